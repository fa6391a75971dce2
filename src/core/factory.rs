use std::any::Any;

use rustc_hash::FxHashMap;

use crate::core::class::{ClassDescriptor, ClassId};

/// Named registry of class descriptors with name and id lookup tables.
///
/// `P` is the factory's product type. Creation by unknown name or id
/// returns `None` rather than failing hard; the spawn path decides how to
/// recover.
pub struct ObjectFactory<P> {
    tag: &'static str,
    classes: Vec<ClassDescriptor<P>>,
    name_table: FxHashMap<&'static str, usize>,
    id_table: FxHashMap<ClassId, usize>,
}

impl<P> ObjectFactory<P> {
    #[must_use]
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            classes: Vec::new(),
            name_table: FxHashMap::default(),
            id_table: FxHashMap::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    #[inline]
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Registers a class. Re-registering a name or id is rejected.
    pub fn register(&mut self, descriptor: ClassDescriptor<P>) -> bool {
        if self.name_table.contains_key(descriptor.name) || self.id_table.contains_key(&descriptor.id)
        {
            log::warn!(
                "{}: class {:?} already registered",
                self.tag,
                descriptor.name
            );
            return false;
        }
        let index = self.classes.len();
        self.name_table.insert(descriptor.name, index);
        self.id_table.insert(descriptor.id, index);
        self.classes.push(descriptor);
        true
    }

    #[must_use]
    pub fn find_class(&self, name: &str) -> Option<&ClassDescriptor<P>> {
        self.name_table.get(name).map(|&i| &self.classes[i])
    }

    #[must_use]
    pub fn lookup_class(&self, id: ClassId) -> Option<&ClassDescriptor<P>> {
        self.id_table.get(&id).map(|&i| &self.classes[i])
    }

    #[must_use]
    pub fn classes(&self) -> &[ClassDescriptor<P>] {
        &self.classes
    }

    /// Constructs an instance by class name; `None` when unknown.
    #[must_use]
    pub fn create_by_name(&self, name: &str) -> Option<P> {
        self.find_class(name).map(ClassDescriptor::create_instance)
    }

    /// Constructs an instance by class id; `None` when unknown.
    #[must_use]
    pub fn create_by_id(&self, id: ClassId) -> Option<P> {
        self.lookup_class(id).map(ClassDescriptor::create_instance)
    }

    /// Walks the super chain of `class`; O(depth).
    #[must_use]
    pub fn is_subclass_of(&self, class: ClassId, superclass: ClassId) -> bool {
        let mut current = Some(class);
        while let Some(id) = current {
            if id == superclass {
                return true;
            }
            current = self.lookup_class(id).and_then(|c| c.super_class);
        }
        false
    }

    /// Iterates attribute descriptors from the root of the super chain down
    /// to the final class, invoking each copy thunk. Used to instantiate
    /// from a template.
    pub fn clone_attributes(&self, final_class: ClassId, src: &dyn Any, dst: &mut dyn Any) {
        let mut chain = Vec::new();
        let mut current = Some(final_class);
        while let Some(id) = current {
            let Some(descriptor) = self.lookup_class(id) else {
                break;
            };
            chain.push(descriptor);
            current = descriptor.super_class;
        }
        for descriptor in chain.into_iter().rev() {
            descriptor.copy_own_attributes(src, dst);
        }
    }
}

impl<P> std::fmt::Debug for ObjectFactory<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectFactory")
            .field("tag", &self.tag)
            .field("classes", &self.classes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::class::class_id;

    #[test]
    fn create_by_name_and_id() {
        let mut factory: ObjectFactory<u32> = ObjectFactory::new("test factory");
        assert!(factory.register(ClassDescriptor::new("Base", None, || 1u32)));
        let base_id = class_id("Base");
        assert!(factory.register(ClassDescriptor::new("Derived", Some(base_id), || 2u32)));

        assert_eq!(factory.create_by_name("Base"), Some(1));
        assert_eq!(factory.create_by_id(class_id("Derived")), Some(2));
        assert_eq!(factory.create_by_name("Missing"), None);
        assert_eq!(factory.create_by_id(42), None);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut factory: ObjectFactory<u32> = ObjectFactory::new("test factory");
        assert!(factory.register(ClassDescriptor::new("Base", None, || 1u32)));
        assert!(!factory.register(ClassDescriptor::new("Base", None, || 9u32)));
        assert_eq!(factory.class_count(), 1);
    }

    #[test]
    fn subclass_walk() {
        let mut factory: ObjectFactory<u32> = ObjectFactory::new("test factory");
        factory.register(ClassDescriptor::new("A", None, || 0u32));
        factory.register(ClassDescriptor::new("B", Some(class_id("A")), || 0u32));
        factory.register(ClassDescriptor::new("C", Some(class_id("B")), || 0u32));

        assert!(factory.is_subclass_of(class_id("C"), class_id("A")));
        assert!(factory.is_subclass_of(class_id("C"), class_id("C")));
        assert!(!factory.is_subclass_of(class_id("A"), class_id("C")));
    }
}

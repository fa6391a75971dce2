use std::any::Any;

use xxhash_rust::xxh3::xxh3_64;

use crate::core::attribute::AttributeDescriptor;

/// Stable 64-bit class identifier, derived from the class name so it
/// survives registration-order changes and rebuilds.
pub type ClassId = u64;

/// Computes the stable id for a class name.
#[inline]
#[must_use]
pub fn class_id(name: &str) -> ClassId {
    xxh3_64(name.as_bytes())
}

/// Metadata record for one polymorphic class.
///
/// `P` is the product the construction thunk yields; each factory has its
/// own product type (e.g. boxed actor scripts for the actor factory).
pub struct ClassDescriptor<P> {
    pub name: &'static str,
    pub id: ClassId,
    pub super_class: Option<ClassId>,
    attributes: Vec<AttributeDescriptor>,
    construct: Box<dyn Fn() -> P>,
}

impl<P> ClassDescriptor<P> {
    #[must_use]
    pub fn new(
        name: &'static str,
        super_class: Option<ClassId>,
        construct: impl Fn() -> P + 'static,
    ) -> Self {
        Self {
            name,
            id: class_id(name),
            super_class,
            attributes: Vec::new(),
            construct: Box::new(construct),
        }
    }

    /// Appends an attribute; registration order is the serialization order.
    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeDescriptor) -> Self {
        debug_assert!(
            self.attributes.iter().all(|a| a.name != attribute.name),
            "duplicate attribute"
        );
        self.attributes.push(attribute);
        self
    }

    #[inline]
    #[must_use]
    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    #[must_use]
    pub fn find_attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Constructs a fresh instance.
    #[must_use]
    pub fn create_instance(&self) -> P {
        (self.construct)()
    }

    /// Invokes every attribute copy thunk of this class (not the super
    /// chain; see `ObjectFactory::clone_attributes`).
    pub fn copy_own_attributes(&self, src: &dyn Any, dst: &mut dyn Any) {
        for attribute in &self.attributes {
            attribute.copy_value(src, dst);
        }
    }
}

impl<P> std::fmt::Debug for ClassDescriptor<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("super_class", &self.super_class)
            .field("attributes", &self.attributes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_and_distinct() {
        assert_eq!(class_id("Actor"), class_id("Actor"));
        assert_ne!(class_id("Actor"), class_id("Pawn"));
    }
}

//! Attribute descriptors and string codecs.
//!
//! An attribute is a named typed accessor pair plus codec thunks. Numeric
//! attributes round-trip through their bit pattern rendered as a decimal
//! integer, so `to_string . from_string` is exact; string attributes
//! round-trip verbatim.

use std::any::Any;

use bitflags::bitflags;
use glam::{Quat, Vec3};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct AttributeFlags: u32 {
        const DEFAULT   = 0;
        /// Excluded from serialization; still cloned from templates.
        const TRANSIENT = 1 << 0;
    }
}

/// A value type an attribute can carry.
///
/// `encode`/`decode` define the serialized form; implementations for float
/// carriers go through the bit pattern to preserve exact values.
pub trait AttributeValue: Sized + Clone + 'static {
    fn encode(&self) -> String;
    fn decode(text: &str) -> Option<Self>;
}

impl AttributeValue for bool {
    fn encode(&self) -> String {
        String::from(if *self { "1" } else { "0" })
    }
    fn decode(text: &str) -> Option<Self> {
        text.trim().parse::<u8>().ok().map(|v| v != 0)
    }
}

macro_rules! impl_int_attribute {
    ($($ty:ty),*) => {$(
        impl AttributeValue for $ty {
            fn encode(&self) -> String {
                self.to_string()
            }
            fn decode(text: &str) -> Option<Self> {
                text.trim().parse().ok()
            }
        }
    )*};
}

impl_int_attribute!(i8, u8, i16, u16, i32, u32, i64, u64);

impl AttributeValue for f32 {
    fn encode(&self) -> String {
        self.to_bits().to_string()
    }
    fn decode(text: &str) -> Option<Self> {
        text.trim().parse::<u32>().ok().map(f32::from_bits)
    }
}

impl AttributeValue for f64 {
    fn encode(&self) -> String {
        self.to_bits().to_string()
    }
    fn decode(text: &str) -> Option<Self> {
        text.trim().parse::<u64>().ok().map(f64::from_bits)
    }
}

fn encode_floats(values: &[f32]) -> String {
    let mut out = String::new();
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&v.to_bits().to_string());
    }
    out
}

fn decode_floats<const N: usize>(text: &str) -> Option<[f32; N]> {
    let mut out = [0.0f32; N];
    let mut parts = text.split_whitespace();
    for slot in &mut out {
        *slot = f32::from_bits(parts.next()?.parse::<u32>().ok()?);
    }
    Some(out)
}

impl AttributeValue for Vec3 {
    fn encode(&self) -> String {
        encode_floats(&self.to_array())
    }
    fn decode(text: &str) -> Option<Self> {
        decode_floats::<3>(text).map(Self::from_array)
    }
}

impl AttributeValue for Quat {
    fn encode(&self) -> String {
        encode_floats(&self.to_array())
    }
    fn decode(text: &str) -> Option<Self> {
        decode_floats::<4>(text).map(Self::from_array)
    }
}

impl AttributeValue for String {
    fn encode(&self) -> String {
        self.clone()
    }
    fn decode(text: &str) -> Option<Self> {
        Some(text.to_owned())
    }
}

type ToStringThunk = Box<dyn Fn(&dyn Any) -> Option<String>>;
type FromStringThunk = Box<dyn Fn(&mut dyn Any, &str) -> bool>;
type CopyThunk = Box<dyn Fn(&dyn Any, &mut dyn Any) -> bool>;

/// Named attribute with codec and copy thunks.
///
/// The thunks downcast the host object internally; a host of the wrong type
/// is a no-op that returns false (logged by callers that care).
pub struct AttributeDescriptor {
    pub name: &'static str,
    pub flags: AttributeFlags,
    to_string: ToStringThunk,
    from_string: FromStringThunk,
    copy: CopyThunk,
}

impl AttributeDescriptor {
    /// Builds a descriptor from a getter/setter pair on host type `T`.
    #[must_use]
    pub fn new<T, V>(
        name: &'static str,
        flags: AttributeFlags,
        get: fn(&T) -> V,
        set: fn(&mut T, V),
    ) -> Self
    where
        T: 'static,
        V: AttributeValue,
    {
        Self {
            name,
            flags,
            to_string: Box::new(move |host| {
                host.downcast_ref::<T>().map(|t| get(t).encode())
            }),
            from_string: Box::new(move |host, text| {
                let Some(t) = host.downcast_mut::<T>() else {
                    return false;
                };
                let Some(value) = V::decode(text) else {
                    return false;
                };
                set(t, value);
                true
            }),
            copy: Box::new(move |src, dst| {
                let Some(s) = src.downcast_ref::<T>() else {
                    return false;
                };
                let value = get(s);
                let Some(d) = dst.downcast_mut::<T>() else {
                    return false;
                };
                set(d, value);
                true
            }),
        }
    }

    /// Serializes the attribute of `host`; `None` if the host type does not
    /// match.
    #[must_use]
    pub fn get_value(&self, host: &dyn Any) -> Option<String> {
        (self.to_string)(host)
    }

    /// Parses `text` and stores it into `host`; false on type or parse
    /// mismatch.
    pub fn set_value(&self, host: &mut dyn Any, text: &str) -> bool {
        (self.from_string)(host, text)
    }

    /// Copies the attribute value from `src` to `dst`.
    pub fn copy_value(&self, src: &dyn Any, dst: &mut dyn Any) -> bool {
        (self.copy)(src, dst)
    }
}

impl std::fmt::Debug for AttributeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeDescriptor")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_codec_is_bit_exact() {
        for v in [0.1f32, -0.0, f32::MIN_POSITIVE, 1.0e20, std::f32::consts::PI] {
            let encoded = v.encode();
            let decoded = f32::decode(&encoded).unwrap();
            assert_eq!(v.to_bits(), decoded.to_bits());
        }
    }

    #[test]
    fn vec3_codec_roundtrip() {
        let v = Vec3::new(0.1, -2.5, 1.0e-8);
        let decoded = Vec3::decode(&v.encode()).unwrap();
        assert_eq!(v, decoded);
    }

    struct Host {
        health: f32,
        title: String,
    }

    #[test]
    fn attribute_thunks_roundtrip() {
        let health = AttributeDescriptor::new::<Host, f32>(
            "Health",
            AttributeFlags::DEFAULT,
            |h| h.health,
            |h, v| h.health = v,
        );
        let title = AttributeDescriptor::new::<Host, String>(
            "Title",
            AttributeFlags::DEFAULT,
            |h| h.title.clone(),
            |h, v| h.title = v,
        );

        let mut a = Host {
            health: 0.1,
            title: "alpha".into(),
        };
        let mut b = Host {
            health: 0.0,
            title: String::new(),
        };

        let text = health.get_value(&a).unwrap();
        assert!(health.set_value(&mut b, &text));
        assert_eq!(a.health.to_bits(), b.health.to_bits());

        assert!(title.copy_value(&a, &mut b));
        assert_eq!(b.title, "alpha");

        // Wrong host type is rejected
        let mut wrong = 0u32;
        assert!(!health.set_value(&mut wrong, &text));
        a.health = 7.0;
        assert!(health.copy_value(&a, &mut b));
        assert_eq!(b.health, 7.0);
    }
}

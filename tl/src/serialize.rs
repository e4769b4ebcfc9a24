// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::deserialize::RawVec;

/// Types that know how to write themselves out in TL's binary encoding.
pub trait Serializable {
    fn serialize(&self, buf: &mut impl Extend<u8>);

    /// Convenience wrapper that serializes into a freshly-allocated buffer.
    ///
    /// [`String`] overrides this to skip the length-prefix framing, mirroring
    /// the special-cased `from_bytes` in [`crate::Deserializable`].
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize(&mut buf);
        buf
    }
}

impl Serializable for bool {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        let id: u32 = if *self { 0x997275b5 } else { 0xbc799737 };
        id.serialize(buf);
    }
}

macro_rules! impl_serializable_int {
    ($ty:ty) => {
        impl Serializable for $ty {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                buf.extend(self.to_le_bytes());
            }
        }
    };
}

impl_serializable_int!(i32);
impl_serializable_int!(u32);
impl_serializable_int!(i64);
impl_serializable_int!(u64);
impl_serializable_int!(f64);

impl Serializable for [u8; 16] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.iter().copied());
    }
}

impl Serializable for [u8; 32] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.iter().copied());
    }
}

impl Serializable for Vec<u8> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        if self.len() < 254 {
            buf.extend(std::iter::once(self.len() as u8));
            buf.extend(self.iter().copied());
            let consumed = 1 + self.len();
            let padding = (4 - (consumed % 4)) % 4;
            buf.extend(std::iter::repeat(0u8).take(padding));
        } else {
            buf.extend(std::iter::once(254u8));
            let len = self.len() as u32;
            buf.extend(len.to_le_bytes()[..3].iter().copied());
            buf.extend(self.iter().copied());
            let consumed = 4 + self.len();
            let padding = (4 - (consumed % 4)) % 4;
            buf.extend(std::iter::repeat(0u8).take(padding));
        }
    }
}

impl Serializable for String {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_bytes().to_vec().serialize(buf);
    }

    /// Returns the raw, unframed bytes, matching the overridden
    /// `Deserializable::from_bytes` for this type.
    fn to_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl<T: Serializable> Serializable for Vec<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        0x1cb5c415u32.serialize(buf);
        (self.len() as u32).serialize(buf);
        self.iter().for_each(|item| item.serialize(buf));
    }
}

impl<T: Serializable> Serializable for RawVec<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (self.0.len() as u32).serialize(buf);
        self.0.iter().for_each(|item| item.serialize(buf));
    }
}

impl<T: Serializable> Serializable for Option<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        if let Some(value) = self {
            value.serialize(buf);
        }
    }
}

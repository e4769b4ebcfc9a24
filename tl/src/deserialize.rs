// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A minimal binary cursor and the [`Deserializable`] trait used to read
//! TL-encoded values off the wire.

use std::fmt;

/// Things that can go wrong while reading a TL value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The cursor ran out of bytes before a value could be fully read.
    UnexpectedEof,

    /// A boxed value started with a constructor ID we don't know about.
    UnexpectedConstructor { id: u32 },
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of buffer"),
            Self::UnexpectedConstructor { id } => {
                write!(f, "unexpected constructor: {:08x}", id)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A forward-only cursor over a borrowed byte slice.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// How many bytes have been consumed so far.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// How many bytes remain unread.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Reads a little-endian `u32` without advancing the cursor. Used by
    /// boxed unions to pick a variant before handing the whole value off to
    /// that variant's own (constructor-checking) `deserialize`.
    pub fn peek_u32(&self) -> Result<u32> {
        let slice = self
            .buf
            .get(self.pos..self.pos + 4)
            .ok_or(Error::UnexpectedEof)?;
        Ok(u32::from_le_bytes(slice.try_into().unwrap()))
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let byte = *self.buf.get(self.pos).ok_or(Error::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        let end = self.pos + out.len();
        let slice = self.buf.get(self.pos..end).ok_or(Error::UnexpectedEof)?;
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(())
    }

    /// Reads whatever bytes are left in the cursor.
    pub fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&self.buf[self.pos..]);
        self.pos = self.buf.len();
        Ok(())
    }
}

/// Types that know how to read themselves out of a [`Cursor`].
pub trait Deserializable: Sized {
    fn deserialize(buf: &mut Cursor) -> Result<Self>;

    /// Convenience wrapper that reads a value out of a standalone buffer.
    ///
    /// For most types this is simply `deserialize` over the whole slice;
    /// [`String`] overrides this to treat `bytes` as raw, unframed content
    /// (see its impl below for why).
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::deserialize(&mut Cursor::from_slice(bytes))
    }
}

impl Deserializable for bool {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        match u32::deserialize(buf)? {
            0x997275b5 => Ok(true),
            0xbc799737 => Ok(false),
            id => Err(Error::UnexpectedConstructor { id }),
        }
    }
}

macro_rules! impl_deserializable_int {
    ($ty:ty) => {
        impl Deserializable for $ty {
            fn deserialize(buf: &mut Cursor) -> Result<Self> {
                let mut bytes = [0; std::mem::size_of::<$ty>()];
                buf.read_exact(&mut bytes)?;
                Ok(<$ty>::from_le_bytes(bytes))
            }
        }
    };
}

impl_deserializable_int!(i32);
impl_deserializable_int!(u32);
impl_deserializable_int!(i64);
impl_deserializable_int!(u64);
impl_deserializable_int!(f64);

impl Deserializable for [u8; 16] {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        let mut out = [0; 16];
        buf.read_exact(&mut out)?;
        Ok(out)
    }
}

impl Deserializable for [u8; 32] {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        let mut out = [0; 32];
        buf.read_exact(&mut out)?;
        Ok(out)
    }
}

impl Deserializable for Vec<u8> {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        let first_byte = buf.read_byte()?;
        let len = if first_byte == 254 {
            let mut len_bytes = [0; 4];
            len_bytes[0] = buf.read_byte()?;
            len_bytes[1] = buf.read_byte()?;
            len_bytes[2] = buf.read_byte()?;
            u32::from_le_bytes(len_bytes) as usize
        } else {
            first_byte as usize
        };

        let mut value = vec![0; len];
        buf.read_exact(&mut value)?;

        let consumed = if first_byte == 254 { 4 } else { 1 } + len;
        let padding = (4 - (consumed % 4)) % 4;
        for _ in 0..padding {
            buf.read_byte()?;
        }

        Ok(value)
    }
}

/// The TL `string` type is physically identical to `bytes`; this library
/// stores it losslessly (via `from_utf8_unchecked` on invalid sequences)
/// because several handshake fields (`p`, `q`, `encrypted_data`, ...) carry
/// arbitrary binary data through a field typed `string` in the schema.
impl Deserializable for String {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        Ok(bytes_into_string(Vec::<u8>::deserialize(buf)?))
    }

    /// Wraps `bytes` directly with no length-prefix framing, unlike the
    /// blanket implementation of `from_bytes`. Used to build outgoing
    /// fields out of raw computed bytes (e.g. `p`/`q`/`encrypted_data`).
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bytes_into_string(bytes.to_vec()))
    }
}

fn bytes_into_string(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|err| unsafe { String::from_utf8_unchecked(err.into_bytes()) })
}

impl<T: Deserializable> Deserializable for Vec<T> {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        let constructor_id = u32::deserialize(buf)?;
        if constructor_id != 0x1cb5c415 {
            return Err(Error::UnexpectedConstructor { id: constructor_id });
        }

        let len = u32::deserialize(buf)? as usize;
        let mut result = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            result.push(T::deserialize(buf)?);
        }
        Ok(result)
    }
}

/// A bare (unboxed) vector: no `0x1cb5c415` constructor prefix, just the
/// element count followed by the elements. Used for bare fields such as
/// `server_public_key_fingerprints`.
pub struct RawVec<T>(pub Vec<T>);

impl<T: Deserializable> Deserializable for RawVec<T> {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        let len = u32::deserialize(buf)? as usize;
        let mut result = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            result.push(T::deserialize(buf)?);
        }
        Ok(RawVec(result))
    }
}

/// The remaining bytes of a buffer, read verbatim with no framing at all.
///
/// Used as the `Return` type of calls whose response this crate only
/// models at the envelope level (e.g. `updates.getDifference`): the caller
/// is expected to peek the leading constructor and pick the trailing
/// fields it cares about back out of the raw bytes itself, rather than
/// have this crate walk a schema it doesn't have.
pub struct Opaque(pub Vec<u8>);

impl Deserializable for Opaque {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        let mut out = Vec::new();
        buf.read_to_end(&mut out)?;
        Ok(Opaque(out))
    }
}

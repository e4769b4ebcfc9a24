// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Implementation of the several [MTProto transports]. This layer is
//! responsible for taking serialized messages from the MTP and packing them
//! in a format that can be sent over a protocol, such as TCP, HTTP or UDP.
//!
//! [MTProto transports]: https://core.telegram.org/mtproto#mtproto-transport
mod abridged;
mod full;
mod intermediate;
mod obfuscated;

pub use abridged::Abridged;
pub use full::Full;
pub use intermediate::Intermediate;
pub use obfuscated::Obfuscated;
use std::fmt;

use tgproto_crypto::RingBuffer;

/// The default cap on a single framed packet's length, enforced by every
/// transport before it will wait for the rest of an oversized claimed
/// frame to arrive. Without this, a peer could announce an arbitrarily
/// large length and leave the reader buffering forever.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// The error type reported by the different transports when something is wrong.
///
/// Certain transports will only produce certain variants of this error.
///
/// Unless the variant is `MissingBytes`, the connection should not continue.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Not enough bytes are provided.
    MissingBytes,

    /// The length is either too short or too long to represent a valid packet.
    BadLen { got: i32 },

    /// The claimed frame length exceeds [`DEFAULT_MAX_FRAME_LEN`] (or
    /// whatever maximum the transport was configured with).
    InvalidLength { got: i64, max: usize },

    /// The sequence number received does not match the expected value.
    BadSeq { expected: i32, got: i32 },

    /// The checksum of the packet does not match its expected value.
    BadCrc { expected: u32, got: u32 },

    /// The server replied with a negative HTTP-style status code, meaning
    /// the transport-level handshake or framing was rejected outright.
    BadStatus { status: u32 },
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error: ")?;
        match self {
            Error::MissingBytes => write!(f, "need more bytes"),
            Error::BadLen { got } => write!(f, "bad len (got {})", got),
            Error::InvalidLength { got, max } => {
                write!(f, "frame length {got} exceeds the maximum of {max} bytes")
            }
            Error::BadSeq { expected, got } => {
                write!(f, "bad seq (expected {}, got {})", expected, got)
            }
            Error::BadCrc { expected, got } => {
                write!(f, "bad crc (expected {}, got {})", expected, got)
            }
            Error::BadStatus { status } => write!(f, "bad status ({})", status),
        }
    }
}

/// The region of a transport's receive buffer that held one complete packet.
pub struct UnpackedOffset {
    /// Where the packet's payload begins.
    pub data_start: usize,
    /// Where the packet's payload ends.
    pub data_end: usize,
    /// How many bytes of the input were consumed by this packet, including
    /// any framing overhead. The next call to `unpack` should start here.
    pub next_offset: usize,
}

/// The trait used by the transports to frame and deframe payloads.
pub trait Transport {
    /// Packs `buffer` in place, prepending and/or appending whatever framing
    /// this transport requires.
    ///
    /// Panics if `buffer.len()` is not divisible by 4.
    fn pack(&mut self, buffer: &mut RingBuffer<u8>);

    /// Attempts to locate one complete framed packet at the start of
    /// `buffer`, returning the offsets of its payload and how many bytes to
    /// advance before the next call.
    ///
    /// Returns `Error::MissingBytes` if `buffer` does not yet hold a full
    /// packet; the caller should read more data and retry with a larger
    /// buffer.
    fn unpack(&mut self, buffer: &mut [u8]) -> Result<UnpackedOffset, Error>;

    /// Resets any per-connection transport state, such as sequence counters
    /// or obfuscation keys, so the transport can be used again after a
    /// reconnect.
    fn reset(&mut self);
}

/// Transports that can report the four-byte tag used to identify them when
/// wrapped in [`Obfuscated`].
pub trait Tagged {
    /// Returns the tag and marks the transport as already initialized, so
    /// a subsequent `pack` call does not also prepend it.
    fn init_tag(&mut self) -> [u8; 4];
}

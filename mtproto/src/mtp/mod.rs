// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Implementation of the [Mobile Transport Protocol], the layer on top of
//! the transport that's responsible for packing requests into messages
//! (optionally encrypted) and unpacking responses back.
//!
//! [Mobile Transport Protocol]: https://core.telegram.org/mtproto/description
mod encrypted;
mod plain;

pub use encrypted::Encrypted;
pub use plain::Plain;

pub use crate::errors::{DeserializeError, RequestError};
use crate::MsgId;

/// The result of deserializing an incoming, already-decrypted message.
#[derive(Debug, Default)]
pub struct Deserialization {
    /// Result bodies for previously-sent requests, keyed by their `msg_id`.
    pub rpc_results: Vec<(MsgId, Result<Vec<u8>, RequestError>)>,

    /// Updates that did not belong to the response of any request we sent.
    pub updates: Vec<Vec<u8>>,
}

/// A sans-I/O state machine responsible for packing requests into messages
/// ready to be sent over a [`Transport`](crate::transport::Transport), and
/// unpacking the responses that come back.
pub trait Mtp {
    /// Pushes a new request into the internal buffer, returning the `msg_id`
    /// that will identify its response, or `None` if the buffer has no room
    /// left for it (the queued requests should be `finalize`d first).
    fn push(&mut self, request: &[u8]) -> Option<MsgId>;

    /// Finalizes the queued requests into the payload that should be given
    /// to the transport. Calling this clears the internal buffer.
    fn finalize(&mut self) -> Vec<u8>;

    /// Deserializes a payload received from the transport, updating any
    /// internal state (such as the time offset or server salt) and
    /// returning the RPC results and updates found within.
    fn deserialize(&mut self, payload: &[u8]) -> Result<Deserialization, DeserializeError>;
}

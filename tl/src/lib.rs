// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Hand-written TL (Type Language) wire types.
//!
//! Unlike a schema-driven TL code generator, nothing here is generated from
//! a `.tl` schema file: only the constructors actually exercised by the
//! authorization handshake, the service-message layer (acks, bad-message
//! notifications, salts, containers, pings) and the envelope of update
//! containers are modelled, by hand, in [`types`], [`enums`] and
//! [`functions`].

pub mod deserialize;
pub mod enums;
pub mod functions;
mod identifiable;
pub mod serialize;
pub mod types;

pub use deserialize::{Cursor, Deserializable, Opaque};
pub use identifiable::{Identifiable, RemoteCall};
pub use serialize::Serializable;

/// The schema layer this client announces via `invokeWithLayer`.
pub const LAYER: i32 = 181;

/// `Vector`'s boxed-constructor marker (`0x1cb5c415`), exposed for callers
/// that need to peek a buffer's leading constructor without fully decoding
/// it (e.g. classifying an incoming message as a known service message vs.
/// an opaque update).
pub const VECTOR_CONSTRUCTOR_ID: u32 = 0x1cb5c415;

/// Best-effort human-readable name for a constructor ID, used when
/// formatting errors that reference one (e.g. `bad_msg_notification`'s
/// `caused_by` field). Falls back to a generic label for anything not in
/// this (deliberately partial) table.
pub fn name_for_id(id: u32) -> &'static str {
    macro_rules! table {
        ($($id:expr => $name:expr),* $(,)?) => {
            match id {
                $($id => $name,)*
                _ => "unknown",
            }
        };
    }

    table! {
        0x05162463 => "resPQ",
        0x83c95aec => "p_q_inner_data",
        0x79cb045d => "server_DH_params_fail",
        0xd0e8075c => "server_DH_params_ok",
        0xb5890dba => "server_DH_inner_data",
        0x6643b654 => "client_DH_inner_data",
        0x3bcbf734 => "dh_gen_ok",
        0x46dc1fb9 => "dh_gen_retry",
        0xa69dae02 => "dh_gen_fail",
        0x2144ca19 => "rpc_error",
        0x62d6b459 => "msgs_ack",
        0xa7eff811 => "bad_msg_notification",
        0xedab447b => "bad_server_salt",
        0xda69fb52 => "msgs_state_req",
        0x04deb57d => "msgs_state_info",
        0x8cc0d131 => "msgs_all_info",
        0x276d3ec6 => "msg_detailed_info",
        0x809db6df => "msg_new_detailed_info",
        0x7d861a08 => "msg_resend_req",
        0x8610baeb => "msg_resend_ans_req",
        0x0949d9dc => "future_salt",
        0xae500895 => "future_salts",
        0x347773c5 => "pong",
        0xe22045fc => "destroy_session_ok",
        0x62d350c9 => "destroy_session_none",
        0x9ec20908 => "new_session_created",
        0x9299359f => "http_wait",
        0x5e2ad36e => "rpc_answer_unknown",
        0xcd78e586 => "rpc_answer_dropped_running",
        0xa43ad8b7 => "rpc_answer_dropped",
        0x313bc7f8 => "updateShortMessage",
        0x4d6deea5 => "updateShortChatMessage",
        0x78d4dec1 => "updateShort",
        0x725b04c3 => "updatesCombined",
        0x74ae4240 => "updates",
        0x9015e101 => "updateShortSentMessage",
        0x18b7a10d => "dcOption",
        0x232566ac => "config",
        0xf35c6d01 => "rpc_result",
        0x73f1f8dc => "msg_container",
        0xe06046b2 => "msg_copy",
        0x3072cfa1 => "gzip_packed",
        0xa56c2a3e => "updates.state",
        0x00f49ca0 => "updates.difference",
        0xa8fb1981 => "updates.differenceSlice",
        0x5d75a138 => "updates.differenceEmpty",
        0x4afe8f6d => "updates.differenceTooLong",
        0x3e11affb => "updates.channelDifferenceEmpty",
        0x2064674e => "updates.channelDifference",
        0xa4bcc6fe => "updates.channelDifferenceTooLong",
        0x19c2f763 => "updates.getDifference",
        0x03173d78 => "updates.getChannelDifference",
    }
}

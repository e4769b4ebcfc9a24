// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Concrete (boxed) TL constructors. Only the constructors actually needed
//! to drive the authorization handshake, the service-message layer and the
//! envelope of update containers are modelled here; there is no code
//! generator behind this module.

use crate::{Cursor, Deserializable, Identifiable, Serializable};
use crate::deserialize::{self, Error, Result};

macro_rules! simple_struct {
    ($name:ident { $($field:ident : $ty:ty),* $(,)? }, $id:expr) => {
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            $(pub $field: $ty,)*
        }

        impl Identifiable for $name {
            #[allow(clippy::unreadable_literal)]
            const CONSTRUCTOR_ID: u32 = $id;
        }

        impl Serializable for $name {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                Self::CONSTRUCTOR_ID.serialize(buf);
                $(self.$field.serialize(buf);)*
            }
        }

        impl Deserializable for $name {
            fn deserialize(buf: &mut Cursor) -> Result<Self> {
                let constructor_id = u32::deserialize(buf)?;
                if constructor_id != Self::CONSTRUCTOR_ID {
                    return Err(Error::UnexpectedConstructor { id: constructor_id });
                }
                $(let $field = <$ty>::deserialize(buf)?;)*
                Ok(Self { $($field,)* })
            }
        }
    };
}

// --- authorization handshake -----------------------------------------------

simple_struct!(ResPq {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    pq: String,
    server_public_key_fingerprints: Vec<i64>,
}, 0x05162463);

simple_struct!(PQInnerData {
    pq: String,
    p: String,
    q: String,
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce: [u8; 32],
}, 0x83c95aec);

simple_struct!(ServerDhParamsFail {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce_hash: [u8; 16],
}, 0x79cb045d);

simple_struct!(ServerDhParamsOk {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    encrypted_answer: String,
}, 0xd0e8075c);

simple_struct!(ServerDhInnerData {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    g: i32,
    dh_prime: String,
    g_a: String,
    server_time: i32,
}, 0xb5890dba);

simple_struct!(ClientDhInnerData {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    retry_id: i64,
    g_b: String,
}, 0x6643b654);

simple_struct!(DhGenOk {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce_hash1: [u8; 16],
}, 0x3bcbf734);

simple_struct!(DhGenRetry {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce_hash2: [u8; 16],
}, 0x46dc1fb9);

simple_struct!(DhGenFail {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce_hash3: [u8; 16],
}, 0xa69dae02);

// --- service messages --------------------------------------------------------

simple_struct!(RpcError {
    error_code: i32,
    error_message: String,
}, 0x2144ca19);

simple_struct!(MsgsAck {
    msg_ids: Vec<i64>,
}, 0x62d6b459);

simple_struct!(BadMsgNotification {
    bad_msg_id: i64,
    bad_msg_seqno: i32,
    error_code: i32,
}, 0xa7eff811);

simple_struct!(BadServerSalt {
    bad_msg_id: i64,
    bad_msg_seqno: i32,
    error_code: i32,
    new_server_salt: i64,
}, 0xedab447b);

simple_struct!(MsgsStateReq {
    msg_ids: Vec<i64>,
}, 0xda69fb52);

simple_struct!(MsgsStateInfo {
    req_msg_id: i64,
    info: String,
}, 0x04deb57d);

simple_struct!(MsgsAllInfo {
    msg_ids: Vec<i64>,
    info: String,
}, 0x8cc0d131);

simple_struct!(MsgDetailedInfo {
    msg_id: i64,
    answer_msg_id: i64,
    bytes: i32,
    status: i32,
}, 0x276d3ec6);

simple_struct!(MsgNewDetailedInfo {
    answer_msg_id: i64,
    bytes: i32,
    status: i32,
}, 0x809db6df);

simple_struct!(MsgResendReq {
    msg_ids: Vec<i64>,
}, 0x7d861a08);

simple_struct!(MsgResendAnsReq {
    msg_ids: Vec<i64>,
}, 0x8610baeb);

simple_struct!(FutureSalt {
    valid_since: i32,
    valid_until: i32,
    salt: i64,
}, 0x0949d9dc);

simple_struct!(FutureSalts {
    req_msg_id: i64,
    now: i32,
    salts: Vec<FutureSalt>,
}, 0xae500895);

simple_struct!(Pong {
    msg_id: i64,
    ping_id: i64,
}, 0x347773c5);

simple_struct!(DestroySessionOk {
    session_id: i64,
}, 0xe22045fc);

simple_struct!(DestroySessionNone {
    session_id: i64,
}, 0x62d350c9);

simple_struct!(NewSessionCreated {
    first_msg_id: i64,
    unique_id: i64,
    server_salt: i64,
}, 0x9ec20908);

simple_struct!(HttpWait {
    max_delay: i32,
    wait_after: i32,
    max_wait: i32,
}, 0x9299359f);

simple_struct!(RpcAnswerUnknown {}, 0x5e2ad36e);

simple_struct!(RpcAnswerDroppedRunning {}, 0xcd78e586);

simple_struct!(RpcAnswerDropped {
    msg_id: i64,
    seq_no: i32,
    bytes: i32,
}, 0xa43ad8b7);

// --- update envelopes ---------------------------------------------------------
//
// Only the account-wide bookkeeping fields are modelled: `pts`/`pts_count`/
// `date` for the "short" forms (which place them before any schema-dependent
// tail we don't otherwise need), and the bare `CONSTRUCTOR_ID` for the two
// container forms whose bookkeeping fields trail a `Vector<Update>` we have
// no schema to walk. See `tgproto_session::updates` for how the trailing
// counters of those two are recovered without a full decode.

simple_struct!(UpdateShortMessage {
    flags: i32,
    id: i32,
    user_id: i64,
    message: String,
    pts: i32,
    pts_count: i32,
    date: i32,
}, 0x313bc7f8);

simple_struct!(UpdateShortChatMessage {
    flags: i32,
    id: i32,
    from_id: i64,
    chat_id: i64,
    message: String,
    pts: i32,
    pts_count: i32,
    date: i32,
}, 0x4d6deea5);

simple_struct!(UpdateShortSentMessage {
    flags: i32,
    id: i32,
    pts: i32,
    pts_count: i32,
    date: i32,
}, 0x9015e101);

pub struct UpdateShort;
impl Identifiable for UpdateShort {
    const CONSTRUCTOR_ID: u32 = 0x78d4dec1;
}

pub struct UpdatesCombined;
impl Identifiable for UpdatesCombined {
    const CONSTRUCTOR_ID: u32 = 0x725b04c3;
}

pub struct Updates;
impl Identifiable for Updates {
    const CONSTRUCTOR_ID: u32 = 0x74ae4240;
}

// --- connection setup / configuration ----------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DcOption {
    pub id: i32,
    pub ip_address: String,
    pub port: i32,
    pub ipv6: bool,
    pub media_only: bool,
    pub tcpo_only: bool,
    pub r#static: bool,
}

impl Identifiable for DcOption {
    const CONSTRUCTOR_ID: u32 = 0x18b7a10d;
}

impl Serializable for DcOption {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        let flags: i32 = (self.ipv6 as i32)
            | ((self.media_only as i32) << 1)
            | ((self.tcpo_only as i32) << 2)
            | ((self.r#static as i32) << 4);
        flags.serialize(buf);
        self.id.serialize(buf);
        self.ip_address.serialize(buf);
        self.port.serialize(buf);
    }
}

impl Deserializable for DcOption {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        let constructor_id = u32::deserialize(buf)?;
        if constructor_id != Self::CONSTRUCTOR_ID {
            return Err(Error::UnexpectedConstructor { id: constructor_id });
        }
        let flags = i32::deserialize(buf)?;
        let id = i32::deserialize(buf)?;
        let ip_address = String::deserialize(buf)?;
        let port = i32::deserialize(buf)?;
        // secret:flags.10?bytes must still be consumed to keep later
        // elements of the enclosing vector aligned.
        if flags & (1 << 10) != 0 {
            let _secret = Vec::<u8>::deserialize(buf)?;
        }
        Ok(Self {
            id,
            ip_address,
            port,
            ipv6: flags & 1 != 0,
            media_only: flags & (1 << 1) != 0,
            tcpo_only: flags & (1 << 2) != 0,
            r#static: flags & (1 << 4) != 0,
        })
    }
}

/// `config`'s trailing fields (rate limits, feature flags, URLs, ...) are
/// out of scope; only the prefix up to and including `dc_options` is read.
/// Whatever bytes follow in the buffer are simply left unread.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub date: i32,
    pub expires: i32,
    pub test_mode: bool,
    pub this_dc: i32,
    pub dc_options: Vec<crate::enums::DcOption>,
}

impl Identifiable for Config {
    const CONSTRUCTOR_ID: u32 = 0x232566ac;
}

impl Deserializable for Config {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        let constructor_id = u32::deserialize(buf)?;
        if constructor_id != Self::CONSTRUCTOR_ID {
            return Err(Error::UnexpectedConstructor { id: constructor_id });
        }
        let _flags = i32::deserialize(buf)?;
        let date = i32::deserialize(buf)?;
        let expires = i32::deserialize(buf)?;
        let test_mode = bool::deserialize(buf)?;
        let this_dc = i32::deserialize(buf)?;
        let dc_options = Vec::<crate::enums::DcOption>::deserialize(buf)?;
        Ok(Self {
            date,
            expires,
            test_mode,
            this_dc,
            dc_options,
        })
    }
}

pub use deserialize::RawVec;

/// Update-difference bookkeeping. Only `updates.state` and the two
/// difference variants whose counters sit before any `Vector<...>` field are
/// modelled fully here; `updates.difference`/`updates.differenceSlice` carry
/// their `updates.State` *after* several vectors this crate has no schema
/// for, so those are recovered by a tail read in `tgproto_session::updates`
/// instead of a dedicated type in this module.
pub mod updates {
    use super::*;

    simple_struct!(State {
        pts: i32,
        qts: i32,
        date: i32,
        seq: i32,
        unread_count: i32,
    }, 0xa56c2a3e);

    simple_struct!(DifferenceEmpty {
        date: i32,
        seq: i32,
    }, 0x5d75a138);

    simple_struct!(DifferenceTooLong {
        pts: i32,
    }, 0x4afe8f6d);

    #[derive(Debug, Clone, PartialEq)]
    pub struct ChannelDifferenceEmpty {
        pub final_: bool,
        pub pts: i32,
        pub timeout: Option<i32>,
    }

    impl Identifiable for ChannelDifferenceEmpty {
        const CONSTRUCTOR_ID: u32 = 0x3e11affb;
    }

    impl Deserializable for ChannelDifferenceEmpty {
        fn deserialize(buf: &mut Cursor) -> Result<Self> {
            let constructor_id = u32::deserialize(buf)?;
            if constructor_id != Self::CONSTRUCTOR_ID {
                return Err(Error::UnexpectedConstructor { id: constructor_id });
            }
            let flags = i32::deserialize(buf)?;
            let pts = i32::deserialize(buf)?;
            let timeout = if flags & (1 << 1) != 0 {
                Some(i32::deserialize(buf)?)
            } else {
                None
            };
            Ok(Self {
                final_: flags & 1 != 0,
                pts,
                timeout,
            })
        }
    }

    /// Only the `final`/`pts`/`timeout` prefix of `updates.channelDifference`
    /// is read; the trailing `new_messages`/`other_updates`/`chats`/`users`
    /// vectors are left unconsumed in the buffer.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ChannelDifference {
        pub final_: bool,
        pub pts: i32,
        pub timeout: Option<i32>,
    }

    impl Identifiable for ChannelDifference {
        const CONSTRUCTOR_ID: u32 = 0x2064674e;
    }

    impl Deserializable for ChannelDifference {
        fn deserialize(buf: &mut Cursor) -> Result<Self> {
            let constructor_id = u32::deserialize(buf)?;
            if constructor_id != Self::CONSTRUCTOR_ID {
                return Err(Error::UnexpectedConstructor { id: constructor_id });
            }
            let flags = i32::deserialize(buf)?;
            let pts = i32::deserialize(buf)?;
            let timeout = if flags & (1 << 1) != 0 {
                Some(i32::deserialize(buf)?)
            } else {
                None
            };
            Ok(Self {
                final_: flags & 1 != 0,
                pts,
                timeout,
            })
        }
    }

    /// `updates.channelDifferenceTooLong` carries a full `Dialog` this crate
    /// has no schema for; only its constructor is recognisable, signalling
    /// that the gap is large enough to require a full channel resync.
    pub struct ChannelDifferenceTooLong;
    impl Identifiable for ChannelDifferenceTooLong {
        const CONSTRUCTOR_ID: u32 = 0xa4bcc6fe;
    }
}

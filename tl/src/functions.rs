// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Outgoing TL functions: requests that pair with a well-known `Return`
//! type via [`RemoteCall`].

use crate::{enums, Cursor, Deserializable, Identifiable, RemoteCall, Serializable};
use crate::deserialize::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct ReqPqMulti {
    pub nonce: [u8; 16],
}

impl Identifiable for ReqPqMulti {
    const CONSTRUCTOR_ID: u32 = 0xbe7e8ef1;
}

impl Serializable for ReqPqMulti {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.nonce.serialize(buf);
    }
}

impl RemoteCall for ReqPqMulti {
    type Return = enums::ResPq;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReqDhParams {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub p: String,
    pub q: String,
    pub public_key_fingerprint: i64,
    pub encrypted_data: String,
}

impl Identifiable for ReqDhParams {
    const CONSTRUCTOR_ID: u32 = 0xd712e4be;
}

impl Serializable for ReqDhParams {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.nonce.serialize(buf);
        self.server_nonce.serialize(buf);
        self.p.serialize(buf);
        self.q.serialize(buf);
        self.public_key_fingerprint.serialize(buf);
        self.encrypted_data.serialize(buf);
    }
}

impl RemoteCall for ReqDhParams {
    type Return = enums::ServerDhParams;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetClientDhParams {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub encrypted_data: String,
}

impl Identifiable for SetClientDhParams {
    const CONSTRUCTOR_ID: u32 = 0xf5045f1f;
}

impl Serializable for SetClientDhParams {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.nonce.serialize(buf);
        self.server_nonce.serialize(buf);
        self.encrypted_data.serialize(buf);
    }
}

impl RemoteCall for SetClientDhParams {
    type Return = enums::SetClientDhParamsAnswer;
}

/// `invokeWithLayer#da9b0d0d layer:int query:!X = X` — wraps any other
/// function to announce the schema layer the client speaks.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeWithLayer<Q> {
    pub layer: i32,
    pub query: Q,
}

impl<Q> Identifiable for InvokeWithLayer<Q> {
    const CONSTRUCTOR_ID: u32 = 0xda9b0d0d;
}

impl<Q: Serializable> Serializable for InvokeWithLayer<Q> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.layer.serialize(buf);
        self.query.serialize(buf);
    }
}

impl<Q: RemoteCall> RemoteCall for InvokeWithLayer<Q> {
    type Return = Q::Return;
}

/// `initConnection#c1cd5ea9 flags:# api_id:int device_model:string
/// system_version:string app_version:string system_lang_code:string
/// lang_pack:string lang_code:string proxy:flags.0?InputClientProxy
/// params:flags.1?JSONValue query:!X = X`.
///
/// `proxy`/`params` are never populated by this crate (no proxy descriptor
/// or client config JSON blob is modelled), so their placeholder type only
/// needs to implement [`Serializable`]; the `Some` arm is unreachable code.
#[derive(Debug, Clone, PartialEq)]
pub struct InitConnection<Q> {
    pub api_id: i32,
    pub device_model: String,
    pub system_version: String,
    pub app_version: String,
    pub system_lang_code: String,
    pub lang_pack: String,
    pub lang_code: String,
    pub proxy: Option<bool>,
    pub params: Option<bool>,
    pub query: Q,
}

impl<Q> Identifiable for InitConnection<Q> {
    const CONSTRUCTOR_ID: u32 = 0xc1cd5ea9;
}

impl<Q: Serializable> Serializable for InitConnection<Q> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        let flags: i32 = (self.proxy.is_some() as i32) | ((self.params.is_some() as i32) << 1);
        flags.serialize(buf);
        self.api_id.serialize(buf);
        self.device_model.serialize(buf);
        self.system_version.serialize(buf);
        self.app_version.serialize(buf);
        self.system_lang_code.serialize(buf);
        self.lang_pack.serialize(buf);
        self.lang_code.serialize(buf);
        self.proxy.serialize(buf);
        self.params.serialize(buf);
        self.query.serialize(buf);
    }
}

impl<Q: RemoteCall> RemoteCall for InitConnection<Q> {
    type Return = Q::Return;
}

pub mod updates {
    use super::*;
    use crate::deserialize::Opaque;

    /// `updates.getDifference#19c2f763 flags:# pts:int pts_total_limit:flags.0?int
    /// date:int qts:int = updates.Difference`.
    ///
    /// The response is only modelled at the envelope level (see
    /// [`crate::types::updates`]), so its `Return` is the raw [`Opaque`]
    /// bytes; `tgproto_session::updates` picks the counters it needs back out
    /// of them.
    #[derive(Debug, Clone, PartialEq)]
    pub struct GetDifference {
        pub pts: i32,
        pub pts_total_limit: Option<i32>,
        pub date: i32,
        pub qts: i32,
    }

    impl Identifiable for GetDifference {
        const CONSTRUCTOR_ID: u32 = 0x19c2f763;
    }

    impl Serializable for GetDifference {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            Self::CONSTRUCTOR_ID.serialize(buf);
            let flags: i32 = self.pts_total_limit.is_some() as i32;
            flags.serialize(buf);
            self.pts.serialize(buf);
            self.pts_total_limit.serialize(buf);
            self.date.serialize(buf);
            self.qts.serialize(buf);
        }
    }

    impl RemoteCall for GetDifference {
        type Return = Opaque;
    }

    /// `updates.getChannelDifference#03173d78 flags:# force:flags.0?true
    /// channel:InputChannel filter:ChannelMessagesFilter pts:int limit:int
    /// = updates.ChannelDifference`.
    ///
    /// `channel` and `filter` are taken as pre-serialized bytes: this crate
    /// has no `InputChannel`/`ChannelMessagesFilter` schema, so the caller is
    /// expected to hand over the already-boxed wire representation of both
    /// (e.g. `inputChannel`/`channelMessagesFilterEmpty`) verbatim.
    #[derive(Debug, Clone, PartialEq)]
    pub struct GetChannelDifference {
        pub force: bool,
        pub channel: Vec<u8>,
        pub filter: Vec<u8>,
        pub pts: i32,
        pub limit: i32,
    }

    impl Identifiable for GetChannelDifference {
        const CONSTRUCTOR_ID: u32 = 0x03173d78;
    }

    impl Serializable for GetChannelDifference {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            Self::CONSTRUCTOR_ID.serialize(buf);
            let flags: i32 = self.force as i32;
            flags.serialize(buf);
            buf.extend(self.channel.iter().copied());
            buf.extend(self.filter.iter().copied());
            self.pts.serialize(buf);
            self.limit.serialize(buf);
        }
    }

    impl RemoteCall for GetChannelDifference {
        type Return = Opaque;
    }
}

pub mod help {
    use super::*;

    /// `help.getConfig#c4f9186b = Config`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GetConfig;

    impl Identifiable for GetConfig {
        const CONSTRUCTOR_ID: u32 = 0xc4f9186b;
    }

    impl Serializable for GetConfig {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            Self::CONSTRUCTOR_ID.serialize(buf);
        }
    }

    impl Deserializable for GetConfig {
        fn deserialize(buf: &mut Cursor) -> Result<Self> {
            let constructor_id = u32::deserialize(buf)?;
            if constructor_id != Self::CONSTRUCTOR_ID {
                return Err(crate::deserialize::Error::UnexpectedConstructor { id: constructor_id });
            }
            Ok(Self)
        }
    }

    impl RemoteCall for GetConfig {
        type Return = enums::Config;
    }
}

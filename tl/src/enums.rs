// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Boxed unions: a TL "type" with more than one possible constructor. Each
//! variant here wraps the concrete struct from [`crate::types`] that
//! actually owns the fields.

use crate::types;
use crate::{Cursor, Deserializable, Identifiable, Serializable};
use crate::deserialize::{Error, Result};

macro_rules! boxed_union {
    ($name:ident { $($variant:ident ( $inner:path ) ),+ $(,)? }) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum $name {
            $($variant($inner),)+
        }

        impl Serializable for $name {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                match self {
                    $($name::$variant(inner) => inner.serialize(buf),)+
                }
            }
        }

        impl Deserializable for $name {
            fn deserialize(buf: &mut Cursor) -> Result<Self> {
                match buf.peek_u32()? {
                    $(<$inner as Identifiable>::CONSTRUCTOR_ID => {
                        Ok($name::$variant(<$inner>::deserialize(buf)?))
                    })+
                    id => Err(Error::UnexpectedConstructor { id }),
                }
            }
        }
    };
}

boxed_union!(ResPq {
    Pq(types::ResPq),
});

boxed_union!(PQInnerData {
    Data(types::PQInnerData),
});

boxed_union!(ServerDhParams {
    Ok(types::ServerDhParamsOk),
    Fail(types::ServerDhParamsFail),
});

boxed_union!(ServerDhInnerData {
    Data(types::ServerDhInnerData),
});

boxed_union!(ClientDhInnerData {
    Data(types::ClientDhInnerData),
});

boxed_union!(SetClientDhParamsAnswer {
    DhGenOk(types::DhGenOk),
    DhGenRetry(types::DhGenRetry),
    DhGenFail(types::DhGenFail),
});

boxed_union!(BadMsgNotification {
    Notification(types::BadMsgNotification),
    BadServerSalt(types::BadServerSalt),
});

boxed_union!(MsgDetailedInfo {
    Info(types::MsgDetailedInfo),
    MsgNewDetailedInfo(types::MsgNewDetailedInfo),
});

boxed_union!(MsgsAck {
    Ack(types::MsgsAck),
});

boxed_union!(FutureSalts {
    Salts(types::FutureSalts),
});

boxed_union!(Pong {
    Pong(types::Pong),
});

boxed_union!(NewSession {
    Created(types::NewSessionCreated),
});

boxed_union!(RpcError {
    Error(types::RpcError),
});

boxed_union!(DcOption {
    Option(types::DcOption),
});

boxed_union!(Config {
    Config(types::Config),
});

// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![deny(unsafe_code)]

//! Drives the sans-I/O [`tgproto_mtproto`] state machine over a real
//! socket (or a user-supplied [`net::NetStream`]).
//!
//! A single [`Sender`] owns one connection to one datacenter. Multi-DC
//! accounts that need to keep several connections alive at once (the
//! home DC plus a media DC, say) are better served by [`sender_pool`],
//! which lazily opens one [`Sender`] per datacenter and routes requests
//! to whichever one a caller names.

pub mod configuration;
pub mod errors;
mod net;
pub mod reconnection;
mod sender;
pub mod sender_pool;
mod utils;

pub use configuration::RetryConfig;
pub use errors::{AuthorizationError, InvocationError, ReadError, RpcError};
pub use net::{NetStream, ServerAddr};
pub use reconnection::{ExponentialReconnect, FixedReconnect, NoReconnect, ReconnectionPolicy};
pub use sender::{connect, connect_with_auth, generate_auth_key, CancelHandle, Sender};
pub use sender_pool::{SenderPool, SenderPoolHandle, SenderPoolRunner};

// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use std::io;

use crate::defs::{DcOption, UpdateState, UpdatesState};

/// Everything a running connection needs to persist across restarts.
///
/// Implementations are shared behind an `Arc` by every sender and task that
/// touches a given account, so every method takes `&self`: interior
/// mutability (a mutex, normally) is the implementor's job.
pub trait Session: Send + Sync {
    /// The datacenter this account is currently "home" in, i.e. the one
    /// the main connection talks to.
    fn home_dc_id(&self) -> i32;

    /// Updates which datacenter is considered home, following a
    /// `USER_MIGRATE_X`/`PHONE_MIGRATE_X` redirection.
    fn set_home_dc_id(&self, dc_id: i32);

    /// The known way to reach `dc_id`, if any, including a cached auth key.
    fn dc_option(&self, dc_id: i32) -> Option<DcOption>;

    /// Remembers (or refreshes) a datacenter's address and/or auth key.
    fn set_dc_option(&self, dc_option: &DcOption);

    /// The access hash cached for `id`, if one was seen before.
    ///
    /// This is a deliberately bare `i64 -> i64` cache: this crate models no
    /// `Peer`/`Chat`/`User` hierarchy, so the key is whatever opaque
    /// identifier the caller associates peers by (typically a user, chat or
    /// channel id).
    fn access_hash(&self, id: i64) -> Option<i64>;

    /// Caches `id`'s access hash, overwriting any previous value.
    fn cache_access_hash(&self, id: i64, access_hash: i64);

    /// The last persisted account-wide update counters.
    fn updates_state(&self) -> UpdatesState;

    /// Per-channel `pts`, if one was persisted for `channel_id`.
    fn channel_pts(&self, channel_id: i64) -> Option<i32>;

    /// Applies an update to the persisted counters.
    fn set_update_state(&self, update: UpdateState);

    /// Flushes whatever is held in memory to durable storage.
    ///
    /// Implementations backed purely by memory may make this a no-op; file-
    /// backed ones must make it crash-safe (see [`crate::FileSession`]).
    fn save(&self) -> io::Result<()>;
}

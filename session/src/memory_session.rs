// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

use crate::defs::{ChannelState, DcOption, UpdateState, UpdatesState, DEFAULT_DC};
use crate::Session;

#[derive(Default)]
struct State {
    home_dc_id: i32,
    dc_options: HashMap<i32, DcOption>,
    access_hashes: HashMap<i64, i64>,
    updates: UpdatesState,
    channels: HashMap<i64, i32>,
}

/// A session implementation kept purely in-memory, lost as soon as the
/// process exits.
///
/// Useful for short-lived scripts, tests, and any caller that plans to
/// export [`Session::save`]'s state through some other channel.
pub struct MemorySession {
    state: Mutex<State>,
}

impl MemorySession {
    /// Create a new, empty session instance.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                home_dc_id: DEFAULT_DC,
                ..Default::default()
            }),
        }
    }
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl Session for MemorySession {
    fn home_dc_id(&self) -> i32 {
        self.state.lock().unwrap().home_dc_id
    }

    fn set_home_dc_id(&self, dc_id: i32) {
        self.state.lock().unwrap().home_dc_id = dc_id;
    }

    fn dc_option(&self, dc_id: i32) -> Option<DcOption> {
        self.state.lock().unwrap().dc_options.get(&dc_id).cloned()
    }

    fn set_dc_option(&self, dc_option: &DcOption) {
        self.state
            .lock()
            .unwrap()
            .dc_options
            .insert(dc_option.id, dc_option.clone());
    }

    fn access_hash(&self, id: i64) -> Option<i64> {
        self.state.lock().unwrap().access_hashes.get(&id).copied()
    }

    fn cache_access_hash(&self, id: i64, access_hash: i64) {
        self.state
            .lock()
            .unwrap()
            .access_hashes
            .insert(id, access_hash);
    }

    fn updates_state(&self) -> UpdatesState {
        self.state.lock().unwrap().updates
    }

    fn channel_pts(&self, channel_id: i64) -> Option<i32> {
        self.state.lock().unwrap().channels.get(&channel_id).copied()
    }

    fn set_update_state(&self, update: UpdateState) {
        let mut state = self.state.lock().unwrap();
        match update {
            UpdateState::All { state: s, channels } => {
                state.updates = s;
                state.channels = channels
                    .into_iter()
                    .map(|ChannelState { id, pts }| (id, pts))
                    .collect();
            }
            UpdateState::Primary { pts, date, seq } => {
                state.updates.pts = pts;
                state.updates.date = date;
                state.updates.seq = seq;
            }
            UpdateState::Secondary { qts } => {
                state.updates.qts = qts;
            }
            UpdateState::Channel { id, pts } => {
                state.channels.insert(id, pts);
            }
        }
    }

    fn save(&self) -> io::Result<()> {
        Ok(())
    }
}

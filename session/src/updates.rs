// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Reconciles the account-wide and per-channel update streams, deciding
//! when a gap means "wait a moment, it'll catch up" and when it means
//! "fetch the difference".
//!
//! Telegram's update delivery is at-least-once but not strictly ordered:
//! every update that carries a `pts` (or `qts`, for secret chats) also
//! carries a `pts_count`, the number of "slots" it consumes. A client that
//! tracks the last `pts` it applied can tell exactly when it missed one:
//! `local_pts + pts_count != new_pts`. What to do about it is the
//! judgment call this module makes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use web_time::Instant;

use tgproto_tl::{self as tl, Cursor, Deserializable};

use crate::defs::UpdateState;
use crate::Session;

/// A gap detected while bridging `pts_count` slots may simply be updates
/// arriving out of order; this is how long the reconciler waits for the
/// missing ones before giving up and asking the server for the difference.
pub const POSSIBLE_GAP_DELAY: Duration = Duration::from_millis(500);

/// If nothing at all arrives for this long, the connection's update stream
/// is presumed stale (e.g. a missed `PUSH` while disconnected) and a full
/// resync is requested on the next opportunity.
pub const NO_UPDATES_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// A server-pushed update, classified just enough to drive gap detection.
///
/// Only the handful of envelope constructors this crate models are told
/// apart; everything else collapses to [`UpdatesLike::Opaque`] and is
/// handed to the caller verbatim; `Combined` and `Updates` carry their own
/// `pts_count` but the crate has no `Update` schema to walk their
/// `Vector<Update>` payload, so they are treated as an unconditional
/// resync trigger rather than decoded further (see [`Reconciler::process`]).
#[derive(Debug, Clone)]
pub enum UpdatesLike {
    ShortMessage(tl::types::UpdateShortMessage),
    ShortChatMessage(tl::types::UpdateShortChatMessage),
    ShortSentMessage(tl::types::UpdateShortSentMessage),
    Short,
    Combined,
    Updates,
    /// Anything not recognized among the above, kept as the raw bytes of
    /// the full (boxed) message so the caller can still inspect it.
    Opaque(Vec<u8>),
}

/// Classifies a raw, fully-assembled message body pushed by the server
/// outside of any RPC response (i.e. one of `Mtp::deserialize`'s
/// `updates` entries) by peeking its leading constructor.
pub fn classify(bytes: &[u8]) -> UpdatesLike {
    let mut cur = Cursor::from_slice(bytes);
    let Ok(id) = cur.peek_u32() else {
        return UpdatesLike::Opaque(bytes.to_vec());
    };

    match id {
        0x313bc7f8 => tl::types::UpdateShortMessage::deserialize(&mut cur)
            .map(UpdatesLike::ShortMessage)
            .unwrap_or_else(|_| UpdatesLike::Opaque(bytes.to_vec())),
        0x4d6deea5 => tl::types::UpdateShortChatMessage::deserialize(&mut cur)
            .map(UpdatesLike::ShortChatMessage)
            .unwrap_or_else(|_| UpdatesLike::Opaque(bytes.to_vec())),
        0x9015e101 => tl::types::UpdateShortSentMessage::deserialize(&mut cur)
            .map(UpdatesLike::ShortSentMessage)
            .unwrap_or_else(|_| UpdatesLike::Opaque(bytes.to_vec())),
        0x78d4dec1 => UpdatesLike::Short,
        0x725b04c3 => UpdatesLike::Combined,
        0x74ae4240 => UpdatesLike::Updates,
        _ => UpdatesLike::Opaque(bytes.to_vec()),
    }
}

/// What the caller (the network driver, typically) should do in response
/// to a processed update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gap {
    /// Nothing is missing; the update (if any) was applied.
    None,
    /// A gap was seen but is still within its grace period; no action
    /// needed yet, but [`Reconciler::check_timeouts`] should keep being
    /// polled so the grace period can expire.
    Possible,
    /// The grace period elapsed, or the gap was too large to wait out:
    /// call `updates.getDifference` with these parameters.
    NeedsDifference { pts: i32, qts: i32, date: i32 },
    /// Same as `NeedsDifference`, but scoped to a single channel.
    NeedsChannelDifference { channel_id: i64, pts: i32 },
}

struct ChannelTracker {
    pts: i32,
    gap_since: Option<Instant>,
}

struct State {
    pts: i32,
    qts: i32,
    date: i32,
    seq: i32,
    gap_since: Option<Instant>,
    channels: HashMap<i64, ChannelTracker>,
    last_update: Instant,
}

/// Tracks `pts`/`qts`/`date`/`seq` (and per-channel `pts`) against what a
/// session has persisted, deciding when a gap is worth waiting out and
/// when it means a `updates.getDifference`/`updates.getChannelDifference`
/// round-trip is due.
pub struct Reconciler {
    session: Arc<dyn Session>,
    state: Mutex<State>,
}

impl Reconciler {
    /// Seeds the reconciler from whatever the session last persisted.
    pub fn new(session: Arc<dyn Session>) -> Self {
        let persisted = session.updates_state();
        let now = Instant::now();
        Self {
            session,
            state: Mutex::new(State {
                pts: persisted.pts,
                qts: persisted.qts,
                date: persisted.date,
                seq: persisted.seq,
                gap_since: None,
                channels: HashMap::new(),
                last_update: now,
            }),
        }
    }

    /// Processes one classified update, applying it to the tracked
    /// counters (and persisting them) if it is in order, or reporting the
    /// gap otherwise.
    pub fn process(&self, update: UpdatesLike) -> Gap {
        let mut state = self.state.lock().unwrap();
        state.last_update = Instant::now();

        match update {
            UpdatesLike::ShortMessage(m) => {
                self.advance_pts(&mut state, m.pts, m.pts_count, m.date)
            }
            UpdatesLike::ShortChatMessage(m) => {
                self.advance_pts(&mut state, m.pts, m.pts_count, m.date)
            }
            UpdatesLike::ShortSentMessage(m) => {
                self.advance_pts(&mut state, m.pts, m.pts_count, m.date)
            }
            // `Short`, `Combined` and `Updates` all carry a `pts`/`seq`
            // bookkeeping tail after a `Vector<Update>` this crate can't
            // walk without a schema for every `Update` variant. Rather
            // than silently drop whatever they contained, every one of
            // these is treated as an unconditional signal to resync: a
            // spurious `getDifference` is wasted bandwidth, a missed one
            // is a silently dropped update, and this crate has no way to
            // tell which case it is in ahead of time.
            UpdatesLike::Short | UpdatesLike::Combined | UpdatesLike::Updates => {
                Gap::NeedsDifference {
                    pts: state.pts,
                    qts: state.qts,
                    date: state.date,
                }
            }
            UpdatesLike::Opaque(_) => Gap::None,
        }
    }

    fn advance_pts(&self, state: &mut State, new_pts: i32, pts_count: i32, date: i32) -> Gap {
        let expected = state.pts + pts_count;
        if new_pts < expected {
            // Already seen (or older than) this slot range; duplicate
            // delivery, drop it.
            return Gap::None;
        }
        if new_pts == expected {
            state.pts = new_pts;
            state.date = date;
            state.gap_since = None;
            self.persist_primary(state);
            return Gap::None;
        }

        // new_pts > expected: a gap. Give it `POSSIBLE_GAP_DELAY` to
        // resolve itself before asking for the difference.
        let since = *state.gap_since.get_or_insert_with(Instant::now);
        if since.elapsed() >= POSSIBLE_GAP_DELAY {
            state.gap_since = None;
            Gap::NeedsDifference {
                pts: state.pts,
                qts: state.qts,
                date: state.date,
            }
        } else {
            Gap::Possible
        }
    }

    /// Applies the result of a `updates.getDifference` call: the new
    /// state fully replaces what was tracked locally, and any pending gap
    /// is cleared.
    pub fn apply_difference(&self, pts: i32, qts: i32, date: i32, seq: i32) {
        let mut state = self.state.lock().unwrap();
        state.pts = pts;
        state.qts = qts;
        state.date = date;
        state.seq = seq;
        state.gap_since = None;
        self.persist_full(&state);
    }

    /// Applies the result of a `updates.getChannelDifference` call for
    /// `channel_id`.
    pub fn apply_channel_difference(&self, channel_id: i64, pts: i32) {
        let mut state = self.state.lock().unwrap();
        state
            .channels
            .entry(channel_id)
            .and_modify(|c| {
                c.pts = pts;
                c.gap_since = None;
            })
            .or_insert(ChannelTracker {
                pts,
                gap_since: None,
            });
        self.session
            .set_update_state(UpdateState::Channel { id: channel_id, pts });
    }

    /// Feeds a channel-scoped `pts`/`pts_count` pair (from an update whose
    /// envelope names a channel) through the same gap logic as the
    /// account-wide stream.
    pub fn process_channel(&self, channel_id: i64, new_pts: i32, pts_count: i32) -> Gap {
        let mut state = self.state.lock().unwrap();
        let local_pts = state
            .channels
            .get(&channel_id)
            .map(|c| c.pts)
            .or_else(|| self.session.channel_pts(channel_id))
            .unwrap_or(new_pts - pts_count);
        let expected = local_pts + pts_count;

        if new_pts < expected {
            return Gap::None;
        }
        if new_pts == expected {
            state.channels.insert(
                channel_id,
                ChannelTracker {
                    pts: new_pts,
                    gap_since: None,
                },
            );
            self.session
                .set_update_state(UpdateState::Channel { id: channel_id, pts: new_pts });
            return Gap::None;
        }

        let since = *state
            .channels
            .entry(channel_id)
            .or_insert(ChannelTracker {
                pts: local_pts,
                gap_since: None,
            })
            .gap_since
            .get_or_insert_with(Instant::now);

        if since.elapsed() >= POSSIBLE_GAP_DELAY {
            state.channels.get_mut(&channel_id).unwrap().gap_since = None;
            Gap::NeedsChannelDifference {
                channel_id,
                pts: local_pts,
            }
        } else {
            Gap::Possible
        }
    }

    /// Should be polled periodically (e.g. alongside a network driver's
    /// ping tick). Detects a possible-gap grace period that has elapsed
    /// without a fresh call to `process`/`process_channel`, and a
    /// prolonged silence on the update stream altogether.
    pub fn check_timeouts(&self) -> Vec<Gap> {
        let mut state = self.state.lock().unwrap();
        let mut gaps = Vec::new();

        if let Some(since) = state.gap_since {
            if since.elapsed() >= POSSIBLE_GAP_DELAY {
                state.gap_since = None;
                gaps.push(Gap::NeedsDifference {
                    pts: state.pts,
                    qts: state.qts,
                    date: state.date,
                });
            }
        }

        let stale_channels: Vec<i64> = state
            .channels
            .iter()
            .filter_map(|(&id, c)| {
                c.gap_since
                    .filter(|since| since.elapsed() >= POSSIBLE_GAP_DELAY)
                    .map(|_| id)
            })
            .collect();
        for id in stale_channels {
            let pts = state.channels.get(&id).unwrap().pts;
            state.channels.get_mut(&id).unwrap().gap_since = None;
            gaps.push(Gap::NeedsChannelDifference { channel_id: id, pts });
        }

        if state.last_update.elapsed() >= NO_UPDATES_TIMEOUT {
            state.last_update = Instant::now();
            gaps.push(Gap::NeedsDifference {
                pts: state.pts,
                qts: state.qts,
                date: state.date,
            });
        }

        gaps
    }

    fn persist_primary(&self, state: &State) {
        self.session.set_update_state(UpdateState::Primary {
            pts: state.pts,
            date: state.date,
            seq: state.seq,
        });
    }

    fn persist_full(&self, state: &State) {
        self.session.set_update_state(UpdateState::Primary {
            pts: state.pts,
            date: state.date,
            seq: state.seq,
        });
        self.session
            .set_update_state(UpdateState::Secondary { qts: state.qts });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_session::MemorySession;

    fn reconciler() -> Reconciler {
        Reconciler::new(Arc::new(MemorySession::new()))
    }

    #[test]
    fn in_order_pts_advances_without_a_gap() {
        let r = reconciler();
        let m = tl::types::UpdateShortMessage {
            flags: 0,
            id: 1,
            user_id: 42,
            message: "hi".into(),
            pts: 1,
            pts_count: 1,
            date: 0,
        };
        assert_eq!(r.process(UpdatesLike::ShortMessage(m)), Gap::None);
    }

    #[test]
    fn missing_slots_are_a_possible_gap_until_the_grace_period_elapses() {
        let r = reconciler();
        let m = tl::types::UpdateShortMessage {
            flags: 0,
            id: 1,
            user_id: 42,
            message: "hi".into(),
            pts: 5,
            pts_count: 1,
            date: 0,
        };
        assert_eq!(r.process(UpdatesLike::ShortMessage(m)), Gap::Possible);
    }

    #[test]
    fn combined_envelopes_always_request_a_resync() {
        let r = reconciler();
        assert!(matches!(
            r.process(UpdatesLike::Combined),
            Gap::NeedsDifference { .. }
        ));
    }

    #[test]
    fn classifies_by_leading_constructor() {
        let mut bytes = Vec::new();
        bytes.extend(0x9015e101u32.to_le_bytes()); // updateShortSentMessage
        bytes.extend(0i32.to_le_bytes()); // flags
        bytes.extend(7i32.to_le_bytes()); // id
        bytes.extend(3i32.to_le_bytes()); // pts
        bytes.extend(1i32.to_le_bytes()); // pts_count
        bytes.extend(0i32.to_le_bytes()); // date
        assert!(matches!(classify(&bytes), UpdatesLike::ShortSentMessage(_)));
    }
}

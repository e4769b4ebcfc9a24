// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use std::ops::ControlFlow;
use std::time::Duration;

/// a simple **Reconnection** Handler.
///
/// with implementing this trait and passing it to the `InitParams` inside the `Client` you can have your own
/// custom implementations for handling connection failures.
///
/// the default implementation is **NoReconnect** which does not handle anything! there is also a `FixedReconnect`
/// which sets a fixed attempt count and a duration
///
/// note that this will return a `ControlFlow<(), Duration>` which tells the handler either `Break` the Connection Attempt *or*
/// `Continue` After the Given `Duration`
pub trait ReconnectionPolicy: Send + Sync {
    ///this function will indicate that the handler should attempt for a new *reconnection* or not.
    ///
    /// it accepts a `attempts` which is the amount of reconnection tries that has been made already
    fn should_retry(&self, attempts: usize) -> ControlFlow<(), Duration>;
}

/// the default implementation of the **ReconnectionPolicy**.
pub struct NoReconnect;

/// simple *Fixed* sized implementation for the **ReconnectionPolicy** trait.
pub struct FixedReconnect {
    pub attempts: usize,
    pub delay: Duration,
}

impl ReconnectionPolicy for FixedReconnect {
    fn should_retry(&self, attempts: usize) -> ControlFlow<(), Duration> {
        if attempts <= self.attempts {
            ControlFlow::Continue(self.delay)
        } else {
            ControlFlow::Break(())
        }
    }
}

impl ReconnectionPolicy for NoReconnect {
    fn should_retry(&self, _: usize) -> ControlFlow<(), Duration> {
        ControlFlow::Break(())
    }
}

/// Doubles the delay after every attempt, up to `cap`, jittered by ±20% so
/// a fleet of clients reconnecting after the same outage doesn't hammer
/// the datacenter in lockstep.
pub struct ExponentialReconnect {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for ExponentialReconnect {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
        }
    }
}

impl ReconnectionPolicy for ExponentialReconnect {
    fn should_retry(&self, attempts: usize) -> ControlFlow<(), Duration> {
        let unjittered = self
            .base
            .saturating_mul(1u32.checked_shl(attempts as u32).unwrap_or(u32::MAX))
            .min(self.cap);

        let mut byte = [0u8; 1];
        // A fresh reconnect attempt is rare enough that a hard failure
        // here (no system RNG available) is allowed to just skip jitter
        // rather than bubble an error through a trait that has none.
        let jitter_pct = if getrandom::getrandom(&mut byte).is_ok() {
            // Map the byte onto roughly [-20%, +20%].
            (byte[0] as i32 - 128) * 20 / 128
        } else {
            0
        };

        let jittered_ms =
            (unjittered.as_millis() as i64 * (100 + jitter_pct as i64) / 100).max(0) as u64;
        ControlFlow::Continue(Duration::from_millis(jittered_ms).min(self.cap))
    }
}

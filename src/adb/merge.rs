//! Splits ADB event pairs into USB reports.
//!
//! One TALK can return two transitions, and one may still be carried over
//! from the previous poll, so up to three ordered transitions are in hand.
//! Two transitions of the same key cannot share a report (the later one
//! would overwrite the earlier, losing a fast tap), so this decides which
//! events go out now, whether a report must be flushed in between, and
//! which single event waits for the next cycle.
//!
//! Uppercase = pressed, lowercase = released; columns are carry, first
//! and second event, what is sent this cycle, and what is carried:
//!
//! ```text
//! in   sent   carry
//! -B-  B      -
//! -BC  BC     -
//! -Bb  B      b
//! AB-  AB     -
//! ABC  ABC    -
//! ABa  AB     a
//! AaB  AB     a
//! Aa-  A      a
//! AaA  A|a    A     ('|' = flushed report)
//! ```

use crate::adb::{AdbResponse, KeyEventCode};
use crate::error::Anomaly;
use crate::log::debug;

/// Receiver of merged events.
pub trait KeySink {
    /// Apply one event to the pending report.
    fn key(&mut self, code: KeyEventCode);

    /// Send the pending report now, before further events land in it.
    fn flush(&mut self);
}

/// Holds the one event deferred between polls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MergeEngine {
    carry: KeyEventCode,
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeEngine {
    pub const fn new() -> Self {
        Self {
            carry: KeyEventCode::NONE,
        }
    }

    /// The deferred event, if any.
    pub fn carry(&self) -> Option<KeyEventCode> {
        (!self.carry.is_none()).then_some(self.carry)
    }

    /// Process one poll result plus the carried event.
    pub fn process<S: KeySink>(&mut self, response: AdbResponse, sink: &mut S) {
        // Nothing newer has touched the carried key's state yet, so it
        // always goes straight in.
        let a = core::mem::replace(&mut self.carry, KeyEventCode::NONE);
        if !a.is_none() {
            sink.key(a);
        }

        let Some((mut b, mut c)) = response.key_events() else {
            let anomaly = if response == AdbResponse::Nothing {
                Anomaly::PollNothing
            } else {
                Anomaly::PollError
            };
            debug!("adb poll: {:?}", anomaly);
            return;
        };

        // Some keys (power) report the same byte in both slots.
        if b == c {
            c = KeyEventCode::NONE;
        }
        if b.is_none() {
            core::mem::swap(&mut b, &mut c);
        }
        if b.is_none() {
            return;
        }

        if !a.is_none() {
            if a.same_key(c) {
                // AaA: the carry's state must reach the host before B
                // overwrites the same key.
                if a.same_key(b) {
                    sink.flush();
                }
                sink.key(b);
                self.carry = c;
                return;
            }
            if a.same_key(b) {
                self.carry = b;
                if !c.is_none() {
                    sink.key(c);
                }
                return;
            }
        }

        sink.key(b);
        if b.same_key(c) {
            self.carry = c;
        } else if !c.is_none() {
            sink.key(c);
        }
    }
}

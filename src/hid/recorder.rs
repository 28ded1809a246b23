//! Event recorder: the live key/modifier state behind the next report.
//!
//! ADB only ever tells us about transitions, so the report is accumulated
//! here one press/release at a time and rebuilt whenever it is sent.

use crate::adb::{keymap, KeyEventCode};
use crate::error::Anomaly;
use crate::hid::keyboard::{KeyboardReport, MAX_KEYS};
use crate::hid::usage;

/// Current USB keyboard state plus a dirty flag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyboardState {
    modifiers: u8,
    keys: [u8; MAX_KEYS],
    changed: bool,
}

impl KeyboardState {
    pub const fn new() -> Self {
        Self {
            modifiers: 0,
            keys: [0; MAX_KEYS],
            changed: false,
        }
    }

    /// Apply one ADB transition.
    ///
    /// Keys without a USB usage are ignored and leave `changed` alone.
    pub fn apply(&mut self, code: KeyEventCode) -> Result<(), Anomaly> {
        if code.is_none() {
            return Ok(());
        }
        let usage = keymap::usb_code_for(code.key());
        if usage == usage::NO {
            return Ok(());
        }
        self.record(usage, code.is_release())
    }

    /// Apply one transition already translated to a USB usage.
    pub fn record(&mut self, usage: u8, released: bool) -> Result<(), Anomaly> {
        if let Some(mask) = usage::modifier_bit(usage) {
            // Set then toggle, so releasing an already-clear modifier
            // (ADB resends) still leaves it clear.
            self.modifiers |= mask;
            if released {
                self.modifiers ^= mask;
            }
            self.changed = true;
            return Ok(());
        }

        let slot = self.keys.iter().position(|&k| k == usage);
        if released {
            let slot = slot.ok_or(Anomaly::ReleaseWithoutPress(usage))?;
            self.keys[slot] = 0;
        } else {
            if slot.is_some() {
                return Err(Anomaly::DuplicatePress(usage));
            }
            let free = self
                .keys
                .iter()
                .position(|&k| k == 0)
                .ok_or(Anomaly::RolloverOverflow(usage))?;
            self.keys[free] = usage;
        }
        self.changed = true;
        Ok(())
    }

    /// State differs from the last report handed to USB.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Force the next update to resend the report (HID idle rate).
    pub fn touch(&mut self) {
        self.changed = true;
    }

    pub fn modifiers(&self) -> u8 {
        self.modifiers
    }

    /// Key slots, 0 = empty.
    pub fn keys(&self) -> &[u8; MAX_KEYS] {
        &self.keys
    }

    pub fn is_pressed(&self, usage: u8) -> bool {
        match usage::modifier_bit(usage) {
            Some(mask) => self.modifiers & mask != 0,
            None => usage != 0 && self.keys.contains(&usage),
        }
    }

    /// Build a report from the current state.
    pub fn report(&self) -> KeyboardReport {
        KeyboardReport {
            modifier: self.modifiers,
            reserved: 0,
            keycodes: self.keys,
        }
    }

    /// Build the report for transmission and clear `changed`.
    pub fn take_report(&mut self) -> KeyboardReport {
        self.changed = false;
        self.report()
    }
}

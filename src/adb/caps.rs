//! Caps lock translation.
//!
//! A stock ADB keyboard latches the caps key mechanically: it reports
//! "down" when the key locks and "up" when it unlocks. A USB host expects
//! caps lock to be an ordinary momentary key that it toggles itself, so
//! every latch change is turned into one quick synthetic tap.

use crate::adb::{KeyEventCode, ADB_CAPS_LOCK};
use crate::hid::keyboard::LED_CAPS_LOCK;
use crate::hid::recorder::KeyboardState;
use crate::log::debug;

/// Which caps lock behaviour to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CapsMode {
    /// Mechanical latch present: translate latch changes into taps.
    Locking,
    /// Latch removed: the key already behaves like a USB key.
    Unlocked,
}

/// Latch emulation state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LockingCaps {
    /// Caps state we last told the host to be in.
    physical_on: bool,
    /// A synthetic press went out and its release is still owed.
    press_pending: bool,
    /// Last caps LED bit seen from the host.
    last_host_led_bit: bool,
}

impl LockingCaps {
    pub const fn new() -> Self {
        Self {
            physical_on: false,
            press_pending: false,
            last_host_led_bit: false,
        }
    }

    pub fn physical_on(&self) -> bool {
        self.physical_on
    }

    pub fn press_pending(&self) -> bool {
        self.press_pending
    }

    fn handle(&mut self, code: KeyEventCode, keyboard: &mut KeyboardState) {
        let target = !code.is_release();
        if target != self.physical_on {
            self.physical_on = target;
            self.press_pending = true;
            apply(keyboard, KeyEventCode::press(ADB_CAPS_LOCK));
        }
    }

    fn release_pending(&mut self, keyboard: &mut KeyboardState) {
        if self.press_pending {
            self.press_pending = false;
            apply(keyboard, KeyEventCode::release(ADB_CAPS_LOCK));
        }
    }

    fn host_leds_changed(&mut self, leds: u8) {
        // Only follow the host on an edge, so a host that never drives
        // the caps LED leaves our own tracking alone.
        let caps_led = leds & LED_CAPS_LOCK != 0;
        if caps_led != self.last_host_led_bit {
            self.last_host_led_bit = caps_led;
            self.physical_on = caps_led;
        }
    }
}

/// Routes ADB events into the recorder, translating caps lock on the way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapsTranslator {
    Locking(LockingCaps),
    Unlocked,
}

impl CapsTranslator {
    pub const fn new(mode: CapsMode) -> Self {
        match mode {
            CapsMode::Locking => CapsTranslator::Locking(LockingCaps::new()),
            CapsMode::Unlocked => CapsTranslator::Unlocked,
        }
    }

    pub fn mode(&self) -> CapsMode {
        match self {
            CapsTranslator::Locking(_) => CapsMode::Locking,
            CapsTranslator::Unlocked => CapsMode::Unlocked,
        }
    }

    /// Feed one ADB event through to the recorder.
    pub fn handle(&mut self, code: KeyEventCode, keyboard: &mut KeyboardState) {
        match self {
            CapsTranslator::Locking(caps) if code.key() == ADB_CAPS_LOCK => {
                caps.handle(code, keyboard)
            }
            _ => apply(keyboard, code),
        }
    }

    /// Emit the release half of a pending caps tap. Call before every
    /// ADB transaction.
    pub fn release_pending(&mut self, keyboard: &mut KeyboardState) {
        if let CapsTranslator::Locking(caps) = self {
            caps.release_pending(keyboard);
        }
    }

    /// The host changed its LED output report.
    pub fn host_leds_changed(&mut self, leds: u8) {
        if let CapsTranslator::Locking(caps) = self {
            caps.host_leds_changed(leds);
        }
    }
}

fn apply(keyboard: &mut KeyboardState, code: KeyEventCode) {
    if let Err(anomaly) = keyboard.apply(code) {
        debug!("recorder: {:?}", anomaly);
    }
}

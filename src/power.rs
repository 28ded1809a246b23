//! Power management - what the bridge does while the host is asleep.
//!
//! When the USB host stops polling (system sleep, cable parked on a
//! powered hub, or a bus reset in progress) the bridge stops touching the
//! ADB bus except for a slow power-key check, and sleeps until one of:
//!
//! - the host resumes bus traffic,
//! - the host resets the bus,
//! - the power key is pressed, in which case we signal remote wake-up.

use crate::adb::AdbHost;
use crate::clock::{self, Deadline, HardwareClock, Wake};
use crate::log::info;
use crate::power_logic::{self, WakeCause};
use crate::scheduler::Timing;
use crate::sync::UsbFlags;
use crate::usb::{GpioBank, UsbKeyboard};

/// Power state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    /// Host is polling, frames run normally.
    Active,
    /// Host inactive; sleeping between power-key checks.
    Suspended,
}

/// Tracks the power state across the main loop.
#[derive(Debug)]
pub struct PowerManager {
    state: PowerState,
    last_wake: Option<WakeCause>,
}

impl Default for PowerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerManager {
    pub const fn new() -> Self {
        Self {
            state: PowerState::Active,
            last_wake: None,
        }
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    /// Why the most recent inactive period ended.
    pub fn last_wake(&self) -> Option<WakeCause> {
        self.last_wake
    }

    fn set_state(&mut self, state: PowerState) {
        if state != self.state {
            info!("Power: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Sleep until the host becomes active again, resets the bus, or the
    /// power key is pressed.
    ///
    /// The only wait in the firmware that is not bounded by a deadline:
    /// each `sleep_until` is, but the loop continues until an external
    /// event ends it.
    pub fn while_inactive<A, U, C, G>(
        &mut self,
        adb: &mut A,
        usb: &mut U,
        clock: &mut C,
        gpio: &mut G,
        flags: &UsbFlags,
        timing: &Timing,
    ) -> WakeCause
    where
        A: AdbHost,
        U: UsbKeyboard,
        C: HardwareClock,
        G: GpioBank,
    {
        self.set_state(PowerState::Suspended);

        let mut check = Deadline::after(&*clock, timing.power_key_interval);
        let cause = loop {
            usb.poll();
            if flags.reset.take() {
                break WakeCause::BusReset;
            }

            match clock.sleep_until(check) {
                Wake::Bus if flags.reset.take() => break WakeCause::BusReset,
                Wake::Bus => break WakeCause::BusActivity,
                Wake::Deadline => {}
            }

            if !check.expired(clock.now()) {
                continue;
            }
            check = Deadline::after(&*clock, timing.power_key_interval);

            let keys = critical_section::with(|_| adb.kbd_recv());
            if power_logic::is_power_key_down(keys) {
                info!("Power: power key pressed, signalling remote wake-up");
                gpio.set_usb_se0(true);
                clock::delay(&*clock, timing.wake_pulse, || {});
                gpio.set_usb_se0(false);
                break WakeCause::PowerKey;
            }
        };

        self.last_wake = Some(cause);
        self.set_state(PowerState::Active);
        cause
    }
}

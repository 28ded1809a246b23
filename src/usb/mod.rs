//! USB side of the bridge - presents a boot keyboard to the host.
//!
//! The scheduler only sees the [`UsbKeyboard`] and [`GpioBank`]
//! capabilities; the nRF52840 implementation on top of `embassy-usb`
//! lives in the firmware binary.

use crate::hid::keyboard::KeyboardReport;

/// USB device stack as seen by the scheduler.
pub trait UsbKeyboard {
    /// The host has selected a configuration. Services the stack.
    fn configured(&mut self) -> bool;

    /// Service pending USB work. Returns `true` when the interrupt
    /// endpoint can accept another report.
    fn poll(&mut self) -> bool;

    /// Queue a report on the interrupt endpoint. The report is copied.
    fn send(&mut self, report: &KeyboardReport);

    /// Return the device to its post-reset state after a bus reset.
    fn reset(&mut self);

    /// HID idle rate from the host's last SET_IDLE, in 4 ms units.
    /// 0 means "only report on change".
    fn idle_period(&self) -> u8;

    /// LED byte from the host's last output report.
    fn leds(&self) -> u8;
}

/// Direct control of the USB data lines.
pub trait GpioBank {
    /// Drive both data lines low (SE0) or release them. Holding SE0 for
    /// a few ms while suspended is a remote wake-up request.
    fn set_usb_se0(&mut self, drive: bool);
}

/// Tracks when the HID idle rate requires an unchanged report to be
/// resent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IdleTimer {
    baseline: u32,
}

impl IdleTimer {
    pub const fn new(now: u32) -> Self {
        Self { baseline: now }
    }

    /// Returns `true` when `period` units of `ticks_per_unit` have passed
    /// since the last resend. With `period == 0` the baseline follows
    /// `now`, so re-enabling the idle rate starts a fresh interval.
    pub fn update(&mut self, now: u32, period: u8, ticks_per_unit: u32) -> bool {
        if period == 0 {
            self.baseline = now;
            return false;
        }
        let elapsed = now.wrapping_sub(self.baseline);
        if elapsed >= u32::from(period) * ticks_per_unit {
            self.baseline = now;
            return true;
        }
        false
    }

    pub fn baseline(&self) -> u32 {
        self.baseline
    }
}

//! nRF52840 implementations of the bridge's hardware capabilities.

use crate::usb_device::{FRAME_EVENT, REMOTE_WAKEUP, USB_FLAGS};
use adb2usb::adb::host::CycleCounter;
use adb2usb::clock::{Deadline, HardwareClock, Wake};
use adb2usb::usb::GpioBank;
use cortex_m::peripheral::DWT;
use embassy_time::Instant;
use embedded_hal::delay::DelayNs;

/// Core clock of the nRF52840 once HFXO is running.
const CPU_HZ: u64 = 64_000_000;

/// The embassy time driver (RTC1) as the scheduler clock.
///
/// Sleeping is a plain `wfe`: the frame ticker and USB handlers all
/// finish with `sev`, so the loop rechecks its conditions at least once
/// per host poll interval.
pub struct RtcClock;

impl HardwareClock for RtcClock {
    fn tick_hz(&self) -> u32 {
        embassy_time::TICK_HZ as u32
    }

    fn now(&self) -> u32 {
        Instant::now().as_ticks() as u32
    }

    fn sleep_until(&mut self, deadline: Deadline) -> Wake {
        loop {
            if FRAME_EVENT.take() || USB_FLAGS.reset.is_set() {
                return Wake::Bus;
            }
            if deadline.expired(self.now()) {
                return Wake::Deadline;
            }
            cortex_m::asm::wfe();
        }
    }
}

/// Busy-wait delay for ADB bit timing, counted in CPU cycles.
///
/// The time driver's tick is far too coarse for 35 µs bit cells.
pub struct CycleDelay;

impl DelayNs for CycleDelay {
    fn delay_ns(&mut self, ns: u32) {
        let cycles = (u64::from(ns) * CPU_HZ).div_ceil(1_000_000_000);
        cortex_m::asm::delay(cycles.max(1) as u32);
    }
}

/// The DWT cycle counter. Must be enabled before the first ADB
/// transaction.
pub struct DwtCounter;

impl CycleCounter for DwtCounter {
    fn ticks_per_us(&self) -> u32 {
        (CPU_HZ / 1_000_000) as u32
    }

    fn now(&self) -> u32 {
        DWT::cycle_count()
    }
}

/// USB data line control. The USBD peripheral owns D+/D-, so a wake
/// pulse is handed to the device task as a remote wake-up request and
/// the peripheral produces the resume signalling itself.
pub struct UsbLines;

impl GpioBank for UsbLines {
    fn set_usb_se0(&mut self, drive: bool) {
        if drive {
            REMOTE_WAKEUP.signal(());
        }
    }
}

//! Bit-banged ADB host on one open-drain GPIO.
//!
//! ADB is a single-wire, open-collector bus pulled up at the host. Each
//! bit is a ~100 µs cell that starts low: a short low phase is a 1, a
//! long one a 0.
//!
//! ```text
//! command:  attention (800 µs low) | sync (70 µs high) | 8 bits | stop (0)
//! TALK:     device answers within Tlt: start (1) | 16 bits | stop (0)
//! LISTEN:   host waits Tlt, then sends start (1) | 16 bits | stop (0)
//! ```
//!
//! The pin must be configured open-drain: `set_low` pulls the line down,
//! `set_high` releases it to the pull-up. Outgoing cells are timed with
//! `DelayNs`; incoming phases are measured on a free-running
//! [`CycleCounter`], so GPIO reads and loop overhead do not shorten them.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::adb::{AdbHost, AdbResponse};
use crate::config;
use crate::error::AdbError;
use crate::log::debug;

/// Longest the device may wait before its start bit (Tlt).
const TLT_MAX_US: u32 = 260;
/// Longest any single low or high phase from the device may last.
const PHASE_TIMEOUT_US: u32 = 130;
/// Device low phases shorter than this are 1 bits.
const ONE_THRESHOLD_US: u32 = 50;

/// Free-running counter the driver measures device phases against.
pub trait CycleCounter {
    /// Counter ticks per microsecond.
    fn ticks_per_us(&self) -> u32;

    /// Current count. Wraps.
    fn now(&self) -> u32;
}

/// Host-side timing in µs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CellTiming {
    pub attention: u32,
    pub sync: u32,
    /// Low phase of a 1 bit, high phase of a 0 bit.
    pub short: u32,
    /// Low phase of a 0 bit, high phase of a 1 bit.
    pub long: u32,
    /// Gap between a LISTEN command and the host's data start bit.
    pub stop_to_start: u32,
}

impl CellTiming {
    pub const STANDARD: Self = Self {
        attention: 800,
        sync: 70,
        short: 35,
        long: 65,
        stop_to_start: 200,
    };

    /// Host-sent cells 25% shorter, still inside the device tolerance.
    pub const REDUCED: Self = Self {
        attention: 800,
        sync: 70,
        short: 26,
        long: 49,
        stop_to_start: 200,
    };

    pub const fn from_config() -> Self {
        if config::ADB_REDUCED_TIMING {
            Self::REDUCED
        } else {
            Self::STANDARD
        }
    }
}

/// ADB host driving `pin`. `delay` times what the host sends, `counter`
/// times what the device sends.
pub struct BitBangAdb<P, D, T> {
    pin: P,
    delay: D,
    counter: T,
    timing: CellTiming,
}

impl<P, D, T> BitBangAdb<P, D, T>
where
    P: InputPin + OutputPin,
    D: DelayNs,
    T: CycleCounter,
{
    pub fn new(pin: P, delay: D, counter: T) -> Self {
        Self::with_timing(pin, delay, counter, CellTiming::from_config())
    }

    pub fn with_timing(pin: P, delay: D, counter: T, timing: CellTiming) -> Self {
        Self {
            pin,
            delay,
            counter,
            timing,
        }
    }

    fn drive_low(&mut self) -> Result<(), AdbError> {
        self.pin.set_low().map_err(|_| AdbError::Protocol)
    }

    fn let_go(&mut self) -> Result<(), AdbError> {
        self.pin.set_high().map_err(|_| AdbError::Protocol)
    }

    fn line_high(&mut self) -> Result<bool, AdbError> {
        self.pin.is_high().map_err(|_| AdbError::Protocol)
    }

    fn send_bit(&mut self, one: bool) -> Result<(), AdbError> {
        let (low, high) = if one {
            (self.timing.short, self.timing.long)
        } else {
            (self.timing.long, self.timing.short)
        };
        self.drive_low()?;
        self.delay.delay_us(low);
        self.let_go()?;
        self.delay.delay_us(high);
        Ok(())
    }

    fn send_byte(&mut self, byte: u8) -> Result<(), AdbError> {
        for bit in (0..8).rev() {
            self.send_bit(byte >> bit & 1 != 0)?;
        }
        Ok(())
    }

    fn send_command(&mut self, cmd: u8) -> Result<(), AdbError> {
        self.drive_low()?;
        self.delay.delay_us(self.timing.attention);
        self.let_go()?;
        self.delay.delay_us(self.timing.sync);
        self.send_byte(cmd)?;
        self.send_bit(false)
    }

    /// Wait for the line to reach `high`, returning how long that took
    /// in µs.
    fn wait_for(&mut self, high: bool, timeout_us: u32, err: AdbError) -> Result<u32, AdbError> {
        let per_us = self.counter.ticks_per_us().max(1);
        let start = self.counter.now();
        loop {
            let reached = self.line_high()? == high;
            let elapsed = self.counter.now().wrapping_sub(start) / per_us;
            if reached {
                return Ok(elapsed);
            }
            if elapsed >= timeout_us {
                return Err(err);
            }
        }
    }

    fn read_bit(&mut self) -> Result<bool, AdbError> {
        self.wait_for(false, PHASE_TIMEOUT_US, AdbError::Protocol)?;
        let low = self.wait_for(true, PHASE_TIMEOUT_US, AdbError::Protocol)?;
        Ok(low < ONE_THRESHOLD_US)
    }

    fn talk_raw(&mut self, cmd: u8) -> Result<u16, AdbError> {
        self.send_command(cmd)?;

        // Start bit. No falling edge within Tlt = no device.
        self.wait_for(false, TLT_MAX_US, AdbError::NoResponse)?;
        self.wait_for(true, PHASE_TIMEOUT_US, AdbError::Protocol)?;

        let mut data = 0u16;
        for _ in 0..16 {
            data = data << 1 | u16::from(self.read_bit()?);
        }

        // Stop bit.
        self.wait_for(false, PHASE_TIMEOUT_US, AdbError::Protocol)?;
        self.wait_for(true, PHASE_TIMEOUT_US, AdbError::Protocol)?;
        Ok(data)
    }

    fn listen_raw(&mut self, cmd: u8, data_hi: u8, data_lo: u8) -> Result<(), AdbError> {
        self.send_command(cmd)?;
        self.delay.delay_us(self.timing.stop_to_start);
        self.send_bit(true)?;
        self.send_byte(data_hi)?;
        self.send_byte(data_lo)?;
        self.send_bit(false)
    }
}

impl<P, D, T> AdbHost for BitBangAdb<P, D, T>
where
    P: InputPin + OutputPin,
    D: DelayNs,
    T: CycleCounter,
{
    fn init(&mut self) {
        if self.let_go().is_err() {
            debug!("ADB: could not release data line");
        }
    }

    fn talk(&mut self, cmd: u8) -> AdbResponse {
        let result = self.talk_raw(cmd);
        // Never leave the bus held low after an aborted transfer.
        let _ = self.let_go();
        if let Err(e) = result {
            if e != AdbError::NoResponse {
                debug!("ADB: talk {:#x} failed: {:?}", cmd, e);
            }
        }
        AdbResponse::from(result)
    }

    fn listen(&mut self, cmd: u8, data_hi: u8, data_lo: u8) {
        let result = self.listen_raw(cmd, data_hi, data_lo);
        let _ = self.let_go();
        if let Err(e) = result {
            debug!("ADB: listen {:#x} failed: {:?}", cmd, e);
        }
    }
}

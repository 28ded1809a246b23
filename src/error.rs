//! Unified error type for adb2usb.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Derives `defmt::Format` (with the `defmt` feature) for on-target logging.

/// Top-level error type. Only bring-up can fail; the running bridge
/// recovers from everything by re-polling the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The ADB bus returned a bit-level error.
    Adb(AdbError),

    /// USB host never configured the device within the bring-up window.
    Timeout,
}

/// Subset of ADB failures we distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdbError {
    /// No device answered the TALK command (no start bit in Tlt).
    NoResponse,
    /// A bit cell was malformed or timed out mid-transfer.
    Protocol,
}

// Convenience conversions

impl From<AdbError> for Error {
    fn from(e: AdbError) -> Self {
        Error::Adb(e)
    }
}

/// Soft anomalies. These are logged at debug level and never surfaced;
/// the next ADB poll reflects live hardware state anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Anomaly {
    /// Press for a usage already in the key list (keyboard resent a key down).
    DuplicatePress(u8),
    /// Release for a usage that is not in the key list.
    ReleaseWithoutPress(u8),
    /// Seventh simultaneous key. Dropped.
    RolloverOverflow(u8),
    /// Keyboard did not answer the poll.
    PollNothing,
    /// Poll transfer was corrupted.
    PollError,
}

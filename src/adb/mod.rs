//! Apple Desktop Bus side of the bridge.
//!
//! The keyboard lives at ADB address 2. Register 0 yields up to two key
//! transitions per TALK, register 2 holds the LED bits (active low) and
//! register 3 the address/handler id.

pub mod caps;
pub mod host;
pub mod keymap;
pub mod merge;

use crate::error::AdbError;

/// ADB key code for the caps lock key.
pub const ADB_CAPS_LOCK: u8 = 0x39;

/// ADB key code for the power key. It reports as `0x7F7F` down and
/// `0xFFFF` up, the same byte in both event slots.
pub const ADB_POWER: u8 = 0x7F;

/// Keyboard TALK register 0 (key events).
pub const CMD_KBD_TALK_KEYS: u8 = 0x2C;
/// Keyboard LISTEN register 2 (LEDs and modifier state).
pub const CMD_KBD_LISTEN_LEDS: u8 = 0x2A;
/// Keyboard TALK register 3 (address and handler id).
pub const CMD_KBD_TALK_ID: u8 = 0x2F;
/// Keyboard LISTEN register 3.
pub const CMD_KBD_LISTEN_ID: u8 = 0x2B;

/// Keyboard register 2 LED bits for a USB host LED byte. Same bit order
/// (num, caps, scroll) but active low.
pub const fn led_mask(host_leds: u8) -> u8 {
    !host_leds & 0x07
}

/// One ADB key transition: bit 7 set means release, low 7 bits pick the key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyEventCode(pub u8);

impl KeyEventCode {
    /// "No event" sentinel.
    pub const NONE: Self = Self(0xFF);

    const RELEASED: u8 = 0x80;

    pub const fn press(key: u8) -> Self {
        Self(key & 0x7F)
    }

    pub const fn release(key: u8) -> Self {
        Self(key | Self::RELEASED)
    }

    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }

    pub const fn key(self) -> u8 {
        self.0 & 0x7F
    }

    pub const fn is_release(self) -> bool {
        self.0 & Self::RELEASED != 0
    }

    /// Both codes refer to the same physical key, whatever their direction.
    pub const fn same_key(self, other: Self) -> bool {
        (self.0 ^ other.0) & 0x7F == 0
    }
}

/// Result of one TALK transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdbResponse {
    /// 16 data bits.
    Data(u16),
    /// No device answered.
    Nothing,
    /// The transfer was corrupted.
    Error,
}

impl AdbResponse {
    /// The register word, or why there is none.
    pub fn data(self) -> Result<u16, AdbError> {
        match self {
            AdbResponse::Data(word) => Ok(word),
            AdbResponse::Nothing => Err(AdbError::NoResponse),
            AdbResponse::Error => Err(AdbError::Protocol),
        }
    }

    /// Split a register 0 word into (older, newer) key events.
    pub fn key_events(self) -> Option<(KeyEventCode, KeyEventCode)> {
        match self {
            AdbResponse::Data(word) => {
                let [older, newer] = word.to_be_bytes();
                Some((KeyEventCode(older), KeyEventCode(newer)))
            }
            _ => None,
        }
    }
}

impl From<Result<u16, AdbError>> for AdbResponse {
    fn from(r: Result<u16, AdbError>) -> Self {
        match r {
            Ok(word) => AdbResponse::Data(word),
            Err(AdbError::NoResponse) => AdbResponse::Nothing,
            Err(AdbError::Protocol) => AdbResponse::Error,
        }
    }
}

/// Bit-level ADB host capability.
pub trait AdbHost {
    /// Put the data line into its idle (released) state.
    fn init(&mut self);

    /// Send a TALK command and read the device's 16-bit answer.
    fn talk(&mut self, cmd: u8) -> AdbResponse;

    /// Send a LISTEN command followed by two data bytes.
    fn listen(&mut self, cmd: u8, data_hi: u8, data_lo: u8);

    /// Poll the keyboard for up to two key transitions.
    fn kbd_recv(&mut self) -> AdbResponse {
        self.talk(CMD_KBD_TALK_KEYS)
    }

    /// Set keyboard LEDs. `mask` is already in the keyboard's active-low
    /// encoding (bit clear = LED on).
    fn kbd_led(&mut self, mask: u8) {
        self.listen(CMD_KBD_LISTEN_LEDS, 0, mask & 0x07);
    }
}

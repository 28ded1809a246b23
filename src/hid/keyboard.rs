//! The 8-byte boot keyboard input report and its report descriptor.
//!
//! ```text
//! [0]    modifiers   LCtrl LShift LAlt LGUI RCtrl RShift RAlt RGUI (bit 0..7)
//! [1]    0
//! [2..8] usage codes of held non-modifier keys, 0 = free slot
//! ```

/// Wire size of an input report.
pub const KEYBOARD_REPORT_SIZE: usize = 8;

/// Number of non-modifier key slots in a boot report.
pub const MAX_KEYS: usize = 6;

/// Output report LED bits, as written by the host with SET_REPORT.
pub const LED_NUM_LOCK: u8 = 0x01;
pub const LED_CAPS_LOCK: u8 = 0x02;
pub const LED_SCROLL_LOCK: u8 = 0x04;

/// One input report, rebuilt from the recorder each time it is sent.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyboardReport {
    pub modifier: u8,
    pub reserved: u8,
    pub keycodes: [u8; MAX_KEYS],
}

impl KeyboardReport {
    /// Nothing held.
    pub const fn empty() -> Self {
        Self {
            modifier: 0,
            reserved: 0,
            keycodes: [0; MAX_KEYS],
        }
    }

    /// Write the wire form into `buf`. Returns the byte count, or 0 when
    /// `buf` cannot hold a whole report.
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        let Some(out) = buf.get_mut(..KEYBOARD_REPORT_SIZE) else {
            return 0;
        };
        out[0] = self.modifier;
        out[1] = self.reserved;
        out[2..].copy_from_slice(&self.keycodes);
        KEYBOARD_REPORT_SIZE
    }

    /// The report as the 8 bytes that go on the wire.
    pub fn to_bytes(&self) -> [u8; KEYBOARD_REPORT_SIZE] {
        let mut buf = [0u8; KEYBOARD_REPORT_SIZE];
        self.serialize(&mut buf);
        buf
    }

    /// No modifier and no key held.
    pub fn is_empty(&self) -> bool {
        self.modifier == 0 && self.keycodes == [0; MAX_KEYS]
    }

    /// Returns `true` if `usage` is in the key list.
    pub fn contains(&self, usage: u8) -> bool {
        usage != 0 && self.keycodes.contains(&usage)
    }
}

/// Boot keyboard report descriptor.
///
/// Matches the fixed boot layout so hosts without a report parser (BIOS
/// setup screens) read the same bytes. The key array's logical maximum
/// stops at Keypad = (0x67), the highest usage the ADB keymap produces.
pub const KEYBOARD_REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page: Generic Desktop
    0x09, 0x06, // Usage: Keyboard
    0xA1, 0x01, // Collection: Application
    // modifiers, one bit each
    0x05, 0x07, // Usage Page: Key Codes
    0x19, 0xE0, // Usage Min: 0xE0
    0x29, 0xE7, // Usage Max: 0xE7
    0x15, 0x00, // Logical Min: 0
    0x25, 0x01, // Logical Max: 1
    0x75, 0x01, // Report Size: 1
    0x95, 0x08, // Report Count: 8
    0x81, 0x02, // Input: Data, Var, Abs
    // constant byte
    0x95, 0x01, // Report Count: 1
    0x75, 0x08, // Report Size: 8
    0x81, 0x03, // Input: Const, Var, Abs
    // host LEDs: num, caps, scroll, compose, kana
    0x05, 0x08, // Usage Page: LEDs
    0x19, 0x01, // Usage Min: 1
    0x29, 0x05, // Usage Max: 5
    0x95, 0x05, // Report Count: 5
    0x75, 0x01, // Report Size: 1
    0x91, 0x02, // Output: Data, Var, Abs
    0x95, 0x01, // Report Count: 1
    0x75, 0x03, // Report Size: 3
    0x91, 0x03, // Output: Const, Var, Abs (pad)
    // held keys
    0x05, 0x07, // Usage Page: Key Codes
    0x19, 0x00, // Usage Min: 0
    0x29, 0x67, // Usage Max: 0x67
    0x15, 0x00, // Logical Min: 0
    0x25, 0x67, // Logical Max: 0x67
    0x95, 0x06, // Report Count: 6
    0x75, 0x08, // Report Size: 8
    0x81, 0x00, // Input: Data, Array
    0xC0, // End Collection
];

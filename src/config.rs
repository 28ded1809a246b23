//! Build options, USB identity and the timing defaults the scheduler
//! converts into clock ticks.

use crate::adb::caps::CapsMode;

// Build-time options

/// Caps lock handling, chosen by the `unlocked-caps` feature.
///
/// Stock ADB keyboards latch the caps key mechanically, so the default
/// translates the latch into momentary USB keystrokes.
pub const CAPS_MODE: CapsMode = if cfg!(feature = "unlocked-caps") {
    CapsMode::Unlocked
} else {
    CapsMode::Locking
};

/// Shorten host-sent ADB bit cells by 25% (still within the ADB spec)
/// so a transaction is less likely to collide with USB interrupts.
pub const ADB_REDUCED_TIMING: bool = cfg!(feature = "adb-reduced-timing");

// ADB

/// Keyboard needs at least 250 ms after power-up or it ignores LISTEN.
pub const ADB_STARTUP_MS: u32 = 300;

/// Handler id written to register 3 of the keyboard during bring-up.
/// Handler 3 makes the Apple Extended Keyboard report distinct codes
/// for the right shift/control/option keys.
pub const ADB_REG3_ADDRESS_BYTE: u8 = 0x02;
pub const ADB_REG3_HANDLER_ID: u8 = 0x03;

// USB

/// pid.codes test VID/PID. Not for shipping hardware.
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0x0002;

/// USB device strings.
pub const USB_MANUFACTURER: &str = "adb2usb";
pub const USB_PRODUCT: &str = "ADB-to-USB Keyboard Bridge";
pub const USB_SERIAL_NUMBER: &str = "000001";

/// USB HID polling interval (ms). One scheduler frame per host poll.
pub const USB_HID_POLL_MS: u8 = 8;

/// HID idle rate reported before the host sends SET_IDLE (4 ms units).
/// 125 = 500 ms, the default the HID spec gives for keyboards.
pub const USB_DEFAULT_IDLE_PERIOD: u8 = 125;

// Scheduler timing (all tunable; confirm against target hardware)

/// No USB activity for this long means the host is asleep or resetting.
pub const INACTIVE_TIMEOUT_US: u32 = 250_000;

/// Frame 1 polls ADB this long after the frame sync point so the two
/// polls are spread across the USB service window.
pub const HALF_FRAME_DELAY_US: u32 = 3_800;

/// Quiet period after a bus reset, so the host can finish negotiating
/// before we settle into one USB transaction per frame.
pub const RESET_SETTLE_US: u32 = 500_000;

/// While the host sleeps, the keyboard is checked for the power key
/// this often.
pub const POWER_KEY_POLL_US: u32 = 250_000;

/// Length of the SE0 pulse used to ask a sleeping host to resume.
pub const WAKE_PULSE_US: u32 = 10_000;

/// Duration of one HID idle-rate unit.
pub const IDLE_UNIT_US: u32 = 4_000;

/// Upper bound on waiting for the interrupt endpoint to free up.
pub const REPORT_SEND_TIMEOUT_US: u32 = 50_000;

/// Upper bound on waiting for the host to configure us at bring-up.
pub const USB_CONFIGURE_TIMEOUT_US: u32 = 5_000_000;

// Pins (picked in `main.rs`)
//
//   ADB data (default)             → P0.03
//   ADB data (`adb-alt-data-pin`)  → P0.29
//
// The ADB data line is open-drain with an external 1 kΩ pull-up to 5 V
// through a level shifter; the keyboard is powered from USB VBUS.

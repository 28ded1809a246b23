use crate::adb::{AdbResponse, ADB_POWER};

/// What ended a low-power wait while the host was inactive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeCause {
    /// Host resumed talking to us.
    BusActivity,
    /// Host reset the bus.
    BusReset,
    /// The keyboard's power key was pressed and we asked the host to wake.
    PowerKey,
}

/// The keyboard reports the power key going down as `0x7F7F`; only the
/// first event byte is checked.
pub fn is_power_key_down(response: AdbResponse) -> bool {
    match response {
        AdbResponse::Data(word) => word >> 8 == u16::from(ADB_POWER),
        AdbResponse::Nothing | AdbResponse::Error => false,
    }
}

/// Whether the host will re-enumerate after this wake, so the quiet
/// post-reset period must be observed.
pub fn needs_reset_settle(cause: WakeCause) -> bool {
    match cause {
        WakeCause::BusActivity => false,
        WakeCause::BusReset | WakeCause::PowerKey => true,
    }
}

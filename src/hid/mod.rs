//! USB HID side: the boot keyboard report, usage codes, and the recorder
//! that turns key transitions into reports.

pub mod keyboard;
pub mod recorder;
pub mod usage;


pub use keyboard::KeyboardReport;
pub use recorder::KeyboardState;

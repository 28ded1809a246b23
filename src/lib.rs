//! ADB keyboard to USB HID boot keyboard bridge.
//!
//! Everything that decides what the USB host sees lives in this library
//! and runs on the host under `cargo test`; the embedded binary
//! (`src/main.rs`, feature `embedded`) only wires the nRF52840
//! peripherals into the capability traits defined here.
//!
//! Usage: `cargo test` (host) or
//! `cargo run --release --features embedded --target thumbv7em-none-eabihf`.

#![cfg_attr(not(test), no_std)]

mod log;

pub mod adb;
pub mod clock;
pub mod config;
pub mod error;
pub mod hid;
pub mod power;
pub mod power_logic;
pub mod scheduler;
pub mod sync;
pub mod usb;

pub use error::Error;
pub use scheduler::Scheduler;

//! adb2usb firmware entry point (nRF52840).
//!
//! The USB stack runs as async tasks on an interrupt executor so it
//! keeps answering the host while the frame scheduler owns thread mode
//! and bit-bangs the ADB line.

#![no_std]
#![no_main]

mod platform;
mod usb_device;

use adb2usb::adb::host::BitBangAdb;
use adb2usb::{config, Scheduler};
use cortex_m_rt::entry;
use defmt::{info, unwrap, warn};
use embassy_executor::InterruptExecutor;
use embassy_nrf::config::HfclkSource;
use embassy_nrf::gpio::{Flex, OutputDrive, Pull};
use embassy_nrf::interrupt;
use embassy_nrf::interrupt::{InterruptExt, Priority};
use {defmt_rtt as _, panic_probe as _};

static EXECUTOR_USB: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn EGU0_SWI0() {
    EXECUTOR_USB.on_interrupt()
}

#[entry]
fn main() -> ! {
    info!("adb2usb starting");

    // USBD needs the crystal oscillator.
    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.hfclk_source = HfclkSource::ExternalXtal;
    let p = embassy_nrf::init(nrf_config);

    // ADB receive timing runs off the cycle counter.
    let mut core = unwrap!(cortex_m::Peripherals::take());
    core.DCB.enable_trace();
    core.DWT.enable_cycle_counter();

    interrupt::EGU0_SWI0.set_priority(Priority::P2);
    let spawner = EXECUTOR_USB.start(interrupt::EGU0_SWI0);

    let usb = usb_device::init(p.USBD);
    unwrap!(spawner.spawn(usb_device::usb_task(usb.device)));
    unwrap!(spawner.spawn(usb_device::hid_reader_task(usb.reader)));
    unwrap!(spawner.spawn(usb_device::hid_writer_task(usb.writer)));
    unwrap!(spawner.spawn(usb_device::frame_ticker()));

    #[cfg(not(feature = "adb-alt-data-pin"))]
    let adb_pin = p.P0_03;
    #[cfg(feature = "adb-alt-data-pin")]
    let adb_pin = p.P0_29;

    // Open drain: the keyboard and the external pull-up share the line.
    let mut data = Flex::new(adb_pin);
    data.set_as_input_output(Pull::None, OutputDrive::Standard0Disconnect1);
    data.set_high();

    let mut bridge = Scheduler::new(
        BitBangAdb::new(data, platform::CycleDelay, platform::DwtCounter),
        usb_device::NrfUsbKeyboard,
        platform::RtcClock,
        platform::UsbLines,
        &usb_device::USB_FLAGS,
        config::CAPS_MODE,
    );

    while let Err(e) = bridge.start() {
        warn!("bring-up failed: {:?}, retrying", e);
    }
    info!("bridge running");
    bridge.run()
}

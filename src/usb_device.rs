//! USB boot keyboard on the nRF52840 USBD peripheral.
//!
//! The USB stack runs in async tasks on a high-priority interrupt
//! executor. The scheduler loop talks to it only through the statics
//! below, wrapped up as [`NrfUsbKeyboard`].

use adb2usb::config;
use adb2usb::hid::keyboard::{KeyboardReport, KEYBOARD_REPORT_DESCRIPTOR, KEYBOARD_REPORT_SIZE};
use adb2usb::sync::{AtomicFlag, UsbFlags};
use adb2usb::usb::UsbKeyboard;
use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use defmt::{debug, info, warn};
use embassy_futures::select::{select, Either};
use embassy_nrf::usb::vbus_detect::HardwareVbusDetect;
use embassy_nrf::usb::Driver;
use embassy_nrf::{bind_interrupts, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker};
use embassy_usb::class::hid::{
    Config as HidConfig, HidReader, HidReaderWriter, HidWriter, ReportId, RequestHandler, State,
};
use embassy_usb::control::OutResponse;
use embassy_usb::{Builder, Config, Handler, UsbDevice};
use static_cell::StaticCell;

bind_interrupts!(struct Irqs {
    USBD => embassy_nrf::usb::InterruptHandler<peripherals::USBD>;
    CLOCK_POWER => embassy_nrf::usb::vbus_detect::InterruptHandler;
});

pub type UsbDriver = Driver<'static, peripherals::USBD, HardwareVbusDetect>;

/// Bus events for the scheduler.
pub static USB_FLAGS: UsbFlags = UsbFlags::new();

/// Raised once per host poll interval while the bus is up.
pub static FRAME_EVENT: AtomicFlag = AtomicFlag::new();

/// Asks the device task to signal remote wake-up.
pub static REMOTE_WAKEUP: Signal<CriticalSectionRawMutex, ()> = Signal::new();

static CONFIGURED: AtomicBool = AtomicBool::new(false);
static SUSPENDED: AtomicBool = AtomicBool::new(false);
static IN_FLIGHT: AtomicBool = AtomicBool::new(false);
static LEDS: AtomicU8 = AtomicU8::new(0);
static IDLE_PERIOD: AtomicU8 = AtomicU8::new(config::USB_DEFAULT_IDLE_PERIOD);

static REPORT: Signal<CriticalSectionRawMutex, KeyboardReport> = Signal::new();
static LAST_REPORT: Mutex<CriticalSectionRawMutex, Cell<KeyboardReport>> =
    Mutex::new(Cell::new(KeyboardReport::empty()));

static HID_STATE: StaticCell<State> = StaticCell::new();
static USB_CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_MSOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_CTRL_BUF: StaticCell<[u8; 64]> = StaticCell::new();
static DEVICE_HANDLER: StaticCell<BusEvents> = StaticCell::new();
static CONTROL_HANDLER: StaticCell<KeyboardRequests> = StaticCell::new();

/// Everything the USB tasks need, handed out once by [`init`].
pub struct UsbParts {
    pub device: UsbDevice<'static, UsbDriver>,
    pub reader: HidReader<'static, UsbDriver, 1>,
    pub writer: HidWriter<'static, UsbDriver, KEYBOARD_REPORT_SIZE>,
}

/// Tracks bus state changes coming out of the USB stack.
struct BusEvents;

impl Handler for BusEvents {
    fn enabled(&mut self, enabled: bool) {
        debug!("USB enabled: {}", enabled);
        if !enabled {
            CONFIGURED.store(false, Ordering::Release);
        }
    }

    fn reset(&mut self) {
        info!("USB bus reset");
        CONFIGURED.store(false, Ordering::Release);
        SUSPENDED.store(false, Ordering::Release);
        USB_FLAGS.reset.set();
        cortex_m::asm::sev();
    }

    fn configured(&mut self, configured: bool) {
        info!("USB configured: {}", configured);
        CONFIGURED.store(configured, Ordering::Release);
    }

    fn suspended(&mut self, suspended: bool) {
        info!("USB suspended: {}", suspended);
        SUSPENDED.store(suspended, Ordering::Release);
        if suspended {
            USB_FLAGS.inactive.set();
        }
        cortex_m::asm::sev();
    }

    fn remote_wakeup_enabled(&mut self, enabled: bool) {
        debug!("USB remote wakeup enabled: {}", enabled);
    }
}

/// HID class requests: GET/SET_REPORT, GET/SET_IDLE.
struct KeyboardRequests;

impl RequestHandler for KeyboardRequests {
    fn get_report(&mut self, _id: ReportId, buf: &mut [u8]) -> Option<usize> {
        let report = LAST_REPORT.lock(|last| last.get());
        match report.serialize(buf) {
            0 => None,
            n => Some(n),
        }
    }

    fn set_report(&mut self, _id: ReportId, data: &[u8]) -> OutResponse {
        match data.first() {
            Some(&leds) => {
                LEDS.store(leds, Ordering::Release);
                OutResponse::Accepted
            }
            None => OutResponse::Rejected,
        }
    }

    fn get_idle_ms(&mut self, _id: Option<ReportId>) -> Option<u32> {
        Some(u32::from(IDLE_PERIOD.load(Ordering::Acquire)) * 4)
    }

    fn set_idle_ms(&mut self, _id: Option<ReportId>, duration_ms: u32) {
        let period = (duration_ms / 4).min(u32::from(u8::MAX)) as u8;
        debug!("HID set_idle: {} x 4 ms", period);
        IDLE_PERIOD.store(period, Ordering::Release);
    }
}

/// Build the USB device with one boot keyboard interface.
///
/// Must be called exactly once.
pub fn init(usbd: peripherals::USBD) -> UsbParts {
    let driver = Driver::new(usbd, Irqs, HardwareVbusDetect::new(Irqs));

    let mut usb_config = Config::new(config::USB_VID, config::USB_PID);
    usb_config.manufacturer = Some(config::USB_MANUFACTURER);
    usb_config.product = Some(config::USB_PRODUCT);
    usb_config.serial_number = Some(config::USB_SERIAL_NUMBER);
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;
    usb_config.supports_remote_wakeup = true;

    let mut builder = Builder::new(
        driver,
        usb_config,
        USB_CONFIG_DESC.init([0u8; 256]),
        USB_BOS_DESC.init([0u8; 256]),
        USB_MSOS_DESC.init([0u8; 256]),
        USB_CTRL_BUF.init([0u8; 64]),
    );
    builder.handler(DEVICE_HANDLER.init(BusEvents));

    let hid_config = HidConfig {
        report_descriptor: KEYBOARD_REPORT_DESCRIPTOR,
        request_handler: Some(CONTROL_HANDLER.init(KeyboardRequests)),
        poll_ms: config::USB_HID_POLL_MS,
        max_packet_size: KEYBOARD_REPORT_SIZE as u16,
    };
    let hid = HidReaderWriter::<_, 1, KEYBOARD_REPORT_SIZE>::new(
        &mut builder,
        HID_STATE.init(State::new()),
        hid_config,
    );
    let (reader, writer) = hid.split();

    let device = builder.build();
    info!("USB boot keyboard initialised");

    UsbParts {
        device,
        reader,
        writer,
    }
}

/// Runs the USB device state machine and services remote wake-up
/// requests while the bus is suspended.
#[embassy_executor::task]
pub async fn usb_task(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    loop {
        device.run_until_suspend().await;
        REMOTE_WAKEUP.reset();
        match select(device.wait_resume(), REMOTE_WAKEUP.wait()).await {
            Either::First(()) => {}
            Either::Second(()) => {
                info!("USB remote wakeup");
                if device.remote_wakeup().await.is_err() {
                    warn!("USB remote wakeup rejected");
                }
            }
        }
        SUSPENDED.store(false, Ordering::Release);
    }
}

/// LED output reports arriving on the interrupt OUT endpoint.
#[embassy_executor::task]
pub async fn hid_reader_task(reader: HidReader<'static, UsbDriver, 1>) -> ! {
    let mut requests = KeyboardRequests;
    reader.run(false, &mut requests).await
}

/// Writes each report the scheduler queues to the interrupt IN endpoint.
#[embassy_executor::task]
pub async fn hid_writer_task(mut writer: HidWriter<'static, UsbDriver, KEYBOARD_REPORT_SIZE>) -> ! {
    loop {
        let report = REPORT.wait().await;
        if writer.write(&report.to_bytes()).await.is_err() {
            warn!("USB keyboard write failed");
        }
        IN_FLIGHT.store(false, Ordering::Release);
        cortex_m::asm::sev();
    }
}

/// Marks the start of each frame at the host's polling interval.
#[embassy_executor::task]
pub async fn frame_ticker() -> ! {
    let mut ticker = Ticker::every(Duration::from_millis(u64::from(config::USB_HID_POLL_MS)));
    loop {
        ticker.next().await;
        if CONFIGURED.load(Ordering::Acquire) && !SUSPENDED.load(Ordering::Acquire) {
            FRAME_EVENT.set();
        }
        cortex_m::asm::sev();
    }
}

/// The scheduler's view of the USB tasks.
pub struct NrfUsbKeyboard;

impl UsbKeyboard for NrfUsbKeyboard {
    fn configured(&mut self) -> bool {
        CONFIGURED.load(Ordering::Acquire)
    }

    fn poll(&mut self) -> bool {
        CONFIGURED.load(Ordering::Acquire)
            && !SUSPENDED.load(Ordering::Acquire)
            && !IN_FLIGHT.load(Ordering::Acquire)
    }

    fn send(&mut self, report: &KeyboardReport) {
        LAST_REPORT.lock(|last| last.set(*report));
        IN_FLIGHT.store(true, Ordering::Release);
        REPORT.signal(*report);
    }

    fn reset(&mut self) {
        REPORT.reset();
        IN_FLIGHT.store(false, Ordering::Release);
        LAST_REPORT.lock(|last| last.set(KeyboardReport::empty()));
    }

    fn idle_period(&self) -> u8 {
        IDLE_PERIOD.load(Ordering::Acquire)
    }

    fn leds(&self) -> u8 {
        LEDS.load(Ordering::Acquire)
    }
}

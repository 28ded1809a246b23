//! Frame scheduler - the firmware's main loop.
//!
//! Every USB interrupt poll from the host starts a frame. Frames cycle
//! through three slots:
//!
//! ```text
//! Poll0   ADB TALK at the frame sync point
//! Poll1   ADB TALK half a frame later
//! Leds    ADB LISTEN for the LED register, only if the host changed it
//! ```
//!
//! Spreading ADB traffic this way keeps every bus transaction short and
//! away from the USB stack's own timing-critical work. Between frames the
//! CPU sleeps until the next host poll; if none arrives within the
//! inactivity timeout the bridge drops into [`PowerManager`]'s low-power
//! loop.

use crate::adb::caps::{CapsMode, CapsTranslator};
use crate::adb::merge::{KeySink, MergeEngine};
use crate::adb::{self, AdbHost, KeyEventCode, CMD_KBD_LISTEN_ID, CMD_KBD_TALK_ID};
use crate::clock::{self, ticks_from_micros, wait_until, Deadline, HardwareClock, Wake, WaitOutcome};
use crate::config;
use crate::error::{AdbError, Error};
use crate::hid::recorder::KeyboardState;
use crate::log::{info, warn};
use crate::power::PowerManager;
use crate::power_logic;
use crate::sync::UsbFlags;
use crate::usb::{GpioBank, IdleTimer, UsbKeyboard};

/// Slot in the three-frame cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Frame {
    Poll0,
    Poll1,
    Leds,
}

impl Frame {
    pub fn next(self) -> Self {
        match self {
            Frame::Poll0 => Frame::Poll1,
            Frame::Poll1 => Frame::Leds,
            Frame::Leds => Frame::Poll0,
        }
    }
}

/// Scheduler timing, in clock ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    /// Keyboard power-up time before it accepts LISTEN.
    pub adb_startup: u32,
    /// No host poll for this long = host inactive.
    pub inactive_timeout: u32,
    /// Power-key check interval while inactive.
    pub power_key_interval: u32,
    /// Offset of the second ADB poll from the frame sync point.
    pub half_frame_delay: u32,
    /// Quiet period after a bus reset.
    pub reset_settle: u32,
    /// SE0 remote wake-up pulse.
    pub wake_pulse: u32,
    /// One HID idle-rate unit (4 ms).
    pub idle_unit: u32,
    /// Bound on waiting for the interrupt endpoint.
    pub report_send_timeout: u32,
    /// Bound on waiting for the host to configure us.
    pub configure_timeout: u32,
}

impl Timing {
    /// Defaults from [`config`] for a clock running at `tick_hz`.
    pub const fn from_tick_hz(tick_hz: u32) -> Self {
        Self {
            adb_startup: ticks_from_micros(tick_hz, config::ADB_STARTUP_MS * 1_000),
            inactive_timeout: ticks_from_micros(tick_hz, config::INACTIVE_TIMEOUT_US),
            power_key_interval: ticks_from_micros(tick_hz, config::POWER_KEY_POLL_US),
            half_frame_delay: ticks_from_micros(tick_hz, config::HALF_FRAME_DELAY_US),
            reset_settle: ticks_from_micros(tick_hz, config::RESET_SETTLE_US),
            wake_pulse: ticks_from_micros(tick_hz, config::WAKE_PULSE_US),
            idle_unit: ticks_from_micros(tick_hz, config::IDLE_UNIT_US),
            report_send_timeout: ticks_from_micros(tick_hz, config::REPORT_SEND_TIMEOUT_US),
            configure_timeout: ticks_from_micros(tick_hz, config::USB_CONFIGURE_TIMEOUT_US),
        }
    }
}

/// Per-frame bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleState {
    pub frame: Frame,
    pub idle: IdleTimer,
    /// LED byte last written to the keyboard. `None` until the first
    /// LED frame, which always writes.
    pub leds: Option<u8>,
    /// Mid-poll flushes that could not reach the host, so an intermediate
    /// key state was overwritten before it was reported.
    pub lost_flushes: u32,
}

/// Owns the bridge state and every hardware capability.
pub struct Scheduler<'a, A, U, C, G> {
    adb: A,
    usb: U,
    clock: C,
    gpio: G,
    flags: &'a UsbFlags,
    timing: Timing,
    keyboard: KeyboardState,
    caps: CapsTranslator,
    merge: MergeEngine,
    power: PowerManager,
    state: ScheduleState,
    handler_id: Result<u8, Error>,
}

impl<'a, A, U, C, G> Scheduler<'a, A, U, C, G>
where
    A: AdbHost,
    U: UsbKeyboard,
    C: HardwareClock,
    G: GpioBank,
{
    pub fn new(adb: A, usb: U, clock: C, gpio: G, flags: &'a UsbFlags, caps: CapsMode) -> Self {
        let timing = Timing::from_tick_hz(clock.tick_hz());
        let now = clock.now();
        Self {
            adb,
            usb,
            clock,
            gpio,
            flags,
            timing,
            keyboard: KeyboardState::new(),
            caps: CapsTranslator::new(caps),
            merge: MergeEngine::new(),
            power: PowerManager::new(),
            state: ScheduleState {
                frame: Frame::Poll0,
                idle: IdleTimer::new(now),
                leds: None,
                lost_flushes: 0,
            },
            handler_id: Err(Error::Adb(AdbError::NoResponse)),
        }
    }

    /// Replace the default timing.
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Bring up the keyboard and wait for the host to configure us.
    pub fn start(&mut self) -> Result<(), Error> {
        self.adb.init();
        clock::delay(&self.clock, self.timing.adb_startup, || {});

        // Low byte of register 3. Bring-up carries on without it.
        self.handler_id = self
            .adb
            .talk(CMD_KBD_TALK_ID)
            .data()
            .map(|reg3| (reg3 & 0xFF) as u8)
            .map_err(Error::from);
        match self.handler_id {
            Ok(id) => info!("ADB: keyboard handler id {}", id),
            Err(e) => info!("ADB: no handler id: {:?}", e),
        }

        // Handler 3: distinct codes for the right-hand modifiers.
        self.adb.listen(
            CMD_KBD_LISTEN_ID,
            config::ADB_REG3_ADDRESS_BYTE,
            config::ADB_REG3_HANDLER_ID,
        );

        let deadline = Deadline::after(&self.clock, self.timing.configure_timeout);
        let usb = &mut self.usb;
        if wait_until(&self.clock, deadline, || usb.configured()) == WaitOutcome::TimedOut {
            warn!("USB: host did not configure the device");
            return Err(Error::Timeout);
        }

        // Enumeration resets are already dealt with.
        self.flags.reset.take();
        self.state.idle = IdleTimer::new(self.clock.now());
        info!("USB: configured");
        Ok(())
    }

    /// Run frames forever.
    pub fn run(&mut self) -> ! {
        loop {
            self.step();
        }
    }

    /// One main loop iteration: at most one frame.
    pub fn step(&mut self) {
        self.handle_reset();

        // Use the gap before the next host poll.
        if self.usb.poll() {
            self.update();
        }

        if self.wait_usb() {
            let cause = self.power.while_inactive(
                &mut self.adb,
                &mut self.usb,
                &mut self.clock,
                &mut self.gpio,
                self.flags,
                &self.timing,
            );
            if power_logic::needs_reset_settle(cause) {
                self.settle_after_reset();
            }
            return;
        }

        let synced = self.clock.now();
        self.update();

        match self.state.frame {
            Frame::Poll0 | Frame::Poll1 => {
                if self.state.frame == Frame::Poll1 {
                    let usb = &mut self.usb;
                    let half = Deadline::new(synced, self.timing.half_frame_delay);
                    let _ = wait_until(&self.clock, half, || {
                        usb.poll();
                        false
                    });
                }
                self.poll_adb();
                self.update_idle();
            }
            Frame::Leds => self.update_leds(),
        }
        self.state.frame = self.state.frame.next();
    }

    fn handle_reset(&mut self) {
        if self.flags.reset.take() {
            self.settle_after_reset();
        }
    }

    /// Give the host time to finish negotiating before we drop to one
    /// USB transaction per frame.
    fn settle_after_reset(&mut self) {
        info!("USB: bus reset");
        self.usb.reset();
        self.keyboard.touch();

        let usb = &mut self.usb;
        clock::delay(&self.clock, self.timing.reset_settle, || {
            usb.poll();
        });
    }

    /// Sleep until the next host poll. Returns `true` if the host went
    /// quiet instead.
    fn wait_usb(&mut self) -> bool {
        let deadline = Deadline::after(&self.clock, self.timing.inactive_timeout);
        let wake = self.clock.sleep_until(deadline);
        let suspended = self.flags.inactive.take();
        wake == Wake::Deadline || suspended
    }

    fn poll_adb(&mut self) {
        self.caps.release_pending(&mut self.keyboard);

        let adb = &mut self.adb;
        let response = critical_section::with(|_| adb.kbd_recv());

        let mut sink = Pipeline {
            caps: &mut self.caps,
            keyboard: &mut self.keyboard,
            usb: &mut self.usb,
            clock: &self.clock,
            send_timeout: self.timing.report_send_timeout,
            lost_flushes: &mut self.state.lost_flushes,
        };
        self.merge.process(response, &mut sink);
    }

    fn update_leds(&mut self) {
        let leds = self.usb.leds();
        if self.state.leds == Some(leds) {
            return;
        }
        self.state.leds = Some(leds);

        self.caps.release_pending(&mut self.keyboard);
        self.caps.host_leds_changed(leds);

        let adb = &mut self.adb;
        critical_section::with(|_| adb.kbd_led(adb::led_mask(leds)));
    }

    fn update_idle(&mut self) {
        let period = self.usb.idle_period();
        let now = self.clock.now();
        if self.state.idle.update(now, period, self.timing.idle_unit) {
            self.keyboard.touch();
        }
    }

    fn update(&mut self) {
        send_changed(
            &mut self.usb,
            &self.clock,
            &mut self.keyboard,
            self.timing.report_send_timeout,
        );
    }

    pub fn keyboard(&self) -> &KeyboardState {
        &self.keyboard
    }

    pub fn caps(&self) -> &CapsTranslator {
        &self.caps
    }

    /// Event deferred to the next poll, if any.
    pub fn carry(&self) -> Option<KeyEventCode> {
        self.merge.carry()
    }

    pub fn power(&self) -> &PowerManager {
        &self.power
    }

    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    /// Keyboard handler id read at bring-up.
    pub fn handler_id(&self) -> Result<u8, Error> {
        self.handler_id
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn adb(&self) -> &A {
        &self.adb
    }

    pub fn adb_mut(&mut self) -> &mut A {
        &mut self.adb
    }

    pub fn usb(&self) -> &U {
        &self.usb
    }

    pub fn usb_mut(&mut self) -> &mut U {
        &mut self.usb
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn gpio(&self) -> &G {
        &self.gpio
    }
}

/// Send the report if it changed, waiting a bounded time for the
/// endpoint. On timeout the report stays pending for the next frame.
fn send_changed<U, C>(usb: &mut U, clock: &C, keyboard: &mut KeyboardState, timeout: u32) -> bool
where
    U: UsbKeyboard,
    C: HardwareClock,
{
    if !keyboard.is_changed() {
        return false;
    }
    let deadline = Deadline::after(clock, timeout);
    if wait_until(clock, deadline, || usb.poll()) == WaitOutcome::TimedOut {
        warn!("USB: interrupt endpoint busy, report deferred");
        return false;
    }
    usb.send(&keyboard.take_report());
    true
}

/// Merge engine output: events go through caps translation into the
/// recorder; a flush sends the report immediately.
struct Pipeline<'s, U, C> {
    caps: &'s mut CapsTranslator,
    keyboard: &'s mut KeyboardState,
    usb: &'s mut U,
    clock: &'s C,
    send_timeout: u32,
    lost_flushes: &'s mut u32,
}

impl<U: UsbKeyboard, C: HardwareClock> KeySink for Pipeline<'_, U, C> {
    fn key(&mut self, code: KeyEventCode) {
        self.caps.handle(code, self.keyboard);
    }

    fn flush(&mut self) {
        let sent = send_changed(self.usb, self.clock, self.keyboard, self.send_timeout);
        if !sent && self.keyboard.is_changed() {
            *self.lost_flushes = self.lost_flushes.wrapping_add(1);
            warn!("USB: flush timed out, intermediate key state lost");
        }
    }
}

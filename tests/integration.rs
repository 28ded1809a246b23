//! Integration tests for adb2usb: the scheduler driven end to end with
//! simulated ADB, USB, GPIO and clock.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use adb2usb::adb::caps::CapsMode;
use adb2usb::adb::{AdbHost, AdbResponse, CMD_KBD_LISTEN_ID, CMD_KBD_LISTEN_LEDS, CMD_KBD_TALK_ID, CMD_KBD_TALK_KEYS};
use adb2usb::clock::{Deadline, HardwareClock, Wake};
use adb2usb::error::AdbError;
use adb2usb::hid::keyboard::LED_CAPS_LOCK;
use adb2usb::hid::usage;
use adb2usb::hid::KeyboardReport;
use adb2usb::power::PowerState;
use adb2usb::power_logic::WakeCause;
use adb2usb::scheduler::Frame;
use adb2usb::sync::UsbFlags;
use adb2usb::usb::{GpioBank, UsbKeyboard};
use adb2usb::{Error, Scheduler};

/// 100 µs ticks.
const TICK_HZ: u32 = 10_000;
/// Host polls the interrupt endpoint every 8 ms.
const FRAME: u32 = 80;

const ADB_A: u8 = 0x00;
const ADB_B: u8 = 0x0B;
const ADB_CAPS: u8 = 0x39;
const NONE: u8 = 0xFF;

// ═══════════════════════════════════════════════════════════════════════════
// Simulated hardware
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug)]
enum SimWake {
    /// Next host poll.
    Bus,
    /// Nothing until the deadline.
    Idle,
    /// Host resets the bus while we sleep.
    Reset,
}

struct SimClock {
    now: Rc<Cell<u32>>,
    wakes: VecDeque<SimWake>,
    /// Tick of every host-poll wake-up.
    woke_at: Vec<u32>,
    flags: &'static UsbFlags,
}

impl SimClock {
    fn new(now: Rc<Cell<u32>>, flags: &'static UsbFlags) -> Self {
        Self {
            now,
            wakes: VecDeque::new(),
            woke_at: Vec::new(),
            flags,
        }
    }

    fn peek(&self) -> u32 {
        self.now.get()
    }
}

impl HardwareClock for SimClock {
    fn tick_hz(&self) -> u32 {
        TICK_HZ
    }

    // Every read costs one tick, so busy-waits always terminate.
    fn now(&self) -> u32 {
        let t = self.now.get();
        self.now.set(t.wrapping_add(1));
        t
    }

    fn sleep_until(&mut self, deadline: Deadline) -> Wake {
        let now = self.now.get();
        match self.wakes.pop_front().unwrap_or(SimWake::Bus) {
            SimWake::Bus => {
                self.now.set(now.wrapping_add(FRAME));
                self.woke_at.push(self.now.get());
                Wake::Bus
            }
            SimWake::Reset => {
                self.flags.reset.set();
                Wake::Bus
            }
            SimWake::Idle => {
                self.now.set(deadline.at());
                Wake::Deadline
            }
        }
    }
}

#[derive(Default)]
struct SimAdb {
    /// Shared with the clock.
    now: Rc<Cell<u32>>,
    inits: u32,
    handler_id: Option<u16>,
    polls: VecDeque<AdbResponse>,
    talks: Vec<u8>,
    /// Tick of every key poll.
    polled_at: Vec<u32>,
    listens: Vec<(u8, u8, u8)>,
}

impl SimAdb {
    fn key_polls(&self) -> usize {
        self.talks.iter().filter(|&&c| c == CMD_KBD_TALK_KEYS).count()
    }

    fn led_writes(&self) -> Vec<u8> {
        self.listens
            .iter()
            .filter(|l| l.0 == CMD_KBD_LISTEN_LEDS)
            .map(|l| l.2)
            .collect()
    }
}

impl AdbHost for SimAdb {
    fn init(&mut self) {
        self.inits += 1;
    }

    fn talk(&mut self, cmd: u8) -> AdbResponse {
        self.talks.push(cmd);
        if cmd == CMD_KBD_TALK_ID {
            return self.handler_id.map_or(AdbResponse::Nothing, AdbResponse::Data);
        }
        self.polled_at.push(self.now.get());
        self.polls.pop_front().unwrap_or(AdbResponse::Nothing)
    }

    fn listen(&mut self, cmd: u8, data_hi: u8, data_lo: u8) {
        self.listens.push((cmd, data_hi, data_lo));
    }
}

#[derive(Default)]
struct SimUsb {
    configured: bool,
    /// `poll()` reports busy this many more times.
    busy: u32,
    idle_period: u8,
    leds: u8,
    sent: Vec<KeyboardReport>,
    resets: u32,
    polls: u32,
}

impl UsbKeyboard for SimUsb {
    fn configured(&mut self) -> bool {
        self.polls += 1;
        self.configured
    }

    fn poll(&mut self) -> bool {
        self.polls += 1;
        if self.busy > 0 {
            self.busy -= 1;
            return false;
        }
        true
    }

    fn send(&mut self, report: &KeyboardReport) {
        self.sent.push(*report);
    }

    fn reset(&mut self) {
        self.resets += 1;
    }

    fn idle_period(&self) -> u8 {
        self.idle_period
    }

    fn leds(&self) -> u8 {
        self.leds
    }
}

#[derive(Default)]
struct SimGpio {
    se0: Vec<bool>,
}

impl GpioBank for SimGpio {
    fn set_usb_se0(&mut self, drive: bool) {
        self.se0.push(drive);
    }
}

type Bridge = Scheduler<'static, SimAdb, SimUsb, SimClock, SimGpio>;

fn unstarted(flags: &'static UsbFlags, caps: CapsMode) -> Bridge {
    let usb = SimUsb {
        configured: true,
        ..SimUsb::default()
    };
    let now = Rc::new(Cell::new(0));
    let adb = SimAdb {
        now: now.clone(),
        ..SimAdb::default()
    };
    Scheduler::new(
        adb,
        usb,
        SimClock::new(now, flags),
        SimGpio::default(),
        flags,
        caps,
    )
}

fn bridge(flags: &'static UsbFlags) -> Bridge {
    let mut bridge = unstarted(flags, CapsMode::Locking);
    bridge.start().unwrap();
    bridge
}

fn keys(first: u8, second: u8) -> AdbResponse {
    AdbResponse::Data(u16::from_be_bytes([first, second]))
}

fn report(keycodes: &[u8]) -> KeyboardReport {
    let mut report = KeyboardReport::empty();
    report.keycodes[..keycodes.len()].copy_from_slice(keycodes);
    report
}

// ═══════════════════════════════════════════════════════════════════════════
// Bring-up
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn bring_up_reads_handler_id_and_selects_handler_3() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = unstarted(&FLAGS, CapsMode::Locking);
    bridge.adb_mut().handler_id = Some(0x6202);
    FLAGS.reset.set();

    bridge.start().unwrap();

    let adb = bridge.adb();
    assert_eq!(adb.inits, 1);
    assert_eq!(adb.talks, vec![CMD_KBD_TALK_ID]);
    assert_eq!(adb.listens, vec![(CMD_KBD_LISTEN_ID, 0x02, 0x03)]);
    assert_eq!(bridge.handler_id(), Ok(0x02));
    // Keyboard needs its startup time before the LISTEN.
    assert!(bridge.clock().peek() >= bridge.timing().adb_startup);
    // Enumeration reset is not replayed once running.
    assert!(!FLAGS.reset.is_set());
}

#[test]
fn bring_up_tolerates_a_silent_keyboard() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = unstarted(&FLAGS, CapsMode::Locking);
    assert_eq!(bridge.start(), Ok(()));
    assert_eq!(bridge.adb().listens.len(), 1);
    assert_eq!(bridge.handler_id(), Err(Error::Adb(AdbError::NoResponse)));
}

#[test]
fn bring_up_times_out_without_usb_configuration() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = unstarted(&FLAGS, CapsMode::Locking);
    bridge.usb_mut().configured = false;

    assert_eq!(bridge.start(), Err(Error::Timeout));
    assert!(bridge.clock().peek() >= bridge.timing().configure_timeout);
}

// ═══════════════════════════════════════════════════════════════════════════
// Frames and reports
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn frames_poll_twice_then_write_leds() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = bridge(&FLAGS);

    assert_eq!(bridge.state().frame, Frame::Poll0);
    bridge.step();
    bridge.step();
    assert_eq!(bridge.adb().key_polls(), 2);
    assert_eq!(bridge.state().frame, Frame::Leds);

    bridge.step();
    assert_eq!(bridge.adb().key_polls(), 2);
    assert_eq!(bridge.state().frame, Frame::Poll0);
}

#[test]
fn second_poll_of_a_cycle_waits_half_a_frame() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = bridge(&FLAGS);
    let half = bridge.timing().half_frame_delay;

    for _ in 0..6 {
        bridge.step();
    }

    let woke = bridge.clock().woke_at.clone();
    let polled = bridge.adb().polled_at.clone();
    assert_eq!(polled.len(), 4);
    // Poll0 right at the frame sync point, Poll1 half a frame later.
    for (cycle, pair) in polled.chunks(2).enumerate() {
        let base = cycle * 3;
        assert!(pair[0] - woke[base] < half, "poll 0 at {}", pair[0] - woke[base]);
        assert!(pair[1] - woke[base + 1] >= half, "poll 1 at {}", pair[1] - woke[base + 1]);
        assert!(pair[1] - woke[base + 1] < FRAME);
    }
}

#[test]
fn release_and_press_across_two_polls_send_two_reports() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = bridge(&FLAGS);
    bridge.adb_mut().polls.extend([
        keys(ADB_A, NONE),
        keys(0x80 | ADB_A, ADB_B),
    ]);

    bridge.step();
    bridge.step();
    assert!(bridge.keyboard().is_pressed(usage::B));
    assert!(!bridge.keyboard().is_pressed(usage::A));

    bridge.step();
    assert_eq!(bridge.usb().sent, vec![report(&[usage::A]), report(&[usage::B])]);
}

#[test]
fn double_tap_in_consecutive_polls_keeps_every_transition() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = bridge(&FLAGS);
    let tap = keys(ADB_A, 0x80 | ADB_A);
    bridge.adb_mut().polls.extend([tap, tap]);

    for _ in 0..6 {
        bridge.step();
    }

    let a = report(&[usage::A]);
    let empty = KeyboardReport::empty();
    assert_eq!(bridge.usb().sent, vec![a, empty, a, empty]);
    assert_eq!(bridge.carry(), None);
}

#[test]
fn repeated_tap_flushes_intermediate_report_mid_poll() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = bridge(&FLAGS);
    let retap = keys(0x80 | ADB_A, ADB_A);
    bridge.adb_mut().polls.extend([keys(ADB_A, NONE), retap, retap]);

    for _ in 0..3 {
        bridge.step();
    }
    assert!(bridge.carry().is_some());
    assert_eq!(bridge.usb().sent.len(), 2);

    // Carry A, then a and A again: A goes out before a overwrites it.
    bridge.step();
    assert_eq!(bridge.usb().sent.len(), 3);
    assert!(!bridge.keyboard().is_pressed(usage::A));

    for _ in 0..5 {
        bridge.step();
    }

    let a = report(&[usage::A]);
    let empty = KeyboardReport::empty();
    assert_eq!(bridge.usb().sent, vec![a, empty, a, empty, a]);
    assert_eq!(bridge.carry(), None);
    assert_eq!(bridge.state().lost_flushes, 0);
}

#[test]
fn busy_endpoint_during_flush_is_counted_as_lost() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = bridge(&FLAGS);
    let retap = keys(0x80 | ADB_A, ADB_A);
    bridge.adb_mut().polls.extend([keys(ADB_A, NONE), retap, retap]);
    for _ in 0..3 {
        bridge.step();
    }

    bridge.usb_mut().busy = u32::MAX;
    bridge.step();
    assert_eq!(bridge.state().lost_flushes, 1);
    assert_eq!(bridge.usb().sent.len(), 2);

    bridge.step();
    bridge.usb_mut().busy = 0;
    bridge.step();
    let a = report(&[usage::A]);
    assert_eq!(bridge.usb().sent, vec![a, KeyboardReport::empty(), a]);
}

#[test]
fn locking_caps_press_becomes_a_tap() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = bridge(&FLAGS);
    bridge.adb_mut().polls.push_back(keys(ADB_CAPS, NONE));

    for _ in 0..3 {
        bridge.step();
    }

    assert_eq!(
        bridge.usb().sent,
        vec![report(&[usage::CAPS_LOCK]), KeyboardReport::empty()]
    );
}

#[test]
fn busy_endpoint_defers_report_without_losing_it() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = bridge(&FLAGS);
    bridge.adb_mut().polls.push_back(keys(ADB_A, NONE));
    bridge.step();

    bridge.usb_mut().busy = u32::MAX;
    bridge.step();
    assert!(bridge.usb().sent.is_empty());
    assert!(bridge.keyboard().is_changed());

    bridge.usb_mut().busy = 0;
    bridge.step();
    assert_eq!(bridge.usb().sent, vec![report(&[usage::A])]);
}

// ═══════════════════════════════════════════════════════════════════════════
// LEDs
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn led_frame_writes_only_on_change() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = bridge(&FLAGS);

    // First LED frame always writes, even with everything off.
    for _ in 0..3 {
        bridge.step();
    }
    assert_eq!(bridge.adb().led_writes(), vec![0x07]);

    for _ in 0..3 {
        bridge.step();
    }
    assert_eq!(bridge.adb().led_writes(), vec![0x07]);

    bridge.usb_mut().leds = LED_CAPS_LOCK;
    for _ in 0..3 {
        bridge.step();
    }
    assert_eq!(bridge.adb().led_writes(), vec![0x07, 0x05]);
}

#[test]
fn host_caps_led_resyncs_locking_caps() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = bridge(&FLAGS);
    bridge.usb_mut().leds = LED_CAPS_LOCK;
    for _ in 0..3 {
        bridge.step();
    }

    // Host already has caps on, so latching the key down sends nothing.
    bridge.adb_mut().polls.push_back(keys(ADB_CAPS, NONE));
    for _ in 0..3 {
        bridge.step();
    }
    assert!(bridge.usb().sent.is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// Idle rate
// ═══════════════════════════════════════════════════════════════════════════

/// Step until a report goes out, returning the tick it went out at.
fn step_until_sent(bridge: &mut Bridge, max_steps: usize) -> Option<u32> {
    let before = bridge.usb().sent.len();
    for _ in 0..max_steps {
        bridge.step();
        if bridge.usb().sent.len() > before {
            return Some(bridge.clock().peek());
        }
    }
    None
}

#[test]
fn idle_rate_resends_unchanged_report_every_period() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = bridge(&FLAGS);
    // 25 × 4 ms = 100 ms = 1000 ticks.
    bridge.usb_mut().idle_period = 25;
    let period = 25 * bridge.timing().idle_unit;

    let mut last = step_until_sent(&mut bridge, 100).unwrap();
    for _ in 0..5 {
        let at = step_until_sent(&mut bridge, 100).unwrap();
        let interval = at - last;
        assert!(interval >= period - FRAME, "resent after {interval} ticks");
        assert!(interval <= period + 4 * FRAME, "resent after {interval} ticks");
        last = at;
    }
    assert!(bridge.usb().sent.iter().all(|r| r.is_empty()));
}

#[test]
fn disabling_idle_rate_stops_resends_without_a_spurious_one() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = bridge(&FLAGS);
    bridge.usb_mut().idle_period = 25;
    step_until_sent(&mut bridge, 100).unwrap();

    bridge.usb_mut().idle_period = 0;
    assert_eq!(step_until_sent(&mut bridge, 100), None);

    // Re-enabled: a full period passes before the next resend.
    let enabled_at = bridge.clock().peek();
    bridge.usb_mut().idle_period = 25;
    let at = step_until_sent(&mut bridge, 100).unwrap();
    let period = 25 * bridge.timing().idle_unit;
    assert!(at - enabled_at >= period - 2 * FRAME);
}

// ═══════════════════════════════════════════════════════════════════════════
// Bus reset, suspend and wake-up
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn bus_reset_resets_transport_and_settles_quietly() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = bridge(&FLAGS);
    let start = bridge.clock().peek();
    let polls_before = bridge.usb().polls;

    FLAGS.reset.set();
    bridge.step();

    assert_eq!(bridge.usb().resets, 1);
    assert!(bridge.clock().peek() - start >= bridge.timing().reset_settle);
    // Serviced USB throughout, touched ADB only for the frame after.
    assert!(bridge.usb().polls - polls_before > 100);
    assert_eq!(bridge.adb().key_polls(), 1);
    // Current state is resent to the freshly reset host.
    assert_eq!(bridge.usb().sent, vec![KeyboardReport::empty()]);
}

#[test]
fn inactive_host_resumes_on_bus_activity() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = bridge(&FLAGS);
    bridge
        .clock_mut()
        .wakes
        .extend([SimWake::Idle, SimWake::Idle, SimWake::Idle, SimWake::Bus]);

    bridge.step();

    assert_eq!(bridge.power().last_wake(), Some(WakeCause::BusActivity));
    assert_eq!(bridge.power().state(), PowerState::Active);
    // Power key checked once per elapsed interval, nothing else.
    assert_eq!(bridge.adb().key_polls(), 2);
    assert_eq!(bridge.usb().resets, 0);
    assert!(bridge.gpio().se0.is_empty());
}

#[test]
fn suspend_flag_enters_the_inactive_loop() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = bridge(&FLAGS);
    FLAGS.inactive.set();

    bridge.step();

    assert_eq!(bridge.power().last_wake(), Some(WakeCause::BusActivity));
    assert_eq!(bridge.adb().key_polls(), 0);
    assert_eq!(bridge.state().frame, Frame::Poll0);
}

#[test]
fn bus_reset_while_inactive_settles() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = bridge(&FLAGS);
    bridge.clock_mut().wakes.extend([SimWake::Idle, SimWake::Reset]);

    bridge.step();

    assert_eq!(bridge.power().last_wake(), Some(WakeCause::BusReset));
    assert_eq!(bridge.usb().resets, 1);
    assert!(bridge.gpio().se0.is_empty());
}

#[test]
fn power_key_wakes_the_host_with_se0() {
    static FLAGS: UsbFlags = UsbFlags::new();
    let mut bridge = bridge(&FLAGS);
    bridge.clock_mut().wakes.extend([SimWake::Idle, SimWake::Idle]);
    bridge.adb_mut().polls.push_back(AdbResponse::Data(0x7F7F));

    bridge.step();

    assert_eq!(bridge.power().last_wake(), Some(WakeCause::PowerKey));
    assert_eq!(bridge.gpio().se0, vec![true, false]);
    assert_eq!(bridge.usb().resets, 1);
    // The power key itself never reaches the host.
    assert!(!bridge.keyboard().keys().iter().any(|&k| k != 0));

    bridge.step();
    assert_eq!(bridge.power().state(), PowerState::Active);
    assert_eq!(bridge.usb().sent, vec![KeyboardReport::empty()]);
}

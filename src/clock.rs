//! Free-running hardware clock and bounded waits.
//!
//! Every wait in the scheduler is expressed against a [`Deadline`] on this
//! clock, so nothing can spin forever and a simulated clock can drive the
//! whole scheduler in tests.

/// Why a low-power wait returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Wake {
    /// USB bus activity (a host poll) woke us.
    Bus,
    /// Nothing happened before the deadline.
    Deadline,
}

/// Outcome of a bounded busy-wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitOutcome {
    /// The condition became true.
    Ready,
    /// The deadline passed first.
    TimedOut,
}

/// Free-running tick counter.
pub trait HardwareClock {
    /// Tick rate in Hz.
    fn tick_hz(&self) -> u32;

    /// Current tick count. Wraps.
    fn now(&self) -> u32;

    /// Low-power wait for the next hardware event, or until `deadline`.
    fn sleep_until(&mut self, deadline: Deadline) -> Wake;
}

/// A point in time, stored as start + length so wrap-around is harmless.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Deadline {
    start: u32,
    ticks: u32,
}

impl Deadline {
    pub const fn new(start: u32, ticks: u32) -> Self {
        Self { start, ticks }
    }

    pub fn after<C: HardwareClock + ?Sized>(clock: &C, ticks: u32) -> Self {
        Self::new(clock.now(), ticks)
    }

    pub fn expired(&self, now: u32) -> bool {
        now.wrapping_sub(self.start) >= self.ticks
    }

    /// Ticks left until expiry, 0 once expired.
    pub fn remaining(&self, now: u32) -> u32 {
        self.ticks.saturating_sub(now.wrapping_sub(self.start))
    }

    /// Tick count at which this deadline expires.
    pub fn at(&self) -> u32 {
        self.start.wrapping_add(self.ticks)
    }
}

/// Spin until `ready` returns true or `deadline` passes. `ready` is
/// checked at least once, even if the deadline already passed.
pub fn wait_until<C, F>(clock: &C, deadline: Deadline, mut ready: F) -> WaitOutcome
where
    C: HardwareClock + ?Sized,
    F: FnMut() -> bool,
{
    loop {
        if ready() {
            return WaitOutcome::Ready;
        }
        if deadline.expired(clock.now()) {
            return WaitOutcome::TimedOut;
        }
    }
}

/// Spin for `ticks`, running `service` on every pass.
pub fn delay<C, F>(clock: &C, ticks: u32, mut service: F)
where
    C: HardwareClock + ?Sized,
    F: FnMut(),
{
    let deadline = Deadline::after(clock, ticks);
    let _ = wait_until(clock, deadline, || {
        service();
        false
    });
}

/// Convert microseconds to ticks, rounding to nearest.
pub const fn ticks_from_micros(tick_hz: u32, us: u32) -> u32 {
    ((tick_hz as u64 * us as u64 + 500_000) / 1_000_000) as u32
}

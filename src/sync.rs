//! Flags shared between interrupt handlers and the scheduler.
//!
//! Interrupt context only ever sets a flag. The scheduler takes it (reads
//! and clears in one step) inside a critical section, so a flag raised
//! between the check and the clear can never be lost.

use core::sync::atomic::{AtomicBool, Ordering};

/// A one-bit event latch.
#[derive(Debug, Default)]
pub struct AtomicFlag(AtomicBool);

impl AtomicFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Raise the flag. Safe to call from interrupt context.
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Read and clear.
    pub fn take(&self) -> bool {
        critical_section::with(|_| self.0.swap(false, Ordering::AcqRel))
    }

    /// Peek without clearing.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// USB bus events latched by the transport's interrupt handlers.
#[derive(Debug, Default)]
pub struct UsbFlags {
    /// No bus activity for the inactivity timeout (host asleep or gone).
    pub inactive: AtomicFlag,
    /// Host drove a bus reset.
    pub reset: AtomicFlag,
}

impl UsbFlags {
    pub const fn new() -> Self {
        Self {
            inactive: AtomicFlag::new(),
            reset: AtomicFlag::new(),
        }
    }
}

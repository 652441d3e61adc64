//! Single-slot rebuild trigger.
//!
//! The debouncer sets it when a burst of changes settles; the next inbound
//! request claims it. A claim is a compare-and-swap, so of any number of
//! racing requests exactly one wins per set.

use std::sync::atomic::{AtomicBool, Ordering};

/// "A rebuild is owed". Capacity one: setting while set is a no-op.
#[derive(Debug, Default)]
pub struct PendingTrigger {
    pending: AtomicBool,
}

impl PendingTrigger {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Mark a rebuild as owed. Returns `false` if one was already pending.
    pub fn set(&self) -> bool {
        !self.pending.swap(true, Ordering::AcqRel)
    }

    /// Claim the pending rebuild. Exactly one caller observes `true` per `set`.
    pub fn claim(&self) -> bool {
        self.pending
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

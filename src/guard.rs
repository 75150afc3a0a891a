//! Per-form in-flight guard against double submission.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Allows one submission at a time. Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct SubmitGuard {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of a submission; releases the guard on drop.
#[derive(Debug)]
pub struct SubmitTicket {
    busy: Arc<AtomicBool>,
}

impl SubmitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard, or `None` if a submission is already running.
    pub fn try_begin(&self) -> Option<SubmitTicket> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SubmitTicket {
                busy: Arc::clone(&self.busy),
            })
    }
}

impl Drop for SubmitTicket {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

// ABOUTME: Process-wide "rollback in progress" flag shared with the health monitor.
// ABOUTME: Raised through a guard that lowers it again on drop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Default)]
pub struct RollbackFlag {
    raised: Arc<AtomicBool>,
}

impl RollbackFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Raise the flag until the returned guard is dropped.
    pub fn raise(&self) -> RollbackGuard {
        self.raised.store(true, Ordering::Release);
        RollbackGuard {
            raised: Arc::clone(&self.raised),
        }
    }
}

#[must_use = "the flag is lowered as soon as the guard is dropped"]
#[derive(Debug)]
pub struct RollbackGuard {
    raised: Arc<AtomicBool>,
}

impl Drop for RollbackGuard {
    fn drop(&mut self) {
        self.raised.store(false, Ordering::Release);
    }
}

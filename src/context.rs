use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::error::Error;

/// Floor on the remaining memory budget; dropping below it aborts the
/// search with a distinguishable error instead of thrashing.
pub const MEMORY_FLOOR_BYTES: usize = 15 * 1024 * 1024;

pub const DEFAULT_MAX_MEM_MIB: usize = 512;

/// Shared context for a search or optimization run: cooperative
/// cancellation, a wall-clock deadline and an explicit memory budget.
///
/// Passed by reference into every long-running routine instead of living
/// in process-wide state; cloning shares the same flags and accounting.
#[derive(Clone)]
pub struct SearchContext {
    cancel: Arc<AtomicBool>,
    deadline: Option<Instant>,
    mem_used: Arc<AtomicUsize>,
    mem_limit: usize,
}

impl SearchContext {
    pub fn new(timeout: Option<Duration>, max_mem_mib: usize) -> Self {
        SearchContext {
            cancel: Arc::new(AtomicBool::new(false)),
            deadline: timeout.map(|t| Instant::now() + t),
            mem_used: Arc::new(AtomicUsize::new(0)),
            mem_limit: max_mem_mib.saturating_mul(1024 * 1024),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None, DEFAULT_MAX_MEM_MIB)
    }

    /// Derive a context that shares this one's cancel flag but applies its
    /// own (possibly tighter) timeout and memory budget. Accounting starts
    /// fresh; the earlier of the two deadlines wins.
    pub fn with_limits(&self, timeout: Option<Duration>, max_mem_mib: usize) -> SearchContext {
        let own_deadline = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, own_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        SearchContext {
            cancel: self.cancel.clone(),
            deadline,
            mem_used: Arc::new(AtomicUsize::new(0)),
            mem_limit: max_mem_mib.saturating_mul(1024 * 1024),
        }
    }

    /// A handle that can be passed to another thread to cancel this run.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check the cancellation flag and the deadline. Called at the top of
    /// every expansion and generation loop.
    pub fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
        }
        Ok(())
    }

    /// Account for `bytes` of newly allocated search state. Fails once the
    /// remaining budget sinks below the floor.
    pub fn charge(&self, bytes: usize) -> Result<(), Error> {
        let used = self.mem_used.fetch_add(bytes, Ordering::Relaxed) + bytes;
        if used + MEMORY_FLOOR_BYTES > self.mem_limit {
            Err(Error::ResourceExhausted)
        } else {
            Ok(())
        }
    }

    pub fn release(&self, bytes: usize) {
        self.mem_used.fetch_sub(bytes, Ordering::Relaxed);
    }

    pub fn mem_used(&self) -> usize {
        self.mem_used.load(Ordering::Relaxed)
    }
}

impl Default for SearchContext {
    fn default() -> Self {
        Self::unlimited()
    }
}

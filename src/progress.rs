use std::sync::Arc;

use parking_lot::Mutex;

/// Invoked with `(bytes_done, bytes_total)` after each completed chunk.
/// `bytes_total` is `None` when the source length is unknown.
pub type ProgressCallback = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Running progress total for one transfer.
///
/// Completions race under parallel execution, so the total lives behind a
/// lock; the callback fires inside the critical section so reported totals
/// are monotonic.
pub struct ProgressTracker {
    total_size: Option<u64>,
    done: Mutex<u64>,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub fn new(total_size: Option<u64>, callback: Option<ProgressCallback>) -> Self {
        Self {
            total_size,
            done: Mutex::new(0),
            callback,
        }
    }

    /// Report zero progress before the first chunk is dispatched
    pub fn start(&self) {
        if let Some(callback) = &self.callback {
            callback(0, self.total_size);
        }
    }

    /// Record `length` transferred bytes and report the new total
    pub fn advance(&self, length: u64) {
        let mut done = self.done.lock();
        *done += length;
        if let Some(callback) = &self.callback {
            callback(*done, self.total_size);
        }
    }

    /// Total bytes recorded so far
    pub fn bytes_done(&self) -> u64 {
        *self.done.lock()
    }
}

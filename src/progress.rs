// src/progress.rs

//! Byte-progress observation
//!
//! Install progress is a monotonically increasing byte counter bounded
//! by the bundle's `installed_size`, reported purely for observer use:
//! it never affects control flow, ordering, or correctness.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Observer for install byte progress.
///
/// Implementations should be thread-safe; the engine itself is
/// single-threaded but observers may be shared.
pub trait ProgressTracker: Send + Sync {
    /// Called once before file writing starts, with the total byte count.
    fn begin(&self, total: u64);

    /// Advance the counter by the given number of bytes processed.
    fn advance(&self, bytes: u64);

    /// Current counter position.
    fn position(&self) -> u64;

    /// Called once after the install commits or aborts.
    fn finish(&self);
}

/// No-op observer that still keeps the counter, for callers that poll.
#[derive(Debug, Default)]
pub struct SilentProgress {
    position: AtomicU64,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressTracker for SilentProgress {
    fn begin(&self, _total: u64) {
        self.position.store(0, Ordering::Relaxed);
    }

    fn advance(&self, bytes: u64) {
        self.position.fetch_add(bytes, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn finish(&self) {}
}

/// Observer that logs progress through tracing.
#[derive(Debug, Default)]
pub struct LogProgress {
    position: AtomicU64,
    total: AtomicU64,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressTracker for LogProgress {
    fn begin(&self, total: u64) {
        self.position.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
        info!("Writing {} bytes", total);
    }

    fn advance(&self, bytes: u64) {
        let position = self.position.fetch_add(bytes, Ordering::Relaxed) + bytes;
        debug!(
            "Progress: {}/{} bytes",
            position,
            self.total.load(Ordering::Relaxed)
        );
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn finish(&self) {
        info!(
            "Done: {} bytes processed",
            self.position.load(Ordering::Relaxed)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_is_monotonic() {
        let progress = SilentProgress::new();
        progress.begin(100);
        assert_eq!(progress.position(), 0);

        let mut last = 0;
        for chunk in [10u64, 0, 25, 65] {
            progress.advance(chunk);
            assert!(progress.position() >= last);
            last = progress.position();
        }
        assert_eq!(progress.position(), 100);
        progress.finish();
    }

    #[test]
    fn test_begin_resets() {
        let progress = SilentProgress::new();
        progress.begin(10);
        progress.advance(10);
        progress.begin(20);
        assert_eq!(progress.position(), 0);
    }
}

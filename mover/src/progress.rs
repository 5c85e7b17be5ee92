use std::sync::atomic::{AtomicU64, Ordering};

/// Receives progress as batches are committed.
pub trait ProgressSink: Send + Sync {
    /// Called once with the estimated number of entries before any work starts.
    fn start(&self, _total: u64) {}

    fn advance(&self, n: u64);

    fn complete(&self);
}

#[derive(Debug, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn advance(&self, _n: u64) {}

    fn complete(&self) {}
}

/// Reports progress through `tracing`.
#[derive(Debug, Default)]
pub struct LogProgress {
    total: AtomicU64,
    done: AtomicU64,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl ProgressSink for LogProgress {
    fn start(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
    }

    fn advance(&self, n: u64) {
        let done = self.done.fetch_add(n, Ordering::Relaxed) + n;
        tracing::debug!(done, total = self.total(), "Transfer progress");
    }

    fn complete(&self) {
        tracing::info!(
            done = self.done(),
            total = self.total(),
            "Transfer progress complete"
        );
    }
}

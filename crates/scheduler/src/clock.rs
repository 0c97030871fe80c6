use std::sync::atomic::{AtomicU64, Ordering};

/// Issues strictly increasing submission timestamps.
///
/// Timestamps only order submissions; they carry no wall-clock meaning.
/// Share one clock (via `Arc`) between every scheduler feeding the same
/// [`StaleResultGuard`](crate::guard::StaleResultGuard).
#[derive(Debug, Default)]
pub struct LogicalClock {
    last: AtomicU64,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp; the first call returns 1.
    pub fn tick(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Most recently issued timestamp, 0 if none.
    pub fn last(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}

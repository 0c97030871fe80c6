use std::sync::{Mutex, PoisonError};

/// Drops completions that were submitted before one already applied.
///
/// Holds a single field, the submission timestamp of the last applied
/// completion. Comparison is by submission order, never completion order:
/// a slow job that finishes after a newer job's result was shown is
/// discarded.
#[derive(Debug, Default)]
pub struct StaleResultGuard {
    last_applied: Mutex<Option<u64>>,
}

impl StaleResultGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `apply` if `submitted_at` is not older than the last applied
    /// timestamp, and advance the stored timestamp.
    ///
    /// `apply` runs while the guard is held, so decisions and applications
    /// from concurrent callers never interleave. Returns whether `apply` ran.
    pub fn try_apply<F>(&self, submitted_at: u64, apply: F) -> bool
    where
        F: FnOnce(),
    {
        let mut last = self
            .last_applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if (*last).is_some_and(|applied| submitted_at < applied) {
            tracing::debug!(submitted_at, last_applied = ?*last, "Discarding stale completion");
            return false;
        }
        *last = Some(submitted_at);
        apply();
        true
    }

    pub fn last_applied(&self) -> Option<u64> {
        *self
            .last_applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn apply_all(guard: &StaleResultGuard, order: &[u64]) -> Vec<u64> {
        let applied = RefCell::new(Vec::new());
        for &ts in order {
            guard.try_apply(ts, || applied.borrow_mut().push(ts));
        }
        applied.into_inner()
    }

    #[test]
    fn newer_after_older_applies_both() {
        let guard = StaleResultGuard::new();
        assert_eq!(apply_all(&guard, &[1, 2]), vec![1, 2]);
        assert_eq!(guard.last_applied(), Some(2));
    }

    #[test]
    fn older_after_newer_is_discarded() {
        let guard = StaleResultGuard::new();
        assert_eq!(apply_all(&guard, &[2, 1]), vec![2]);
        assert_eq!(guard.last_applied(), Some(2));
    }

    #[test]
    fn equal_timestamp_is_applied() {
        let guard = StaleResultGuard::new();
        assert_eq!(apply_all(&guard, &[3, 3]), vec![3, 3]);
    }

    #[test]
    fn first_completion_always_applies() {
        let guard = StaleResultGuard::new();
        assert_eq!(guard.last_applied(), None);
        assert!(guard.try_apply(0, || {}));
    }

    #[test]
    fn discard_does_not_run_apply() {
        let guard = StaleResultGuard::new();
        guard.try_apply(5, || {});
        let mut ran = false;
        assert!(!guard.try_apply(4, || ran = true));
        assert!(!ran);
    }
}

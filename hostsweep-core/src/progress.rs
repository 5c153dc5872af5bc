use crate::model::RunId;
use std::collections::HashMap;
use std::sync::{LockResult, Mutex, MutexGuard, OnceLock, PoisonError};

/// Processed/total candidate counts for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub total: Option<u64>,
    pub processed: u64,
}

impl Progress {
    /// Percentage capped at 100 and rounded to two decimals. `None` while the
    /// total is unknown or zero.
    pub fn percent(&self) -> Option<f64> {
        let total = self.total.filter(|t| *t > 0)?;
        let raw = (self.processed as f64 / total as f64 * 100.0).min(100.0);
        Some((raw * 100.0).round() / 100.0)
    }
}

/// In-memory progress and stop flags keyed by run id. Nothing here is
/// persisted; a restart forgets every entry.
#[derive(Debug, Default)]
pub struct RunRegistry {
    progress: Mutex<HashMap<RunId, Progress>>,
    stops: Mutex<HashMap<RunId, bool>>,
}

static GLOBAL: OnceLock<RunRegistry> = OnceLock::new();

// Entries are plain values, a poisoned map is still consistent
fn relock<'a, T>(guard: LockResult<MutexGuard<'a, T>>) -> MutexGuard<'a, T> {
    guard.unwrap_or_else(PoisonError::into_inner)
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry shared by the engine and whoever queries or stops runs.
    pub fn global() -> &'static RunRegistry {
        GLOBAL.get_or_init(RunRegistry::new)
    }

    pub fn set_progress(&self, run_id: RunId, total: Option<u64>, processed: u64) {
        relock(self.progress.lock()).insert(run_id, Progress { total, processed });
    }

    pub fn increment_progress(&self, run_id: RunId, delta: u64, total: Option<u64>) {
        let mut map = relock(self.progress.lock());
        let entry = map.entry(run_id).or_insert(Progress {
            total,
            processed: 0,
        });
        if total.is_some() {
            entry.total = total;
        }
        entry.processed += delta;
    }

    pub fn clear_progress(&self, run_id: RunId) {
        relock(self.progress.lock()).remove(&run_id);
    }

    pub fn progress(&self, run_id: RunId) -> Progress {
        relock(self.progress.lock())
            .get(&run_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn request_stop(&self, run_id: RunId) {
        relock(self.stops.lock()).insert(run_id, true);
    }

    pub fn clear_stop(&self, run_id: RunId) {
        relock(self.stops.lock()).remove(&run_id);
    }

    pub fn is_stopped(&self, run_id: RunId) -> bool {
        relock(self.stops.lock())
            .get(&run_id)
            .copied()
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_defaults_when_absent() {
        let registry = RunRegistry::new();
        assert_eq!(registry.progress(7), Progress::default());
        assert_eq!(registry.progress(7).percent(), None);
        assert!(!registry.is_stopped(7));
    }

    #[test]
    fn test_increment_and_clear() {
        let registry = RunRegistry::new();
        registry.set_progress(1, Some(3), 0);
        registry.increment_progress(1, 2, None);
        assert_eq!(
            registry.progress(1),
            Progress {
                total: Some(3),
                processed: 2
            }
        );

        registry.increment_progress(1, 1, Some(4));
        assert_eq!(registry.progress(1).total, Some(4));
        assert_eq!(registry.progress(1).processed, 3);

        registry.clear_progress(1);
        assert_eq!(registry.progress(1), Progress::default());
    }

    #[test]
    fn test_increment_without_entry_starts_from_zero() {
        let registry = RunRegistry::new();
        registry.increment_progress(2, 5, None);
        assert_eq!(
            registry.progress(2),
            Progress {
                total: None,
                processed: 5
            }
        );
    }

    #[test]
    fn test_percent_rounding_and_cap() {
        let third = Progress {
            total: Some(3),
            processed: 1,
        };
        assert_eq!(third.percent(), Some(33.33));

        let over = Progress {
            total: Some(2),
            processed: 5,
        };
        assert_eq!(over.percent(), Some(100.0));

        let empty = Progress {
            total: Some(0),
            processed: 0,
        };
        assert_eq!(empty.percent(), None);
    }

    #[test]
    fn test_stop_flags_are_per_run() {
        let registry = RunRegistry::new();
        registry.request_stop(1);
        assert!(registry.is_stopped(1));
        assert!(!registry.is_stopped(2));

        registry.clear_stop(1);
        assert!(!registry.is_stopped(1));
    }
}

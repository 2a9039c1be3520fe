use log::warn;
use provsys_model::constants::SETUP_FAIL_LIMIT;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

/// The per-worker memory of the setup engine: how often each provider failed to set up and which
/// providers are quarantined. It lives as long as the worker process.
#[derive(Debug, Default)]
pub struct HarnessState {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default, Clone)]
struct Inner {
    failures: BTreeMap<String, u32>,
    quarantined: BTreeSet<String>,
}

/// A consistent read-only view of [`HarnessState`] at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    pub failures: BTreeMap<String, u32>,
    pub quarantined: BTreeSet<String>,
}

impl StateSnapshot {
    pub fn is_quarantined(&self, key: &str) -> bool {
        self.quarantined.contains(key)
    }

    pub fn failures(&self, key: &str) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }
}

impl HarnessState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        StateSnapshot {
            failures: inner.failures.clone(),
            quarantined: inner.quarantined.clone(),
        }
    }

    pub fn is_quarantined(&self, key: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .quarantined
            .contains(key)
    }

    /// Count a failed setup of `key`. Returns `true` if this failure quarantined the provider.
    pub fn record_failure(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let count = inner.failures.entry(key.to_string()).or_insert(0);
        *count = count.saturating_add(1).min(SETUP_FAIL_LIMIT);
        if *count >= SETUP_FAIL_LIMIT && inner.quarantined.insert(key.to_string()) {
            warn!(
                "Provider '{}' failed to set up {} times and is now problematic",
                key, SETUP_FAIL_LIMIT
            );
            return true;
        }
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn quarantines_at_the_limit() {
        let state = HarnessState::new();
        assert!(!state.record_failure("rhv1"));
        assert!(!state.record_failure("rhv1"));
        assert!(state.record_failure("rhv1"));
        assert!(state.is_quarantined("rhv1"));
        // Further failures neither re-quarantine nor grow the counter past the limit.
        assert!(!state.record_failure("rhv1"));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.failures("rhv1"), SETUP_FAIL_LIMIT);
        assert_eq!(snapshot.failures("vc1"), 0);
    }
}

//! Statistics for the buffer registry

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operation counters, updated without taking the registry lock
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// Successful retains
    pub retains: AtomicU64,
    /// Successful releases
    pub releases: AtomicU64,
    /// Successful map calls, including no-op maps of mapped buffers
    pub maps: AtomicU64,
    /// Calls into the memory mapper
    pub mapper_invocations: AtomicU64,
    /// Handles rejected by the sanity checker
    pub sanity_rejections: AtomicU64,
    /// Validator failures across all operations
    pub validation_failures: AtomicU64,
    /// Records destroyed by a final release
    pub records_destroyed: AtomicU64,
    /// Teardown steps that reported an error
    pub teardown_errors: AtomicU64,
}

impl RegistryStats {
    /// Create new statistics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of mapper invocations so far
    pub fn mapper_invocations(&self) -> u64 {
        self.mapper_invocations.load(Ordering::Relaxed)
    }

    /// Plain copy of every counter
    pub fn snapshot(&self) -> RegistryStatsSnapshot {
        RegistryStatsSnapshot {
            retains: self.retains.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            maps: self.maps.load(Ordering::Relaxed),
            mapper_invocations: self.mapper_invocations.load(Ordering::Relaxed),
            sanity_rejections: self.sanity_rejections.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            records_destroyed: self.records_destroyed.load(Ordering::Relaxed),
            teardown_errors: self.teardown_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RegistryStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStatsSnapshot {
    pub retains: u64,
    pub releases: u64,
    pub maps: u64,
    pub mapper_invocations: u64,
    pub sanity_rejections: u64,
    pub validation_failures: u64,
    pub records_destroyed: u64,
    pub teardown_errors: u64,
}

impl RegistryStatsSnapshot {
    /// Retains not yet balanced by a release
    pub fn outstanding_references(&self) -> u64 {
        self.retains.saturating_sub(self.releases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = RegistryStats::new();
        RegistryStats::bump(&stats.retains);
        RegistryStats::bump(&stats.retains);
        RegistryStats::bump(&stats.releases);
        RegistryStats::bump(&stats.mapper_invocations);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.retains, 2);
        assert_eq!(snapshot.outstanding_references(), 1);
        assert_eq!(stats.mapper_invocations(), 1);
    }
}

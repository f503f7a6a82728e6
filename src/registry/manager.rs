//! Process-wide buffer registry

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{
    error::{RegistryError, Result},
    handle::BufferHandle,
    mapper::{MapCoordinator, MemMapper, MmapMapper},
    sanity::SanityChecker,
};

use super::{
    config::RegistryConfig,
    record::RecordInfo,
    stats::{RegistryStats, RegistryStatsSnapshot},
    table::RegistryTable,
    validator::validate_locked,
};

lazy_static::lazy_static! {
    static ref GLOBAL_REGISTRY: BufferRegistry = BufferRegistry::default();
}

/// Reference-counted registry of imported buffer handles
///
/// Every public operation holds the registry lock for its full duration, so
/// operations are linearizable across threads. Validation and the mutation
/// it guards always share one lock acquisition.
#[derive(Debug)]
pub struct BufferRegistry {
    /// Records keyed by handle identity
    table: Mutex<RegistryTable>,
    /// Mapper driver for map and teardown
    coordinator: MapCoordinator,
    /// Descriptor checks run before first map
    checker: SanityChecker,
    /// Configuration the registry was built with
    config: RegistryConfig,
    /// Operation counters
    stats: RegistryStats,
}

impl BufferRegistry {
    /// Create a registry using the default mmap-backed mapper
    pub fn new(config: RegistryConfig) -> Result<Self> {
        Self::with_mapper(config, Box::new(MmapMapper::new()))
    }

    /// Create a registry driving a custom mapper
    pub fn with_mapper(config: RegistryConfig, mapper: Box<dyn MemMapper>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, mapper))
    }

    fn build(config: RegistryConfig, mapper: Box<dyn MemMapper>) -> Self {
        Self {
            table: Mutex::new(RegistryTable::new()),
            coordinator: MapCoordinator::new(mapper),
            checker: SanityChecker::new(config.page_size, config.length_probe),
            config,
            stats: RegistryStats::new(),
        }
    }

    /// The process-wide registry, created on first use
    pub fn global() -> &'static BufferRegistry {
        &GLOBAL_REGISTRY
    }

    fn lock(&self) -> MutexGuard<'_, RegistryTable> {
        // Critical sections never leave the table half-updated
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a handle, or take another reference on a registered one
    ///
    /// The first retain zeroes the handle's scratch bases: addresses written
    /// by another process mean nothing here.
    pub fn retain(&self, handle: &BufferHandle) -> Result<()> {
        if !handle.is_well_formed() {
            log::error!("Registering/Retaining invalid buffer {}, returning error", handle.id());
            return Err(RegistryError::invalid_handle("handle is not well formed"));
        }

        let mut table = self.lock();
        let (record, created) = table.get_or_insert(handle.id());
        if created {
            handle.clear_bases();
            log::debug!("retain: registered {}", handle.id());
        } else if record.ref_count == 0 {
            log::error!(
                "BUG: Import counter of an imported buffer {} is 0, expect errors",
                handle.id()
            );
        }

        record.add_ref();
        log::trace!("retain: {} ref_count={}", handle.id(), record.ref_count);
        RegistryStats::bump(&self.stats.retains);
        Ok(())
    }

    /// Map the handle's regions into this process if not already mapped
    pub fn map(&self, handle: &BufferHandle) -> Result<()> {
        let mut table = self.lock();
        self.validate_with(&table, handle)?;
        self.map_locked(&mut table, handle)
    }

    fn map_locked(&self, table: &mut RegistryTable, handle: &BufferHandle) -> Result<()> {
        let record = table.get_mut(handle.id()).ok_or_else(|| {
            log::error!("BUG: Map called without importing buffer {}", handle.id());
            RegistryError::invalid_handle("map called without importing buffer")
        })?;

        if record.ref_count == 0 {
            log::error!(
                "BUG: Found an imported buffer {} with ref count 0, expect errors",
                handle.id()
            );
        }

        if record.is_mapped() {
            RegistryStats::bump(&self.stats.maps);
            return Ok(());
        }

        if let Err(failure) = self.checker.check(handle) {
            log::error!("dmabuf sanity check failed for {}: {}", handle.id(), failure);
            RegistryStats::bump(&self.stats.sanity_rejections);
            return Err(RegistryError::invalid_handle(failure.to_string()));
        }

        RegistryStats::bump(&self.stats.mapper_invocations);
        self.coordinator.map_regions(handle)?;
        record.capture(handle);

        log::debug!("map: {} mapped at {:#x?}", handle.id(), record.bases);
        RegistryStats::bump(&self.stats.maps);
        Ok(())
    }

    /// Drop one reference; the last one unmaps everything and forgets the handle
    pub fn release(&self, handle: &BufferHandle) -> Result<()> {
        let mut table = self.lock();

        // Validation must happen under this same acquisition; validating
        // through the public `validate` would leave a window between check
        // and mutation.
        self.validate_with(&table, handle)?;

        let record = table.get_mut(handle.id()).ok_or_else(|| {
            log::error!("Trying to release a non-imported buffer {}", handle.id());
            RegistryError::invalid_handle("release of a non-imported buffer")
        })?;

        if record.ref_count == 0 {
            log::error!("BUG: Reference held for buffer {} whose counter is 0", handle.id());
            return Err(RegistryError::invalid_handle("reference count already zero"));
        }

        let last = record.remove_ref();
        let mapped = record.is_mapped();
        RegistryStats::bump(&self.stats.releases);

        if last {
            let outcome = self.coordinator.teardown(handle, mapped);
            table.remove(handle.id());
            self.stats
                .teardown_errors
                .fetch_add(u64::from(outcome.errors), std::sync::atomic::Ordering::Relaxed);
            RegistryStats::bump(&self.stats.records_destroyed);
            log::debug!("release: destroyed record for {} ({:?})", handle.id(), outcome);
        }
        Ok(())
    }

    /// Check that the handle is registered and consistent with its record
    pub fn validate(&self, handle: &BufferHandle) -> Result<()> {
        let table = self.lock();
        self.validate_with(&table, handle)
    }

    fn validate_with(&self, table: &RegistryTable, handle: &BufferHandle) -> Result<()> {
        validate_locked(table, handle).map_err(|e| {
            RegistryStats::bump(&self.stats.validation_failures);
            e
        })
    }

    /// Snapshot of the record for `handle`, if registered
    pub fn record_info(&self, handle: &BufferHandle) -> Option<RecordInfo> {
        self.lock().get(handle.id()).map(|record| record.info())
    }

    /// Whether `handle` currently has a record
    pub fn is_registered(&self, handle: &BufferHandle) -> bool {
        self.lock().contains(handle.id())
    }

    /// Number of registered handles
    pub fn registered_count(&self) -> usize {
        self.lock().len()
    }

    /// Number of registered handles currently mapped
    pub fn mapped_count(&self) -> usize {
        self.lock().iter().filter(|(_, record)| record.is_mapped()).count()
    }

    /// Operation counters
    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    /// Point-in-time copy of the operation counters
    pub fn stats_snapshot(&self) -> RegistryStatsSnapshot {
        self.stats.snapshot()
    }

    /// Configuration in effect
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The sanity checker used before first map
    pub fn checker(&self) -> &SanityChecker {
        &self.checker
    }
}

impl Default for BufferRegistry {
    fn default() -> Self {
        Self::build(RegistryConfig::default(), Box::new(MmapMapper::new()))
    }
}

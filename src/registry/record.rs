//! Per-handle bookkeeping

use serde::Serialize;

use crate::{handle::BufferHandle, limits::MAX_BUFFER_FDS};

/// Reference count and cached mapping state of one registered handle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferRecord {
    /// Cached base address of each region, zero until mapped
    pub bases: [u64; MAX_BUFFER_FDS],
    /// Region sizes captured at map time
    pub alloc_sizes: [u64; MAX_BUFFER_FDS],
    /// Number of outstanding retains
    pub ref_count: u64,
}

impl BufferRecord {
    /// Create an unreferenced, unmapped record
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the regions are mapped in this process
    pub fn is_mapped(&self) -> bool {
        self.bases[0] != 0
    }

    /// Cache the addresses and sizes a mapper just wrote into `handle`
    pub fn capture(&mut self, handle: &BufferHandle) {
        self.bases = handle.bases_snapshot();
        self.alloc_sizes = handle.alloc_sizes;
    }

    /// Increment reference count
    pub fn add_ref(&mut self) {
        self.ref_count += 1;
    }

    /// Decrement reference count and return true if the record should be removed
    pub fn remove_ref(&mut self) -> bool {
        self.ref_count = self.ref_count.saturating_sub(1);
        self.ref_count == 0
    }

    /// Plain snapshot for callers outside the registry lock
    pub fn info(&self) -> RecordInfo {
        RecordInfo {
            ref_count: self.ref_count,
            mapped: self.is_mapped(),
            bases: self.bases,
            alloc_sizes: self.alloc_sizes,
        }
    }
}

/// Snapshot of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordInfo {
    pub ref_count: u64,
    pub mapped: bool,
    pub bases: [u64; MAX_BUFFER_FDS],
    pub alloc_sizes: [u64; MAX_BUFFER_FDS],
}

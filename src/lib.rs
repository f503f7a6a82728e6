//! # gralloc-refs - Process-Local Buffer Reference Registry
//!
//! Shared graphics and video buffers travel between processes as handles
//! carrying several shared-memory descriptors. This crate tracks such handles
//! inside one client process: how many times each was imported, whether its
//! regions are mapped here, and whether the handle still agrees with what the
//! registry recorded.
//!
//! ## Operations
//!
//! - **retain**: register a handle or take another reference on it
//! - **map**: sanity-check the descriptors and map every region once
//! - **release**: drop a reference; the last one unmaps and forgets the handle
//! - **validate**: assert the handle is registered and untampered
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 BufferRegistry                   │
//! │   (one lock, held for each whole operation)      │
//! ├──────────────┬──────────────┬────────────────────┤
//! │ RegistryTable│  Validator   │  SanityChecker     │
//! │ HandleId ->  │ handle vs    │ fd lengths vs      │
//! │ BufferRecord │ record       │ advertised sizes   │
//! └──────────────┴──────────────┴─────────┬──────────┘
//!                                         │
//!                              ┌──────────▼──────────┐
//!                              │   MapCoordinator    │
//!                              │ MemMapper + munmap  │
//!                              └─────────────────────┘
//! ```
//!
//! Reference counts are strictly per process; nothing here allocates buffers
//! or coordinates with other processes.

pub mod error;
pub mod handle;
pub mod mapper;
pub mod reference;
pub mod registry;
pub mod sanity;

#[cfg(feature = "c-api")]
pub mod ffi;

// Main API re-exports
pub use error::{status_of, RegistryError, Result};
pub use handle::{BufferHandle, HandleId, SharedBuffer};
pub use mapper::{MapCoordinator, MemMapper, MmapMapper};
pub use registry::{BufferRegistry, RecordInfo, RegistryConfig, RegistryStatsSnapshot};
pub use sanity::{LengthProbe, SanityChecker, SanityFailure};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Handle layout limits
pub mod limits {
    /// Total descriptor slots in a handle, including the sentinel tail
    pub const MAX_FDS: usize = 4;

    /// Client-facing regions per handle; one slot is reserved for metadata
    pub const MAX_BUFFER_FDS: usize = MAX_FDS - 1;

    /// Default page size used as the sanity tolerance
    pub const PAGE_SIZE: usize = 4096;

    /// Marks an unused descriptor slot
    pub const FD_SENTINEL: std::os::fd::RawFd = -1;

    /// Page size of the running system, or [`PAGE_SIZE`] if it can't be read
    pub fn system_page_size() -> usize {
        use nix::unistd::{sysconf, SysconfVar};

        match sysconf(SysconfVar::PAGE_SIZE) {
            Ok(Some(size)) if size > 0 && (size as usize).is_power_of_two() => size as usize,
            _ => PAGE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits() {
        assert_eq!(limits::MAX_BUFFER_FDS + 1, limits::MAX_FDS);
        assert!(limits::system_page_size().is_power_of_two());
    }
}

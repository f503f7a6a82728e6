//! Memory mappers and the coordinator that drives them
//!
//! The registry never maps memory itself. A [`MemMapper`] turns the region
//! descriptors of a handle into virtual addresses, and the
//! [`MapCoordinator`] sequences it together with the metadata teardown.

pub mod coordinator;
pub mod mmap;

pub use coordinator::{MapCoordinator, Teardown};
pub use mmap::MmapMapper;

use crate::{error::Result, handle::BufferHandle};

/// Maps and unmaps the client-facing regions of a handle
pub trait MemMapper: Send + Sync + std::fmt::Debug {
    /// Populate `handle.bases[..fd_count]` with valid addresses
    ///
    /// Must not touch `attr_base`. On error no region may be left mapped.
    fn map(&self, handle: &BufferHandle) -> Result<()>;

    /// Release the ranges established by `map` and clear `handle.bases`
    fn unmap(&self, handle: &BufferHandle) -> Result<()>;
}

//! Sequencing of region mapping and last-reference teardown

use crate::{
    error::Result,
    handle::{unmap_attributes, BufferHandle},
};

use super::MemMapper;

/// Outcome of a best-effort teardown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Teardown {
    /// Regions were unmapped through the mapper
    pub regions_unmapped: bool,
    /// The metadata mapping was released
    pub metadata_unmapped: bool,
    /// Number of steps that reported an error
    pub errors: u32,
}

/// Drives a [`MemMapper`] on behalf of the registry
#[derive(Debug)]
pub struct MapCoordinator {
    mapper: Box<dyn MemMapper>,
}

impl MapCoordinator {
    /// Wrap a mapper
    pub fn new(mapper: Box<dyn MemMapper>) -> Self {
        Self { mapper }
    }

    /// Borrow the underlying mapper
    pub fn mapper(&self) -> &dyn MemMapper {
        self.mapper.as_ref()
    }

    /// Map the client-facing regions
    ///
    /// On failure the scratch bases are zeroed so the handle still reads as
    /// unmapped; the mapper's error is returned unchanged.
    pub fn map_regions(&self, handle: &BufferHandle) -> Result<()> {
        self.mapper.map(handle).map_err(|e| {
            handle.clear_bases();
            e
        })
    }

    /// Release everything a dying record still holds
    ///
    /// Every step runs even if an earlier one fails, so a bad descriptor
    /// cannot pin a record. Metadata is released whenever `attr_base` is set,
    /// independent of `regions_mapped`.
    pub fn teardown(&self, handle: &BufferHandle, regions_mapped: bool) -> Teardown {
        let mut outcome = Teardown::default();

        if regions_mapped {
            match self.mapper.unmap(handle) {
                Ok(()) => outcome.regions_unmapped = true,
                Err(e) => {
                    log::warn!("release: unmapping regions of {} failed: {}", handle.id(), e);
                    outcome.errors += 1;
                }
            }
            handle.clear_bases();
        }

        match unmap_attributes(handle) {
            Ok(unmapped) => outcome.metadata_unmapped = unmapped,
            Err(e) => {
                log::warn!("release: unmapping metadata of {} failed: {}", handle.id(), e);
                outcome.errors += 1;
            }
        }

        outcome
    }
}

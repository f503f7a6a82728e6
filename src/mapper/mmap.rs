//! Default mapper backed by memmap2 shared mappings

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use memmap2::{MmapMut, MmapOptions};

use crate::{
    error::{RegistryError, Result},
    handle::{BufferHandle, HandleId},
};

use super::MemMapper;

/// Maps each client-facing region as a shared read/write mapping
///
/// Mappings are owned here, keyed by handle identity, and are dropped
/// (unmapped) on [`MemMapper::unmap`].
#[derive(Debug, Default)]
pub struct MmapMapper {
    mappings: Mutex<HashMap<HandleId, Vec<MmapMut>>>,
}

impl MmapMapper {
    /// Create a new mapper with no live mappings
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles with live mappings
    pub fn mapped_count(&self) -> usize {
        self.mappings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn map_region(handle: &BufferHandle, index: usize) -> Result<MmapMut> {
        let fd = handle.fds[index];
        let len = usize::try_from(handle.alloc_sizes[index]).unwrap_or(0);
        if len == 0 {
            return Err(RegistryError::mapper(
                libc::EINVAL,
                format!("region {} of {} has zero size", index, handle.id()),
            ));
        }

        unsafe { MmapOptions::new().len(len).map_mut(fd) }.map_err(|e| {
            RegistryError::mapper(
                e.raw_os_error().unwrap_or(libc::EIO),
                format!("Failed to map region {} (fd {}): {}", index, fd, e),
            )
        })
    }
}

impl MemMapper for MmapMapper {
    fn map(&self, handle: &BufferHandle) -> Result<()> {
        // Partial mappings are dropped by `?` before anything is published
        let regions = (0..handle.region_count())
            .map(|i| Self::map_region(handle, i))
            .collect::<Result<Vec<_>>>()?;

        handle.clear_bases();
        if regions.is_empty() {
            return Ok(());
        }
        for (i, region) in regions.iter().enumerate() {
            handle.set_base(i, region.as_ptr() as u64);
        }

        let previous = self
            .mappings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id(), regions);
        if previous.is_some() {
            log::warn!("mmap mapper: replaced stale mappings for {}", handle.id());
        }
        Ok(())
    }

    fn unmap(&self, handle: &BufferHandle) -> Result<()> {
        let removed = self
            .mappings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.id());
        handle.clear_bases();

        match removed {
            Some(regions) => {
                drop(regions);
                Ok(())
            }
            None => Err(RegistryError::mapper(
                libc::EINVAL,
                format!("no mappings held for {}", handle.id()),
            )),
        }
    }
}

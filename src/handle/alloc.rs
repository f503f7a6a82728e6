//! memfd-backed shared buffer allocations for building handles

use std::{
    ffi::CString,
    os::fd::{AsFd, AsRawFd, OwnedFd, RawFd},
};

use nix::{
    sys::memfd::{memfd_create, MemFdCreateFlag},
    unistd::ftruncate,
};

use crate::{
    error::{RegistryError, Result},
    limits::MAX_BUFFER_FDS,
};

use super::private::BufferHandle;

/// Region descriptors and a metadata descriptor owned together
///
/// Stands in for an allocator: the descriptors stay open as long as the
/// `SharedBuffer` lives, and handles built from it borrow them.
#[derive(Debug)]
pub struct SharedBuffer {
    name: String,
    regions: Vec<OwnedFd>,
    alloc_sizes: Vec<u64>,
    attr: OwnedFd,
    attr_size: u64,
}

impl SharedBuffer {
    /// Allocate one memfd per region plus one for metadata, sized as advertised
    pub fn allocate(name: &str, alloc_sizes: &[u64], attr_size: u64) -> Result<Self> {
        if alloc_sizes.len() > MAX_BUFFER_FDS {
            return Err(RegistryError::invalid_parameter(
                "alloc_sizes",
                format!("at most {} regions are supported", MAX_BUFFER_FDS),
            ));
        }

        let regions = alloc_sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| create_memfd(&format!("{}-{}", name, i), size))
            .collect::<Result<Vec<_>>>()?;
        let attr = create_memfd(&format!("{}-attr", name), attr_size)?;

        Ok(Self {
            name: name.to_string(),
            regions,
            alloc_sizes: alloc_sizes.to_vec(),
            attr,
            attr_size,
        })
    }

    /// Build a fresh handle advertising the allocation sizes
    pub fn handle(&self) -> Result<BufferHandle> {
        let fds: Vec<RawFd> = self.regions.iter().map(|fd| fd.as_raw_fd()).collect();
        BufferHandle::new(&fds, &self.alloc_sizes, self.attr.as_raw_fd(), self.attr_size)
    }

    /// Resize the backing descriptor of region `index` without touching
    /// the advertised size
    pub fn set_region_len(&self, index: usize, len: u64) -> Result<()> {
        let fd = self.regions.get(index).ok_or_else(|| {
            RegistryError::invalid_parameter("index", format!("no region {}", index))
        })?;
        resize(fd, len)
    }

    /// Resize the metadata descriptor without touching the advertised size
    pub fn set_attr_len(&self, len: u64) -> Result<()> {
        resize(&self.attr, len)
    }

    /// Allocation name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of client-facing regions
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Advertised region sizes
    pub fn alloc_sizes(&self) -> &[u64] {
        &self.alloc_sizes
    }

    /// Advertised metadata size
    pub fn attr_size(&self) -> u64 {
        self.attr_size
    }

    /// Borrow the metadata descriptor
    pub fn attr_fd(&self) -> RawFd {
        self.attr.as_raw_fd()
    }
}

fn create_memfd(name: &str, size: u64) -> Result<OwnedFd> {
    let name_cstr = CString::new(name)
        .map_err(|_| RegistryError::invalid_parameter("name", "Name contains null bytes"))?;

    let owned_fd = memfd_create(&name_cstr, MemFdCreateFlag::MFD_CLOEXEC)
        .map_err(|e| RegistryError::platform(format!("Failed to create memfd: {}", e)))?;

    resize(&owned_fd, size)?;
    Ok(owned_fd)
}

fn resize(fd: &impl AsFd, len: u64) -> Result<()> {
    let len = libc::off_t::try_from(len)
        .map_err(|_| RegistryError::invalid_parameter("len", "length exceeds off_t"))?;
    ftruncate(fd, len)
        .map_err(|e| RegistryError::platform(format!("Failed to set memfd size: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::stat::fstat;

    #[test]
    fn test_allocate_and_build_handle() {
        let buffer = SharedBuffer::allocate("alloc_test", &[4096, 8192], 4096).unwrap();
        assert_eq!(buffer.region_count(), 2);
        assert_eq!(buffer.name(), "alloc_test");

        let handle = buffer.handle().unwrap();
        assert!(handle.is_well_formed());
        assert_eq!(handle.fd_count, 2);
        assert_eq!(handle.share_attr_fd(), buffer.attr_fd());
        assert_eq!(fstat(handle.fds[1]).unwrap().st_size, 8192);
    }

    #[test]
    fn test_resize_region() {
        let buffer = SharedBuffer::allocate("resize_test", &[4096], 4096).unwrap();
        buffer.set_region_len(0, 16384).unwrap();
        let handle = buffer.handle().unwrap();
        assert_eq!(fstat(handle.fds[0]).unwrap().st_size, 16384);
        assert_eq!(handle.alloc_sizes[0], 4096);
        assert!(buffer.set_region_len(3, 1).is_err());
    }

    #[test]
    fn test_too_many_regions() {
        assert!(SharedBuffer::allocate("too_many", &[1, 1, 1, 1], 1).is_err());
    }
}

//! Metadata (shared attribute) region mapping
//!
//! `attr_base` is populated outside the registry, typically when a client
//! first reads buffer attributes. Whoever installs it must map exactly
//! `attr_size` bytes of the metadata descriptor with the OS mapping
//! primitive: registry teardown releases `(attr_base, attr_size)` with the
//! OS unmap primitive once the last reference is dropped. Callers must hold a
//! retained reference while mapping attributes.

use std::{
    ffi::c_void,
    ptr::{self, NonNull},
    sync::atomic::Ordering,
};

use crate::error::{RegistryError, Result};

use super::private::BufferHandle;

/// Map the metadata region and publish it through `attr_base`
///
/// Returns the existing mapping if one is already installed.
pub fn map_attributes(handle: &BufferHandle) -> Result<NonNull<c_void>> {
    if let Some(base) = handle.attr_base() {
        return Ok(base);
    }

    let fd = handle.share_attr_fd();
    let len = attr_len(handle)?;
    if fd < 0 {
        return Err(RegistryError::invalid_handle("metadata descriptor missing"));
    }

    let addr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        return Err(RegistryError::from_io(
            std::io::Error::last_os_error(),
            "Failed to map metadata region",
        ));
    }

    match handle.attr_base.compare_exchange(
        ptr::null_mut(),
        addr,
        Ordering::AcqRel,
        Ordering::Acquire,
    ) {
        Ok(_) => NonNull::new(addr)
            .ok_or_else(|| RegistryError::platform("mmap returned null")),
        Err(existing) => {
            // Lost the race to another mapper; keep theirs.
            unsafe {
                libc::munmap(addr, len);
            }
            NonNull::new(existing).ok_or_else(|| RegistryError::platform("attr_base raced to null"))
        }
    }
}

/// Unmap the metadata region if mapped and clear `attr_base`
///
/// Returns `Ok(false)` when nothing was mapped. `attr_base` is cleared even
/// if the unmap itself fails.
pub fn unmap_attributes(handle: &BufferHandle) -> Result<bool> {
    let base = handle.attr_base.swap(ptr::null_mut(), Ordering::AcqRel);
    if base.is_null() {
        return Ok(false);
    }

    let len = attr_len(handle)?;
    let rc = unsafe { libc::munmap(base, len) };
    if rc != 0 {
        return Err(RegistryError::from_io(
            std::io::Error::last_os_error(),
            "Failed to unmap metadata region",
        ));
    }
    Ok(true)
}

/// Metadata region as a byte slice
///
/// # Safety
/// The metadata region must stay mapped while the slice is alive.
pub unsafe fn attributes(handle: &BufferHandle) -> Option<&[u8]> {
    let base = handle.attr_base()?;
    let len = usize::try_from(handle.attr_size).ok()?;
    Some(std::slice::from_raw_parts(base.as_ptr() as *const u8, len))
}

fn attr_len(handle: &BufferHandle) -> Result<usize> {
    match usize::try_from(handle.attr_size) {
        Ok(0) | Err(_) => Err(RegistryError::invalid_handle(format!(
            "unusable metadata size {}",
            handle.attr_size
        ))),
        Ok(len) => Ok(len),
    }
}

//! C Foreign Function Interface (FFI) for gralloc/mapper integration
//!
//! Handles are passed by pointer and identified by that pointer, so callers
//! must pass the same handle object to every call between retain and the
//! final release.

use std::ffi::{c_char, c_int};

use crate::{handle::BufferHandle, reference};

/// Initialize `env_logger` for the library; safe to call more than once
#[no_mangle]
pub extern "C" fn gralloc_reference_init_logging() -> c_int {
    match env_logger::try_init() {
        Ok(()) => 0,
        Err(_) => -libc::EALREADY,
    }
}

/// Register or re-register an imported handle
///
/// # Safety
/// `handle` must be null or point to a live `BufferHandle`.
#[no_mangle]
pub unsafe extern "C" fn gralloc_reference_retain(handle: *const BufferHandle) -> c_int {
    with_handle(handle, reference::retain)
}

/// Map the regions of a retained handle
///
/// # Safety
/// `handle` must be null or point to a live `BufferHandle`.
#[no_mangle]
pub unsafe extern "C" fn gralloc_reference_map(handle: *const BufferHandle) -> c_int {
    with_handle(handle, reference::map)
}

/// Drop one reference on a retained handle
///
/// # Safety
/// `handle` must be null or point to a live `BufferHandle`.
#[no_mangle]
pub unsafe extern "C" fn gralloc_reference_release(handle: *const BufferHandle) -> c_int {
    with_handle(handle, reference::release)
}

/// Check a handle is registered and consistent
///
/// # Safety
/// `handle` must be null or point to a live `BufferHandle`.
#[no_mangle]
pub unsafe extern "C" fn gralloc_reference_validate(handle: *const BufferHandle) -> c_int {
    with_handle(handle, reference::validate)
}

/// Library version as a static NUL-terminated string
#[no_mangle]
pub extern "C" fn gralloc_reference_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

unsafe fn with_handle(handle: *const BufferHandle, op: fn(&BufferHandle) -> i32) -> c_int {
    match handle.as_ref() {
        Some(handle) => op(handle),
        None => {
            log::error!("null buffer handle passed across the C API");
            -libc::EINVAL
        }
    }
}

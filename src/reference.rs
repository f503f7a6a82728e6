//! Status-code entry points over the process-wide registry
//!
//! Each returns `0` on success or a negative errno; an invalid handle is
//! `-EINVAL` and a mapper failure forwards the mapper's errno.

use crate::{error::status_of, handle::BufferHandle, registry::BufferRegistry};

/// Register or re-register an imported handle
pub fn retain(handle: &BufferHandle) -> i32 {
    status_of(BufferRegistry::global().retain(handle))
}

/// Map the handle's regions into this process
pub fn map(handle: &BufferHandle) -> i32 {
    status_of(BufferRegistry::global().map(handle))
}

/// Drop one reference, tearing down on the last
pub fn release(handle: &BufferHandle) -> i32 {
    status_of(BufferRegistry::global().release(handle))
}

/// Check the handle is known and consistent
pub fn validate(handle: &BufferHandle) -> i32 {
    status_of(BufferRegistry::global().validate(handle))
}

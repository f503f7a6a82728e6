//! Handle-versus-record consistency checks
//!
//! Only ever called with the registry lock held; the table reference is the
//! proof of that.

use crate::{
    error::{RegistryError, Result},
    handle::BufferHandle,
};

use super::table::RegistryTable;

/// Validate `handle` against its record
///
/// A mapped record must agree with the handle's scratch bases and advertised
/// sizes slot for slot; an unmapped record and the handle's scratch must both
/// be empty.
pub fn validate_locked(table: &RegistryTable, handle: &BufferHandle) -> Result<()> {
    if !handle.is_well_formed() {
        log::error!("Reference invalid buffer {}, returning error", handle.id());
        return Err(RegistryError::invalid_handle("handle is not well formed"));
    }

    let record = table.get(handle.id()).ok_or_else(|| {
        log::error!("Reference unimported buffer {}, returning error", handle.id());
        RegistryError::invalid_handle("buffer was never retained")
    })?;

    let bases = handle.bases_snapshot();
    if record.is_mapped() {
        let consistent = bases == record.bases && handle.alloc_sizes == record.alloc_sizes;
        if !consistent {
            log::error!(
                "Validation failed for {}: buffer attributes inconsistent with mapper",
                handle.id()
            );
            return Err(RegistryError::invalid_handle(
                "buffer attributes inconsistent with mapper",
            ));
        }
    } else if bases.iter().chain(record.bases.iter()).any(|&base| base != 0) {
        log::error!(
            "Validation failed for {}: expected null bases for unmapped buffer",
            handle.id()
        );
        return Err(RegistryError::invalid_handle(
            "expected null bases for unmapped buffer",
        ));
    }

    Ok(())
}

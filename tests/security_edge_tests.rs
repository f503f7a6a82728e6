//! Security and edge case tests
//! Handles arrive from other processes, so every field may be hostile

use gralloc_refs::{
    handle::SharedBuffer, BufferHandle, BufferRegistry, RegistryConfig, RegistryError,
};

fn registry() -> BufferRegistry {
    BufferRegistry::new(RegistryConfig::new().with_page_size(4096)).unwrap()
}

fn mapped(registry: &BufferRegistry, handle: &BufferHandle) {
    registry.retain(handle).unwrap();
    registry.map(handle).unwrap();
}

#[cfg(test)]
mod security_edge_tests {
    use super::*;

    #[test]
    fn test_foreign_scratch_cleared_on_first_retain() {
        let registry = registry();
        let buffer = SharedBuffer::allocate("foreign_scratch", &[4096, 4096], 4096).unwrap();
        let handle = buffer.handle().unwrap();
        handle.set_base(0, 0xdead_0000);
        handle.set_base(1, 0xbeef_0000);

        registry.retain(&handle).unwrap();
        assert_eq!(handle.bases_snapshot(), [0; 3]);
        registry.validate(&handle).unwrap();
        registry.release(&handle).unwrap();
    }

    #[test]
    fn test_scratch_planted_before_map_rejected() {
        let registry = registry();
        let buffer = SharedBuffer::allocate("planted", &[4096], 4096).unwrap();
        let handle = buffer.handle().unwrap();

        registry.retain(&handle).unwrap();
        handle.set_base(0, 0x1000);

        // The mapper must never run for a handle that fails validation
        assert!(registry.map(&handle).unwrap_err().is_invalid_handle());
        assert_eq!(registry.stats_snapshot().mapper_invocations, 0);
        assert!(registry.release(&handle).unwrap_err().is_invalid_handle());

        handle.set_base(0, 0);
        registry.release(&handle).unwrap();
    }

    #[test]
    fn test_scratch_zeroed_while_mapped_rejected() {
        let registry = registry();
        let buffer = SharedBuffer::allocate("zeroed", &[4096], 4096).unwrap();
        let handle = buffer.handle().unwrap();
        mapped(&registry, &handle);

        let genuine = handle.base(0);
        handle.set_base(0, 0);
        assert!(registry.validate(&handle).unwrap_err().is_invalid_handle());
        // A tampered handle is not re-mapped either
        assert!(registry.map(&handle).unwrap_err().is_invalid_handle());
        assert_eq!(registry.stats_snapshot().mapper_invocations, 1);

        handle.set_base(0, genuine);
        registry.release(&handle).unwrap();
    }

    #[test]
    fn test_unused_scratch_slot_checked() {
        let registry = registry();
        let buffer = SharedBuffer::allocate("unused_slot", &[4096], 4096).unwrap();
        let handle = buffer.handle().unwrap();
        mapped(&registry, &handle);

        handle.set_base(2, 0x4000);
        assert!(registry.validate(&handle).is_err());
        handle.set_base(2, 0);
        registry.release(&handle).unwrap();
    }

    #[test]
    fn test_alloc_sizes_changed_after_map_rejected() {
        let registry = registry();
        let buffer = SharedBuffer::allocate("resized", &[4096], 4096).unwrap();
        let mut handle = buffer.handle().unwrap();
        mapped(&registry, &handle);

        handle.alloc_sizes[0] = 1 << 30;
        assert!(registry.validate(&handle).unwrap_err().is_invalid_handle());
        assert!(registry.release(&handle).unwrap_err().is_invalid_handle());

        handle.alloc_sizes[0] = 4096;
        registry.release(&handle).unwrap();
    }

    #[test]
    fn test_magic_corrupted_after_retain() {
        let registry = registry();
        let buffer = SharedBuffer::allocate("magic", &[4096], 4096).unwrap();
        let mut handle = buffer.handle().unwrap();
        registry.retain(&handle).unwrap();

        handle.magic = !BufferHandle::MAGIC;
        for err in [
            registry.validate(&handle).unwrap_err(),
            registry.map(&handle).unwrap_err(),
            registry.release(&handle).unwrap_err(),
            registry.retain(&handle).unwrap_err(),
        ] {
            assert!(err.is_invalid_handle());
            assert_eq!(err.status(), -libc::EINVAL);
        }
        assert_eq!(registry.record_info(&handle).unwrap().ref_count, 1);

        handle.magic = BufferHandle::MAGIC;
        registry.release(&handle).unwrap();
    }

    #[test]
    fn test_malformed_headers_never_registered() {
        let registry = registry();
        let buffer = SharedBuffer::allocate("headers", &[4096], 4096).unwrap();

        let corruptions: [fn(&mut BufferHandle); 5] = [
            |h| h.header.version += 1,
            |h| h.header.num_fds = 0,
            |h| h.header.num_ints -= 1,
            |h| h.fd_count = -1,
            |h| h.fd_count = 4,
        ];
        for corrupt in corruptions {
            let mut handle = buffer.handle().unwrap();
            corrupt(&mut handle);
            assert!(!handle.is_well_formed());
            assert!(matches!(
                registry.retain(&handle),
                Err(RegistryError::InvalidHandle { .. })
            ));
        }
        assert_eq!(registry.registered_count(), 0);
    }

    #[test]
    fn test_cloned_mapped_handle_is_not_trusted() {
        let registry = registry();
        let buffer = SharedBuffer::allocate("clone_mapped", &[4096], 4096).unwrap();
        let original = buffer.handle().unwrap();
        mapped(&registry, &original);

        // The clone has no record, so planting the original's addresses gains nothing
        let copy = original.clone();
        assert_eq!(copy.base(0), 0);
        copy.set_base(0, original.base(0));
        assert!(registry.validate(&copy).is_err());
        assert!(registry.release(&copy).is_err());

        registry.retain(&copy).unwrap();
        assert_eq!(copy.base(0), 0);
        assert_ne!(original.base(0), 0);
        registry.validate(&original).unwrap();

        registry.release(&copy).unwrap();
        registry.release(&original).unwrap();
    }

    #[test]
    fn test_stale_descriptor_fails_at_map() {
        let registry = registry();
        let buffer = SharedBuffer::allocate("stale_fd", &[4096], 4096).unwrap();
        let mut handle = buffer.handle().unwrap();
        handle.fds[0] = 999_999;

        // Unknown length passes the size check; the mapper reports the bad descriptor
        registry.retain(&handle).unwrap();
        let err = registry.map(&handle).unwrap_err();
        assert_eq!(err.status(), -libc::EBADF);
        assert_eq!(handle.base(0), 0);
        registry.release(&handle).unwrap();
    }

    #[test]
    fn test_double_release_after_teardown() {
        let registry = registry();
        let buffer = SharedBuffer::allocate("double_release", &[4096], 4096).unwrap();
        let handle = buffer.handle().unwrap();
        mapped(&registry, &handle);

        registry.release(&handle).unwrap();
        for _ in 0..3 {
            assert!(registry.release(&handle).unwrap_err().is_invalid_handle());
        }
        assert_eq!(registry.stats_snapshot().records_destroyed, 1);
    }
}

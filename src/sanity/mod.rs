//! Sanity checks on descriptors supplied across the trust boundary
//!
//! A handle arrives from another process, so nothing it advertises is trusted
//! until the kernel's view of each descriptor agrees with it.

pub mod probe;

pub use probe::LengthProbe;

use std::os::fd::RawFd;

use crate::handle::BufferHandle;

/// Why a handle failed the sanity check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanityFailure {
    /// `is_well_formed()` returned false
    IllFormed,
    /// Non-sentinel descriptor count is not `fd_count + 1`
    FdCountMismatch { valid_fds: usize, fd_count: i32 },
    /// A client-facing region is not within a page of its advertised size
    RegionSize { index: usize, fd: RawFd, actual: u64, advertised: u64 },
    /// The metadata region is not within a page of `attr_size`
    MetadataSize { fd: RawFd, actual: u64, advertised: u64 },
}

impl std::fmt::Display for SanityFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IllFormed => write!(f, "handle is not well formed"),
            Self::FdCountMismatch { valid_fds, fd_count } => write!(
                f,
                "count of valid buffer fds ({}) does not match fd_count ({}) + 1",
                valid_fds, fd_count
            ),
            Self::RegionSize { index, fd, actual, advertised } => write!(
                f,
                "fd ({}) size ({}) is not within a page of alloc_sizes[{}] ({:#x})",
                fd, actual, index, advertised
            ),
            Self::MetadataSize { fd, actual, advertised } => write!(
                f,
                "metadata fd ({}) size ({}) is not within a page of attr_size ({:#x})",
                fd, actual, advertised
            ),
        }
    }
}

/// Pure predicate over a handle's descriptors
#[derive(Debug, Clone, Copy)]
pub struct SanityChecker {
    page_size: u64,
    probe: LengthProbe,
}

impl SanityChecker {
    /// Create a checker tolerating up to `page_size` bytes of padding
    pub fn new(page_size: usize, probe: LengthProbe) -> Self {
        Self {
            page_size: page_size as u64,
            probe,
        }
    }

    /// Tolerance in bytes
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Run every check, reporting the first failure
    pub fn check(&self, handle: &BufferHandle) -> Result<(), SanityFailure> {
        if !handle.is_well_formed() {
            return Err(SanityFailure::IllFormed);
        }

        // One fd is reserved for metadata and is not counted in fd_count
        let valid_fds = handle.valid_fd_count();
        if valid_fds != handle.fd_count as usize + 1 {
            return Err(SanityFailure::FdCountMismatch {
                valid_fds,
                fd_count: handle.fd_count,
            });
        }

        for (index, &fd) in handle.region_fds().iter().enumerate() {
            let advertised = handle.alloc_sizes[index];
            if let Some(actual) = self.out_of_range(fd, advertised) {
                return Err(SanityFailure::RegionSize { index, fd, actual, advertised });
            }
        }

        let fd = handle.share_attr_fd();
        if let Some(actual) = self.out_of_range(fd, handle.attr_size) {
            return Err(SanityFailure::MetadataSize {
                fd,
                actual,
                advertised: handle.attr_size,
            });
        }

        Ok(())
    }

    /// Convenience wrapper returning a plain bool
    pub fn is_sane(&self, handle: &BufferHandle) -> bool {
        self.check(handle).is_ok()
    }

    /// Actual length when it is known and outside `[advertised, advertised + page]`
    fn out_of_range(&self, fd: RawFd, advertised: u64) -> Option<u64> {
        let actual = self.probe.length(fd)?;
        let within = actual
            .checked_sub(advertised)
            .map_or(false, |padding| padding <= self.page_size);
        (!within).then_some(actual)
    }
}

impl Default for SanityChecker {
    fn default() -> Self {
        Self::new(crate::limits::PAGE_SIZE, LengthProbe::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{handle::SharedBuffer, limits::FD_SENTINEL};

    fn checker() -> SanityChecker {
        SanityChecker::new(4096, LengthProbe::Auto)
    }

    #[test]
    fn test_exact_sizes_pass() {
        let buffer = SharedBuffer::allocate("sanity_exact", &[4096, 8192], 4096).unwrap();
        let handle = buffer.handle().unwrap();
        assert_eq!(checker().check(&handle), Ok(()));
    }

    #[test]
    fn test_padding_up_to_one_page_passes() {
        let buffer = SharedBuffer::allocate("sanity_pad", &[4096], 4096).unwrap();
        buffer.set_region_len(0, 8192).unwrap();
        let handle = buffer.handle().unwrap();
        assert!(checker().is_sane(&handle));
    }

    #[test]
    fn test_over_report_rejected() {
        let buffer = SharedBuffer::allocate("sanity_over", &[4096], 4096).unwrap();
        buffer.set_region_len(0, 16384).unwrap();
        let handle = buffer.handle().unwrap();
        assert!(matches!(
            checker().check(&handle),
            Err(SanityFailure::RegionSize { index: 0, actual: 16384, advertised: 4096, .. })
        ));
    }

    #[test]
    fn test_under_report_rejected() {
        let buffer = SharedBuffer::allocate("sanity_under", &[4096], 4096).unwrap();
        buffer.set_region_len(0, 4095).unwrap();
        let handle = buffer.handle().unwrap();
        assert!(matches!(
            checker().check(&handle),
            Err(SanityFailure::RegionSize { actual: 4095, .. })
        ));
    }

    #[test]
    fn test_metadata_size_checked() {
        let buffer = SharedBuffer::allocate("sanity_attr", &[4096], 4096).unwrap();
        buffer.set_attr_len(3 * 4096).unwrap();
        let handle = buffer.handle().unwrap();
        assert!(matches!(
            checker().check(&handle),
            Err(SanityFailure::MetadataSize { actual: 12288, .. })
        ));
    }

    #[test]
    fn test_fd_count_mismatch() {
        let buffer = SharedBuffer::allocate("sanity_count", &[4096, 4096], 4096).unwrap();
        let mut handle = buffer.handle().unwrap();
        handle.fds[2] = FD_SENTINEL;
        assert!(matches!(
            checker().check(&handle),
            Err(SanityFailure::FdCountMismatch { valid_fds: 2, fd_count: 2 })
        ));
    }

    #[test]
    fn test_ill_formed_rejected_first() {
        let buffer = SharedBuffer::allocate("sanity_magic", &[4096], 4096).unwrap();
        let mut handle = buffer.handle().unwrap();
        handle.magic ^= 1;
        assert_eq!(checker().check(&handle), Err(SanityFailure::IllFormed));
    }

    #[test]
    fn test_unknown_length_accepted() {
        use std::os::fd::AsRawFd;

        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        let handle =
            BufferHandle::new(&[read_end.as_raw_fd()], &[4096], write_end.as_raw_fd(), 4096)
                .unwrap();
        assert!(checker().is_sane(&handle));
    }

    #[test]
    fn test_failure_display_names_fd() {
        let failure = SanityFailure::RegionSize { index: 1, fd: 9, actual: 1, advertised: 4096 };
        let text = failure.to_string();
        assert!(text.contains("fd (9)"));
        assert!(text.contains("alloc_sizes[1]"));
    }
}

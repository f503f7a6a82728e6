//! Private buffer handle layout shared with allocator processes

use std::{
    ffi::c_void,
    fmt,
    mem::size_of,
    os::fd::RawFd,
    ptr::{self, NonNull},
    sync::atomic::{AtomicPtr, AtomicU64, Ordering},
};

use crate::{
    error::{RegistryError, Result},
    limits::{FD_SENTINEL, MAX_BUFFER_FDS, MAX_FDS},
};

/// Native handle header preceding the descriptor table
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeHandleHeader {
    /// Size of this header in bytes
    pub version: i32,
    /// Number of descriptor slots that follow
    pub num_fds: i32,
    /// Number of 32-bit words following the descriptor slots
    pub num_ints: i32,
}

/// Identity of a handle: its address in this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(usize);

impl HandleId {
    /// Identity of `handle`
    pub fn of(handle: &BufferHandle) -> Self {
        Self(handle as *const BufferHandle as usize)
    }

    /// Raw address value
    pub fn addr(&self) -> usize {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Opaque buffer handle carrying shared-memory descriptors and per-process scratch
///
/// The registry identifies a handle by its address. A handle must stay in place
/// between `retain` and the final `release`; a clone or a moved value is a
/// different buffer as far as the registry is concerned.
#[repr(C)]
pub struct BufferHandle {
    /// Native handle header
    pub header: NativeHandleHeader,
    /// Descriptor slots; the non-sentinel prefix holds `fd_count` region
    /// descriptors followed by the metadata descriptor
    pub fds: [RawFd; MAX_FDS],
    /// Layout magic
    pub magic: u32,
    /// Number of client-facing regions
    pub fd_count: i32,
    /// Advertised allocated size of each client-facing region
    pub alloc_sizes: [u64; MAX_BUFFER_FDS],
    /// Advertised size of the metadata region
    pub attr_size: u64,
    /// Scratch: per-process base address of each region, zero when unmapped
    pub bases: [AtomicU64; MAX_BUFFER_FDS],
    /// Scratch: per-process base address of the metadata region, null when unmapped
    pub attr_base: AtomicPtr<c_void>,
}

impl BufferHandle {
    /// Layout magic ("GRHN")
    pub const MAGIC: u32 = 0x4752_484E;

    /// Expected header version
    pub const VERSION: i32 = size_of::<NativeHandleHeader>() as i32;

    /// Number of 32-bit words after the descriptor table
    pub const NUM_INTS: i32 = ((size_of::<BufferHandle>()
        - size_of::<NativeHandleHeader>()
        - MAX_FDS * size_of::<RawFd>())
        / size_of::<u32>()) as i32;

    /// Build a well-formed handle over existing descriptors
    ///
    /// The handle borrows the descriptors; whoever owns them must keep them
    /// open for the lifetime of the handle.
    pub fn new(
        region_fds: &[RawFd],
        alloc_sizes: &[u64],
        attr_fd: RawFd,
        attr_size: u64,
    ) -> Result<Self> {
        if region_fds.len() > MAX_BUFFER_FDS {
            return Err(RegistryError::invalid_parameter(
                "region_fds",
                format!("at most {} regions are supported", MAX_BUFFER_FDS),
            ));
        }
        if region_fds.len() != alloc_sizes.len() {
            return Err(RegistryError::invalid_parameter(
                "alloc_sizes",
                "one size is required per region descriptor",
            ));
        }
        if region_fds.iter().chain(Some(&attr_fd)).any(|&fd| fd < 0) {
            return Err(RegistryError::invalid_parameter(
                "fds",
                "descriptors must be non-negative",
            ));
        }

        let mut fds = [FD_SENTINEL; MAX_FDS];
        fds[..region_fds.len()].copy_from_slice(region_fds);
        fds[region_fds.len()] = attr_fd;

        let mut sizes = [0u64; MAX_BUFFER_FDS];
        sizes[..alloc_sizes.len()].copy_from_slice(alloc_sizes);

        Ok(Self {
            header: NativeHandleHeader {
                version: Self::VERSION,
                num_fds: MAX_FDS as i32,
                num_ints: Self::NUM_INTS,
            },
            fds,
            magic: Self::MAGIC,
            fd_count: region_fds.len() as i32,
            alloc_sizes: sizes,
            attr_size,
            bases: Default::default(),
            attr_base: AtomicPtr::new(ptr::null_mut()),
        })
    }

    /// Registry identity of this handle
    pub fn id(&self) -> HandleId {
        HandleId::of(self)
    }

    /// Self-consistency of header, magic and internal counts
    pub fn is_well_formed(&self) -> bool {
        self.header.version == Self::VERSION
            && self.magic == Self::MAGIC
            && self.header.num_fds == MAX_FDS as i32
            && self.header.num_ints == Self::NUM_INTS
            && self.fd_count >= 0
            && self.fd_count as usize <= MAX_BUFFER_FDS
    }

    /// Number of client-facing regions, clamped to the slot count
    pub fn region_count(&self) -> usize {
        (self.fd_count.max(0) as usize).min(MAX_BUFFER_FDS)
    }

    /// Descriptors of the client-facing regions
    pub fn region_fds(&self) -> &[RawFd] {
        &self.fds[..self.region_count()]
    }

    /// Descriptor of the metadata region
    pub fn share_attr_fd(&self) -> RawFd {
        self.fds
            .get(self.region_count())
            .copied()
            .unwrap_or(FD_SENTINEL)
    }

    /// Length of the non-sentinel descriptor prefix
    pub fn valid_fd_count(&self) -> usize {
        self.fds
            .iter()
            .position(|&fd| fd == FD_SENTINEL)
            .unwrap_or(MAX_FDS)
    }

    /// Scratch base address of region `index` (zero when unmapped)
    pub fn base(&self, index: usize) -> u64 {
        self.bases
            .get(index)
            .map(|b| b.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Snapshot of every scratch base slot
    pub fn bases_snapshot(&self) -> [u64; MAX_BUFFER_FDS] {
        std::array::from_fn(|i| self.bases[i].load(Ordering::Acquire))
    }

    /// Write the scratch base address of region `index`
    pub fn set_base(&self, index: usize, address: u64) {
        if let Some(base) = self.bases.get(index) {
            base.store(address, Ordering::Release);
        }
    }

    /// Zero every scratch base slot
    pub fn clear_bases(&self) {
        for base in &self.bases {
            base.store(0, Ordering::Release);
        }
    }

    /// Scratch base address of the metadata region
    pub fn attr_base(&self) -> Option<NonNull<c_void>> {
        NonNull::new(self.attr_base.load(Ordering::Acquire))
    }

    /// Base address of a mapped region as a byte slice
    ///
    /// The slice length is the handle's current `alloc_sizes[index]`, not a
    /// length remembered from the mapping.
    ///
    /// # Safety
    /// The handle must be mapped and stay mapped (i.e. retained) while the
    /// slice is alive, and no other code may hold a mutable view of it.
    /// `alloc_sizes[index]` must not have changed since the region was
    /// mapped; a handle that passes `validate` satisfies this.
    pub unsafe fn region_slice(&self, index: usize) -> Option<&[u8]> {
        let base = self.base(index);
        if base == 0 || index >= self.region_count() {
            return None;
        }
        Some(std::slice::from_raw_parts(
            base as *const u8,
            self.alloc_sizes[index] as usize,
        ))
    }

    /// Base address of a mapped region as a mutable byte slice
    ///
    /// # Safety
    /// Same as [`BufferHandle::region_slice`], and the caller must guarantee
    /// exclusive access to the region for the lifetime of the slice.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn region_slice_mut(&self, index: usize) -> Option<&mut [u8]> {
        let base = self.base(index);
        if base == 0 || index >= self.region_count() {
            return None;
        }
        Some(std::slice::from_raw_parts_mut(
            base as *mut u8,
            self.alloc_sizes[index] as usize,
        ))
    }
}

/// Copies the shared contract only
///
/// Scratch slots record mappings owned by one handle object, so a clone
/// starts unmapped: `bases` zeroed and `attr_base` null.
impl Clone for BufferHandle {
    fn clone(&self) -> Self {
        Self {
            header: self.header,
            fds: self.fds,
            magic: self.magic,
            fd_count: self.fd_count,
            alloc_sizes: self.alloc_sizes,
            attr_size: self.attr_size,
            bases: Default::default(),
            attr_base: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferHandle")
            .field("address", &(self as *const Self))
            .field("fds", &self.fds)
            .field("fd_count", &self.fd_count)
            .field("alloc_sizes", &self.alloc_sizes)
            .field("attr_size", &self.attr_size)
            .field("bases", &self.bases_snapshot())
            .field("attr_base", &self.attr_base.load(Ordering::Acquire))
            .finish()
    }
}

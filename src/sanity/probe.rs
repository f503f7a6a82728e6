//! Descriptor length probes

use std::os::fd::RawFd;

use nix::{
    sys::stat::{fstat, SFlag},
    unistd::{lseek, Whence},
};
use serde::{Deserialize, Serialize};

/// Strategy used to learn the byte length behind a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LengthProbe {
    /// `fstat` for regular files (memfd, tmpfs), seek probe for everything else
    #[default]
    Auto,
    /// `fstat` only; a non-regular descriptor reporting zero bytes
    /// (pipes, sockets) is unknown
    Stat,
    /// Seek to the end and back, restoring the caller's position
    Seek,
}

impl LengthProbe {
    /// Get a human-readable name for the probe
    pub fn name(&self) -> &'static str {
        match self {
            LengthProbe::Auto => "auto",
            LengthProbe::Stat => "stat",
            LengthProbe::Seek => "seek",
        }
    }

    /// Byte length of `fd`, or `None` when it cannot be determined
    pub fn length(&self, fd: RawFd) -> Option<u64> {
        match self {
            LengthProbe::Auto => match stat_length(fd) {
                Some((len, true)) => Some(len),
                _ => seek_length(fd),
            },
            LengthProbe::Stat => match stat_length(fd) {
                Some((len, regular)) if regular || len > 0 => Some(len),
                _ => None,
            },
            LengthProbe::Seek => seek_length(fd),
        }
    }
}

/// Size reported by `fstat` and whether the descriptor is a regular file
fn stat_length(fd: RawFd) -> Option<(u64, bool)> {
    let stat = fstat(fd).ok()?;
    let kind = SFlag::from_bits_truncate(stat.st_mode) & SFlag::S_IFMT;
    let len = u64::try_from(stat.st_size).ok()?;
    Some((len, kind == SFlag::S_IFREG))
}

/// Length via `lseek(SEEK_END)`; the current offset is restored before returning
fn seek_length(fd: RawFd) -> Option<u64> {
    let current = lseek(fd, 0, Whence::SeekCur).ok()?;
    let end = lseek(fd, 0, Whence::SeekEnd);
    if let Err(e) = lseek(fd, current, Whence::SeekSet) {
        log::error!("seek probe failed to restore fd {} to offset {}: {}", fd, current, e);
    }
    u64::try_from(end.ok()?).ok()
}

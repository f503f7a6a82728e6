//! Error types and handling for the buffer registry

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Error types surfaced by the buffer registry and its collaborators
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Ill-formed handle, unknown identity, failed sanity check or inconsistent state
    #[error("Invalid handle: {reason}")]
    InvalidHandle { reason: String },

    /// Failure reported by a memory mapper, passed through unchanged
    #[error("Mapper error (errno {errno}): {message}")]
    Mapper { errno: i32, message: String },

    /// I/O related errors (descriptor queries, mmap, etc.)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Platform-specific errors
    #[error("Platform error: {message}")]
    Platform { message: String },
}

impl RegistryError {
    /// Create an invalid handle error
    pub fn invalid_handle(reason: impl Into<String>) -> Self {
        Self::InvalidHandle {
            reason: reason.into(),
        }
    }

    /// Create a mapper error carrying a positive errno value
    ///
    /// The sign of `errno` is ignored. Zero, or a value with no positive
    /// counterpart, becomes `EIO` so a failure never reads as status `0`.
    pub fn mapper(errno: i32, message: impl Into<String>) -> Self {
        let errno = match errno.checked_abs() {
            Some(errno) if errno > 0 => errno,
            _ => libc::EIO,
        };
        Self::Mapper {
            errno,
            message: message.into(),
        }
    }

    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a platform error
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
        }
    }

    /// Whether this is the distinguished invalid-handle condition
    pub fn is_invalid_handle(&self) -> bool {
        matches!(self, Self::InvalidHandle { .. })
    }

    /// Negative errno status for C-style callers; never `0`
    pub fn status(&self) -> i32 {
        match self {
            Self::InvalidHandle { .. } | Self::InvalidParameter { .. } => -libc::EINVAL,
            Self::Mapper { errno, .. } if *errno > 0 => -errno,
            Self::Mapper { .. } => -libc::EIO,
            Self::Io { source, .. } => -source
                .as_ref()
                .and_then(|e| e.raw_os_error())
                .filter(|&errno| errno > 0)
                .unwrap_or(libc::EIO),
            Self::Platform { .. } => -libc::EIO,
        }
    }
}

/// Collapse an operation result into the `0` / negative errno convention
pub fn status_of(result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => e.status(),
    }
}

// Convert from common error types
impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<nix::errno::Errno> for RegistryError {
    fn from(err: nix::errno::Errno) -> Self {
        Self::from_io(std::io::Error::from(err), "System call failed")
    }
}

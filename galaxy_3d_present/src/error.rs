//! Error types for Galaxy3D presentation
//!
//! Every fallible operation returns `Result<T>`; nothing in this crate panics
//! or aborts on a device error. Errors are grouped into kinds so a frame loop
//! can tell "recreate and retry" apart from "give up".

use std::fmt;

/// Result type for Galaxy3D presentation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Galaxy3D presentation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bad input rejected before any GPU call (zero extent, frame count, null handle)
    InvalidArgument(String),

    /// Component or device context used before initialization
    NotInitialized(String),

    /// A fence wait or image acquire ran out of time (retry is safe)
    Timeout(String),

    /// The swapchain no longer matches the surface and must be recreated
    SurfaceOutOfDate(String),

    /// A GPU object could not be created
    InitializationFailed(String),

    /// Out of host or device memory
    OutOfMemory,

    /// The logical device was lost
    DeviceLost,

    /// Any other backend failure (Vulkan, etc.)
    BackendError(String),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller mistake, state unchanged
    Precondition,
    /// Timing failure, the same call may be retried
    Transient,
    /// Swapchain is stale, recreate then redo the frame
    SurfaceOutOfDate,
    /// Object allocation failed, partial work was rolled back
    ResourceCreation,
    /// Device-level failure, not recoverable here
    Fatal,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) | Error::NotInitialized(_) => ErrorKind::Precondition,
            Error::Timeout(_) => ErrorKind::Transient,
            Error::SurfaceOutOfDate(_) => ErrorKind::SurfaceOutOfDate,
            Error::InitializationFailed(_) | Error::OutOfMemory => ErrorKind::ResourceCreation,
            Error::DeviceLost | Error::BackendError(_) => ErrorKind::Fatal,
        }
    }

    /// True for errors where retrying the same call is meaningful
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// True when the swapchain must be recreated before presenting again
    pub fn is_surface_out_of_date(&self) -> bool {
        self.kind() == ErrorKind::SurfaceOutOfDate
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::NotInitialized(msg) => write!(f, "Not initialized: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::SurfaceOutOfDate(msg) => write!(f, "Surface out of date: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::DeviceLost => write!(f, "Device lost"),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Caller-side helpers for results coming out of this crate
pub trait ResultExt<T> {
    /// Log the error (if any) and abort the process
    ///
    /// This is an explicit opt-in for applications that treat any failure as
    /// unrecoverable; the library itself always propagates.
    fn or_abort(self, source: &str) -> T;
}

impl<T> ResultExt<T> for Result<T> {
    fn or_abort(self, source: &str) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                crate::engine_error!(source, "Aborting: {}", e);
                std::process::abort();
            }
        }
    }
}

// ===== ERROR MACROS =====

/// Log an ERROR message and build an `Error::BackendError` from it
///
/// # Example
///
/// ```ignore
/// let err = engine_err!("galaxy3d::vulkan", "Failed to reset fence: {:?}", e);
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::galaxy3d::Error::BackendError(message)
    }};
}

/// Log an ERROR message and return `Err(Error::BackendError)` from the enclosing function
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

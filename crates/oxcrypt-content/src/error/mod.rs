//! Error category mapping for content errors.
//!
//! Front ends speak errno. [`ErrorCategory`] is the intermediate
//! classification every engine error maps onto, and [`ErrorCategory::to_errno`]
//! turns it into the POSIX value to hand back to the kernel.

use std::io;

use crate::engine::EngineError;
use crate::fs::{ContentError, ContentErrorKind};

/// Semantic category for content errors.
///
/// # Example
///
/// ```
/// use oxcrypt_content::error::ErrorCategory;
/// use oxcrypt_content::fs::{ContentContext, ContentError};
///
/// let err = ContentError::Unsupported { flags: 0x02, context: ContentContext::new() };
/// let category = ErrorCategory::from(&err);
///
/// assert_eq!(category, ErrorCategory::NotSupported);
/// assert_eq!(category.to_errno(), libc::EOPNOTSUPP);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Resource not found (ENOENT)
    NotFound,
    /// Resource already exists (EEXIST)
    AlreadyExists,
    /// Invalid argument or broken precondition (EINVAL)
    InvalidArgument,
    /// I/O, authentication or format error (EIO)
    IoError,
    /// Out of space on the backing store (ENOSPC)
    NoSpace,
    /// Permission denied (EACCES)
    PermissionDenied,
    /// Operation not supported (EOPNOTSUPP)
    NotSupported,
    /// Unknown or released handle (EBADF)
    BadHandle,
}

impl ErrorCategory {
    /// Converts this error category to a POSIX errno value.
    #[inline]
    pub fn to_errno(self) -> i32 {
        match self {
            Self::NotFound => libc::ENOENT,
            Self::AlreadyExists => libc::EEXIST,
            Self::InvalidArgument => libc::EINVAL,
            Self::IoError => libc::EIO,
            Self::NoSpace => libc::ENOSPC,
            Self::PermissionDenied => libc::EACCES,
            Self::NotSupported => libc::EOPNOTSUPP,
            Self::BadHandle => libc::EBADF,
        }
    }

    /// Returns a human-readable name for this error category.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::InvalidArgument => "InvalidArgument",
            Self::IoError => "IoError",
            Self::NoSpace => "NoSpace",
            Self::PermissionDenied => "PermissionDenied",
            Self::NotSupported => "NotSupported",
            Self::BadHandle => "BadHandle",
        }
    }
}

impl From<&ContentError> for ErrorCategory {
    fn from(e: &ContentError) -> Self {
        match e {
            ContentError::Io { source, .. } => io_error_category(source),
            other => match other.kind() {
                // A block that fails to verify is an I/O error to the caller,
                // never zeros
                ContentErrorKind::Authentication | ContentErrorKind::Format => Self::IoError,
                ContentErrorKind::Resource => Self::IoError,
                ContentErrorKind::InvariantViolation => Self::InvalidArgument,
                ContentErrorKind::Unsupported => Self::NotSupported,
            },
        }
    }
}

impl From<ContentError> for ErrorCategory {
    fn from(e: ContentError) -> Self {
        Self::from(&e)
    }
}

impl From<&EngineError> for ErrorCategory {
    fn from(e: &EngineError) -> Self {
        match e {
            EngineError::Content(inner) => Self::from(inner.as_ref()),
            EngineError::InvalidHandle { .. } => Self::BadHandle,
            EngineError::Io { source, .. } => io_error_category(source),
            EngineError::Cipher(_) | EngineError::TaskJoin(_) => Self::IoError,
        }
    }
}

impl From<EngineError> for ErrorCategory {
    fn from(e: EngineError) -> Self {
        Self::from(&e)
    }
}

impl From<&io::Error> for ErrorCategory {
    fn from(e: &io::Error) -> Self {
        io_error_category(e)
    }
}

impl From<io::Error> for ErrorCategory {
    fn from(e: io::Error) -> Self {
        io_error_category(&e)
    }
}

/// Categorizes an I/O error based on its kind.
fn io_error_category(e: &io::Error) -> ErrorCategory {
    if e.raw_os_error() == Some(libc::ENOSPC) {
        return ErrorCategory::NoSpace;
    }
    match e.kind() {
        io::ErrorKind::NotFound => ErrorCategory::NotFound,
        io::ErrorKind::PermissionDenied => ErrorCategory::PermissionDenied,
        io::ErrorKind::AlreadyExists => ErrorCategory::AlreadyExists,
        io::ErrorKind::InvalidInput => ErrorCategory::InvalidArgument,
        io::ErrorKind::Unsupported => ErrorCategory::NotSupported,
        _ => ErrorCategory::IoError,
    }
}

/// Converts an I/O error to a POSIX errno value.
///
/// This extracts the raw OS error if available, otherwise returns `EIO`.
#[inline]
pub fn io_error_to_errno(e: &io::Error) -> i32 {
    e.raw_os_error().unwrap_or(libc::EIO)
}

/// Errno for a content error. Backing-store failures keep their OS errno.
pub fn content_error_to_errno(e: &ContentError) -> i32 {
    match e {
        ContentError::Io { source, .. } if source.raw_os_error().is_some() => {
            io_error_to_errno(source)
        }
        other => ErrorCategory::from(other).to_errno(),
    }
}

//! Error types and the normalized status convention.
//!
//! Every backend reports failures as a [`StoreError`]: the operation, the
//! path it was applied to, and the platform error number captured at the
//! point of failure. [`StoreError::code`] folds that into the signed status
//! domain (negative = error) and [`Status`] does the same for whole
//! operation results, so callers above the contract only branch on sign.

use std::fmt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;

/// Backend-independent classification of a failure.
///
/// Derived from the error number; see [`ErrorKind::from_errno`] for the
/// mapping.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller lacks permission for the operation.
    PermissionDenied,
    /// Path (or a component of it) does not exist.
    NotFound,
    /// Target already exists.
    AlreadyExists,
    /// A path component is not a directory.
    NotADirectory,
    /// Operation not valid on a directory.
    IsADirectory,
    /// Directory is not empty.
    DirectoryNotEmpty,
    /// No space (or quota) left on the device.
    NoSpace,
    /// Low-level I/O failure.
    Io,
    /// Out of descriptors, memory, or admission slots.
    ResourceExhausted,
    /// Argument rejected by the backend.
    InvalidArgument,
    /// The backend does not support the operation.
    Unsupported,
    /// Descriptor is not valid for the operation.
    BadHandle,
    /// Filesystem is mounted read-only.
    ReadOnly,
    /// Any error number without a more specific kind.
    Other,
}

impl ErrorKind {
    /// Classify a platform error number.
    pub fn from_errno(errno: Errno) -> Self {
        match errno {
            Errno::EACCES | Errno::EPERM => ErrorKind::PermissionDenied,
            Errno::ENOENT => ErrorKind::NotFound,
            Errno::EEXIST => ErrorKind::AlreadyExists,
            Errno::ENOTDIR => ErrorKind::NotADirectory,
            Errno::EISDIR => ErrorKind::IsADirectory,
            Errno::ENOTEMPTY => ErrorKind::DirectoryNotEmpty,
            Errno::ENOSPC | Errno::EDQUOT => ErrorKind::NoSpace,
            Errno::EIO => ErrorKind::Io,
            Errno::EMFILE | Errno::ENFILE | Errno::ENOMEM => ErrorKind::ResourceExhausted,
            Errno::EINVAL | Errno::ENAMETOOLONG => ErrorKind::InvalidArgument,
            // ENOTSUP and EOPNOTSUPP share a value on Linux.
            #[allow(unreachable_patterns)]
            Errno::ENOSYS | Errno::ENOTSUP | Errno::EOPNOTSUPP => ErrorKind::Unsupported,
            Errno::EBADF => ErrorKind::BadHandle,
            Errno::EROFS => ErrorKind::ReadOnly,
            _ => ErrorKind::Other,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::NotADirectory => "not a directory",
            ErrorKind::IsADirectory => "is a directory",
            ErrorKind::DirectoryNotEmpty => "directory not empty",
            ErrorKind::NoSpace => "no space left",
            ErrorKind::Io => "i/o error",
            ErrorKind::ResourceExhausted => "resource exhausted",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::Unsupported => "operation not supported",
            ErrorKind::BadHandle => "bad handle",
            ErrorKind::ReadOnly => "read-only filesystem",
            ErrorKind::Other => "other error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed storage operation.
///
/// Carries the operation name and the path involved for diagnostics; the
/// normalized code comes from the captured error number alone.
///
/// # Examples
///
/// ```rust
/// use iostore::{Errno, ErrorKind, StoreError};
///
/// let err = StoreError::new("open", "/missing", Errno::ENOENT);
/// assert_eq!(err.kind(), ErrorKind::NotFound);
/// assert_eq!(err.code(), -(Errno::ENOENT as i32));
/// assert!(err.to_string().contains("/missing"));
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed for {path}: {kind} ({errno})", kind = kind_of(.errno))]
pub struct StoreError {
    operation: &'static str,
    path: PathBuf,
    #[source]
    errno: Errno,
}

fn kind_of(errno: &Errno) -> ErrorKind {
    ErrorKind::from_errno(*errno)
}

impl StoreError {
    /// Build an error from an operation, its path, and the error number.
    pub fn new(operation: &'static str, path: impl AsRef<Path>, errno: Errno) -> Self {
        Self {
            operation,
            path: path.as_ref().to_path_buf(),
            errno,
        }
    }

    /// The error a backend returns for an operation it does not implement.
    pub fn unsupported(operation: &'static str, path: impl AsRef<Path>) -> Self {
        Self::new(operation, path, Errno::ENOTSUP)
    }

    /// Translate an `std::io::Error`, keeping its OS error number when it has one.
    pub fn from_io(
        operation: &'static str,
        path: impl AsRef<Path>,
        error: &std::io::Error,
    ) -> Self {
        let errno = match error.raw_os_error() {
            Some(raw) => Errno::from_raw(raw),
            None => match error.kind() {
                std::io::ErrorKind::NotFound => Errno::ENOENT,
                std::io::ErrorKind::PermissionDenied => Errno::EACCES,
                std::io::ErrorKind::AlreadyExists => Errno::EEXIST,
                std::io::ErrorKind::InvalidInput => Errno::EINVAL,
                std::io::ErrorKind::OutOfMemory => Errno::ENOMEM,
                std::io::ErrorKind::Unsupported => Errno::ENOTSUP,
                _ => Errno::EIO,
            },
        };
        Self::new(operation, path, errno)
    }

    /// The classified kind of this failure.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_errno(self.errno)
    }

    /// The captured platform error number.
    pub fn errno(&self) -> Errno {
        self.errno
    }

    /// The normalized status code: the negated error number, always `< 0`.
    pub fn code(&self) -> i32 {
        let raw = self.errno as i32;
        if raw > 0 { -raw } else { -(Errno::EIO as i32) }
    }

    /// The operation that failed.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// The path the operation was applied to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl From<StoreError> for std::io::Error {
    fn from(error: StoreError) -> Self {
        std::io::Error::from_raw_os_error(-error.code())
    }
}

/// Fold an operation result into the signed status domain.
///
/// Success maps to the non-negative value (0 for unit results, the count
/// or position otherwise); failure maps to [`StoreError::code`].
///
/// ```rust
/// use iostore::{Errno, Status, StoreError};
///
/// let ok: Result<usize, StoreError> = Ok(12);
/// assert_eq!(ok.status(), 12);
///
/// let err: Result<(), StoreError> = Err(StoreError::new("unlink", "/x", Errno::ENOENT));
/// assert!(err.status() < 0);
/// ```
pub trait Status {
    /// The signed status of this result.
    fn status(&self) -> i64;
}

impl Status for Result<(), StoreError> {
    fn status(&self) -> i64 {
        match self {
            Ok(()) => 0,
            Err(e) => i64::from(e.code()),
        }
    }
}

impl Status for Result<usize, StoreError> {
    fn status(&self) -> i64 {
        match self {
            Ok(n) => i64::try_from(*n).unwrap_or(i64::MAX),
            Err(e) => i64::from(e.code()),
        }
    }
}

impl Status for Result<u64, StoreError> {
    fn status(&self) -> i64 {
        match self {
            Ok(n) => i64::try_from(*n).unwrap_or(i64::MAX),
            Err(e) => i64::from(e.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display_names_operation_and_path() {
        let err = StoreError::new("rename", "/a/b", Errno::EXDEV);
        let text = err.to_string();
        assert!(text.starts_with("rename failed for /a/b"));
    }

    #[test]
    fn code_is_negated_errno() {
        let err = StoreError::new("write", "/f", Errno::ENOSPC);
        assert_eq!(err.code(), -libc::ENOSPC);
        assert_eq!(err.kind(), ErrorKind::NoSpace);
    }

    #[test]
    fn code_of_unknown_errno_is_still_negative() {
        let err = StoreError::new("read", "/f", Errno::UnknownErrno);
        assert!(err.code() < 0);
    }

    #[test]
    fn taxonomy_round_trips_for_common_failures() {
        let cases = [
            (Errno::EACCES, ErrorKind::PermissionDenied),
            (Errno::EPERM, ErrorKind::PermissionDenied),
            (Errno::ENOENT, ErrorKind::NotFound),
            (Errno::EEXIST, ErrorKind::AlreadyExists),
            (Errno::ENOTDIR, ErrorKind::NotADirectory),
            (Errno::EISDIR, ErrorKind::IsADirectory),
            (Errno::ENOSPC, ErrorKind::NoSpace),
            (Errno::EIO, ErrorKind::Io),
            (Errno::EMFILE, ErrorKind::ResourceExhausted),
            (Errno::ENOMEM, ErrorKind::ResourceExhausted),
            (Errno::EINVAL, ErrorKind::InvalidArgument),
            (Errno::ENOSYS, ErrorKind::Unsupported),
            (Errno::EBADF, ErrorKind::BadHandle),
        ];
        for (errno, kind) in cases {
            let err = StoreError::new("op", "/p", errno);
            // The normalized code maps back to the originating kind.
            let back = ErrorKind::from_errno(Errno::from_raw(-err.code()));
            assert_eq!(back, kind, "{errno:?}");
        }
    }

    #[test]
    fn unsupported_has_unsupported_kind() {
        let err = StoreError::unsupported("mknod", "/dev/x");
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn from_io_keeps_os_error() {
        let io = std::io::Error::from_raw_os_error(libc::EROFS);
        let err = StoreError::from_io("unlink", "/ro", &io);
        assert_eq!(err.kind(), ErrorKind::ReadOnly);
    }

    #[test]
    fn from_io_without_os_error_uses_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = StoreError::from_io("stat", "/gone", &io);
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn into_io_error_preserves_errno() {
        let err = StoreError::new("mkdir", "/d", Errno::EEXIST);
        let io: std::io::Error = err.into();
        assert_eq!(io.raw_os_error(), Some(libc::EEXIST));
        assert_eq!(io.kind(), std::io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn status_of_results() {
        let unit: Result<(), StoreError> = Ok(());
        assert_eq!(unit.status(), 0);

        let pos: Result<u64, StoreError> = Ok(4096);
        assert_eq!(pos.status(), 4096);

        let failed: Result<usize, StoreError> = Err(StoreError::new("read", "/f", Errno::EIO));
        assert_eq!(failed.status(), -i64::from(libc::EIO));
    }
}

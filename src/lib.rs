//! # iostore
//!
//! A uniform storage-backend contract and its reference POSIX backend.
//!
//! Upper-level code performs file, directory, and metadata operations
//! through three traits without committing to a storage technology:
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Store`] | Factory for handles plus path-level operations (stat, rename, unlink, …) |
//! | [`Handle`] | One open resource: read, write, seek, sync, truncate, map |
//! | [`DirHandle`] | One open directory stream |
//! | [`StoreError`] | Normalized failure: operation, path, error number |
//! | [`PosixStore`] | Reference backend, a direct pass-through to the kernel |
//!
//! ---
//!
//! ## Quick Start
//!
//! ```rust
//! use iostore::{OpenFlags, Permissions, PosixStore, SharedStore, Store, StoreError};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! fn copy(store: &dyn Store, from: &Path, to: &Path) -> Result<u64, StoreError> {
//!     let src = store.open(from, OpenFlags::READ, Permissions::default_file())?;
//!     let dst = store.open(to, OpenFlags::WRITE, Permissions::default_file())?;
//!     let mut buf = [0u8; 4096];
//!     let mut total = 0;
//!     loop {
//!         let n = src.pread(&mut buf, total)?;
//!         if n == 0 {
//!             break;
//!         }
//!         dst.pwrite(&buf[..n], total)?;
//!         total += n as u64;
//!     }
//!     src.close()?;
//!     dst.close()?;
//!     Ok(total)
//! }
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store: SharedStore = Arc::new(PosixStore::new());
//! std::fs::write(dir.path().join("a"), b"payload").unwrap();
//! let n = copy(store.as_ref(), &dir.path().join("a"), &dir.path().join("b")).unwrap();
//! assert_eq!(n, 7);
//! ```
//!
//! ---
//!
//! ## Error Handling
//!
//! All operations return `Result<T, StoreError>`. The error carries the
//! platform error number; [`StoreError::code`] is its negation and
//! [`StoreError::kind`] its backend-independent [`ErrorKind`]. [`Status`]
//! folds a whole result into the signed status domain:
//!
//! ```rust
//! use iostore::{ErrorKind, PosixStore, Status, Store};
//! use std::path::Path;
//!
//! let store = PosixStore::new();
//! let result = store.unlink(Path::new("/definitely/not/here"));
//! assert!(result.status() < 0);
//! assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
//! ```
//!
//! No operation retries or falls back; every failure is returned as soon as
//! it happens.
//!
//! ---
//!
//! ## Resource Pairing
//!
//! `open`, `opendir`, and `mmap` each produce an owned value whose release
//! method (`close`, `closedir`, `unmap`) consumes it, so a resource cannot
//! be released twice. A value dropped without release is released by
//! `Drop` and a warning is logged through `tracing`. [`AccountingLayer`]
//! wraps any store and reports what is still outstanding.
//!
//! ---
//!
//! ## Thread Safety
//!
//! Stores and handles are `Send + Sync` and take `&self`. Share a backend as
//! an `Arc<dyn Store>`. Positional I/O on one handle may be interleaved
//! across threads; sequential I/O shares the handle's position.
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Serialization for [`Metadata`], [`DirEntry`], [`StoreConfig`], …; JSON helpers |

// Private modules
mod accounting;
mod config;
mod error;
mod ext;
mod layer;
mod mapping;
mod posix;
mod traits;
mod types;

use std::sync::Arc;

// Public re-exports - errors
pub use error::{ErrorKind, Status, StoreError};
pub use nix::errno::Errno;

// Public re-exports - core types
pub use types::{
    AccessMode, DirEntry, FileTimes, FileType, MapFlags, Metadata, OpenFlags, Ownership,
    Permissions, Protection, StatFs, Whence,
};

// Public re-exports - contract
pub use mapping::MappedRegion;
pub use traits::{DirHandle, Handle, ReadDirIter, Store};

// Public re-exports - reference backend
pub use config::StoreConfig;
pub use posix::{PosixDirHandle, PosixHandle, PosixStore};

// Public re-exports - infrastructure
pub use accounting::{Accounted, AccountingLayer, Counter, Ledger, Outstanding, Slot};
pub use ext::StoreExt;
pub use layer::{Layer, LayerExt};

// Conditional re-exports
#[cfg(feature = "serde")]
pub use ext::{JsonError, StoreExtJson};

/// A backend chosen once and shared; every operation is one virtual call.
pub type SharedStore = Arc<dyn Store>;

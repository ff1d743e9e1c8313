//! # Backend Contract
//!
//! The three operation groups every storage backend implements.
//!
//! ```text
//! Store ──open──────▶ Handle    ──close────▶ (released)
//!       ──opendir───▶ DirHandle ──closedir─▶ (released)
//!       ──stat/rename/unlink/…  (path-only, no handle)
//! Handle ──mmap─────▶ MappedRegion ──unmap─▶ (released)
//! ```
//!
//! | Trait | Role |
//! |-------|------|
//! | [`Store`] | Factory for handles; path-level metadata and namespace operations |
//! | [`Handle`] | I/O, seek, sync, truncate, and mapping on one open resource |
//! | [`DirHandle`] | Sequential enumeration of one directory |
//!
//! ## Results
//!
//! Every operation returns `Result<_, StoreError>`. The error's
//! [`code`](crate::StoreError::code) is the normalized negative status and
//! [`Status`](crate::Status) folds a whole result into the signed domain.
//!
//! ## Pairing
//!
//! Every successful `open`, `opendir`, and `mmap` is matched by exactly one
//! release. The release methods consume their receiver, and backends
//! release in `Drop` whatever the caller forgot, so the pairing holds on
//! every exit path.
//!
//! ## Dispatch
//!
//! All three traits are object-safe. A backend is chosen once, as an
//! `Arc<dyn Store>` (see [`SharedStore`](crate::SharedStore)); every later
//! operation is a single virtual call.

mod dir_handle;
mod handle;
mod store;

pub use dir_handle::{DirHandle, ReadDirIter};
pub use handle::Handle;
pub use store::Store;

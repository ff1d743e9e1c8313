//! Operations on one open byte-addressable resource.
//!
//! # Lifecycle
//!
//! ```text
//! Store::open ──▶ Handle (active) ──▶ Handle::close ──▶ closed
//! ```
//!
//! A failed `open` produces no handle. `close` consumes the handle, so it
//! cannot be called twice and nothing can be done with a closed handle.
//! A handle dropped without `close` releases its resource in `Drop`.

use std::ffi::c_void;
use std::path::Path;
use std::ptr::NonNull;

use crate::{MapFlags, MappedRegion, Metadata, Protection, StoreError, Whence};

/// An open, seekable, readable/writable resource.
///
/// # Thread Safety
///
/// Handles are `Send + Sync` and take `&self`. Positional operations
/// ([`pread`](Handle::pread), [`pwrite`](Handle::pwrite)) do not touch the
/// current position and may be interleaved freely across threads.
/// Sequential operations ([`read`](Handle::read), [`write`](Handle::write),
/// [`lseek`](Handle::lseek)) share the position and need external
/// serialization to give predictable results.
///
/// # Example
///
/// ```rust
/// use iostore::{Handle, StoreError, Whence};
///
/// fn rewrite(handle: &dyn Handle, data: &[u8]) -> Result<(), StoreError> {
///     handle.ftruncate(0)?;
///     handle.lseek(0, Whence::Set)?;
///     let mut written = 0;
///     while written < data.len() {
///         written += handle.write(&data[written..])?;
///     }
///     handle.fsync()
/// }
/// ```
pub trait Handle: Send + Sync {
    /// The path this handle was opened from. Diagnostic only.
    fn path(&self) -> &Path;

    /// Read at the current position, advancing it. Returns 0 at end of file.
    fn read(&self, buf: &mut [u8]) -> Result<usize, StoreError>;

    /// Write at the current position, advancing it.
    fn write(&self, buf: &[u8]) -> Result<usize, StoreError>;

    /// Read at `offset` without moving the current position.
    fn pread(&self, buf: &mut [u8], offset: u64) -> Result<usize, StoreError>;

    /// Write at `offset` without moving the current position.
    fn pwrite(&self, buf: &[u8], offset: u64) -> Result<usize, StoreError>;

    /// Reposition; returns the new absolute position.
    fn lseek(&self, offset: i64, whence: Whence) -> Result<u64, StoreError>;

    /// Metadata of the open resource.
    fn fstat(&self) -> Result<Metadata, StoreError>;

    /// Force prior writes to durable storage.
    fn fsync(&self) -> Result<(), StoreError>;

    /// Resize the resource.
    fn ftruncate(&self, length: u64) -> Result<(), StoreError>;

    /// Map `len` bytes of the resource starting at `offset`.
    ///
    /// The region outlives the handle; release it with
    /// [`munmap`](Handle::munmap) or [`MappedRegion::unmap`].
    ///
    /// # Safety
    ///
    /// With [`MapFlags::FIXED`] the mapping replaces whatever occupied the
    /// hinted address. The backing resource may change the mapped bytes at
    /// any time; readers of the region must tolerate that.
    unsafe fn mmap(
        &self,
        _addr_hint: Option<NonNull<c_void>>,
        _len: usize,
        _prot: Protection,
        _flags: MapFlags,
        _offset: u64,
    ) -> Result<MappedRegion, StoreError> {
        Err(StoreError::unsupported("mmap", self.path()))
    }

    /// Release a mapping. The region carries its own length.
    fn munmap(&self, region: MappedRegion) -> Result<(), StoreError> {
        region.unmap()
    }

    /// Release the underlying resource.
    fn close(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_is_object_safe() {
        fn _check(_: &dyn Handle) {}
        fn _boxed(_: Box<dyn Handle>) {}
    }

    #[test]
    fn handle_requires_send_sync() {
        fn _assert_send_sync<T: Send + Sync + ?Sized>() {}
        _assert_send_sync::<dyn Handle>();
    }
}

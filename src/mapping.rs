//! Memory mappings established through [`Handle::mmap`](crate::Handle::mmap).

use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use nix::errno::Errno;
use tracing::{debug, warn};

use crate::StoreError;
use crate::accounting::Slot;

/// A live memory mapping.
///
/// Independent of the handle that created it: the region stays valid after
/// the handle is closed. Release it with [`unmap`](MappedRegion::unmap) (or
/// [`Handle::munmap`](crate::Handle::munmap)); a region dropped without
/// being unmapped is unmapped by `Drop`.
pub struct MappedRegion {
    addr: NonNull<c_void>,
    len: usize,
    origin: PathBuf,
    slot: Option<Slot>,
    mapped: bool,
}

// SAFETY: the region is a plain address range owned by this value; access
// to its contents goes through `unsafe` accessors whose callers uphold
// aliasing rules.
unsafe impl Send for MappedRegion {}
// SAFETY: see above; `&MappedRegion` exposes no interior mutation.
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Take ownership of a mapping of `len` bytes at `addr`.
    ///
    /// # Safety
    ///
    /// `addr` and `len` must describe a mapping returned by a successful
    /// `mmap` that nothing else will unmap.
    pub unsafe fn from_raw(addr: NonNull<c_void>, len: usize, origin: impl AsRef<Path>) -> Self {
        Self {
            addr,
            len,
            origin: origin.as_ref().to_path_buf(),
            slot: None,
            mapped: true,
        }
    }

    pub(crate) fn with_slot(mut self, slot: Slot) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Start address of the mapping.
    pub fn as_ptr(&self) -> *mut c_void {
        self.addr.as_ptr()
    }

    /// Length in bytes, as requested at map time.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` for a zero-length region.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Path of the resource backing the mapping.
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// View the mapping as bytes.
    ///
    /// # Safety
    ///
    /// The mapping must be readable, and nothing (including the backing
    /// file) may modify it while the slice is alive.
    pub unsafe fn as_slice(&self) -> &[u8] {
        // SAFETY: the range is mapped for `len` bytes; readability and
        // immutability are the caller's obligations.
        unsafe { std::slice::from_raw_parts(self.addr.as_ptr().cast::<u8>(), self.len) }
    }

    /// View the mapping as mutable bytes.
    ///
    /// # Safety
    ///
    /// The mapping must be writable and not aliased while the slice is alive.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as for `as_slice`, plus exclusive access through `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(self.addr.as_ptr().cast::<u8>(), self.len) }
    }

    /// Release the mapping.
    pub fn unmap(mut self) -> Result<(), StoreError> {
        self.mapped = false;
        self.release()
    }

    fn release(&mut self) -> Result<(), StoreError> {
        // SAFETY: `addr`/`len` came from a successful mmap and are unmapped
        // exactly once; `mapped` guards the Drop path.
        let rv = unsafe { libc::munmap(self.addr.as_ptr(), self.len) };
        self.slot = None;
        Errno::result(rv)
            .map(drop)
            .map_err(|e| StoreError::new("munmap", &self.origin, e))?;
        debug!(path = %self.origin.display(), len = self.len, "munmap");
        Ok(())
    }
}

impl fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedRegion")
            .field("addr", &self.addr)
            .field("len", &self.len)
            .field("origin", &self.origin)
            .finish()
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        if !self.mapped {
            return;
        }
        warn!(path = %self.origin.display(), len = self.len, "mapping dropped without munmap");
        if let Err(e) = self.release() {
            warn!(error = %e, "munmap during drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anonymous(len: usize) -> MappedRegion {
        // SAFETY: a fresh private anonymous mapping owned by nobody else.
        unsafe {
            let addr = libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            );
            assert_ne!(addr, libc::MAP_FAILED);
            MappedRegion::from_raw(NonNull::new(addr).unwrap(), len, "anon")
        }
    }

    #[test]
    fn region_is_writable_and_unmaps() {
        let mut region = anonymous(4096);
        assert_eq!(region.len(), 4096);
        assert!(!region.is_empty());
        unsafe {
            region.as_mut_slice()[..5].copy_from_slice(b"hello");
            assert_eq!(&region.as_slice()[..5], b"hello");
        }
        region.unmap().unwrap();
    }

    #[test]
    fn slot_is_released_on_unmap() {
        let counter = crate::accounting::Counter::new();
        let region = anonymous(4096).with_slot(counter.acquire().unwrap());
        assert_eq!(counter.live(), 1);
        region.unmap().unwrap();
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn dropped_region_releases_slot() {
        let counter = crate::accounting::Counter::new();
        let region = anonymous(4096).with_slot(counter.acquire().unwrap());
        drop(region);
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn region_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MappedRegion>();
    }
}

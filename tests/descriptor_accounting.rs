//! Process-wide descriptor accounting.
//!
//! Counting `/proc/self/fd` only works when nothing else in the process
//! opens files concurrently, so this binary holds exactly one test.

#![cfg(target_os = "linux")]

use iostore::*;
use std::path::Path;

fn open_fds() -> usize {
    std::fs::read_dir("/proc/self/fd").unwrap().count()
}

fn open_rw(store: &dyn Store, path: &Path) -> Result<Box<dyn Handle>, StoreError> {
    store.open(
        path,
        OpenFlags::READ_WRITE | OpenFlags::CREATE,
        Permissions::default_file(),
    )
}

#[test]
fn every_path_returns_descriptors_to_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let store = PosixStore::new();
    let baseline = open_fds();

    // open then close
    let handle = open_rw(&store, &dir.path().join("a")).unwrap();
    assert_eq!(open_fds(), baseline + 1);
    handle.close().unwrap();
    assert_eq!(open_fds(), baseline);

    // opendir then closedir
    let stream = store.opendir(dir.path()).unwrap();
    assert_eq!(open_fds(), baseline + 1);
    stream.closedir().unwrap();
    assert_eq!(open_fds(), baseline);

    // dropped without release
    {
        let _handle = open_rw(&store, &dir.path().join("b")).unwrap();
        let _stream = store.opendir(dir.path()).unwrap();
        assert_eq!(open_fds(), baseline + 2);
    }
    assert_eq!(open_fds(), baseline);

    // failed opens acquire nothing
    assert!(store
        .open(&dir.path().join("missing"), OpenFlags::READ, Permissions::default_file())
        .is_err());
    assert!(store.opendir(&dir.path().join("missing")).is_err());
    assert_eq!(open_fds(), baseline);

    // a mapping keeps no descriptor of its own
    let handle = open_rw(&store, &dir.path().join("mapped")).unwrap();
    handle.ftruncate(4096).unwrap();
    // SAFETY: private file, read-only view.
    let region = unsafe { handle.mmap(None, 4096, Protection::READ, MapFlags::SHARED, 0) }.unwrap();
    handle.close().unwrap();
    assert_eq!(open_fds(), baseline);
    region.unmap().unwrap();

    // The kernel open succeeds, then admission is refused: the descriptor
    // must be closed before the error is returned.
    let full = PosixStore::with_config(&StoreConfig::default().with_handle_limit(0));
    let created = dir.path().join("refused");
    let err = open_rw(&full, &created).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert_eq!(err.code(), -libc::ENOMEM);
    assert!(created.exists());
    assert_eq!(open_fds(), baseline);

    let full = PosixStore::with_config(&StoreConfig::default().with_dir_limit(0));
    let err = full.opendir(dir.path()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert_eq!(err.code(), -libc::ENOMEM);
    assert_eq!(open_fds(), baseline);

    // Releasing one slot lets the next open through.
    let one = PosixStore::with_config(&StoreConfig::default().with_handle_limit(1));
    let first = open_rw(&one, &dir.path().join("a")).unwrap();
    assert!(open_rw(&one, &dir.path().join("a")).is_err());
    assert_eq!(open_fds(), baseline + 1);
    first.close().unwrap();
    open_rw(&one, &dir.path().join("a")).unwrap().close().unwrap();
    assert_eq!(open_fds(), baseline);
}

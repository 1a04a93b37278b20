//! Content store access: existence probe and placeholder materialization.

use std::fs::{self, File};
use std::io;
use std::path::PathBuf;

use crate::error::{StoreError, StoreOp};

/// The backing store a run reconciles against.
///
/// Paths are catalog-relative and `/`-delimited.
pub trait ContentStore: Sync {
    /// `Ok(false)` for a missing file or missing parent directories.
    fn exists(&self, relative: &str) -> Result<bool, StoreError>;

    /// Create missing ancestors and a zero-filled file of exactly `size` bytes.
    /// Returns the absolute location written.
    fn materialize(&self, relative: &str, size: u64) -> Result<PathBuf, StoreError>;
}

/// A content store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Join a catalog-relative path onto the root, one segment at a time so the
    /// result uses the platform separator.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        let mut out = self.root.clone();
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            out.push(segment);
        }
        out
    }
}

impl ContentStore for FsContentStore {
    fn exists(&self, relative: &str) -> Result<bool, StoreError> {
        let target = self.resolve(relative);
        match fs::metadata(&target) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::new(StoreOp::Probe, target, err)),
        }
    }

    fn materialize(&self, relative: &str, size: u64) -> Result<PathBuf, StoreError> {
        let target = self.resolve(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| StoreError::new(StoreOp::CreateDir, parent, err))?;
        }

        let file = File::create(&target)
            .map_err(|err| StoreError::new(StoreOp::CreateFile, &target, err))?;
        file.set_len(size)
            .map_err(|err| StoreError::new(StoreOp::Extend, &target, err))?;

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_parents_read_as_absent() {
        let dir = tempdir().unwrap();
        let store = FsContentStore::new(dir.path());
        assert!(!store.exists("2023/05/01/0/abc.bin").unwrap());
    }

    #[test]
    fn materialize_creates_parents_and_sizes_file() {
        let dir = tempdir().unwrap();
        let store = FsContentStore::new(dir.path());

        let written = store.materialize("2023/05/01/0/abc.bin", 1000).unwrap();
        assert_eq!(written, dir.path().join("2023/05/01/0/abc.bin"));
        assert_eq!(fs::metadata(&written).unwrap().len(), 1000);
        assert!(store.exists("2023/05/01/0/abc.bin").unwrap());

        let bytes = fs::read(&written).unwrap();
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn materialize_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FsContentStore::new(dir.path());

        store.materialize("2023/05/01/abc.bin", 64).unwrap();
        let written = store.materialize("2023/05/01/abc.bin", 64).unwrap();
        assert_eq!(fs::metadata(&written).unwrap().len(), 64);
    }

    #[test]
    fn materialize_resets_existing_content() {
        let dir = tempdir().unwrap();
        let store = FsContentStore::new(dir.path());
        let target = dir.path().join("2023/05/01/abc.bin");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, b"stale bytes that are longer").unwrap();

        store.materialize("2023/05/01/abc.bin", 4).unwrap();
        assert_eq!(fs::read(&target).unwrap(), vec![0u8; 4]);
    }

    #[test]
    fn zero_size_placeholder() {
        let dir = tempdir().unwrap();
        let store = FsContentStore::new(dir.path());
        let written = store.materialize("2023/05/01/empty.bin", 0).unwrap();
        assert_eq!(fs::metadata(written).unwrap().len(), 0);
    }

    #[test]
    fn directory_blocked_by_file_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("2023"), b"not a directory").unwrap();
        let store = FsContentStore::new(dir.path());

        let err = store.materialize("2023/05/01/abc.bin", 10).unwrap_err();
        assert_eq!(err.op, StoreOp::CreateDir);
    }

    #[test]
    fn exists_through_a_file_is_an_error() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("2023/05")).unwrap();
        fs::write(dir.path().join("2023/05/01"), b"not a directory").unwrap();
        let store = FsContentStore::new(dir.path());

        let err = store.exists("2023/05/01/0/abc.bin").unwrap_err();
        assert_eq!(err.op, StoreOp::Probe);
        assert_eq!(err.path, dir.path().join("2023/05/01/0/abc.bin"));
    }

    #[test]
    fn resolve_ignores_empty_segments() {
        let store = FsContentStore::new("/srv/contentstore/");
        assert_eq!(
            store.resolve("2023//05/01/abc.bin"),
            PathBuf::from("/srv/contentstore/2023/05/01/abc.bin")
        );
    }
}

//! File storage seam.
//!
//! The engine touches disk only through [`FileStore`], which keeps the core
//! testable and lets an embedding shell substitute its own storage. The
//! production implementation writes atomically (tempfile + fsync + rename)
//! so a crash mid-write leaves either the old content or the new, never a
//! torn file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl StoreError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            StoreError::NotFound(path.to_path_buf())
        } else {
            StoreError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Narrow storage interface the engine depends on.
pub trait FileStore: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, StoreError>;

    /// Replace the file's entire content. Must be all-or-nothing: on error
    /// the previous content is still intact.
    fn write(&self, path: &Path, content: &str) -> Result<(), StoreError>;

    fn exists(&self, path: &Path) -> bool;
}

/// Real-filesystem store with atomic replace semantics.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskStore;

impl FileStore for DiskStore {
    fn read_to_string(&self, path: &Path) -> Result<String, StoreError> {
        fs::read_to_string(path).map_err(|e| StoreError::from_io(path, e))
    }

    fn write(&self, path: &Path, content: &str) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| StoreError::from_io(parent, e))?;
            }
        }

        atomic_write(path, content.as_bytes()).map_err(|e| StoreError::from_io(path, e))?;

        // Bump mtime so editors and watchers notice the replace.
        let now = filetime::FileTime::now();
        filetime::set_file_mtime(path, now).map_err(|e| StoreError::from_io(path, e))?;

        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Atomic file write: tempfile in the same directory, fsync, rename.
fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory")
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = DiskStore.read_to_string(&dir.path().join("absent.txt"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");

        DiskStore.write(&path, "hello\nworld\n").unwrap();
        assert!(DiskStore.exists(&path));
        assert_eq!(DiskStore.read_to_string(&path).unwrap(), "hello\nworld\n");
    }

    #[test]
    fn write_replaces_existing_content_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        fs::write(&path, "old content").unwrap();

        DiskStore.write(&path, "new content").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new content");
    }

    #[test]
    fn write_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/file.txt");

        DiskStore.write(&path, "created").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "created");
    }
}

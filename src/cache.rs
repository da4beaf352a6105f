//! Short-TTL read cache for line-split file content.
//!
//! Amortizes reads across the edits of a batch (and closely spaced batches)
//! without masking external modifications for long: entries expire after a
//! few seconds and every successful write invalidates its entry. The cache
//! is read-through and never writes storage itself. Entries carry an xxh3
//! fingerprint so an expired re-read that produces identical bytes just
//! refreshes the timestamp instead of reallocating the line buffer.

use crate::store::{FileStore, StoreError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use xxhash_rust::xxh3::xxh3_64;

/// Default entry lifetime: long enough to cover a multi-edit batch, short
/// enough that edits made by other tools are picked up promptly.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3);

/// A file's content split into lines, plus whether the original bytes ended
/// with a newline (so composition can write the file back faithfully).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub lines: Vec<String>,
    pub trailing_newline: bool,
}

impl FileSnapshot {
    pub fn from_content(content: &str) -> Self {
        Self {
            lines: content.lines().map(String::from).collect(),
            trailing_newline: content.ends_with('\n'),
        }
    }

    /// Empty buffer used when composing a file that does not exist yet.
    pub fn empty() -> Self {
        Self {
            lines: Vec::new(),
            trailing_newline: false,
        }
    }

    /// Reassemble the content string, restoring the trailing newline.
    pub fn to_content(&self) -> String {
        let mut content = self.lines.join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            content.push('\n');
        }
        content
    }
}

#[derive(Debug)]
struct CacheEntry {
    snapshot: Arc<FileSnapshot>,
    fingerprint: u64,
    cached_at: Instant,
}

/// Read-through, write-invalidate cache keyed by file path.
#[derive(Debug)]
pub struct FileCache {
    ttl: Duration,
    entries: HashMap<PathBuf, CacheEntry>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Current content for `path`, reading through to the store on a miss or
    /// an expired entry.
    pub fn get(
        &mut self,
        path: &Path,
        store: &dyn FileStore,
    ) -> Result<Arc<FileSnapshot>, StoreError> {
        if let Some(entry) = self.entries.get(path) {
            if entry.cached_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&entry.snapshot));
            }
        }

        let content = store.read_to_string(path)?;
        let fingerprint = xxh3_64(content.as_bytes());

        if let Some(entry) = self.entries.get_mut(path) {
            if entry.fingerprint == fingerprint {
                entry.cached_at = Instant::now();
                return Ok(Arc::clone(&entry.snapshot));
            }
        }

        let snapshot = Arc::new(FileSnapshot::from_content(&content));
        self.entries.insert(
            path.to_path_buf(),
            CacheEntry {
                snapshot: Arc::clone(&snapshot),
                fingerprint,
                cached_at: Instant::now(),
            },
        );
        Ok(snapshot)
    }

    /// Drop the entry for `path`. Called after every successful write.
    pub fn invalidate(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    /// Housekeeping: drop every expired entry.
    pub fn purge_expired(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.cached_at.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new()
    }
}

//! Tool-level entry point.
//!
//! The engine owns the long-lived pieces (the read cache, the per-file
//! apply locks, the file store, and an optional workspace guard) and
//! exposes the `apply_diff` contract the surrounding shell calls. Per-file
//! locking enforces at-most-one in-flight apply per file identity so two
//! batches can never compose against each other's stale line buffers;
//! applies to different files proceed independently.

use crate::applier::{ApplyOutcome, DiffApplier, ResolvedBatch};
use crate::cache::FileCache;
use crate::matcher::{ContentMatcher, MatchOptions};
use crate::request::{EditBatch, RawDiff, RequestError};
use crate::safety::{SafetyError, WorkspaceGuard};
use crate::store::{DiskStore, FileStore};
use crate::applier::ApplyError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad parameters; nothing was read or mutated.
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Safety(#[from] SafetyError),
}

/// Diff-application engine with per-file serialization.
pub struct Engine {
    store: Box<dyn FileStore>,
    cache: Mutex<FileCache>,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    guard: Option<WorkspaceGuard>,
    matcher: ContentMatcher,
}

impl Engine {
    /// Engine over the real filesystem with default thresholds.
    pub fn new() -> Self {
        Self::with_store(Box::new(DiskStore))
    }

    pub fn with_store(store: Box<dyn FileStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(FileCache::new()),
            locks: Mutex::new(HashMap::new()),
            guard: None,
            matcher: ContentMatcher::new(),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = Mutex::new(FileCache::with_ttl(ttl));
        self
    }

    pub fn with_match_options(mut self, options: MatchOptions) -> Self {
        self.matcher = ContentMatcher::with_options(options);
        self
    }

    /// Restrict every apply to paths inside the guarded workspace.
    pub fn with_workspace(mut self, guard: WorkspaceGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn workspace_root(&self) -> Option<&Path> {
        self.guard.as_ref().map(WorkspaceGuard::workspace_root)
    }

    /// Apply a batch of diffs to one file.
    ///
    /// Accepts both current (`search`/`replace`) and legacy
    /// (`originalContent`/`newContent`) field spellings. An entry with an
    /// empty search against a missing file creates the file with the
    /// replacement as its entire content. In partial-success mode,
    /// unresolvable edits are reported individually instead of aborting the
    /// batch.
    pub fn apply_diff(
        &self,
        path: impl AsRef<Path>,
        diffs: Vec<RawDiff>,
        description: Option<String>,
        partial_success: bool,
    ) -> Result<ApplyOutcome, EngineError> {
        let batch = EditBatch::from_raw(diffs, partial_success)?;
        let path = self.checked_path(path.as_ref())?;

        let file_lock = self.file_lock(&path);
        let _serialized = lock(&file_lock);

        let applier = DiffApplier::with_matcher(self.store.as_ref(), self.matcher.clone());
        let mut outcome = applier.apply(&path, &batch, &self.cache)?;
        outcome.description = description;
        Ok(outcome)
    }

    /// Resolve without writing: the approval-gate path. The returned batch
    /// carries a unified-diff preview; pass it to [`Self::commit`] once the
    /// shell has its approval decision.
    pub fn resolve_diff(
        &self,
        path: impl AsRef<Path>,
        diffs: Vec<RawDiff>,
        partial_success: bool,
    ) -> Result<ResolvedBatch, EngineError> {
        let batch = EditBatch::from_raw(diffs, partial_success)?;
        let path = self.checked_path(path.as_ref())?;

        let file_lock = self.file_lock(&path);
        let _serialized = lock(&file_lock);

        let applier = DiffApplier::with_matcher(self.store.as_ref(), self.matcher.clone());
        Ok(applier.resolve(&path, &batch, &self.cache)?)
    }

    /// Commit a previously resolved batch.
    pub fn commit(&self, resolved: &ResolvedBatch) -> Result<ApplyOutcome, EngineError> {
        let file_lock = self.file_lock(&resolved.path);
        let _serialized = lock(&file_lock);

        let applier = DiffApplier::with_matcher(self.store.as_ref(), self.matcher.clone());
        Ok(applier.commit(resolved, &self.cache)?)
    }

    /// Canonical identity for locking and caching; also the safety check
    /// when a workspace guard is configured.
    fn checked_path(&self, path: &Path) -> Result<PathBuf, EngineError> {
        match &self.guard {
            Some(guard) => Ok(guard.validate_path(path)?),
            None => Ok(crate::safety::canonical_identity(path)),
        }
    }

    fn file_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = lock(&self.locks);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

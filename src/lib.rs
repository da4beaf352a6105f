//! Linepatch: fuzzy line-oriented diff application for drifted files.
//!
//! Given a file and a batch of edits (expected fragment, replacement,
//! approximate line hint), linepatch locates each fragment even when line
//! numbers have shifted or whitespace differs, rejects batches whose edits
//! overlap, applies everything atomically (or with explicit partial-success
//! semantics), and attaches advisory warnings when an edit unbalances
//! braces, quotes, or JSON.
//!
//! # Architecture
//!
//! Matching cascades from cheap to expensive with early exit: exact →
//! whitespace-normalized → similarity scan, each step tagging the result
//! with a confidence score. The [`DiffApplier`] resolves edits by descending
//! line hint and composes highest-range-first, so no applied edit can shift
//! the lines a pending edit depends on. The [`Engine`] wraps all of it with
//! a short-TTL read cache and per-file apply locks.
//!
//! # Safety
//!
//! - Overlapping batches are rejected before any file is touched
//! - Writes are atomic (tempfile + fsync + rename)
//! - At most one apply runs per file at a time
//! - Optional workspace boundary enforcement
//! - Structural damage is warned about, never silently ignored, and never
//!   blocks the edit, since the matching delimiter often lives outside the
//!   edited region
//!
//! # Example
//!
//! ```no_run
//! use linepatch::{Engine, RawDiff};
//!
//! let engine = Engine::new();
//! let diff = RawDiff {
//!     search: Some("  return 42;".to_string()),
//!     replace: Some("  return 100;".to_string()),
//!     start_line: Some(1),
//!     ..RawDiff::default()
//! };
//!
//! match engine.apply_diff("src/answer.js", vec![diff], None, false) {
//!     Ok(outcome) => println!("{outcome}"),
//!     Err(e) => eprintln!("apply failed: {e}"),
//! }
//! ```

pub mod applier;
pub mod batch;
pub mod cache;
pub mod engine;
pub mod matcher;
pub mod request;
pub mod safety;
pub mod store;
pub mod structural;
pub mod validate;

// Re-exports
pub use applier::{ApplyError, ApplyOutcome, DiffApplier, FailedEdit, ResolvedBatch, ResolvedEdit};
pub use batch::{load_from_path, load_from_str, BatchFile, BatchFileError};
pub use cache::{FileCache, FileSnapshot, DEFAULT_CACHE_TTL};
pub use engine::{Engine, EngineError};
pub use matcher::{
    ContentMatcher, MatchCandidate, MatchOptions, MatchStrategy, AUTO_APPLY_CONFIDENCE,
    DEFAULT_MIN_CONFIDENCE, DEFAULT_SIMILARITY_THRESHOLD, NORMALIZED_CONFIDENCE,
};
pub use request::{EditBatch, EditRequest, RawDiff, RequestError, RequestIssue};
pub use safety::{SafetyError, WorkspaceGuard};
pub use store::{DiskStore, FileStore, StoreError};
pub use structural::{FileKind, StructuralValidator};
pub use validate::{ConflictError, ConflictPair, DiffValidator};

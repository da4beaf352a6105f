//! Batch orchestration: Validating → Resolving → Composing → Writing.
//!
//! The applier drives one batch against one file. Validation rejects
//! self-contradictory batches before any I/O; resolution walks edits by
//! descending line hint so an applied edit can never shift the line numbers
//! a not-yet-applied edit depends on; composition splices the line buffer
//! highest-range-first; the write is a single atomic replace of the full
//! content. Resolution and commit are split (`resolve` / `commit`) so an
//! embedding shell can show a preview and gate on approval in between;
//! the engine itself is approval-agnostic.

use crate::cache::{FileCache, FileSnapshot};
use crate::matcher::{ContentMatcher, MatchCandidate};
use crate::request::{EditBatch, EditRequest};
use crate::store::{FileStore, StoreError};
use crate::structural::{FileKind, StructuralValidator};
use crate::validate::{ConflictError, DiffValidator};
use similar::TextDiff;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("content not found near line {hint}: {fragment:?}")]
    ContentNotFound { fragment: String, hint: usize },

    #[error("resolved lines {start}-{end} overlap an edit already resolved in this batch")]
    ResolvedOverlap { start: usize, end: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An edit that could not be resolved, with the request echoed back so the
/// caller can retry with corrected input.
#[derive(Debug, Clone)]
pub struct FailedEdit {
    /// Index of the request in the submitted batch.
    pub index: usize,
    pub request: EditRequest,
    pub reason: String,
}

/// Terminal result of one apply operation.
#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    pub applied: usize,
    pub failed: Vec<FailedEdit>,
    pub warnings: Vec<String>,
    /// Caller-supplied label for the batch, echoed in the summary.
    pub description: Option<String>,
}

impl ApplyOutcome {
    pub fn is_total_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(description) = &self.description {
            write!(f, "{description}: ")?;
        }
        let total = self.applied + self.failed.len();
        if self.failed.is_empty() {
            write!(
                f,
                "applied {} edit{}",
                self.applied,
                if self.applied == 1 { "" } else { "s" }
            )?;
        } else {
            write!(f, "applied {} of {} edits", self.applied, total)?;
            for failure in &self.failed {
                write!(f, "\n  edit #{} failed: {}", failure.index, failure.reason)?;
            }
        }
        for warning in &self.warnings {
            write!(f, "\nwarning: {warning}")?;
        }
        Ok(())
    }
}

/// One request pinned to a concrete location in the original line buffer.
#[derive(Debug, Clone)]
pub struct ResolvedEdit {
    /// Index of the request in the submitted batch.
    pub index: usize,
    /// First line touched (zero-based). Insertions insert before this line.
    pub line: usize,
    /// Number of existing lines replaced; zero for insertions.
    pub delete_count: usize,
    pub replacement_lines: Vec<String>,
    /// Match diagnostics; `None` for insertions.
    pub candidate: Option<MatchCandidate>,
}

/// A fully resolved batch, ready to commit. Carries everything needed to
/// render a preview without touching the file again.
#[derive(Debug)]
pub struct ResolvedBatch {
    pub path: PathBuf,
    snapshot: Arc<FileSnapshot>,
    trailing_newline: bool,
    pub edits: Vec<ResolvedEdit>,
    pub failed: Vec<FailedEdit>,
    warnings: Vec<String>,
    pub creates_file: bool,
}

impl ResolvedBatch {
    /// True when nothing resolved successfully; committing is a no-op.
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// True when any resolved edit matched below the auto-apply bar or with
    /// issues; the surrounding shell should surface the preview first.
    pub fn requires_confirmation(&self) -> bool {
        self.edits
            .iter()
            .any(|e| e.candidate.as_ref().is_some_and(|c| c.requires_confirmation()))
    }

    /// The post-edit file content.
    pub fn composed(&self) -> FileSnapshot {
        let mut lines = self.snapshot.lines.clone();
        let mut edits: Vec<&ResolvedEdit> = self.edits.iter().collect();
        // Highest range first; on a shared start line the replacement goes
        // first so the insertion lands in front of it.
        edits.sort_by(|a, b| {
            b.line
                .cmp(&a.line)
                .then(b.delete_count.cmp(&a.delete_count))
        });

        for edit in edits {
            let end = (edit.line + edit.delete_count).min(lines.len());
            lines.splice(edit.line..end, edit.replacement_lines.iter().cloned());
        }

        FileSnapshot {
            lines,
            trailing_newline: self.trailing_newline,
        }
    }

    /// Unified-diff preview of the pending change.
    pub fn preview(&self) -> String {
        let original = self.snapshot.to_content();
        let composed = self.composed().to_content();
        let name = self.path.display().to_string();
        TextDiff::from_lines(original.as_str(), composed.as_str())
            .unified_diff()
            .context_radius(3)
            .header(&format!("a/{name}"), &format!("b/{name}"))
            .to_string()
    }
}

/// Orchestrates one batch against one file.
pub struct DiffApplier<'a> {
    store: &'a dyn FileStore,
    matcher: ContentMatcher,
}

impl<'a> DiffApplier<'a> {
    pub fn new(store: &'a dyn FileStore) -> Self {
        Self {
            store,
            matcher: ContentMatcher::new(),
        }
    }

    pub fn with_matcher(store: &'a dyn FileStore, matcher: ContentMatcher) -> Self {
        Self { store, matcher }
    }

    /// Resolve and commit in one step.
    pub fn apply(
        &self,
        path: &Path,
        batch: &EditBatch,
        cache: &Mutex<FileCache>,
    ) -> Result<ApplyOutcome, ApplyError> {
        let resolved = self.resolve(path, batch, cache)?;
        self.commit(&resolved, cache)
    }

    /// Validating + Resolving. No file mutation happens here.
    pub fn resolve(
        &self,
        path: &Path,
        batch: &EditBatch,
        cache: &Mutex<FileCache>,
    ) -> Result<ResolvedBatch, ApplyError> {
        DiffValidator::validate(&batch.edits)?;

        let exists = self.store.exists(path);
        if !exists && !batch.edits.iter().all(EditRequest::is_insertion) {
            return Err(ApplyError::FileNotFound(path.to_path_buf()));
        }

        let snapshot = if exists {
            lock_cache(cache).get(path, self.store)?
        } else {
            Arc::new(FileSnapshot::empty())
        };

        // Edits near the end of the file resolve first so nothing an earlier
        // edit does can invalidate a later hint.
        let mut order: Vec<usize> = (0..batch.edits.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse((batch.edits[i].start_hint, i)));

        let mut edits: Vec<ResolvedEdit> = Vec::new();
        let mut failed: Vec<FailedEdit> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        for index in order {
            let request = &batch.edits[index];
            match self.resolve_one(&snapshot.lines, request, index, &edits) {
                Ok(resolved) => {
                    if let Some(candidate) = &resolved.candidate {
                        if candidate.requires_confirmation() {
                            warnings.push(confirmation_warning(index, candidate));
                        }
                    }
                    edits.push(resolved);
                }
                Err(err) if batch.partial_success => {
                    failed.push(FailedEdit {
                        index,
                        request: request.clone(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        let trailing_newline = if exists {
            snapshot.trailing_newline
        } else {
            batch
                .edits
                .last()
                .map(|e| e.replacement.ends_with('\n'))
                .unwrap_or(false)
        };

        Ok(ResolvedBatch {
            path: path.to_path_buf(),
            snapshot,
            trailing_newline,
            edits,
            failed,
            warnings,
            creates_file: !exists,
        })
    }

    fn resolve_one(
        &self,
        lines: &[String],
        request: &EditRequest,
        index: usize,
        resolved_so_far: &[ResolvedEdit],
    ) -> Result<ResolvedEdit, ApplyError> {
        if request.is_insertion() {
            let line = request.start_hint.min(lines.len());
            if resolved_so_far
                .iter()
                .any(|prior| overlaps(line, 0, prior))
            {
                return Err(ApplyError::ResolvedOverlap {
                    start: line,
                    end: line,
                });
            }
            return Ok(ResolvedEdit {
                index,
                line,
                delete_count: 0,
                replacement_lines: split_fragment(&request.replacement),
                candidate: None,
            });
        }

        let candidate = self
            .matcher
            .locate(lines, &request.original, Some(request.start_hint))
            .ok_or_else(|| ApplyError::ContentNotFound {
                fragment: request.original.clone(),
                hint: request.start_hint,
            })?;

        let line = candidate.start_line;
        let delete_count = candidate.end_line - candidate.start_line + 1;

        // Hints were disjoint but the actual match landed on territory an
        // earlier edit already claimed. Refuse this edit rather than compose
        // a corrupted buffer.
        if resolved_so_far
            .iter()
            .any(|prior| overlaps(line, delete_count, prior))
        {
            return Err(ApplyError::ResolvedOverlap {
                start: line,
                end: candidate.end_line,
            });
        }

        Ok(ResolvedEdit {
            index,
            line,
            delete_count,
            replacement_lines: split_fragment(&request.replacement),
            candidate: Some(candidate),
        })
    }

    /// Composing + Writing + the advisory structural pass.
    pub fn commit(
        &self,
        resolved: &ResolvedBatch,
        cache: &Mutex<FileCache>,
    ) -> Result<ApplyOutcome, ApplyError> {
        let mut outcome = ApplyOutcome {
            applied: resolved.edits.len(),
            failed: resolved.failed.clone(),
            warnings: resolved.warnings.clone(),
            description: None,
        };

        // Nothing resolved: the file stays untouched.
        if resolved.is_empty() {
            return Ok(outcome);
        }

        let composed = resolved.composed();
        let kind = FileKind::from_path(&resolved.path);

        // Structural check over the aggregate diff, bottom edit first.
        let mut ascending: Vec<&ResolvedEdit> = resolved.edits.iter().collect();
        ascending.sort_by_key(|e| e.line);
        let before = ascending
            .iter()
            .map(|e| e.candidate.as_ref().map(|c| c.actual.as_str()).unwrap_or(""))
            .collect::<Vec<_>>()
            .join("\n");
        let after = ascending
            .iter()
            .map(|e| e.replacement_lines.join("\n"))
            .collect::<Vec<_>>()
            .join("\n");
        outcome
            .warnings
            .extend(StructuralValidator::check(&before, &after, kind));

        let content = composed.to_content();
        outcome
            .warnings
            .extend(StructuralValidator::check_file(&content, kind));

        self.store.write(&resolved.path, &content)?;
        lock_cache(cache).invalidate(&resolved.path);

        Ok(outcome)
    }
}

fn confirmation_warning(index: usize, candidate: &MatchCandidate) -> String {
    let detail = if candidate.issues.is_empty() {
        "low-confidence match".to_string()
    } else {
        candidate.issues.join("; ")
    };
    format!(
        "edit #{index} matched lines {}-{} with confidence {:.2}: {detail}",
        candidate.start_line, candidate.end_line, candidate.confidence
    )
}

fn split_fragment(fragment: &str) -> Vec<String> {
    fragment.lines().map(String::from).collect()
}

/// Whether a new range collides with an already-resolved edit. Two
/// insertions at the same point compose fine; an insertion strictly inside a
/// replaced range (or vice versa) does not.
fn overlaps(new_line: usize, new_delete: usize, prior: &ResolvedEdit) -> bool {
    match (new_delete, prior.delete_count) {
        (0, 0) => false,
        (0, prior_delete) => prior.line < new_line && new_line < prior.line + prior_delete,
        (new_delete, 0) => new_line < prior.line && prior.line < new_line + new_delete,
        (new_delete, prior_delete) => {
            new_line < prior.line + prior_delete && prior.line < new_line + new_delete
        }
    }
}

fn lock_cache(cache: &Mutex<FileCache>) -> MutexGuard<'_, FileCache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DiskStore;
    use std::fs;
    use std::path::PathBuf;

    fn setup(content: &str) -> (tempfile::TempDir, PathBuf, Mutex<FileCache>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target.rs");
        fs::write(&path, content).unwrap();
        (dir, path, Mutex::new(FileCache::new()))
    }

    fn edit(start: usize, end: usize, original: &str, replacement: &str) -> EditRequest {
        EditRequest {
            start_hint: start,
            end_hint: end,
            original: original.to_string(),
            replacement: replacement.to_string(),
            description: None,
        }
    }

    #[test]
    fn exact_replacement_applies() {
        let (_dir, path, cache) = setup("function t(){\n  return 42;\n}");
        let applier = DiffApplier::new(&DiskStore);
        let batch = EditBatch::new(vec![edit(1, 1, "  return 42;", "  return 100;")]);

        let outcome = applier.apply(&path, &batch, &cache).unwrap();
        assert_eq!(outcome.applied, 1);
        assert!(outcome.is_total_success());
        assert!(outcome.warnings.is_empty());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "function t(){\n  return 100;\n}"
        );
    }

    #[test]
    fn exact_match_is_not_idempotent_by_design() {
        // After application the old fragment no longer exists, so
        // re-resolving the same batch must fail.
        let (_dir, path, cache) = setup("a\nb\nc\n");
        let applier = DiffApplier::new(&DiskStore);
        let batch = EditBatch::new(vec![edit(1, 1, "b", "B")]);

        applier.apply(&path, &batch, &cache).unwrap();
        let second = applier.apply(&path, &batch, &cache);
        assert!(matches!(second, Err(ApplyError::ContentNotFound { .. })));
    }

    #[test]
    fn composition_is_order_independent() {
        let content: String = (1..=12).map(|i| format!("line {i}\n")).collect();
        let first = edit(0, 0, "line 1", "line one");
        let second = edit(7, 9, "line 8\nline 9\nline 10", "middle");

        let (_dir, path_a, cache_a) = setup(&content);
        let (_dir_b, path_b, cache_b) = setup(&content);
        let applier = DiffApplier::new(&DiskStore);

        applier
            .apply(
                &path_a,
                &EditBatch::new(vec![first.clone(), second.clone()]),
                &cache_a,
            )
            .unwrap();
        applier
            .apply(&path_b, &EditBatch::new(vec![second, first]), &cache_b)
            .unwrap();

        assert_eq!(
            fs::read_to_string(&path_a).unwrap(),
            fs::read_to_string(&path_b).unwrap()
        );
        assert!(fs::read_to_string(&path_a).unwrap().contains("middle"));
    }

    #[test]
    fn overlapping_hints_reject_whole_batch() {
        let (_dir, path, cache) = setup("a\nb\nc\nd\n");
        let applier = DiffApplier::new(&DiskStore);
        let batch = EditBatch::new(vec![edit(0, 2, "a", "x"), edit(1, 1, "b", "y")]);

        let err = applier.apply(&path, &batch, &cache).unwrap_err();
        assert!(matches!(err, ApplyError::Conflict(_)));
        // File unchanged.
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb\nc\nd\n");
    }

    #[test]
    fn partial_success_applies_what_it_can() {
        let (_dir, path, cache) = setup("one\ntwo\nthree\n");
        let applier = DiffApplier::new(&DiskStore);
        let batch = EditBatch::new(vec![
            edit(0, 0, "one", "ONE"),
            edit(1, 1, "never existed", "nope"),
            edit(2, 2, "three", "THREE"),
        ])
        .with_partial_success(true);

        let outcome = applier.apply(&path, &batch, &cache).unwrap();
        assert_eq!(outcome.applied, 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].index, 1);
        assert!(outcome.failed[0].reason.contains("content not found"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "ONE\ntwo\nTHREE\n");
    }

    #[test]
    fn non_partial_batch_aborts_without_mutation() {
        let (_dir, path, cache) = setup("one\ntwo\n");
        let applier = DiffApplier::new(&DiskStore);
        let batch = EditBatch::new(vec![
            edit(0, 0, "one", "ONE"),
            edit(1, 1, "never existed", "nope"),
        ]);

        let err = applier.apply(&path, &batch, &cache).unwrap_err();
        match err {
            ApplyError::ContentNotFound { fragment, hint } => {
                assert_eq!(fragment, "never existed");
                assert_eq!(hint, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn all_edits_failing_leaves_file_untouched_even_in_partial_mode() {
        let (_dir, path, cache) = setup("one\ntwo\n");
        let applier = DiffApplier::new(&DiskStore);
        let batch =
            EditBatch::new(vec![edit(0, 0, "missing", "x")]).with_partial_success(true);

        let outcome = applier.apply(&path, &batch, &cache).unwrap();
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn structural_warning_does_not_block() {
        let (_dir, path, cache) = setup("if (x) {\n    y();\n}\ntail();\n");
        let applier = DiffApplier::new(&DiskStore);
        // Removes the closing brace.
        let batch = EditBatch::new(vec![edit(2, 2, "}", "")]);

        let outcome = applier.apply(&path, &batch, &cache).unwrap();
        assert_eq!(outcome.applied, 1);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.contains("unmatched opening brace")));
        assert_eq!(fs::read_to_string(&path).unwrap(), "if (x) {\n    y();\ntail();\n");
    }

    #[test]
    fn insertion_at_hinted_line() {
        let (_dir, path, cache) = setup("a\nc\n");
        let applier = DiffApplier::new(&DiskStore);
        let batch = EditBatch::new(vec![edit(1, 1, "", "b")]);

        let outcome = applier.apply(&path, &batch, &cache).unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn insertion_hint_clamps_to_end_of_file() {
        let (_dir, path, cache) = setup("a\n");
        let applier = DiffApplier::new(&DiskStore);
        let batch = EditBatch::new(vec![edit(99, 99, "", "z")]);

        applier.apply(&path, &batch, &cache).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nz\n");
    }

    #[test]
    fn missing_file_with_replacement_edit_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.rs");
        let cache = Mutex::new(FileCache::new());
        let applier = DiffApplier::new(&DiskStore);
        let batch = EditBatch::new(vec![edit(0, 0, "x", "y")]);

        let err = applier.apply(&path, &batch, &cache).unwrap_err();
        assert!(matches!(err, ApplyError::FileNotFound(_)));
    }

    #[test]
    fn missing_file_with_insertion_creates_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.txt");
        let cache = Mutex::new(FileCache::new());
        let applier = DiffApplier::new(&DiskStore);
        let batch = EditBatch::new(vec![edit(0, 0, "", "entire content\nof the file\n")]);

        let outcome = applier.apply(&path, &batch, &cache).unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "entire content\nof the file\n"
        );
    }

    #[test]
    fn drifted_match_overlapping_resolved_edit_fails_that_edit() {
        // Both fragments resolve to the same two lines even though the
        // hints are disjoint; the second resolution must be refused.
        let (_dir, path, cache) = setup("alpha\nbeta\ngamma\n");
        let applier = DiffApplier::new(&DiskStore);
        let batch = EditBatch::new(vec![
            edit(8, 9, "beta\ngamma", "B\nG"),
            edit(1, 2, "beta\ngamma", "b\ng"),
        ])
        .with_partial_success(true);

        let outcome = applier.apply(&path, &batch, &cache).unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.failed[0].reason.contains("overlap"));
    }

    #[test]
    fn deletion_via_empty_replacement() {
        let (_dir, path, cache) = setup("keep\ndrop me\nkeep too\n");
        let applier = DiffApplier::new(&DiskStore);
        let batch = EditBatch::new(vec![edit(1, 1, "drop me", "")]);

        applier.apply(&path, &batch, &cache).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep\nkeep too\n");
    }

    #[test]
    fn resolve_commit_split_allows_preview_before_write() {
        let (_dir, path, cache) = setup("old line\n");
        let applier = DiffApplier::new(&DiskStore);
        let batch = EditBatch::new(vec![edit(0, 0, "old line", "new line")]);

        let resolved = applier.resolve(&path, &batch, &cache).unwrap();
        let preview = resolved.preview();
        assert!(preview.contains("-old line"));
        assert!(preview.contains("+new line"));
        // Nothing written yet.
        assert_eq!(fs::read_to_string(&path).unwrap(), "old line\n");

        applier.commit(&resolved, &cache).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new line\n");
    }

    #[test]
    fn fuzzy_match_surfaces_confirmation_warning() {
        let (_dir, path, cache) = setup("function t(){\n\treturn 42;\n}");
        let applier = DiffApplier::new(&DiskStore);
        let batch = EditBatch::new(vec![edit(1, 1, "  return 42;", "  return 100;")]);

        let resolved = applier.resolve(&path, &batch, &cache).unwrap();
        assert!(resolved.requires_confirmation());

        let outcome = applier.commit(&resolved, &cache).unwrap();
        assert!(outcome.warnings.iter().any(|w| w.contains("whitespace")));
    }

    #[test]
    fn outcome_summary_reads_naturally() {
        let outcome = ApplyOutcome {
            applied: 2,
            failed: vec![FailedEdit {
                index: 1,
                request: edit(1, 1, "gone", "x"),
                reason: "content not found near line 1: \"gone\"".to_string(),
            }],
            warnings: vec!["edit changes double-quote balance in the edited region".to_string()],
            description: None,
        };

        let summary = outcome.to_string();
        assert!(summary.contains("applied 2 of 3 edits"));
        assert!(summary.contains("edit #1 failed"));
        assert!(summary.contains("warning:"));
    }
}

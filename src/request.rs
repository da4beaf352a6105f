//! Edit request types and boundary normalization.
//!
//! The wire format ([`RawDiff`]) tolerates two generations of field names
//! (`search`/`replace` and the legacy `originalContent`/`newContent`).
//! Normalization converts every entry into the canonical [`EditRequest`]
//! up front, so the engine never branches on field-name presence.

use serde::Deserialize;
use std::fmt;

/// A single logical edit against one file.
///
/// Line hints are zero-based inclusive indices into the file's line buffer.
/// They seed the search; they are not trusted as ground truth. An empty
/// `original` fragment means insertion at the hinted line (or file creation
/// when the target does not exist).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRequest {
    /// First line the caller believes the fragment starts on (zero-based).
    pub start_hint: usize,
    /// Last line the caller believes the fragment covers (zero-based, inclusive).
    pub end_hint: usize,
    /// The fragment expected to exist in the file. Empty means insert.
    pub original: String,
    /// The fragment to put in its place.
    pub replacement: String,
    /// Optional human-readable label for reporting.
    pub description: Option<String>,
}

impl EditRequest {
    /// True when this request inserts new content instead of replacing.
    pub fn is_insertion(&self) -> bool {
        self.original.is_empty()
    }

    /// The hinted `[start, end]` line range.
    pub fn hint_range(&self) -> (usize, usize) {
        (self.start_hint, self.end_hint)
    }
}

/// An ordered batch of edits for exactly one target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBatch {
    pub edits: Vec<EditRequest>,
    /// When true, edits that fail to resolve are reported individually and
    /// the rest of the batch still applies.
    pub partial_success: bool,
}

impl EditBatch {
    pub fn new(edits: Vec<EditRequest>) -> Self {
        Self {
            edits,
            partial_success: false,
        }
    }

    pub fn with_partial_success(mut self, allowed: bool) -> Self {
        self.partial_success = allowed;
        self
    }

    /// Normalize a slice of wire-format diffs into a canonical batch.
    ///
    /// Collects every issue across the batch instead of stopping at the
    /// first, so the caller can fix the whole request at once.
    pub fn from_raw(diffs: Vec<RawDiff>, partial_success: bool) -> Result<Self, RequestError> {
        let mut edits = Vec::with_capacity(diffs.len());
        let mut issues = Vec::new();

        for (index, raw) in diffs.into_iter().enumerate() {
            match raw.into_request(index) {
                Ok(edit) => edits.push(edit),
                Err(mut batch_issues) => issues.append(&mut batch_issues),
            }
        }

        if issues.is_empty() {
            Ok(Self {
                edits,
                partial_success,
            })
        } else {
            Err(RequestError { issues })
        }
    }
}

/// Wire-format diff entry as submitted by the surrounding shell.
///
/// `search` also deserializes from `originalContent`, `replace` from
/// `newContent`, and the hints from `startLine`/`endLine`, for backward
/// compatibility with the older tool schema.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDiff {
    #[serde(default, alias = "originalContent")]
    pub search: Option<String>,
    #[serde(default, alias = "newContent")]
    pub replace: Option<String>,
    #[serde(default, alias = "startLine")]
    pub start_line: Option<usize>,
    #[serde(default, alias = "endLine")]
    pub end_line: Option<usize>,
    #[serde(default)]
    pub description: Option<String>,
}

impl RawDiff {
    /// Convert to the canonical form, reporting every issue found.
    fn into_request(self, index: usize) -> Result<EditRequest, Vec<RequestIssue>> {
        let mut issues = Vec::new();

        if self.search.is_none() {
            issues.push(RequestIssue::MissingParameter {
                index,
                field: "search/originalContent",
            });
        }
        if self.replace.is_none() {
            issues.push(RequestIssue::MissingParameter {
                index,
                field: "replace/newContent",
            });
        }

        let original = self.search.unwrap_or_default();
        let replacement = self.replace.unwrap_or_default();

        let start_hint = self.start_line.unwrap_or(0);
        // Default the end hint to cover the fragment's own line count.
        let end_hint = self.end_line.unwrap_or_else(|| {
            start_hint + original.lines().count().saturating_sub(1)
        });

        if end_hint < start_hint {
            issues.push(RequestIssue::InvalidRange {
                index,
                start: start_hint,
                end: end_hint,
            });
        }

        if !issues.is_empty() {
            return Err(issues);
        }

        Ok(EditRequest {
            start_hint,
            end_hint,
            original,
            replacement,
            description: self.description,
        })
    }
}

/// Validation failure for a submitted batch. Always fatal; nothing was read
/// or mutated when this is returned.
#[derive(Debug, Clone)]
pub struct RequestError {
    pub issues: Vec<RequestIssue>,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RequestError {}

#[derive(Debug, Clone)]
pub enum RequestIssue {
    MissingParameter { index: usize, field: &'static str },
    InvalidRange { index: usize, start: usize, end: usize },
}

impl fmt::Display for RequestIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIssue::MissingParameter { index, field } => {
                write!(
                    f,
                    "diff #{index} missing required parameters: no '{field}' provided"
                )
            }
            RequestIssue::InvalidRange { index, start, end } => {
                write!(
                    f,
                    "diff #{index} has an invalid line range: end {end} is before start {start}"
                )
            }
        }
    }
}

use crate::request::RawDiff;
use serde::Deserialize;
use std::fmt;

/// A TOML batch file: one target file plus its ordered edits.
///
/// ```toml
/// [meta]
/// name = "rename-handler"
/// file = "src/handler.rs"
/// partial_success = true
///
/// [[edits]]
/// search = "fn old_name("
/// replace = "fn new_name("
/// start_line = 42
/// ```
#[derive(Debug, Deserialize, Default, Clone)]
pub struct BatchFile {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub edits: Vec<RawDiff>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Meta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Target file, resolved against the workspace root.
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub partial_success: bool,
}

impl BatchFile {
    /// Structural validation collecting every issue at once, so a batch file
    /// with several mistakes is fixable in a single pass.
    pub fn validate(&self) -> Result<(), BatchValidationError> {
        let mut issues = Vec::new();

        if self.meta.file.trim().is_empty() {
            issues.push(BatchIssue::MissingTargetFile);
        }
        if self.edits.is_empty() {
            issues.push(BatchIssue::EmptyEditList);
        }

        for (index, edit) in self.edits.iter().enumerate() {
            if edit.search.is_none() {
                issues.push(BatchIssue::MissingField {
                    edit_index: index,
                    field: "search",
                });
            }
            if edit.replace.is_none() {
                issues.push(BatchIssue::MissingField {
                    edit_index: index,
                    field: "replace",
                });
            }
            if let (Some(start), Some(end)) = (edit.start_line, edit.end_line) {
                if end < start {
                    issues.push(BatchIssue::InvalidRange {
                        edit_index: index,
                        start,
                        end,
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(BatchValidationError { issues })
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchValidationError {
    pub issues: Vec<BatchIssue>,
}

impl fmt::Display for BatchValidationError {
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

impl std::error::Error for BatchValidationError {}

#[derive(Debug, Clone)]
pub enum BatchIssue {
    MissingTargetFile,
    EmptyEditList,
    MissingField {
        edit_index: usize,
        field: &'static str,
    },
    InvalidRange {
        edit_index: usize,
        start: usize,
        end: usize,
    },
}

impl fmt::Display for BatchIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchIssue::MissingTargetFile => write!(f, "batch file missing 'meta.file'"),
            BatchIssue::EmptyEditList => write!(f, "batch file contains no edits"),
            BatchIssue::MissingField { edit_index, field } => {
                write!(f, "edit #{edit_index} missing required field '{field}'")
            }
            BatchIssue::InvalidRange {
                edit_index,
                start,
                end,
            } => {
                write!(
                    f,
                    "edit #{edit_index} has an invalid line range: end {end} is before start {start}"
                )
            }
        }
    }
}

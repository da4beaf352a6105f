use crate::batch::schema::{BatchFile, BatchValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum BatchFileError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: BatchValidationError,
    },
}

impl BatchFileError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            BatchFileError::Toml { path: None, source } => BatchFileError::Toml {
                path: Some(path),
                source,
            },
            BatchFileError::Validation { path: None, source } => BatchFileError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for BatchFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchFileError::Io { path, source } => {
                write!(
                    f,
                    "failed to read batch file from {}: {}",
                    path.display(),
                    source
                )
            }
            BatchFileError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse batch file TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse batch file TOML: {}", source),
            },
            BatchFileError::Validation { path, source } => match path {
                Some(path) => write!(
                    f,
                    "invalid batch file ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "invalid batch file: {}", source),
            },
        }
    }
}

impl std::error::Error for BatchFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BatchFileError::Io { source, .. } => Some(source),
            BatchFileError::Toml { source, .. } => Some(source),
            BatchFileError::Validation { source, .. } => Some(source),
        }
    }
}

/// Parse and validate a batch file from a string.
pub fn load_from_str(content: &str) -> Result<BatchFile, BatchFileError> {
    let batch: BatchFile = toml_edit::de::from_str(content)
        .map_err(|source| BatchFileError::Toml { path: None, source })?;

    batch
        .validate()
        .map_err(|source| BatchFileError::Validation { path: None, source })?;

    Ok(batch)
}

/// Read, parse, and validate a batch file from disk.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<BatchFile, BatchFileError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| BatchFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    load_from_str(&content).map_err(|e| e.with_path(path))
}

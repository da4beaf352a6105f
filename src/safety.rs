use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Workspace safety checks to prevent editing files outside the target
/// workspace. Canonicalizes before checking so symlink and `..` escapes are
/// caught. Paths that do not exist yet (file creation) are resolved through
/// their nearest existing ancestor.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Absolute path to workspace root
    workspace_root: PathBuf,
    /// Canonical paths the engine must never write into
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("failed to canonicalize path: {0}")]
    Canonicalize(#[from] io::Error),
}

impl WorkspaceGuard {
    /// Create a guard rooted at `workspace_root` with no forbidden paths.
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        Self::with_forbidden(workspace_root, Vec::new())
    }

    /// Create a guard with explicit forbidden directories (resolved to
    /// canonical form; nonexistent entries are skipped).
    pub fn with_forbidden(
        workspace_root: impl AsRef<Path>,
        forbidden: Vec<PathBuf>,
    ) -> Result<Self, SafetyError> {
        let workspace_root = workspace_root.as_ref().canonicalize()?;
        let forbidden_paths = forbidden
            .into_iter()
            .filter_map(|p| p.canonicalize().ok())
            .collect();

        Ok(Self {
            workspace_root,
            forbidden_paths,
        })
    }

    /// Check that a path is safe to edit or create.
    ///
    /// Returns the canonicalized absolute path if safe. Canonicalization
    /// happens at validation time; callers that must close the TOCTOU window
    /// re-validate immediately before writing via [`Self::revalidate`].
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };

        let canonical = canonicalize_allowing_new(&absolute)?;
        self.check_canonical(&canonical)?;

        Ok(canonical)
    }

    /// Re-validate a previously-validated canonical path immediately before
    /// a write.
    pub fn revalidate(&self, path: &Path) -> Result<PathBuf, SafetyError> {
        let canonical = canonicalize_allowing_new(path)?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        if !canonical.starts_with(&self.workspace_root) {
            return Err(SafetyError::OutsideWorkspace {
                path: canonical.to_path_buf(),
                workspace: self.workspace_root.clone(),
            });
        }

        for forbidden in &self.forbidden_paths {
            if canonical.starts_with(forbidden) {
                return Err(SafetyError::ForbiddenPath {
                    path: canonical.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }

        Ok(())
    }

    /// Get the workspace root.
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}

/// Stable identity for a path used as a cache/lock key: canonical where
/// possible, the raw path otherwise.
pub(crate) fn canonical_identity(path: &Path) -> PathBuf {
    canonicalize_allowing_new(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Canonicalize a path that may not exist yet: resolve the nearest existing
/// ancestor and re-append the not-yet-created components lexically.
fn canonicalize_allowing_new(path: &Path) -> Result<PathBuf, io::Error> {
    if path.exists() {
        return path.canonicalize();
    }

    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();

    while !existing.exists() {
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) if !parent.as_os_str().is_empty() => {
                tail.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no existing ancestor for {}", path.display()),
                ));
            }
        }
    }

    let mut canonical = existing.canonicalize()?;
    for name in tail.iter().rev() {
        canonical.push(name);
    }
    Ok(canonical)
}

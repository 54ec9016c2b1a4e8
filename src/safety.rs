//! Workspace safety checks to prevent patching files outside the target
//! project tree.
//!
//! Patch plans name files by relative path; a typo or a symlink must never
//! let an edit land in dependency trees, build output, or the VCS store.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory names inside the workspace that must never be edited.
const FORBIDDEN_SUBDIRS: &[&str] = &["node_modules", ".git", "dist", "build", ".next"];

/// Canonicalizing guard confining edits to a workspace root.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Absolute path to workspace root
    workspace_root: PathBuf,
    /// Canonical paths to forbidden directories
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

// One failed validation can gate several pending edits, each of which reports
// its own copy. io::Error is not Clone, so the Canonicalize payload is
// rebuilt from its kind and message.
impl Clone for SafetyError {
    fn clone(&self) -> Self {
        match self {
            SafetyError::OutsideWorkspace { path, workspace } => SafetyError::OutsideWorkspace {
                path: path.clone(),
                workspace: workspace.clone(),
            },
            SafetyError::ForbiddenPath { path, forbidden } => SafetyError::ForbiddenPath {
                path: path.clone(),
                forbidden: forbidden.clone(),
            },
            SafetyError::Canonicalize(e) => {
                SafetyError::Canonicalize(std::io::Error::new(e.kind(), e.to_string()))
            }
        }
    }
}

impl WorkspaceGuard {
    /// Create a guard rooted at `workspace_root`.
    ///
    /// The root is canonicalized so symlinked workspaces behave consistently.
    /// Forbidden directories are the usual untouchables of a generated web
    /// project: installed dependencies, VCS internals, build output, and the
    /// global package caches under `$HOME`.
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let workspace_root = workspace_root.as_ref().canonicalize()?;

        let mut forbidden_paths = Vec::new();

        for subdir in FORBIDDEN_SUBDIRS {
            if let Ok(path) = workspace_root.join(subdir).canonicalize() {
                forbidden_paths.push(path);
            }
        }

        if let Some(home) = home::home_dir() {
            for cache in [".npm", ".yarn", ".nvm"] {
                if let Ok(path) = home.join(cache).canonicalize() {
                    forbidden_paths.push(path);
                }
            }
        }

        Ok(Self {
            workspace_root,
            forbidden_paths,
        })
    }

    /// Check that a path is safe to edit, resolving relative paths against
    /// the workspace root. Returns the canonical absolute path.
    ///
    /// Canonicalization happens at validation time. For maximum TOCTOU safety
    /// callers should [`revalidate`](Self::revalidate) immediately before the
    /// write.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };

        // Resolves symlinks and .. components
        let canonical = absolute.canonicalize()?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    /// Re-validate a previously-validated canonical path just before writing.
    pub fn revalidate(&self, path: &Path) -> Result<PathBuf, SafetyError> {
        let canonical = path.canonicalize()?;
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

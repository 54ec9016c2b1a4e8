//! Bulk token rename across a file tree.
//!
//! The batch collaborator for sweeping cosmetic renames (deprecated CSS
//! utility classes, renamed identifiers) across every file of a given
//! extension. Independent of the region core: replacements here are global
//! token substitutions, not anchored regions.
//!
//! Plain tokens are replaced on word boundaries; tokens containing brackets
//! (`min-w-[200px]` style) are replaced literally, since `[` and `]` are word
//! breaks themselves and a boundary match would misfire.

use regex::{NoExpand, Regex};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Directories never descended into during the tree walk.
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "dist", "build", ".next"];

#[derive(Error, Debug)]
pub enum RenameError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse rename map {path}: {source}")]
    Map {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("cannot build matcher for token '{token}': {source}")]
    Token {
        token: String,
        source: regex::Error,
    },

    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// One old-token to new-token substitution rule.
#[derive(Debug, Clone)]
struct RenameRule {
    from: String,
    to: String,
    matcher: Regex,
}

impl RenameRule {
    fn new(from: String, to: String) -> Result<Self, RenameError> {
        // Bracketed tokens get literal matching, plain tokens whole-word
        let source = if from.contains('[') {
            regex::escape(&from)
        } else {
            format!(r"\b{}\b", regex::escape(&from))
        };
        let matcher = Regex::new(&source).map_err(|source| RenameError::Token {
            token: from.clone(),
            source,
        })?;
        Ok(Self { from, to, matcher })
    }
}

/// An ordered set of rename rules.
#[derive(Debug, Clone)]
pub struct RenameMap {
    rules: Vec<RenameRule>,
}

impl RenameMap {
    /// Build a map from (old, new) token pairs.
    pub fn new(
        pairs: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, RenameError> {
        let rules = pairs
            .into_iter()
            .map(|(from, to)| RenameRule::new(from, to))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Load a map from a JSON object file (`{"old-token": "new-token", ...}`).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RenameError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| RenameError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let pairs: BTreeMap<String, String> =
            serde_json::from_str(&contents).map_err(|source| RenameError::Map {
                path: path.to_path_buf(),
                source,
            })?;
        Self::new(pairs)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule to a buffer, returning the rewritten buffer and the
    /// per-token replacement counts (zero counts included).
    pub fn apply(&self, content: &str) -> (String, Vec<(String, usize)>) {
        let mut buffer = content.to_string();
        let mut counts = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            let count = rule.matcher.find_iter(&buffer).count();
            counts.push((rule.from.clone(), count));
            if count > 0 {
                buffer = rule
                    .matcher
                    .replace_all(&buffer, NoExpand(&rule.to))
                    .into_owned();
            }
        }

        (buffer, counts)
    }
}

/// Replacement counts for a single modified file.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    /// Only tokens that actually matched in this file
    pub counts: Vec<(String, usize)>,
}

/// Aggregate outcome of a tree rename.
#[derive(Debug, Clone, Default)]
pub struct RenameReport {
    pub files_scanned: usize,
    pub modified: Vec<FileReport>,
    /// Per-token totals across every file, in rule order
    pub totals: Vec<(String, usize)>,
}

impl RenameReport {
    pub fn files_modified(&self) -> usize {
        self.modified.len()
    }

    pub fn total_replacements(&self) -> usize {
        self.totals.iter().map(|(_, count)| count).sum()
    }
}

/// Rename tokens across every `*.{extension}` file under `root`.
///
/// Files whose content does not change are never rewritten. With `dry_run`
/// the report is computed but nothing is written. Writes are atomic, so an
/// interrupted run leaves no half-rewritten file behind.
pub fn rename_tree(
    root: &Path,
    extension: &str,
    map: &RenameMap,
    dry_run: bool,
) -> Result<RenameReport, RenameError> {
    let mut report = RenameReport::default();

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        let name = entry.file_name().to_str().unwrap_or("");
        !(entry.file_type().is_dir() && SKIPPED_DIRS.contains(&name))
    });

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file()
            || entry.path().extension().and_then(|s| s.to_str()) != Some(extension)
        {
            continue;
        }

        report.files_scanned += 1;
        let path = entry.path();

        let content = fs::read_to_string(path).map_err(|source| RenameError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let (rewritten, counts) = map.apply(&content);

        merge_totals(&mut report.totals, &counts);

        if rewritten == content {
            continue;
        }

        if !dry_run {
            crate::edit::atomic_write(path, rewritten.as_bytes()).map_err(|e| {
                RenameError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::other(e.to_string()),
                }
            })?;
        }

        report.modified.push(FileReport {
            path: path.to_path_buf(),
            counts: counts.into_iter().filter(|(_, count)| *count > 0).collect(),
        });
    }

    Ok(report)
}

fn merge_totals(totals: &mut Vec<(String, usize)>, counts: &[(String, usize)]) {
    if totals.is_empty() {
        totals.extend_from_slice(counts);
        return;
    }
    for ((_, total), (_, count)) in totals.iter_mut().zip(counts) {
        *total += count;
    }
}

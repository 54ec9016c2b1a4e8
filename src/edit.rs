//! Verified byte-span replacement against files on disk.
//!
//! The region module decides *what* to replace; this module is the only place
//! that touches persistent storage. Every edit re-checks the text it expects
//! to find before splicing, writes atomically, and reports idempotent
//! applications instead of rewriting identical content.

use crate::region::Region;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Verification of the text an edit expects to replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of the expected text (for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check whether `text` satisfies this verification.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected) => xxh3_64(text.as_bytes()) == *expected,
        }
    }

    /// Build verification from the expected text, hashing spans over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("before-text verification failed at {file}:{byte_start}")]
    BeforeTextMismatch {
        file: PathBuf,
        byte_start: usize,
        byte_end: usize,
        found: String,
    },

    #[error("invalid byte range [{byte_start}, {byte_end}) in file of length {file_len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        file_len: usize,
    },

    #[error("overlapping edits at [{first_start}, {second_end})")]
    OverlappingEdits {
        first_start: usize,
        second_end: usize,
    },

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 validation error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("edit would create malformed UTF-8")]
    InvalidUtf8Edit,
}

/// Result of applying an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "EditResult should be checked for success/already-applied"]
pub enum EditResult {
    /// Edit was applied and the file rewritten
    Applied { file: PathBuf, bytes_changed: usize },
    /// The span already equals the new text; the file was not touched
    AlreadyApplied { file: PathBuf },
}

/// A single verified span replacement in one file.
///
/// All higher-level operations (anchor plans, bulk removals) compile down to
/// this primitive. Region location is where the intelligence lives; this type
/// only enforces that what it was told to replace is still there.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until apply() is called"]
pub struct Edit {
    pub file: PathBuf,
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// Replacement text for `[byte_start, byte_end)`
    pub new_text: String,
    /// What we expect to find at the span before applying
    pub expected_before: EditVerification,
}

impl Edit {
    /// Create an edit, deriving verification from the expected before-text.
    pub fn new(
        file: impl Into<PathBuf>,
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: &str,
    ) -> Self {
        Self {
            file: file.into(),
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before),
        }
    }

    /// Create an edit from a region located in `buffer`.
    ///
    /// Captures the current region text as the expected before-text, so the
    /// edit refuses to apply if the file changed since location.
    pub fn from_region(
        file: impl Into<PathBuf>,
        buffer: &str,
        region: Region,
        new_text: impl Into<String>,
    ) -> Result<Self, EditError> {
        if region.start > region.end
            || region.end > buffer.len()
            || !buffer.is_char_boundary(region.start)
            || !buffer.is_char_boundary(region.end)
        {
            return Err(EditError::InvalidByteRange {
                byte_start: region.start,
                byte_end: region.end,
                file_len: buffer.len(),
            });
        }
        Ok(Self::new(
            file,
            region.start,
            region.end,
            new_text,
            &buffer[region.start..region.end],
        ))
    }

    /// Validate this edit against file content, returning the current span text.
    fn validate<'a>(&self, content: &'a [u8]) -> Result<&'a str, EditError> {
        if self.byte_start > self.byte_end || self.byte_end > content.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                file_len: content.len(),
            });
        }

        let current = std::str::from_utf8(&content[self.byte_start..self.byte_end])?;

        // Already applied counts as valid
        if current == self.new_text {
            return Ok(current);
        }

        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                file: self.file.clone(),
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                found: current.to_string(),
            });
        }

        Ok(current)
    }

    /// Apply this edit to the file system atomically.
    pub fn apply(&self) -> Result<EditResult, EditError> {
        apply_to_file(&self.file, std::slice::from_ref(self)).map(|mut results| {
            results.pop().unwrap_or(EditResult::AlreadyApplied {
                file: self.file.clone(),
            })
        })
    }

    /// Apply several edits to one file in a single atomic write.
    ///
    /// Spans must not overlap. Edits are applied bottom-to-top so earlier
    /// splices never invalidate the offsets of later ones.
    pub fn apply_all(file: &Path, edits: &[Edit]) -> Result<Vec<EditResult>, EditError> {
        apply_to_file(file, edits)
    }
}

fn apply_to_file(file: &Path, edits: &[Edit]) -> Result<Vec<EditResult>, EditError> {
    if edits.is_empty() {
        return Ok(Vec::new());
    }

    let original = fs::read(file)?;

    // Sort descending by start for bottom-to-top application
    let mut ordered: Vec<(usize, &Edit)> = edits.iter().enumerate().collect();
    ordered.sort_by(|a, b| b.1.byte_start.cmp(&a.1.byte_start));

    // Validate every span against the original content before touching anything
    for (_, edit) in &ordered {
        edit.validate(&original)?;
    }

    // With descending order, the edit below must end at or before the one above starts
    for window in ordered.windows(2) {
        let (upper, lower) = (window[0].1, window[1].1);
        if lower.byte_end > upper.byte_start {
            return Err(EditError::OverlappingEdits {
                first_start: upper.byte_start,
                second_end: lower.byte_end,
            });
        }
    }

    let mut content = original;
    let mut results: Vec<Option<EditResult>> = vec![None; edits.len()];
    let mut changed = false;

    for (index, edit) in &ordered {
        let current = std::str::from_utf8(&content[edit.byte_start..edit.byte_end])?;
        if current == edit.new_text {
            results[*index] = Some(EditResult::AlreadyApplied {
                file: edit.file.clone(),
            });
            continue;
        }

        content.splice(edit.byte_start..edit.byte_end, edit.new_text.bytes());
        changed = true;
        results[*index] = Some(EditResult::Applied {
            file: edit.file.clone(),
            bytes_changed: edit.new_text.len(),
        });
    }

    if changed {
        std::str::from_utf8(&content).map_err(|_| EditError::InvalidUtf8Edit)?;
        atomic_write(file, &content)?;
        filetime::set_file_mtime(file, filetime::FileTime::now())?;
    }

    Ok(results.into_iter().flatten().collect())
}

/// Atomic file write: tempfile in the same directory + fsync + rename.
///
/// Either the full write succeeds or the original file is untouched.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    let parent = path.parent().ok_or_else(|| {
        EditError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        ))
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

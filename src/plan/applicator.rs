//! Plan applicator - turns patch definitions into verified file edits.
//!
//! Application is all-or-nothing per target file: every patch on a file is
//! located and simulated in memory, the post-conditions of every patch are
//! checked against the simulated result, and only then is anything written.
//! Any anchor miss or verification failure leaves the file byte-identical.

use crate::edit::{Edit, EditError, EditResult};
use crate::plan::schema::{AnchorSpecError, PatchDefinition, PatchPlan, StartAlign, VerifySpec};
use crate::region::{self, Anchor, Region, RegionError};
use crate::safety::{SafetyError, WorkspaceGuard};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of applying a single patch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult should be checked for success/failure"]
pub enum PatchResult {
    /// Patch was applied and the file rewritten
    Applied { file: PathBuf },
    /// The region already equals the replacement
    AlreadyApplied { file: PathBuf },
    /// Patch was not applied
    Failed { file: PathBuf, reason: String },
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::Applied { file } => write!(f, "applied to {}", file.display()),
            PatchResult::AlreadyApplied { file } => {
                write!(f, "already applied to {}", file.display())
            }
            PatchResult::Failed { file, reason } => {
                write!(f, "failed on {}: {}", file.display(), reason)
            }
        }
    }
}

/// Closest-line hint attached to a missing-anchor diagnostic, so the operator
/// can see what the buffer actually contains near the intended marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub line_number: usize,
    pub line: String,
}

/// Errors during plan application.
#[derive(Debug)]
pub enum ApplicationError {
    /// File I/O error
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Target path escapes the workspace or lands in a forbidden tree
    Safety(SafetyError),
    /// A configured anchor is missing from the buffer
    AnchorNotFound {
        file: PathBuf,
        anchor: String,
        suggestion: Option<Suggestion>,
    },
    /// Anchor configuration that survived schema validation but cannot be
    /// compiled (hand-built plans)
    InvalidAnchor { file: PathBuf, message: String },
    /// Region computation or verification error
    Region {
        file: PathBuf,
        source: RegionError,
    },
    /// Edit-level error
    Edit(EditError),
    /// The whole batch for a file failed; individual cause in `reason`
    Batch { file: PathBuf, reason: String },
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            ApplicationError::Safety(e) => write!(f, "unsafe target path: {}", e),
            ApplicationError::AnchorNotFound {
                file,
                anchor,
                suggestion,
            } => {
                write!(f, "anchor not found in {}: {}", file.display(), anchor)?;
                if let Some(s) = suggestion {
                    write!(f, " (closest line {}: {})", s.line_number, s.line.trim())?;
                }
                Ok(())
            }
            ApplicationError::InvalidAnchor { file, message } => {
                write!(f, "invalid anchor for {}: {}", file.display(), message)
            }
            ApplicationError::Region { file, source } => {
                write!(f, "region error in {}: {}", file.display(), source)
            }
            ApplicationError::Edit(e) => write!(f, "edit error: {}", e),
            ApplicationError::Batch { file, reason } => {
                write!(f, "batch failed for {}: {}", file.display(), reason)
            }
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Io { source, .. } => Some(source),
            ApplicationError::Safety(e) => Some(e),
            ApplicationError::Region { source, .. } => Some(source),
            ApplicationError::Edit(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EditError> for ApplicationError {
    fn from(e: EditError) -> Self {
        ApplicationError::Edit(e)
    }
}

/// Per-patch outcomes, in plan order.
pub type PlanReport = Vec<(String, Result<PatchResult, ApplicationError>)>;

enum Mode {
    Apply,
    Check,
}

/// Apply every patch in the plan to the workspace.
pub fn apply_plan(plan: &PatchPlan, workspace_root: &Path) -> PlanReport {
    run_plan(plan, workspace_root, Mode::Apply)
}

/// Evaluate every patch without mutating the workspace.
///
/// Result semantics mirror [`apply_plan`]: `Applied` means "would apply". All
/// edits run against a temporary copy of the target, so check and apply can
/// never disagree.
pub fn check_plan(plan: &PatchPlan, workspace_root: &Path) -> PlanReport {
    run_plan(plan, workspace_root, Mode::Check)
}

fn run_plan(plan: &PatchPlan, workspace_root: &Path, mode: Mode) -> PlanReport {
    let guard = match WorkspaceGuard::new(workspace_root) {
        Ok(guard) => guard,
        Err(e) => {
            // Without a guard nothing may be touched
            let reason = format!("workspace guard: {e}");
            return plan
                .patches
                .iter()
                .map(|patch| {
                    (
                        patch.id.clone(),
                        Ok(PatchResult::Failed {
                            file: workspace_root.join(&patch.file),
                            reason: reason.clone(),
                        }),
                    )
                })
                .collect();
        }
    };

    let mut report = Vec::with_capacity(plan.patches.len());

    for (raw_path, patches) in group_by_file(plan, workspace_root) {
        run_file_group(&guard, &raw_path, &patches, &mode, &mut report);
    }

    report
}

/// Group patches by target file, preserving plan order within each group.
fn group_by_file<'a>(
    plan: &'a PatchPlan,
    workspace_root: &Path,
) -> Vec<(PathBuf, Vec<&'a PatchDefinition>)> {
    let mut groups: Vec<(PathBuf, Vec<&PatchDefinition>)> = Vec::new();
    for patch in &plan.patches {
        let raw = if plan.meta.workspace_relative {
            workspace_root.join(&patch.file)
        } else {
            PathBuf::from(&patch.file)
        };
        match groups.iter_mut().find(|(path, _)| *path == raw) {
            Some((_, members)) => members.push(patch),
            None => groups.push((raw, vec![patch])),
        }
    }
    groups
}

/// Before and after content of one file a plan would rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePreview {
    pub file: PathBuf,
    pub before: String,
    pub after: String,
}

/// Compute the would-be content of every file the plan changes, without
/// writing anything.
///
/// Files whose patch group fails to locate or verify, and files the plan
/// leaves unchanged, are omitted; the per-patch report from [`check_plan`]
/// carries those diagnostics.
pub fn preview_plan(plan: &PatchPlan, workspace_root: &Path) -> Vec<FilePreview> {
    let guard = match WorkspaceGuard::new(workspace_root) {
        Ok(guard) => guard,
        Err(_) => return Vec::new(),
    };

    let mut previews = Vec::new();
    for (raw_path, patches) in group_by_file(plan, workspace_root) {
        let Ok(canonical) = guard.validate_path(&raw_path) else {
            continue;
        };
        let Ok(content) = fs::read_to_string(&canonical) else {
            continue;
        };

        let located: Option<Vec<(&PatchDefinition, Edit)>> = patches
            .iter()
            .map(|patch| {
                compute_edit(patch, &canonical, &content)
                    .ok()
                    .map(|edit| (*patch, edit))
            })
            .collect();
        let Some(located) = located else { continue };

        let Ok(simulated) = simulate(&content, &located) else {
            continue;
        };
        let verified = located.iter().all(|(patch, _)| {
            patch
                .verify
                .as_ref()
                .map(|v| check_verify(&simulated, v).is_ok())
                .unwrap_or(true)
        });

        if verified && simulated != content {
            previews.push(FilePreview {
                file: canonical,
                before: content,
                after: simulated,
            });
        }
    }
    previews
}

fn run_file_group(
    guard: &WorkspaceGuard,
    raw_path: &Path,
    patches: &[&PatchDefinition],
    mode: &Mode,
    report: &mut PlanReport,
) {
    if !raw_path.exists() {
        for patch in patches {
            report.push((
                patch.id.clone(),
                Err(ApplicationError::Io {
                    path: raw_path.to_path_buf(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "target file does not exist",
                    ),
                }),
            ));
        }
        return;
    }

    let canonical = match guard.validate_path(raw_path) {
        Ok(path) => path,
        Err(err) => {
            for patch in patches {
                report.push((patch.id.clone(), Err(ApplicationError::Safety(err.clone()))));
            }
            return;
        }
    };

    let content = match fs::read_to_string(&canonical) {
        Ok(content) => content,
        Err(source) => {
            let kind = source.kind();
            let msg = source.to_string();
            for patch in patches {
                report.push((
                    patch.id.clone(),
                    Err(ApplicationError::Io {
                        path: canonical.clone(),
                        source: std::io::Error::new(kind, msg.clone()),
                    }),
                ));
            }
            return;
        }
    };

    // Locate every patch before touching anything
    let outcomes: Vec<Result<Edit, ApplicationError>> = patches
        .iter()
        .map(|patch| compute_edit(patch, &canonical, &content))
        .collect();

    // A locate failure anywhere in the group leaves the file untouched
    if outcomes.iter().any(|o| o.is_err()) {
        for (patch, outcome) in patches.iter().zip(outcomes) {
            let result = match outcome {
                Err(e) => Err(e),
                Ok(_) => Ok(PatchResult::Failed {
                    file: canonical.clone(),
                    reason: "not applied: a sibling patch on this file could not be located"
                        .to_string(),
                }),
            };
            report.push((patch.id.clone(), result));
        }
        return;
    }

    let located: Vec<(&PatchDefinition, Edit)> = patches
        .iter()
        .copied()
        .zip(outcomes.into_iter().map(|o| o.expect("checked above")))
        .collect();

    // Simulate the fully-patched buffer and check every post-condition
    // against it before any byte reaches disk
    let simulated = match simulate(&content, &located) {
        Ok(buffer) => buffer,
        Err(reason) => {
            for (patch, _) in &located {
                report.push((
                    patch.id.clone(),
                    Err(ApplicationError::Batch {
                        file: canonical.clone(),
                        reason: reason.clone(),
                    }),
                ));
            }
            return;
        }
    };

    let verify_failures: Vec<(&str, RegionError)> = located
        .iter()
        .filter_map(|(patch, _)| {
            let verify = patch.verify.as_ref()?;
            check_verify(&simulated, verify)
                .err()
                .map(|e| (patch.id.as_str(), e))
        })
        .collect();

    if !verify_failures.is_empty() {
        for (patch, _) in &located {
            let own_failure = verify_failures
                .iter()
                .find(|(id, _)| *id == patch.id.as_str());
            let result = match own_failure {
                Some((_, source)) => Err(ApplicationError::Region {
                    file: canonical.clone(),
                    source: source.clone(),
                }),
                None => Ok(PatchResult::Failed {
                    file: canonical.clone(),
                    reason: "not applied: a sibling patch on this file failed verification"
                        .to_string(),
                }),
            };
            report.push((patch.id.clone(), result));
        }
        return;
    }

    // Verification holds; write (or simulate the write against a temp copy)
    let edits: Vec<Edit> = located.iter().map(|(_, edit)| edit.clone()).collect();
    let outcome = match mode {
        Mode::Apply => Edit::apply_all(&canonical, &edits),
        Mode::Check => check_against_copy(&content, &edits),
    };

    match outcome {
        Ok(results) => {
            for ((patch, _), result) in located.iter().zip(results) {
                let mapped = match result {
                    EditResult::Applied { .. } => PatchResult::Applied {
                        file: canonical.clone(),
                    },
                    EditResult::AlreadyApplied { .. } => PatchResult::AlreadyApplied {
                        file: canonical.clone(),
                    },
                };
                report.push((patch.id.clone(), Ok(mapped)));
            }
        }
        Err(e) => {
            let reason = e.to_string();
            for (patch, _) in &located {
                report.push((
                    patch.id.clone(),
                    Err(ApplicationError::Batch {
                        file: canonical.clone(),
                        reason: reason.clone(),
                    }),
                ));
            }
        }
    }
}

/// Compute the verified edit for one patch against the current file content.
fn compute_edit(
    patch: &PatchDefinition,
    file: &Path,
    content: &str,
) -> Result<Edit, ApplicationError> {
    let invalid_anchor = |e: AnchorSpecError| ApplicationError::InvalidAnchor {
        file: file.to_path_buf(),
        message: e.to_string(),
    };

    let start_anchor = patch.start.anchor.to_anchor().map_err(invalid_anchor)?;
    let end_anchor = patch.end.anchor.to_anchor().map_err(invalid_anchor)?;
    let fallback: Option<Anchor> = patch
        .end
        .fallback
        .as_ref()
        .map(|spec| spec.to_anchor())
        .transpose()
        .map_err(invalid_anchor)?;

    let mut located =
        region::locate_region(content, &start_anchor, &end_anchor, fallback.as_ref()).map_err(
            |e| match e {
                RegionError::AnchorNotFound { anchor } => anchor_not_found(file, content, anchor),
                other => ApplicationError::Region {
                    file: file.to_path_buf(),
                    source: other,
                },
            },
        )?;

    if let (Some(token), Some(depth)) = (&patch.end.close_token, patch.end.close_depth) {
        located.end = region::extend_to_balanced_close(content, located.end, token, depth)
            .ok_or_else(|| anchor_not_found(file, content, token.clone()))?;
    }

    if patch.start.align == StartAlign::LineStart {
        located.start = region::extend_to_line_start(content, located.start);
    }

    let region = Region::new(located.start, located.end);
    Ok(Edit::from_region(file, content, region, patch.replacement.clone())?)
}

fn anchor_not_found(file: &Path, content: &str, anchor: String) -> ApplicationError {
    let suggestion = region::closest_line(content, &anchor).map(|(line_number, line)| Suggestion {
        line_number,
        line,
    });
    ApplicationError::AnchorNotFound {
        file: file.to_path_buf(),
        anchor,
        suggestion,
    }
}

fn check_verify(buffer: &str, verify: &VerifySpec) -> Result<(), RegionError> {
    region::verify_patch(buffer, &verify.must_contain, &verify.must_not_contain)
}

/// Splice all located edits into an in-memory copy of the buffer,
/// bottom-to-top, without touching the file.
fn simulate(content: &str, located: &[(&PatchDefinition, Edit)]) -> Result<String, String> {
    let mut ordered: Vec<&Edit> = located.iter().map(|(_, edit)| edit).collect();
    ordered.sort_by(|a, b| b.byte_start.cmp(&a.byte_start));

    for window in ordered.windows(2) {
        let (upper, lower) = (window[0], window[1]);
        if lower.byte_end > upper.byte_start {
            return Err(format!(
                "patches define overlapping regions at [{}, {})",
                lower.byte_start, upper.byte_end
            ));
        }
    }

    let mut buffer = content.to_string();
    for edit in ordered {
        buffer = region::apply_patch(
            &buffer,
            Region::new(edit.byte_start, edit.byte_end),
            &edit.new_text,
        )
        .map_err(|e| e.to_string())?;
    }
    Ok(buffer)
}

/// Run the batch against a temporary copy of the file, preserving result
/// semantics without mutating the real target.
fn check_against_copy(content: &str, edits: &[Edit]) -> Result<Vec<EditResult>, EditError> {
    let temp_dir = tempfile::tempdir().map_err(EditError::Io)?;
    let temp_file = temp_dir.path().join("plan-check.tmp");
    fs::write(&temp_file, content).map_err(EditError::Io)?;

    let retargeted: Vec<Edit> = edits
        .iter()
        .map(|edit| {
            let mut copy = edit.clone();
            copy.file = temp_file.clone();
            copy
        })
        .collect();

    Edit::apply_all(&temp_file, &retargeted)
}

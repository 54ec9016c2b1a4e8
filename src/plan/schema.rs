//! Patch plan schema - the declarative form of an anchor-based patch.
//!
//! A plan is the configuration that replaces the hard-coded marker tables of
//! one-off fix scripts: each patch names its file, how to find the region
//! (start anchor, end anchor, optional fallback and adjustments), the
//! replacement text, and the post-conditions that must hold afterwards.

use crate::region::Anchor;
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchPlan {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// When true, patch file paths are resolved against the workspace root.
    #[serde(default = "default_workspace_relative")]
    pub workspace_relative: bool,
}

fn default_workspace_relative() -> bool {
    true
}

impl Default for Metadata {
    fn default() -> Self {
        Metadata {
            name: String::new(),
            description: None,
            workspace_relative: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    pub file: String,
    pub start: StartSpec,
    pub end: EndSpec,
    pub replacement: String,
    #[serde(default)]
    pub verify: Option<VerifySpec>,
}

/// A literal or pattern anchor as written in a plan. Exactly one of the two
/// fields must be set.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AnchorSpec {
    #[serde(default)]
    pub literal: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
}

impl AnchorSpec {
    pub fn is_well_formed(&self) -> bool {
        matches!(
            (&self.literal, &self.pattern),
            (Some(_), None) | (None, Some(_))
        )
    }

    /// Compile into an [`Anchor`]. Compilation errors surface here so both
    /// plan validation and hand-built plans that skip [`PatchPlan::validate`]
    /// reject a bad or empty spec before any file is read.
    pub fn to_anchor(&self) -> Result<Anchor, AnchorSpecError> {
        match (&self.literal, &self.pattern) {
            (Some(text), _) => Ok(Anchor::literal(text.clone())),
            (None, Some(pattern)) => {
                Anchor::pattern(pattern).map_err(AnchorSpecError::BadPattern)
            }
            (None, None) => Err(AnchorSpecError::Unspecified),
        }
    }

    fn describe(&self) -> String {
        match (&self.literal, &self.pattern) {
            (Some(text), _) => text.clone(),
            (None, Some(pattern)) => format!("/{pattern}/"),
            (None, None) => String::new(),
        }
    }
}

/// Why an [`AnchorSpec`] cannot be compiled into an anchor.
#[derive(Debug, Clone)]
pub enum AnchorSpecError {
    /// Neither `literal` nor `pattern` is set
    Unspecified,
    /// The `pattern` field does not compile
    BadPattern(regex::Error),
}

impl fmt::Display for AnchorSpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnchorSpecError::Unspecified => {
                write!(f, "anchor has neither 'literal' nor 'pattern'")
            }
            AnchorSpecError::BadPattern(e) => write!(f, "anchor pattern does not compile: {e}"),
        }
    }
}

impl std::error::Error for AnchorSpecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnchorSpecError::Unspecified => None,
            AnchorSpecError::BadPattern(e) => Some(e),
        }
    }
}

/// Where the region starts.
#[derive(Debug, Deserialize, Clone)]
pub struct StartSpec {
    #[serde(flatten)]
    pub anchor: AnchorSpec,
    /// `match` starts the region at the anchor match itself; `line-start`
    /// widens it back to the beginning of the anchor's line (to take the
    /// leading indentation with it).
    #[serde(default)]
    pub align: StartAlign,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StartAlign {
    #[default]
    Match,
    LineStart,
}

/// Where the region ends.
#[derive(Debug, Deserialize, Clone)]
pub struct EndSpec {
    #[serde(flatten)]
    pub anchor: AnchorSpec,
    /// Retried when the primary end anchor is absent.
    #[serde(default)]
    pub fallback: Option<AnchorSpec>,
    /// When set, the region extends past `close_depth` occurrences of this
    /// token after the end anchor (the skip-N-closing-tags heuristic).
    #[serde(default)]
    pub close_token: Option<String>,
    #[serde(default)]
    pub close_depth: Option<usize>,
}

/// Post-conditions checked against the patched buffer before it is persisted.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct VerifySpec {
    #[serde(default)]
    pub must_contain: Vec<String>,
    #[serde(default)]
    pub must_not_contain: Vec<String>,
}

impl PatchPlan {
    /// Validate the plan shape, collecting every issue rather than stopping
    /// at the first.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        for patch in &self.patches {
            let id = if patch.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
                None
            } else {
                Some(patch.id.clone())
            };

            if patch.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: id.clone(),
                    field: "file",
                });
            }

            for (spec, field) in [
                (&patch.start.anchor, "start"),
                (&patch.end.anchor, "end"),
            ] {
                if !spec.is_well_formed() {
                    issues.push(ValidationIssue::InvalidAnchor {
                        patch_id: id.clone(),
                        field,
                        message: "exactly one of 'literal' or 'pattern' is required".to_string(),
                    });
                } else if let Err(e) = spec.to_anchor() {
                    issues.push(ValidationIssue::InvalidAnchor {
                        patch_id: id.clone(),
                        field,
                        message: format!("bad pattern '{}': {e}", spec.describe()),
                    });
                }
            }

            if let Some(fallback) = &patch.end.fallback {
                if !fallback.is_well_formed() {
                    issues.push(ValidationIssue::InvalidAnchor {
                        patch_id: id.clone(),
                        field: "end.fallback",
                        message: "exactly one of 'literal' or 'pattern' is required".to_string(),
                    });
                } else if let Err(e) = fallback.to_anchor() {
                    issues.push(ValidationIssue::InvalidAnchor {
                        patch_id: id.clone(),
                        field: "end.fallback",
                        message: format!("bad pattern '{}': {e}", fallback.describe()),
                    });
                }
            }

            match (&patch.end.close_token, patch.end.close_depth) {
                (Some(token), Some(depth)) => {
                    if token.is_empty() {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: id.clone(),
                            message: "close_token must not be empty".to_string(),
                        });
                    }
                    if depth == 0 {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: id.clone(),
                            message: "close_depth must be at least 1".to_string(),
                        });
                    }
                }
                (None, None) => {}
                _ => {
                    issues.push(ValidationIssue::InvalidCombo {
                        patch_id: id.clone(),
                        message: "close_token and close_depth must be set together".to_string(),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
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

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    InvalidAnchor {
        patch_id: Option<String>,
        field: &'static str,
        message: String,
    },
    InvalidCombo {
        patch_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = |patch_id: &Option<String>| {
            patch_id
                .clone()
                .unwrap_or_else(|| "<unnamed>".to_string())
        };
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch plan contains no patches"),
            ValidationIssue::MissingField { patch_id, field } => {
                write!(f, "patch '{}' missing required field '{field}'", id(patch_id))
            }
            ValidationIssue::InvalidAnchor {
                patch_id,
                field,
                message,
            } => write!(
                f,
                "patch '{}' has invalid '{field}' anchor: {message}",
                id(patch_id)
            ),
            ValidationIssue::InvalidCombo { patch_id, message } => {
                write!(f, "patch '{}' has invalid configuration: {message}", id(patch_id))
            }
        }
    }
}

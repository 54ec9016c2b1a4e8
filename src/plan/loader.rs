//! Loading patch plans from TOML.
//!
//! Every failure names the plan it came from, and validation failures carry
//! the per-patch issue list, so an operator editing a plans directory can go
//! straight to the offending patch id.

use crate::plan::schema::{PatchPlan, ValidationError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("failed to read patch plan {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {plan}: {source}")]
    Parse {
        plan: String,
        #[source]
        source: toml_edit::de::Error,
    },

    #[error("{plan} failed validation:\n{source}")]
    Invalid {
        plan: String,
        #[source]
        source: ValidationError,
    },

    #[error("cannot list plan directory {}: {source}", dir.display())]
    List {
        dir: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("no .toml patch plans under {}", dir.display())]
    NoPlans { dir: PathBuf },
}

fn parse_plan(label: &str, input: &str) -> Result<PatchPlan, PlanError> {
    let plan: PatchPlan = toml_edit::de::from_str(input).map_err(|source| PlanError::Parse {
        plan: label.to_string(),
        source,
    })?;
    plan.validate().map_err(|source| PlanError::Invalid {
        plan: label.to_string(),
        source,
    })?;
    Ok(plan)
}

/// Parse and validate a plan from TOML text.
pub fn load_from_str(input: &str) -> Result<PatchPlan, PlanError> {
    parse_plan("inline plan", input)
}

/// Read, parse, and validate a plan file.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchPlan, PlanError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| PlanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_plan(&path.display().to_string(), &contents)
}

/// List the `.toml` plan files directly under `dir`, sorted by name so runs
/// are deterministic regardless of directory order.
pub fn discover_plans(dir: &Path) -> Result<Vec<PathBuf>, PlanError> {
    let mut plans = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|source| PlanError::List {
            dir: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
        {
            plans.push(entry.path().to_path_buf());
        }
    }
    plans.sort();

    if plans.is_empty() {
        return Err(PlanError::NoPlans {
            dir: dir.to_path_buf(),
        });
    }
    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::schema::StartAlign;

    #[test]
    fn load_minimal_plan() {
        let toml = r#"
[meta]
name = "fix-calculator"
workspace_relative = true

[[patches]]
id = "replace-calculator-block"
file = "App.tsx"
replacement = "<calculator/>"

[patches.start]
literal = "{/* Calculator */}"
align = "line-start"

[patches.end]
literal = "</div>"
close_token = "</div>"
close_depth = 2

[patches.end.fallback]
literal = "</section>"

[patches.verify]
must_contain = ["<calculator/>"]
must_not_contain = ["volumeBalanco"]
"#;
        let plan = load_from_str(toml).unwrap();
        assert_eq!(plan.meta.name, "fix-calculator");
        assert!(plan.meta.workspace_relative);
        assert_eq!(plan.patches.len(), 1);

        let patch = &plan.patches[0];
        assert_eq!(patch.start.align, StartAlign::LineStart);
        assert_eq!(patch.end.close_depth, Some(2));
        assert!(patch.end.fallback.is_some());
        let verify = patch.verify.as_ref().unwrap();
        assert_eq!(verify.must_not_contain, vec!["volumeBalanco".to_string()]);
    }

    #[test]
    fn pattern_anchor_roundtrip() {
        let toml = r#"
[[patches]]
id = "p"
file = "App.tsx"
replacement = ""

[patches.start]
pattern = 'id="\w+"'

[patches.end]
literal = "</div>"
"#;
        let plan = load_from_str(toml).unwrap();
        assert!(plan.patches[0].start.anchor.pattern.is_some());
    }

    #[test]
    fn invalid_toml_is_reported() {
        assert!(matches!(
            load_from_str("not [valid"),
            Err(PlanError::Parse { .. })
        ));
    }

    #[test]
    fn validation_failure_names_the_patch() {
        let toml = r#"
[[patches]]
id = "double-anchor"
file = "App.tsx"
replacement = ""

[patches.start]
literal = "a"
pattern = "b"

[patches.end]
literal = "z"
"#;
        let err = load_from_str(toml).unwrap_err();
        assert!(matches!(err, PlanError::Invalid { .. }));
        assert!(err.to_string().contains("double-anchor"));
    }

    #[test]
    fn missing_file_error_names_path() {
        let err = load_from_path("/nonexistent/patches.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/patches.toml"));
    }

    #[test]
    fn discovery_is_sorted_and_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.toml", "a.toml", "notes.md"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let plans = discover_plans(dir.path()).unwrap();
        let names: Vec<_> = plans
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.toml", "b.toml"]);
    }

    #[test]
    fn empty_directory_has_no_plans() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_plans(dir.path()),
            Err(PlanError::NoPlans { .. })
        ));
    }
}

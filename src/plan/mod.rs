//! Configuration-driven patch plans: schema, loading, and application.

pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{
    apply_plan, check_plan, preview_plan, ApplicationError, FilePreview, PatchResult, PlanReport,
    Suggestion,
};
pub use loader::{discover_plans, load_from_path, load_from_str, PlanError};
pub use schema::{
    AnchorSpec, AnchorSpecError, EndSpec, Metadata, PatchDefinition, PatchPlan, StartAlign,
    StartSpec, ValidationError, ValidationIssue, VerifySpec,
};

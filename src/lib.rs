//! Region Patcher: anchor-based region patching for generated source files.
//!
//! Locates a contiguous span of a text buffer demarcated by human-meaningful
//! anchors (comment markers, identifiers, closing-delimiter counting) and
//! replaces it with supplied text, without a grammar-aware parser for the
//! source format.
//!
//! # Architecture
//!
//! Region location is pure computation in [`region`]; every file mutation
//! compiles down to a single primitive, [`Edit`], a verified byte-span
//! replacement. Plans ([`plan`]) are the declarative configuration layer that
//! drives both.
//!
//! # Safety
//!
//! - Patching is all-or-nothing: on any anchor miss or failed verification
//!   the original file is left byte-identical
//! - Every edit verifies its expected before-text before applying
//! - Atomic file writes (tempfile + fsync + rename)
//! - Workspace boundary enforcement
//! - Idempotent operations
//!
//! # Example
//!
//! ```
//! use region_patcher::region::{apply_patch, locate_region, verify_patch, Anchor};
//!
//! let buffer = "AAA<marker>keep-this</end>BBB";
//! let region = locate_region(
//!     buffer,
//!     &Anchor::literal("<marker>"),
//!     &Anchor::literal("</end>"),
//!     None,
//! )?;
//! let patched = apply_patch(buffer, region, "<marker>new</end>")?;
//! assert_eq!(patched, "AAA<marker>new</end>BBB");
//! verify_patch(&patched, &["new".to_string()], &["keep-this".to_string()])?;
//! # Ok::<(), region_patcher::region::RegionError>(())
//! ```

pub mod edit;
pub mod plan;
pub mod region;
pub mod rename;
pub mod safety;
pub mod vcs;

// Re-exports
pub use edit::{Edit, EditError, EditResult, EditVerification};
pub use plan::{
    apply_plan, check_plan, load_from_path, load_from_str, preview_plan, ApplicationError,
    FilePreview, PatchPlan, PatchResult, PlanError, PlanReport,
};
pub use region::{
    apply_patch, extend_to_balanced_close, find_anchor, locate_region, verify_patch, Anchor,
    AnchorMatch, Region, RegionError,
};
pub use rename::{rename_tree, RenameError, RenameMap, RenameReport};
pub use safety::{SafetyError, WorkspaceGuard};
pub use vcs::{publish, PublishResult, VcsError};

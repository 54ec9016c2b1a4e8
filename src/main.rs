use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use region_patcher::plan::{
    apply_plan, check_plan, discover_plans, load_from_path, preview_plan, ApplicationError,
    PatchResult, PlanError,
};
use region_patcher::rename::{rename_tree, RenameMap};
use region_patcher::vcs::{publish, PublishResult};
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "region-patcher")]
#[command(about = "Anchor-based region patching for generated source files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patch plans to a workspace
    Apply {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific plan file to apply (otherwise applies all in patches/)
        #[arg(short, long)]
        plan: Option<PathBuf>,

        /// Dry run - evaluate against a copy without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Check status of patch plans without applying
    Check {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific plan file to check
        #[arg(short, long)]
        plan: Option<PathBuf>,
    },

    /// Rename tokens across every file of an extension in the tree
    Rename {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// JSON file mapping old tokens to new tokens
        #[arg(short, long)]
        map: PathBuf,

        /// File extension to rewrite (without the dot)
        #[arg(short, long, default_value = "tsx")]
        ext: String,

        /// Dry run - report counts without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Stage, commit, and push workspace changes
    Push {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Commit message
        #[arg(short, long)]
        message: String,

        /// Remote to push to
        #[arg(long, default_value = "origin")]
        remote: String,

        /// Branch to push
        #[arg(long, default_value = "main")]
        branch: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            workspace,
            plan,
            dry_run,
            diff,
        } => cmd_apply(workspace, plan, dry_run, diff),

        Commands::Check { workspace, plan } => cmd_check(workspace, plan),

        Commands::Rename {
            workspace,
            map,
            ext,
            dry_run,
        } => cmd_rename(workspace, map, &ext, dry_run),

        Commands::Push {
            workspace,
            message,
            remote,
            branch,
        } => cmd_push(workspace, &message, &remote, &branch),
    }
}

/// Collect the plan files for a run: the explicit `--plan` file if given,
/// otherwise every `.toml` plan under the first `patches/` directory that
/// holds any (the workspace's, then the current directory's).
fn collect_plan_files(workspace: &Path, explicit: Option<PathBuf>) -> Result<Vec<PathBuf>> {
    if let Some(path) = explicit {
        return Ok(vec![path]);
    }

    let mut candidates = vec![workspace.join("patches")];
    if let Ok(cwd) = env::current_dir() {
        candidates.push(cwd.join("patches"));
    }

    for dir in &candidates {
        if !dir.is_dir() {
            continue;
        }
        match discover_plans(dir) {
            Ok(plans) => return Ok(plans),
            Err(PlanError::NoPlans { .. }) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    anyhow::bail!(
        "no .toml patch plans under {} or ./patches; pass one with --plan",
        workspace.join("patches").display()
    )
}

/// Workspace root: the explicit flag, then the PATCHER_WORKSPACE environment
/// variable, then the nearest ancestor of the current directory holding a
/// package.json.
fn resolve_workspace(explicit: Option<PathBuf>) -> Result<PathBuf> {
    let candidate = explicit
        .or_else(|| env::var_os("PATCHER_WORKSPACE").map(PathBuf::from))
        .or_else(detect_project_root)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no workspace found; pass --workspace, set PATCHER_WORKSPACE, \
                 or run inside a project with a package.json"
            )
        })?;

    candidate
        .canonicalize()
        .with_context(|| format!("workspace {} is not accessible", candidate.display()))
}

fn detect_project_root() -> Option<PathBuf> {
    let cwd = env::current_dir().ok()?;
    cwd.ancestors()
        .find(|dir| dir.join("package.json").exists())
        .map(Path::to_path_buf)
}

/// Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn report_error(patch_id: &str, e: &ApplicationError) {
    eprintln!("{} {}: {}", "✗".red(), patch_id, e);
    if let ApplicationError::AnchorNotFound { suggestion, .. } = e {
        if let Some(s) = suggestion {
            eprintln!(
                "  Closest line {}: {}",
                s.line_number,
                s.line.trim().dimmed()
            );
        }
        eprintln!("  Possible causes:");
        eprintln!("    - Marker was renamed or removed from the file");
        eprintln!("    - The file was regenerated since the plan was written");
        eprintln!("  Action: adjust the anchor and retry; the file was not modified");
    }
}

fn cmd_apply(
    workspace: Option<PathBuf>,
    plan: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let plan_files = collect_plan_files(&workspace, plan)?;

    println!("Workspace: {}", workspace.display());
    println!();

    let mut total_applied = 0;
    let mut total_already_applied = 0;
    let mut total_failed = 0;

    for plan_file in plan_files {
        println!("Loading plan from {}...", plan_file.display());

        let plan = load_from_path(&plan_file)?;

        if plan.patches.is_empty() {
            println!("{}", "  No patches found in plan".yellow());
            continue;
        }

        // The simulated result is what apply would write, so the same
        // previews serve both dry runs and real runs
        let previews = if show_diff {
            preview_plan(&plan, &workspace)
        } else {
            Vec::new()
        };

        let results = if dry_run {
            println!("{}", "  [DRY RUN - showing what would be applied]".cyan());
            check_plan(&plan, &workspace)
        } else {
            apply_plan(&plan, &workspace)
        };

        for (patch_id, result) in results {
            match result {
                Ok(PatchResult::Applied { file }) => {
                    let verb = if dry_run { "Would apply" } else { "Applied" };
                    println!("{} {}: {} to {}", "✓".green(), patch_id, verb, file.display());
                    total_applied += 1;
                }
                Ok(PatchResult::AlreadyApplied { file }) => {
                    println!(
                        "{} {}: Already applied to {}",
                        "⊙".yellow(),
                        patch_id,
                        file.display()
                    );
                    total_already_applied += 1;
                }
                Ok(PatchResult::Failed { file, reason }) => {
                    eprintln!("{} {}: Failed - {}", "✗".red(), patch_id, reason);
                    eprintln!("  File: {}", file.display());
                    total_failed += 1;
                }
                Err(e) => {
                    report_error(&patch_id, &e);
                    total_failed += 1;
                }
            }
        }

        if show_diff && previews.is_empty() {
            println!("{}", "  (no files would change; nothing to diff)".yellow());
        }
        for preview in &previews {
            display_diff(&preview.file, &preview.before, &preview.after);
        }

        println!();
    }

    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", total_applied).green());
    println!(
        "  {} already applied",
        format!("{}", total_already_applied).yellow()
    );
    println!("  {} failed", format!("{}", total_failed).red());

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_check(workspace: Option<PathBuf>, plan: Option<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let plan_files = collect_plan_files(&workspace, plan)?;

    println!("{}", "Plan Status Report".bold());
    println!("Workspace: {}", workspace.display());
    println!();

    let mut applied = Vec::new();
    let mut pending = Vec::new();
    let mut failed = Vec::new();

    for plan_file in plan_files {
        let plan = load_from_path(&plan_file)?;
        let results = check_plan(&plan, &workspace);

        for (patch_id, result) in results {
            match result {
                Ok(PatchResult::Applied { .. }) => {
                    // Target found; patch would change the file if applied
                    pending.push(patch_id);
                }
                Ok(PatchResult::AlreadyApplied { .. }) => {
                    applied.push(patch_id);
                }
                Ok(PatchResult::Failed { reason, .. }) => {
                    failed.push((patch_id, reason));
                }
                Err(e) => {
                    failed.push((patch_id, e.to_string()));
                }
            }
        }
    }

    if !applied.is_empty() {
        println!(
            "{} {} ({} patches)",
            "✓".green(),
            "APPLIED".green().bold(),
            applied.len()
        );
        for id in &applied {
            println!("  - {}", id);
        }
        println!();
    }

    if !pending.is_empty() {
        println!(
            "{} {} ({} patches)",
            "⊙".yellow(),
            "PENDING".yellow().bold(),
            pending.len()
        );
        for id in &pending {
            println!("  - {}", id);
        }
        println!();
    }

    if !failed.is_empty() {
        println!(
            "{} {} ({} patches)",
            "✗".red(),
            "FAILED".red().bold(),
            failed.len()
        );
        for (id, reason) in &failed {
            println!("  - {} ({})", id, reason.dimmed());
        }
        println!();
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_rename(
    workspace: Option<PathBuf>,
    map_file: PathBuf,
    ext: &str,
    dry_run: bool,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;

    let map = RenameMap::from_json_file(&map_file)?;
    if map.is_empty() {
        anyhow::bail!("rename map {} contains no entries", map_file.display());
    }

    if dry_run {
        println!("{}", "[DRY RUN - no files will be modified]".cyan());
    }

    let report = rename_tree(&workspace, ext, &map, dry_run)?;

    println!(
        "Scanned {} .{} file(s) under {}",
        report.files_scanned,
        ext,
        workspace.display()
    );
    println!();

    for file in &report.modified {
        println!("{} {}", "Modified:".green(), file.path.display());
        for (token, count) in &file.counts {
            println!("  - {}: {} replacement(s)", token, count);
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!(
        "  {} file(s) modified, {} total replacement(s)",
        format!("{}", report.files_modified()).green(),
        report.total_replacements()
    );
    for (token, count) in &report.totals {
        println!("  {} -> {} replacement(s)", token, count);
    }

    Ok(())
}

fn cmd_push(
    workspace: Option<PathBuf>,
    message: &str,
    remote: &str,
    branch: &str,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;

    println!("Staging changes in {}...", workspace.display());

    match publish(&workspace, message, remote, branch)? {
        PublishResult::Pushed => {
            println!(
                "{} Committed and pushed to {}/{}",
                "✓".green(),
                remote,
                branch
            );
        }
        PublishResult::NothingToCommit => {
            println!("{} Working tree clean; nothing to commit", "⊙".yellow());
        }
    }

    Ok(())
}

//! Version-control collaborator: stage, commit, and push via child processes.
//!
//! Version-control semantics are deliberately not modeled here; every
//! operation shells out to `git` and relays its outcome. Intended to be
//! called only after a plan applied and verified cleanly.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("failed to spawn git {subcommand}: {source}")]
    Spawn {
        subcommand: String,
        source: std::io::Error,
    },

    #[error("git {subcommand} failed in {dir}: {stderr}")]
    CommandFailed {
        subcommand: String,
        dir: PathBuf,
        stderr: String,
    },
}

/// Outcome of a publish run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResult {
    /// Changes were committed and pushed
    Pushed,
    /// The tree was clean; nothing to commit
    NothingToCommit,
}

fn run_git(repo: &Path, args: &[&str]) -> Result<std::process::Output, VcsError> {
    let subcommand = args.first().copied().unwrap_or("").to_string();
    Command::new("git")
        .current_dir(repo)
        .args(args)
        .output()
        .map_err(|source| VcsError::Spawn {
            subcommand: subcommand.clone(),
            source,
        })
}

fn expect_success(
    repo: &Path,
    args: &[&str],
    output: std::process::Output,
) -> Result<std::process::Output, VcsError> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(VcsError::CommandFailed {
            subcommand: args.first().copied().unwrap_or("").to_string(),
            dir: repo.to_path_buf(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Stage every change in the repository.
pub fn stage_all(repo: &Path) -> Result<(), VcsError> {
    let args = ["add", "-A"];
    expect_success(repo, &args, run_git(repo, &args)?)?;
    Ok(())
}

/// Check whether the repository has staged or unstaged changes.
pub fn has_changes(repo: &Path) -> Result<bool, VcsError> {
    let args = ["status", "--porcelain"];
    let output = expect_success(repo, &args, run_git(repo, &args)?)?;
    Ok(!output.stdout.is_empty())
}

/// Commit staged changes with the given message.
pub fn commit(repo: &Path, message: &str) -> Result<(), VcsError> {
    let args = ["commit", "-m", message];
    expect_success(repo, &args, run_git(repo, &args)?)?;
    Ok(())
}

/// Push the given branch to the given remote.
pub fn push(repo: &Path, remote: &str, branch: &str) -> Result<(), VcsError> {
    let args = ["push", remote, branch];
    expect_success(repo, &args, run_git(repo, &args)?)?;
    Ok(())
}

/// Stage, commit, and push in sequence.
///
/// A clean tree short-circuits before the commit so repeated runs are
/// harmless.
pub fn publish(
    repo: &Path,
    message: &str,
    remote: &str,
    branch: &str,
) -> Result<PublishResult, VcsError> {
    stage_all(repo)?;

    if !has_changes(repo)? {
        return Ok(PublishResult::NothingToCommit);
    }

    commit(repo, message)?;
    push(repo, remote, branch)?;
    Ok(PublishResult::Pushed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for args in [
            vec!["init", "-q"],
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "user.name", "Test"],
        ] {
            let status = Command::new("git")
                .current_dir(dir.path())
                .args(&args)
                .status()
                .unwrap();
            assert!(status.success(), "git {args:?} failed");
        }
        dir
    }

    #[test]
    fn stage_and_commit_in_fresh_repo() {
        if !git_available() {
            return;
        }
        let repo = init_repo();
        fs::write(repo.path().join("App.tsx"), "content").unwrap();

        stage_all(repo.path()).unwrap();
        assert!(has_changes(repo.path()).unwrap());
        commit(repo.path(), "fix: patch calculator block").unwrap();
        assert!(!has_changes(repo.path()).unwrap());
    }

    #[test]
    fn publish_on_clean_tree_is_a_noop() {
        if !git_available() {
            return;
        }
        let repo = init_repo();
        fs::write(repo.path().join("App.tsx"), "content").unwrap();
        stage_all(repo.path()).unwrap();
        commit(repo.path(), "initial").unwrap();

        let result = publish(repo.path(), "nothing", "origin", "main").unwrap();
        assert_eq!(result, PublishResult::NothingToCommit);
    }

    #[test]
    fn push_without_remote_reports_stderr() {
        if !git_available() {
            return;
        }
        let repo = init_repo();

        let err = push(repo.path(), "origin", "main").unwrap_err();
        match err {
            VcsError::CommandFailed {
                subcommand, stderr, ..
            } => {
                assert_eq!(subcommand, "push");
                assert!(!stderr.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn commit_outside_repo_is_command_failure() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();

        // Plain directory, not a repository
        let err = commit(dir.path(), "msg").unwrap_err();
        assert!(matches!(err, VcsError::CommandFailed { .. }));
    }
}

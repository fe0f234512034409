//! Thin async wrapper over the `git` CLI.
//!
//! Only the commands the finish flow needs live here, so all argument building
//! and output parsing stay in one place.
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Stdio,
};

use thiserror::Error;
use tokio::process::Command;
use utils::text::decode_output;

#[derive(Debug, Error)]
pub enum GitCliError {
    #[error("git executable not found or not runnable")]
    NotAvailable,
    #[error("git command failed: {0}")]
    CommandFailed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Parsed worktree entry from `git worktree list --porcelain`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    /// Short branch name (`refs/heads/` stripped when present).
    pub branch: String,
}

#[derive(Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self {}
    }

    /// List worktrees of `repo_path` that have both a path and a branch.
    ///
    /// Detached and bare entries carry no branch and are left out.
    pub async fn list_worktrees(
        &self,
        repo_path: &Path,
    ) -> Result<Vec<WorktreeEntry>, GitCliError> {
        let out = self
            .git(repo_path, ["worktree", "list", "--porcelain"])
            .await?;
        Ok(parse_worktree_list(&out))
    }

    /// Run `git -C <repo_path> <args...>` and return stdout on success.
    pub async fn git<I, S>(&self, repo_path: &Path, args: I) -> Result<String, GitCliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let git = which::which("git").map_err(|_| GitCliError::NotAvailable)?;
        let mut cmd = Command::new(&git);
        cmd.arg("-C").arg(repo_path);
        for a in args {
            cmd.arg(a);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::trace!(repo = ?repo_path, "Running git command: {:?}", cmd);

        let out = cmd.output().await?;
        if !out.status.success() {
            let stderr = decode_output(&out.stderr);
            let stderr = stderr.trim();
            let message = if stderr.is_empty() {
                format!("git exited with {}", out.status)
            } else {
                stderr.to_string()
            };
            return Err(GitCliError::CommandFailed(message));
        }
        Ok(decode_output(&out.stdout))
    }
}

/// Parse porcelain worktree output into entries.
///
/// Records are separated by blank lines. A `worktree` line starts a record and
/// a `branch` line names its branch; records missing either are dropped.
pub fn parse_worktree_list(output: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut current_path: Option<PathBuf> = None;
    let mut current_branch = String::new();

    for line in output.lines() {
        let line = line.trim();

        if line.is_empty() {
            if let Some(entry) = finish_record(current_path.take(), &current_branch) {
                entries.push(entry);
            }
            current_branch.clear();
        } else if let Some(path) = line.strip_prefix("worktree ") {
            current_path = Some(PathBuf::from(path.trim()));
            current_branch.clear();
        } else if let Some(branch_ref) = line.strip_prefix("branch ") {
            let branch_ref = branch_ref.trim();
            current_branch = branch_ref
                .strip_prefix("refs/heads/")
                .unwrap_or(branch_ref)
                .to_string();
        }
        // HEAD, bare, detached, locked and prunable lines carry nothing we need
    }

    // Handle the last entry if no trailing empty line
    if let Some(entry) = finish_record(current_path, &current_branch) {
        entries.push(entry);
    }

    entries
}

fn finish_record(path: Option<PathBuf>, branch: &str) -> Option<WorktreeEntry> {
    let path = path?;
    if branch.is_empty() {
        return None;
    }
    Some(WorktreeEntry {
        path,
        branch: branch.to_string(),
    })
}

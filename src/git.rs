//! `git` executable backend.
//!
//! Every command runs with stdin closed and credential prompting disabled, so a
//! missing credential turns into an immediate failure instead of a hang.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::repository::{
    CommitSummary, GitFailure, OperationResult, RepositoryBackend, RepositoryStatus,
};

const RECORD_SEP: char = '\u{1e}';
const FIELD_SEP: char = '\u{1f}';
const HEADER_END: char = '\u{1d}';

/// Hash length used for display.
const SHORT_HASH_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
#[error("{command}: {details}")]
pub struct GitCommandError {
    pub command: String,
    pub details: String,
}

#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
    remote: String,
}

impl GitCli {
    pub fn new(root: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            remote: remote.into(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_ASKPASS", "echo")
            .env("SSH_ASKPASS", "echo")
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if std::env::var_os("GIT_SSH_COMMAND").is_none() {
            cmd.env("GIT_SSH_COMMAND", "ssh -o BatchMode=yes");
        }
        cmd
    }

    /// Run git and return trimmed stdout. Failure details combine stderr and
    /// stdout since some errors (merge conflicts) only show up on stdout.
    async fn run(&self, args: &[&str]) -> Result<String, GitCommandError> {
        let command = format!("git {}", args.join(" "));
        debug!(%command, "running git");

        let output = self
            .command(args)
            .output()
            .await
            .map_err(|e| GitCommandError {
                command: command.clone(),
                details: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let details = match (stderr.is_empty(), stdout.is_empty()) {
                (true, true) => "Unknown error".to_string(),
                (false, true) => stderr,
                (true, false) => stdout,
                (false, false) => format!("{stderr}\n{stdout}"),
            };
            return Err(GitCommandError { command, details });
        }
        Ok(stdout)
    }

    /// Exit status only; `Ok(false)` on a non-zero exit.
    async fn succeeds(&self, args: &[&str]) -> Result<bool, GitCommandError> {
        let status = self
            .command(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| GitCommandError {
                command: format!("git {}", args.join(" ")),
                details: e.to_string(),
            })?;
        Ok(status.success())
    }

    async fn current_branch(&self) -> Result<String, GitCommandError> {
        self.run(&["symbolic-ref", "--short", "HEAD"]).await
    }

    /// Commits (ahead, behind) relative to the upstream. No upstream counts
    /// as zero both ways.
    async fn ahead_behind(&self) -> (u32, u32) {
        match self
            .run(&["rev-list", "--left-right", "--count", "HEAD...@{upstream}"])
            .await
        {
            Ok(out) => parse_ahead_behind(&out).unwrap_or((0, 0)),
            Err(err) => {
                debug!(error = %err, "no upstream; ahead/behind treated as zero");
                (0, 0)
            }
        }
    }

    async fn last_commit(&self) -> Option<(String, String)> {
        let abbrev = format!("--abbrev={SHORT_HASH_LEN}");
        let out = self
            .run(&["log", "-1", &abbrev, "--format=%h%x1f%B"])
            .await
            .ok()?;
        let (hash, message) = out.split_once(FIELD_SEP)?;
        Some((short_hash(hash), message.trim().to_string()))
    }

    async fn build_status(&self) -> Result<RepositoryStatus, GitCommandError> {
        let porcelain = self
            .run(&["status", "--porcelain", "--untracked-files=all"])
            .await?;
        let has_changes = !porcelain.is_empty();
        let current_branch = self.current_branch().await?;
        let (ahead, behind) = self.ahead_behind().await;
        let last = self.last_commit().await;

        Ok(RepositoryStatus {
            is_clean: !has_changes,
            has_changes,
            ahead,
            behind,
            current_branch,
            last_commit: last.as_ref().map(|(hash, _)| hash.clone()),
            last_commit_message: last.map(|(_, message)| message),
        })
    }

    async fn try_commit(&self, message: &str, pathspec: &str) -> Result<OperationResult, GitCommandError> {
        // `git add` rejects a pathspec that matches nothing (an empty files
        // directory), so check for changes under it first.
        let pending = self
            .run(&["status", "--porcelain", "--untracked-files=all", "--", pathspec])
            .await?;
        if pending.is_empty() {
            return Ok(OperationResult::no_changes());
        }

        self.run(&["add", "--all", "--", pathspec]).await?;

        // `diff --cached --quiet` exits 1 when something is staged. Both it and
        // the commit are scoped so unrelated staged paths stay out.
        if self
            .succeeds(&["diff", "--cached", "--quiet", "--", pathspec])
            .await?
        {
            return Ok(OperationResult::no_changes());
        }

        self.run(&["commit", "--no-verify", "-m", message, "--", pathspec])
            .await?;
        let abbrev = format!("--short={SHORT_HASH_LEN}");
        let hash = self.run(&["rev-parse", &abbrev, "HEAD"]).await?;
        Ok(OperationResult::ok(
            "Successfully committed changes",
            format!("Commit {}: {message}", short_hash(&hash)),
        ))
    }
}

#[async_trait]
impl RepositoryBackend for GitCli {
    async fn is_available(&self) -> bool {
        if !self.root.is_dir() {
            return false;
        }
        self.succeeds(&["rev-parse", "--is-inside-work-tree"])
            .await
            .unwrap_or(false)
    }

    async fn status(&self) -> RepositoryStatus {
        if !self.is_available().await {
            return RepositoryStatus::unavailable();
        }
        match self.build_status().await {
            Ok(status) => status,
            Err(err) => {
                error!(error = %err, "failed to read git status");
                RepositoryStatus::error(err.to_string())
            }
        }
    }

    async fn stage_and_commit(&self, message: &str, pathspec: &str) -> OperationResult {
        if !self.is_available().await {
            return GitFailure::Unavailable.into();
        }
        match self.try_commit(message, pathspec).await {
            Ok(result) => {
                info!(message = %result.message, "commit finished");
                result
            }
            Err(err) => {
                error!(error = %err, "commit failed");
                GitFailure::CommitFailed(err.details).into()
            }
        }
    }

    async fn push(&self) -> OperationResult {
        if !self.is_available().await {
            return GitFailure::Unavailable.into();
        }
        let branch = match self.current_branch().await {
            Ok(branch) => branch,
            Err(err) => return GitFailure::PushFailed(err.details).into(),
        };

        match self.run(&["push", &self.remote, &branch]).await {
            Ok(_) => {
                info!(remote = %self.remote, %branch, "pushed");
                OperationResult::ok(
                    "Successfully pushed changes",
                    format!("Pushed to {}/{branch}", self.remote),
                )
            }
            Err(err) => {
                let failure = GitFailure::from_push_output(&err.details);
                warn!(error = %err, kind = %failure, "push failed");
                failure.into()
            }
        }
    }

    async fn pull(&self) -> OperationResult {
        if !self.is_available().await {
            return GitFailure::Unavailable.into();
        }
        let branch = match self.current_branch().await {
            Ok(branch) => branch,
            Err(err) => return GitFailure::PullFailed(err.details).into(),
        };

        match self
            .run(&["pull", "--no-rebase", "--no-edit", &self.remote, &branch])
            .await
        {
            Ok(out) if out.contains("Already up to date") || out.contains("Already up-to-date") => {
                OperationResult::ok("Already up to date", "No changes to pull")
            }
            Ok(out) => {
                let note = out.lines().last().unwrap_or_default().trim();
                info!(remote = %self.remote, %branch, "pulled");
                OperationResult::ok(
                    "Successfully pulled changes",
                    format!("Pulled from {}/{branch}: {note}", self.remote),
                )
            }
            Err(err) => {
                let failure = GitFailure::from_pull_output(&err.details);
                warn!(error = %err, kind = %failure, "pull failed");
                failure.into()
            }
        }
    }

    async fn recent_commits(&self, count: usize) -> Vec<CommitSummary> {
        if count == 0 || !self.is_available().await {
            return Vec::new();
        }
        let max_count = format!("--max-count={count}");
        let abbrev = format!("--abbrev={SHORT_HASH_LEN}");
        let format = "--format=%x1e%h%x1f%an%x1f%cI%x1f%B%x1d";
        match self
            .run(&["log", &max_count, &abbrev, format, "--name-only"])
            .await
        {
            Ok(out) => parse_log(&out),
            Err(err) => {
                // An unborn branch has no log; that is not worth an error line.
                debug!(error = %err, "git log failed");
                Vec::new()
            }
        }
    }
}

fn short_hash(hash: &str) -> String {
    hash.trim().chars().take(SHORT_HASH_LEN).collect()
}

fn parse_ahead_behind(out: &str) -> Option<(u32, u32)> {
    let mut parts = out.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    Some((ahead, behind))
}

/// Parse `git log --name-only` output produced with the record/field
/// separators above.
fn parse_log(out: &str) -> Vec<CommitSummary> {
    out.split(RECORD_SEP)
        .filter(|record| !record.trim().is_empty())
        .filter_map(|record| {
            let (header, files) = record.split_once(HEADER_END)?;
            let mut fields = header.splitn(4, FIELD_SEP);
            let hash = short_hash(fields.next()?);
            let author = fields.next()?.to_string();
            let date = fields.next()?.to_string();
            let message = fields.next()?.trim().to_string();
            let files_changed = files.lines().filter(|l| !l.trim().is_empty()).count();
            Some(CommitSummary {
                hash,
                message,
                author,
                date,
                files_changed,
            })
        })
        .collect()
}

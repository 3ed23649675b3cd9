//! Repository model: status snapshots, operation results, and the backend
//! seam the rest of the service talks to.
//!
//! Backends never return errors: every failure is folded into an
//! [`OperationResult`] (or an error-marked [`RepositoryStatus`]) so callers only
//! ever branch on `success`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const NO_CHANGES_MESSAGE: &str = "No changes to commit";
pub const NO_REPOSITORY_BRANCH: &str = "No repository";
pub const ERROR_BRANCH: &str = "Error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryStatus {
    pub is_clean: bool,
    pub has_changes: bool,
    pub ahead: u32,
    pub behind: u32,
    pub current_branch: String,
    pub last_commit: Option<String>,
    pub last_commit_message: Option<String>,
}

impl RepositoryStatus {
    pub fn unavailable() -> Self {
        Self::marker(NO_REPOSITORY_BRANCH, None)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::marker(ERROR_BRANCH, Some(message.into()))
    }

    fn marker(branch: &str, message: Option<String>) -> Self {
        Self {
            is_clean: false,
            has_changes: false,
            ahead: 0,
            behind: 0,
            current_branch: branch.to_string(),
            last_commit: None,
            last_commit_message: message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    pub details: Option<String>,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            details: Some(details.into()),
        }
    }

    pub fn failed(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            details: Some(details.into()),
        }
    }

    pub fn no_changes() -> Self {
        Self::ok(NO_CHANGES_MESSAGE, "Working tree is clean")
    }

    pub fn is_no_changes(&self) -> bool {
        self.success && self.message == NO_CHANGES_MESSAGE
    }

    fn details_or_empty(&self) -> &str {
        self.details.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub hash: String,
    pub message: String,
    pub author: String,
    pub date: String,
    pub files_changed: usize,
}

/// Classified failure of a repository operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GitFailure {
    #[error("Git repository not available")]
    Unavailable,
    #[error("Authentication failed")]
    AuthenticationFailed,
    #[error("Merge conflict detected")]
    MergeConflict,
    #[error("Push rejected by remote")]
    RejectedByRemote,
    #[error("Push failed")]
    PushFailed(String),
    #[error("Failed to pull changes")]
    PullFailed(String),
    #[error("Failed to commit changes")]
    CommitFailed(String),
}

impl GitFailure {
    pub fn details(&self) -> String {
        match self {
            Self::Unavailable => "Please initialize a Git repository first".to_string(),
            Self::AuthenticationFailed => "Please set up SSH keys or Personal Access Token. \
                Check your Git credentials configuration."
                .to_string(),
            Self::MergeConflict => "Please resolve conflicts manually and try again".to_string(),
            Self::RejectedByRemote => "The remote repository rejected the push. \
                You may need to pull first or check branch permissions."
                .to_string(),
            Self::PushFailed(raw) | Self::PullFailed(raw) | Self::CommitFailed(raw) => raw.clone(),
        }
    }

    /// Classify the output of a failed push.
    pub fn from_push_output(output: &str) -> Self {
        if is_auth_error(output) {
            Self::AuthenticationFailed
        } else if output.to_lowercase().contains("rejected") {
            Self::RejectedByRemote
        } else {
            Self::PushFailed(output.trim().to_string())
        }
    }

    /// Classify the output of a failed pull.
    pub fn from_pull_output(output: &str) -> Self {
        if output.to_lowercase().contains("conflict") {
            Self::MergeConflict
        } else if is_auth_error(output) {
            Self::AuthenticationFailed
        } else {
            Self::PullFailed(output.trim().to_string())
        }
    }
}

impl From<GitFailure> for OperationResult {
    fn from(failure: GitFailure) -> Self {
        OperationResult::failed(failure.to_string(), failure.details())
    }
}

fn is_auth_error(output: &str) -> bool {
    let lower = output.to_lowercase();
    [
        "authentication failed",
        "permission denied",
        "could not read username",
        "could not read password",
        "terminal prompts disabled",
        "invalid credentials",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

/// Version-control client consumed by the service.
#[async_trait]
pub trait RepositoryBackend: Send + Sync {
    async fn is_available(&self) -> bool;

    async fn status(&self) -> RepositoryStatus;

    /// Stage everything matching `pathspec` and commit it.
    async fn stage_and_commit(&self, message: &str, pathspec: &str) -> OperationResult;

    async fn push(&self) -> OperationResult;

    async fn pull(&self) -> OperationResult;

    /// Newest first.
    async fn recent_commits(&self, count: usize) -> Vec<CommitSummary>;
}

/// A backend plus the lock that keeps mutating operations from overlapping.
///
/// Manual pulls, scheduled pulls and commit-and-push all go through here, so
/// at most one of them touches the working tree at a time.
pub struct Repository {
    backend: Arc<dyn RepositoryBackend>,
    pathspec: String,
    op_lock: Mutex<()>,
}

impl Repository {
    pub fn new(backend: Arc<dyn RepositoryBackend>, pathspec: impl Into<String>) -> Self {
        Self {
            backend,
            pathspec: pathspec.into(),
            op_lock: Mutex::new(()),
        }
    }

    pub fn pathspec(&self) -> &str {
        &self.pathspec
    }

    pub async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }

    pub async fn status(&self) -> RepositoryStatus {
        self.backend.status().await
    }

    pub async fn recent_commits(&self, count: usize) -> Vec<CommitSummary> {
        self.backend.recent_commits(count).await
    }

    pub async fn stage_and_commit(&self, message: &str) -> OperationResult {
        let _guard = self.op_lock.lock().await;
        self.backend.stage_and_commit(message, &self.pathspec).await
    }

    pub async fn push(&self) -> OperationResult {
        let _guard = self.op_lock.lock().await;
        self.backend.push().await
    }

    pub async fn pull(&self) -> OperationResult {
        let _guard = self.op_lock.lock().await;
        self.backend.pull().await
    }

    /// Commit then push under a single lock hold. A clean tree short-circuits
    /// before the push.
    pub async fn commit_and_push(&self, message: &str) -> OperationResult {
        let _guard = self.op_lock.lock().await;

        let commit = self.backend.stage_and_commit(message, &self.pathspec).await;
        if !commit.success || commit.is_no_changes() {
            return commit;
        }

        let push = self.backend.push().await;
        if !push.success {
            warn!(message = %push.message, "commit succeeded but push failed");
            return OperationResult::failed(
                "Commit successful but push failed",
                format!(
                    "Commit: {}. Push error: {}",
                    commit.details_or_empty(),
                    push.details_or_empty()
                ),
            );
        }

        info!("committed and pushed");
        OperationResult::ok(
            "Successfully committed and pushed changes",
            format!("{}. {}", commit.details_or_empty(), push.details_or_empty()),
        )
    }
}

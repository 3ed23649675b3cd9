use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::repository::{CommitSummary, OperationResult, RepositoryStatus};
use crate::server::AppState;

const DEFAULT_COMMIT_COUNT: usize = 10;

#[derive(Deserialize, Default)]
pub struct CommitRequest {
    pub message: Option<String>,
}

#[derive(Deserialize)]
pub struct CommitsQuery {
    pub count: Option<usize>,
}

#[derive(Serialize)]
pub struct CommitsResponse {
    pub commits: Vec<CommitSummary>,
}

pub async fn status(State(state): State<AppState>) -> Json<RepositoryStatus> {
    Json(state.repo.status().await)
}

/// Body is optional; a missing or blank message falls back to the configured
/// default.
pub async fn commit_push(
    State(state): State<AppState>,
    body: Option<Json<CommitRequest>>,
) -> Json<OperationResult> {
    let Json(req) = body.unwrap_or_default();
    let message = req
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.config.commit_message.clone());
    Json(state.repo.commit_and_push(&message).await)
}

pub async fn pull(State(state): State<AppState>) -> Json<OperationResult> {
    Json(state.repo.pull().await)
}

pub async fn commits(
    State(state): State<AppState>,
    Query(query): Query<CommitsQuery>,
) -> Json<CommitsResponse> {
    let count = query.count.unwrap_or(DEFAULT_COMMIT_COUNT);
    Json(CommitsResponse {
        commits: state.repo.recent_commits(count).await,
    })
}

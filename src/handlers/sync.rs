use axum::{extract::State, Json};

use crate::repository::OperationResult;
use crate::scheduler::SyncStatus;
use crate::server::AppState;

pub async fn status(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.scheduler.status())
}

pub async fn manual_pull(State(state): State<AppState>) -> Json<OperationResult> {
    let result = if state.scheduler.perform_pull().await {
        OperationResult::ok(
            "Manual sync pull completed successfully",
            "Files have been synchronized",
        )
    } else {
        OperationResult::failed("Manual sync pull failed", "Check logs for more information")
    };
    Json(result)
}

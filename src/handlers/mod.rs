pub mod files;
pub mod git;
pub mod sync;

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::AppState;

#[derive(Serialize)]
pub struct ServiceInfo {
    pub message: &'static str,
    pub version: &'static str,
    pub endpoints: BTreeMap<&'static str, &'static str>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub git_available: bool,
    pub sync_running: bool,
    pub files_directory: String,
}

pub async fn root() -> Json<ServiceInfo> {
    let endpoints = BTreeMap::from([
        ("files", "/files"),
        ("tree", "/tree"),
        ("upload", "/upload"),
        ("git_status", "/git/status"),
        ("commit_push", "/git/commit-push"),
        ("pull", "/git/pull"),
        ("commits", "/git/commits"),
        ("sync_status", "/sync/status"),
        ("health", "/health"),
    ]);
    Json(ServiceInfo {
        message: "gitsync file sync backend",
        version: env!("CARGO_PKG_VERSION"),
        endpoints,
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        git_available: state.repo.is_available().await,
        sync_running: state.scheduler.is_running(),
        files_directory: state.files.base_path().display().to_string(),
    })
}

//! gitsync serve: HTTP API over the file store, the repository and the
//! auto-pull scheduler.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{self, SyncConfig};
use crate::file_store::{FileStore, StoreError};
use crate::git::GitCli;
use crate::handlers;
use crate::path_sandbox::SandboxError;
use crate::repository::Repository;
use crate::scheduler::SyncScheduler;

/// Multipart bodies may carry several files; the per-file cap is enforced
/// while streaming, this only bounds the whole request.
const MAX_FILES_PER_REQUEST: u64 = 32;

// ─── Shared state ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SyncConfig>,
    pub files: Arc<FileStore>,
    pub repo: Arc<Repository>,
    pub scheduler: Arc<SyncScheduler>,
}

impl AppState {
    /// Build the services from configuration, backed by the `git` CLI.
    pub fn from_config(config: SyncConfig) -> Result<Self> {
        config.validate()?;

        let files = FileStore::open(config.files_path()).with_context(|| {
            format!(
                "cannot open files directory {}",
                config.files_path().display()
            )
        })?;
        let pathspec = config::commit_pathspec(&config.repo_dir, files.base_path());
        let backend = Arc::new(GitCli::new(config.repo_dir.clone(), config.remote.clone()));
        let repo = Arc::new(Repository::new(backend, pathspec));

        Ok(Self::new(config, files, repo))
    }

    pub fn new(config: SyncConfig, files: FileStore, repo: Arc<Repository>) -> Self {
        let scheduler = Arc::new(SyncScheduler::new(
            Arc::clone(&repo),
            config.pull_interval,
            config.pull_on_startup,
        ));
        Self {
            config: Arc::new(config),
            files: Arc::new(files),
            repo,
            scheduler,
        }
    }
}

// ─── Router ───────────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(
        state
            .config
            .max_upload_size
            .saturating_mul(MAX_FILES_PER_REQUEST),
    )
    .unwrap_or(usize::MAX);
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/files", get(handlers::files::list_files))
        .route(
            "/files/*path",
            get(handlers::files::read_file).delete(handlers::files::delete_file),
        )
        .route("/directories", post(handlers::files::make_directory))
        .route("/tree", get(handlers::files::tree))
        .route("/upload", post(handlers::files::upload))
        .route("/git/status", get(handlers::git::status))
        .route("/git/commit-push", post(handlers::git::commit_push))
        .route("/git/pull", post(handlers::git::pull))
        .route("/git/commits", get(handlers::git::commits))
        .route("/sync/status", get(handlers::sync::status))
        .route("/sync/manual-pull", post(handlers::sync::manual_pull))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

// ─── Error envelope ───────────────────────────────────────────────────────────

/// Failure response rendered as `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn payload_too_large(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, detail = %self.detail, "request failed");
        }
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}

impl From<SandboxError> for ApiError {
    fn from(err: SandboxError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::Sandbox(_) => StatusCode::BAD_REQUEST,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            StoreError::BinaryContent => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            StoreError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detail = match &err {
            StoreError::NotFound(_) => "File not found".to_string(),
            _ => err.to_string(),
        };
        Self::new(status, detail)
    }
}

// ─── Public entry point ───────────────────────────────────────────────────────

pub async fn run_serve(config: SyncConfig) -> Result<()> {
    let listen = config.listen.clone();
    let state = AppState::from_config(config)?;

    info!(
        repo = %state.config.repo_dir.display(),
        files = %state.files.base_path().display(),
        pathspec = %state.repo.pathspec(),
        "starting gitsync"
    );

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    info!(addr = %listener.local_addr()?, "gitsync listening");

    if state.repo.is_available().await {
        state.scheduler.start().await;
        info!("auto-sync started");
    } else {
        warn!("git repository not available; auto-sync disabled");
    }

    let scheduler = Arc::clone(&state.scheduler);
    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed");

    info!("shutting down");
    scheduler.stop().await;
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down gracefully"),
        _ = terminate => info!("received SIGTERM, shutting down gracefully"),
    }
}

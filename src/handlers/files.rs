use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::file_store::{FileContent, FileEntry};
use crate::server::{ApiError, AppState};

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub path: String,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub files: Vec<FileEntry>,
    pub path: String,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
    pub path: String,
}

#[derive(Deserialize)]
pub struct DirectoryRequest {
    pub path: String,
}

#[derive(Serialize)]
pub struct DirectoryResponse {
    pub path: String,
}

#[derive(Serialize)]
pub struct TreeResponse {
    pub files: Vec<String>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub uploaded_files: Vec<String>,
}

pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let files = state.files.list(&query.path)?;
    Ok(Json(ListResponse {
        files,
        path: query.path,
    }))
}

pub async fn read_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<FileContent>, ApiError> {
    Ok(Json(state.files.read(&path)?))
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let deleted = state.files.delete(&path)?;
    if deleted {
        info!(%path, "deleted");
    }
    Ok(Json(DeleteResponse { deleted, path }))
}

pub async fn make_directory(
    State(state): State<AppState>,
    Json(req): Json<DirectoryRequest>,
) -> Result<Json<DirectoryResponse>, ApiError> {
    if req.path.trim().is_empty() {
        return Err(ApiError::bad_request("Directory path must not be empty"));
    }
    let path = state.files.make_directory(&req.path)?;
    Ok(Json(DirectoryResponse { path }))
}

pub async fn tree(State(state): State<AppState>) -> Result<Json<TreeResponse>, ApiError> {
    Ok(Json(TreeResponse {
        files: state.files.list_all_recursive()?,
    }))
}

/// Multipart upload: any number of `files` parts plus an optional `path`
/// part naming the target directory. Every part is read and every target
/// path checked before anything is written, so one bad file rejects the
/// whole request.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let max = state.config.max_upload_size;
    let mut target_dir = String::new();
    let mut pending: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "path" => {
                target_dir = field
                    .text()
                    .await
                    .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
            }
            "files" | "file" => {
                let Some(filename) = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|n| !n.is_empty())
                else {
                    continue;
                };

                let mut content = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| ApiError::new(e.status(), e.body_text()))?
                {
                    if (content.len() + chunk.len()) as u64 > max {
                        return Err(ApiError::payload_too_large(format!(
                            "File {filename} is too large (max {max} bytes)"
                        )));
                    }
                    content.extend_from_slice(&chunk);
                }
                pending.push((filename, content));
            }
            _ => {}
        }
    }

    if pending.is_empty() {
        return Err(ApiError::bad_request("No files provided"));
    }

    let target_dir = target_dir.trim_matches('/');
    let checked = pending
        .into_iter()
        .map(|(filename, content)| {
            let relative = if target_dir.is_empty() {
                filename
            } else {
                format!("{target_dir}/{filename}")
            };
            Ok((state.files.normalize(&relative)?, content))
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let mut uploaded_files = Vec::with_capacity(checked.len());
    for (relative, content) in checked {
        uploaded_files.push(state.files.write(&relative, &content)?);
    }

    info!(count = uploaded_files.len(), "uploaded files");
    Ok(Json(UploadResponse {
        success: true,
        message: format!("Successfully uploaded {} file(s)", uploaded_files.len()),
        uploaded_files,
    }))
}

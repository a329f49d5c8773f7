//! JSON API for folder mutations and bucket-wide queries.
//!
//! Every mutation checks authorization before touching the store and answers
//! with the `{"success": true, ...}` envelope or an `{"error": ...}` body.

use crate::{
    errors::AppError,
    handlers::{AppState, Success},
    models::tree::FolderTree,
    services::{
        file_manager::{BatchReport, TransferMode},
        size_ledger::SizeReading,
    },
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateFolderReq {
    pub path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameReq {
    pub old_key: String,
    pub new_key: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteReq {
    pub keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferReq {
    pub keys: Vec<String>,
    pub destination: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedFolder {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct AllFolders {
    pub folders: Vec<String>,
    pub tree: FolderTree,
}

/// POST `/api/create-folder`
pub async fn create_folder(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateFolderReq>, JsonRejection>,
) -> Result<Json<Success<CreatedFolder>>, AppError> {
    state.require_authorized(&headers)?;
    let Json(req) = payload?;
    let marker = state.files.create_folder(&req.path).await?;
    Ok(Json(Success::new(CreatedFolder { path: marker.key })))
}

/// POST `/api/rename`
pub async fn rename(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RenameReq>, JsonRejection>,
) -> Result<Json<Success<BatchReport>>, AppError> {
    state.require_authorized(&headers)?;
    let Json(req) = payload?;
    let report = state.files.rename(&req.old_key, &req.new_key).await?;
    Ok(Json(Success::new(report)))
}

/// POST `/api/delete`
pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<DeleteReq>, JsonRejection>,
) -> Result<Json<Success<BatchReport>>, AppError> {
    state.require_authorized(&headers)?;
    let Json(req) = payload?;
    let report = state.files.delete(&req.keys).await?;
    Ok(Json(Success::new(report)))
}

/// POST `/api/move`
pub async fn move_objects(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TransferReq>, JsonRejection>,
) -> Result<Json<Success<BatchReport>>, AppError> {
    transfer(state, headers, payload, TransferMode::Move).await
}

/// POST `/api/copy`
pub async fn copy_objects(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TransferReq>, JsonRejection>,
) -> Result<Json<Success<BatchReport>>, AppError> {
    transfer(state, headers, payload, TransferMode::Copy).await
}

async fn transfer(
    state: AppState,
    headers: HeaderMap,
    payload: Result<Json<TransferReq>, JsonRejection>,
    mode: TransferMode,
) -> Result<Json<Success<BatchReport>>, AppError> {
    state.require_authorized(&headers)?;
    let Json(req) = payload?;
    let report = state
        .files
        .transfer(&req.keys, &req.destination, mode)
        .await?;
    Ok(Json(Success::new(report)))
}

/// GET `/api/list-all-folders`: every folder path plus the nested tree.
pub async fn list_all_folders(
    State(state): State<AppState>,
) -> Result<Json<AllFolders>, AppError> {
    let folders = state.files.list_all_folders().await?;
    let tree = FolderTree::from_paths(&folders);
    Ok(Json(AllFolders { folders, tree }))
}

/// GET `/api/size`: approximate total bytes stored.
pub async fn total_size(State(state): State<AppState>) -> Result<Json<SizeReading>, AppError> {
    state
        .files
        .total_size()
        .await
        .map(Json)
        .ok_or_else(|| AppError::new(StatusCode::SERVICE_UNAVAILABLE, "size counter unavailable"))
}

//! Defines routes for the folder-oriented file manager.
//!
//! ## Structure
//! - **Public endpoints**
//!   - `GET  /` and `GET /{*path}`: list one folder level
//!   - `GET  /preview/{*key}`     : stream an object inline
//!   - `GET  /download/{*key}`    : stream an object as an attachment
//!   - `GET  /api/list-all-folders`: every folder path + nested tree
//!   - `GET  /api/size`           : approximate total bytes stored
//!
//! - **Authorized endpoints**
//!   - `POST /upload`             : multipart upload (`file`, `path`)
//!   - `POST /api/create-folder`  : `{path}`
//!   - `POST /api/rename`         : `{oldKey, newKey}`
//!   - `POST /api/delete`         : `{keys}`
//!   - `POST /api/move`           : `{keys, destination}`
//!   - `POST /api/copy`           : `{keys, destination}`
//!
//! The wildcard segments allow nested keys like `photos/2025/img.jpg`.

use crate::handlers::{
    AppState, api_handlers,
    health_handlers::{healthz, readyz},
    object_handlers::{download_object, list_folder, list_root, preview_object, upload_object},
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router with every route bound to `state`.
///
/// `max_upload_bytes` caps request bodies on `/upload`.
pub fn routes(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // JSON API
        .route("/api/create-folder", post(api_handlers::create_folder))
        .route("/api/rename", post(api_handlers::rename))
        .route("/api/delete", post(api_handlers::delete))
        .route("/api/move", post(api_handlers::move_objects))
        .route("/api/copy", post(api_handlers::copy_objects))
        .route("/api/list-all-folders", get(api_handlers::list_all_folders))
        .route("/api/size", get(api_handlers::total_size))
        // Object access
        .route(
            "/upload",
            post(upload_object).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/preview/{*key}", get(preview_object))
        .route("/download/{*key}", get(download_object))
        // Folder browsing
        .route("/", get(list_root))
        .route("/{*path}", get(list_folder))
        .with_state(state)
}

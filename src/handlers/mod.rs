//! HTTP handlers and the state they share.

pub mod api_handlers;
pub mod health_handlers;
pub mod object_handlers;

use crate::{
    errors::AppError,
    services::{auth::Authorizer, file_manager::FileManager},
};
use axum::http::HeaderMap;
use serde::Serialize;
use std::sync::Arc;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub files: FileManager,
    pub authorizer: Arc<dyn Authorizer>,
}

impl AppState {
    pub fn new(files: FileManager, authorizer: Arc<dyn Authorizer>) -> Self {
        Self { files, authorizer }
    }

    /// Reject the request before any store call if it may not mutate.
    pub fn require_authorized(&self, headers: &HeaderMap) -> Result<(), AppError> {
        if self.authorizer.is_authorized(headers) {
            Ok(())
        } else {
            tracing::debug!("rejected unauthorized mutation");
            Err(AppError::unauthorized())
        }
    }
}

/// `{"success": true, ...data}` envelope for successful mutations.
#[derive(Serialize)]
pub struct Success<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> Success<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

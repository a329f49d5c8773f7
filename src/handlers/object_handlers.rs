//! HTTP handlers for browsing, reading and uploading objects.
//! Object bodies are streamed into and out of the store without buffering.

use crate::{
    errors::AppError,
    handlers::{AppState, Success},
    models::{
        listing::FolderListing,
        object::ObjectInfo,
        path,
    },
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use std::io;

/// Folder listing plus the approximate size of the whole store.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingResponse {
    #[serde(flatten)]
    pub listing: FolderListing,
    pub total_size: Option<u64>,
}

#[derive(Clone, Copy)]
enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    fn as_str(self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

/// GET `/`: list the root folder.
pub async fn list_root(State(state): State<AppState>) -> Result<Json<ListingResponse>, AppError> {
    list_at(&state, "").await
}

/// GET `/{*path}`: list one folder level.
pub async fn list_folder(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<ListingResponse>, AppError> {
    list_at(&state, &path).await
}

async fn list_at(state: &AppState, prefix: &str) -> Result<Json<ListingResponse>, AppError> {
    let listing = state.files.list(prefix).await?;
    let total_size = state.files.total_size().await.map(|r| r.total_size);
    Ok(Json(ListingResponse {
        listing,
        total_size,
    }))
}

/// GET `/preview/{*key}`: stream an object for inline display.
pub async fn preview_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    stream_object(&state, &key, Disposition::Inline).await
}

/// GET `/download/{*key}`: stream an object as an attachment.
pub async fn download_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    stream_object(&state, &key, Disposition::Attachment).await
}

async fn stream_object(
    state: &AppState,
    key: &str,
    disposition: Disposition,
) -> Result<Response, AppError> {
    let object = state.files.read(key).await?;
    let mut response = Response::new(Body::from_stream(object.body));
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &object.info, disposition);
    Ok(response)
}

/// POST `/upload`: multipart with an optional `path` part (destination
/// folder) followed by a `file` part.
///
/// The file part is streamed straight into the store, so `path` has to
/// arrive before it. A late `path` removes the file again and fails.
pub async fn upload_object(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Success<ObjectInfo>>, AppError> {
    state.require_authorized(&headers)?;

    let mut folder = String::new();
    let mut uploaded: Option<ObjectInfo> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("path") => {
                if let Some(misplaced) = uploaded.take() {
                    state.files.delete(&[misplaced.key]).await?;
                    return Err(AppError::bad_request("`path` part must precede `file`"));
                }
                folder = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(err.body_text()))?;
            }
            Some("file") if uploaded.is_some() => {
                return Err(AppError::bad_request("only one `file` part is accepted"));
            }
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::bad_request("file part has no file name"))?;
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .filter(|ct| ct != "application/octet-stream")
                    .or_else(|| mime_guess::from_path(&file_name).first().map(|m| m.to_string()));
                let body = field
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.body_text()))
                    .boxed();
                let info = state
                    .files
                    .upload(folder.trim(), &file_name, body, content_type)
                    .await?;
                uploaded = Some(info);
            }
            _ => {}
        }
    }

    let info = uploaded.ok_or_else(|| AppError::bad_request("missing `file` part"))?;
    Ok(Json(Success::new(info)))
}

fn set_object_headers(headers: &mut HeaderMap, meta: &ObjectInfo, disposition: Disposition) {
    let content_type = meta
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size));

    if let Some(etag) = meta.etag.as_ref() {
        let quoted = format!("\"{}\"", etag);
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&meta.uploaded_at.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    let disposition = content_disposition(path::last_component(&meta.key), disposition);
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
}

/// Content-Disposition value safe against header injection.
///
/// Control characters are dropped, quotes and backslashes replaced in the
/// plain `filename`, and non-ASCII names additionally carry an RFC 5987
/// `filename*` parameter.
fn content_disposition(filename: &str, disposition: Disposition) -> String {
    let kind = disposition.as_str();
    let needs_encoding =
        !filename.is_ascii() || filename.chars().any(|c| c.is_control() || c == '"' || c == '\\');
    if !needs_encoding {
        return format!("{kind}; filename=\"{filename}\"");
    }

    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() => c,
            _ => '_',
        })
        .collect();
    let encoded = urlencoding::encode(filename);
    format!("{kind}; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_are_quoted() {
        assert_eq!(
            content_disposition("report.pdf", Disposition::Attachment),
            "attachment; filename=\"report.pdf\""
        );
        assert_eq!(
            content_disposition("a.png", Disposition::Inline),
            "inline; filename=\"a.png\""
        );
    }

    #[test]
    fn unicode_and_quotes_are_encoded() {
        let value = content_disposition("résumé \"v2\".txt", Disposition::Attachment);
        assert!(value.starts_with("attachment; filename=\"r_sum_ _v2_.txt\""));
        assert!(value.contains("filename*=UTF-8''r%C3%A9sum%C3%A9%20%22v2%22.txt"));
        assert!(HeaderValue::from_str(&value).is_ok());
    }
}

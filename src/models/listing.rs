//! Listing requests and results, both the raw store page and the
//! folder-oriented view built on top of it.

use crate::models::object::ObjectInfo;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One call to the store's paginated list primitive.
#[derive(Clone, Debug, Default)]
pub struct ListRequest {
    pub prefix: String,
    pub delimiter: Option<String>,
    pub cursor: Option<String>,
    pub limit: usize,
}

/// One page returned by the store.
#[derive(Clone, Debug, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectInfo>,
    /// Distinct key prefixes grouped by the delimiter. A prefix may repeat
    /// across pages.
    pub delimited_prefixes: Vec<String>,
    pub truncated: bool,
    pub cursor: Option<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FolderEntry {
    pub name: String,
    pub path: String,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub key: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub content_type: Option<String>,
}

/// Single-level view of a folder.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FolderListing {
    pub prefix: String,
    pub parent: Option<String>,
    pub folders: Vec<FolderEntry>,
    pub files: Vec<FileEntry>,
}

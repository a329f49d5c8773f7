//! src/services/storage_service.rs
//!
//! StorageService, the concrete object store: metadata rows in SQLite and
//! payload bytes on local disk, sharded beneath
//! `base_path/{shard}/{shard}/{blob_id}`. Keys never touch the filesystem;
//! each write lands in a fresh blob so replacing an object never exposes a
//! half-written payload.

use crate::{
    models::{
        listing::{ListPage, ListRequest},
        object::{BodyStream, ObjectInfo, StoredObject},
    },
    services::object_store::{
        MAX_PAGE_SIZE, ObjectStore, StoreError, StoreResult, delimited_prefix,
    },
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use md5::Context;
use sqlx::{FromRow, QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{
    io::{self, ErrorKind},
    ops::Bound,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

/// SQLite caps bound parameters per statement; batch deletes are chunked below it.
const DELETE_CHUNK: usize = 500;

const OBJECT_COLUMNS: &str = "key, blob_id, content_type, size_bytes, etag, uploaded_at";

#[derive(FromRow, Debug)]
struct ObjectRow {
    key: String,
    blob_id: String,
    content_type: Option<String>,
    size_bytes: i64,
    etag: Option<String>,
    uploaded_at: DateTime<Utc>,
}

impl From<ObjectRow> for ObjectInfo {
    fn from(row: ObjectRow) -> Self {
        Self {
            key: row.key,
            size: row.size_bytes.max(0) as u64,
            uploaded_at: row.uploaded_at,
            content_type: row.content_type,
            etag: row.etag,
        }
    }
}

/// Object store backed by SQLite metadata and on-disk payloads.
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl StorageService {
    /// Create a new StorageService backed by the provided SQLite pool and
    /// using `base_path` as the root directory for object payloads.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Two-level shard directories taken from the leading hex digits of the
    /// blob id. Keeps the file count per directory small.
    fn blob_path(&self, blob_id: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(blob_id.get(0..2).unwrap_or("00"));
        path.push(blob_id.get(2..4).unwrap_or("00"));
        path.push(blob_id);
        path
    }

    async fn fetch_row(&self, key: &str) -> StoreResult<Option<ObjectRow>> {
        let row = sqlx::query_as::<_, ObjectRow>(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects WHERE key = ?"
        ))
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    /// Up to `limit` rows under `prefix` starting at `lower`, in key order.
    async fn fetch_rows(
        &self,
        prefix: &str,
        lower: &Bound<String>,
        limit: usize,
    ) -> StoreResult<Vec<ObjectRow>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {OBJECT_COLUMNS} FROM objects WHERE 1 = 1"
        ));

        if !prefix.is_empty() {
            // substr keeps `%` and `_` in keys literal, unlike LIKE.
            builder.push(" AND substr(key, 1, ");
            builder.push_bind(prefix.chars().count() as i64);
            builder.push(") = ");
            builder.push_bind(prefix.to_string());
        }

        match lower {
            Bound::Included(from) => {
                builder.push(" AND key >= ");
                builder.push_bind(from.clone());
            }
            Bound::Excluded(after) => {
                builder.push(" AND key > ");
                builder.push_bind(after.clone());
            }
            Bound::Unbounded => {}
        }

        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind(limit as i64);

        Ok(builder.build_query_as().fetch_all(&*self.db).await?)
    }

    /// Stream `body` into a new blob file.
    ///
    /// Writes to a temp file, fsyncs, then renames into place. Returns the
    /// size and hex MD5 of what was written. The temp file is removed on any
    /// failure.
    async fn write_blob(
        &self,
        blob_path: &Path,
        mut body: BodyStream<'_>,
    ) -> StoreResult<(i64, String)> {
        let parent = blob_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "blob path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        while let Some(chunk_res) = body.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, blob_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        Ok((size_bytes, format!("{:x}", digest.compute())))
    }

    /// Remove a blob file and prune the shard directories it leaves empty.
    async fn remove_blob(&self, blob_id: &str) {
        let file_path = self.blob_path(blob_id);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed blob {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("blob {} already missing", file_path.display());
            }
            Err(err) => {
                debug!("failed to remove blob {}: {}", file_path.display(), err);
                return;
            }
        }
        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }
    }

    /// Recursively remove empty directories up to the storage root.
    ///
    /// Stops when:
    /// - directory not empty
    /// - directory not found
    /// - reached root
    /// - encountered unexpected I/O errors
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for StorageService {
    /// Returns `None` if the row is missing or its blob vanished underneath
    /// a concurrent delete.
    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        let Some(row) = self.fetch_row(key).await? else {
            return Ok(None);
        };

        let file = match File::open(self.blob_path(&row.blob_id)).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::Io(err)),
        };

        Ok(Some(StoredObject {
            info: row.into(),
            body: ReaderStream::new(file).boxed(),
        }))
    }

    async fn head(&self, key: &str) -> StoreResult<Option<ObjectInfo>> {
        Ok(self.fetch_row(key).await?.map(Into::into))
    }

    /// Upserts the metadata row (overwrite semantics) after the payload is
    /// durable, then drops the blob of the replaced version.
    async fn put(
        &self,
        key: &str,
        body: BodyStream<'_>,
        content_type: Option<String>,
    ) -> StoreResult<ObjectInfo> {
        let blob_id = Uuid::new_v4().simple().to_string();
        let blob_path = self.blob_path(&blob_id);
        let (size_bytes, etag) = self.write_blob(&blob_path, body).await?;

        let previous = self.fetch_row(key).await?.map(|row| row.blob_id);

        let upserted = sqlx::query_as::<_, ObjectRow>(&format!(
            r#"
            INSERT INTO objects (key, blob_id, content_type, size_bytes, etag, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                blob_id = excluded.blob_id,
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                uploaded_at = excluded.uploaded_at
            RETURNING {OBJECT_COLUMNS}
            "#
        ))
        .bind(key)
        .bind(&blob_id)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match upserted {
            Ok(row) => {
                if let Some(old_blob) = previous.filter(|old| *old != blob_id) {
                    self.remove_blob(&old_blob).await;
                }
                Ok(row.into())
            }
            Err(err) => {
                self.remove_blob(&blob_id).await;
                Err(StoreError::Sqlx(err))
            }
        }
    }

    /// Deletes rows first so readers stop seeing the keys, then removes the
    /// payload files best-effort.
    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        for chunk in keys.chunks(DELETE_CHUNK) {
            let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM objects WHERE key IN (");
            let mut separated = builder.separated(", ");
            for key in chunk {
                separated.push_bind(key);
            }
            separated.push_unseparated(") RETURNING blob_id");

            let blobs: Vec<String> = builder
                .build_query_scalar()
                .fetch_all(&*self.db)
                .await?;
            debug!(requested = chunk.len(), removed = blobs.len(), "deleted object rows");

            for blob_id in blobs {
                self.remove_blob(&blob_id).await;
            }
        }
        Ok(())
    }

    /// List one page following ListObjectsV2-style rules:
    /// - prefix filtering
    /// - delimiter grouping, where each grouped prefix counts as one entry
    ///   and the scan jumps past everything beneath it
    /// - opaque continuation cursor (the last key or prefix handed out)
    /// - lexicographical ordering
    async fn list(&self, request: ListRequest) -> StoreResult<ListPage> {
        let limit = request.limit.clamp(1, MAX_PAGE_SIZE);
        let delimiter = request.delimiter.as_deref().filter(|d| !d.is_empty());

        let mut lower = match request.cursor.as_deref().map(decode_cursor) {
            None => Bound::Unbounded,
            Some(after) => match delimiter.and_then(|d| delimited_prefix(&after, &request.prefix, d)) {
                Some(grouped) if grouped == after => past_group(&grouped),
                _ => Bound::Excluded(after),
            },
        };

        let mut objects = Vec::new();
        let mut prefixes = Vec::new();
        let mut last_entry = None;
        let mut truncated = false;
        let mut queries = 0usize;

        'scan: loop {
            let handed_out = objects.len() + prefixes.len();
            let rows = self
                .fetch_rows(&request.prefix, &lower, limit - handed_out + 1)
                .await?;
            queries += 1;

            for row in rows {
                if objects.len() + prefixes.len() == limit {
                    truncated = true;
                    break 'scan;
                }
                if let Some(grouped) = delimiter.and_then(|d| delimited_prefix(&row.key, &request.prefix, d)) {
                    lower = past_group(&grouped);
                    last_entry = Some(grouped.clone());
                    prefixes.push(grouped);
                    continue 'scan;
                }
                lower = Bound::Excluded(row.key.clone());
                last_entry = Some(row.key.clone());
                objects.push(ObjectInfo::from(row));
            }
            break;
        }

        debug!(
            prefix = %request.prefix,
            objects = objects.len(),
            prefixes = prefixes.len(),
            queries,
            truncated,
            "listed page"
        );
        Ok(ListPage {
            objects,
            delimited_prefixes: prefixes,
            truncated,
            cursor: if truncated {
                last_entry.as_deref().map(encode_cursor)
            } else {
                None
            },
        })
    }

    /// Runs `SELECT 1` and a write/read/delete round trip under `base_path`.
    async fn ping(&self) -> StoreResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if one != 1 {
            return Err(StoreError::Unavailable(format!(
                "unexpected probe result: {one}"
            )));
        }

        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read_back = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read_back? != b"readyz" {
            return Err(StoreError::Unavailable("file content mismatch".into()));
        }
        Ok(())
    }
}

/// Lower bound that skips every key beginning with `grouped`: the smallest
/// string greater than all of them, found by bumping its last character.
fn past_group(grouped: &str) -> Bound<String> {
    let mut chars: Vec<char> = grouped.chars().collect();
    let bumped = chars.pop().and_then(|last| match last as u32 {
        0xD7FF => Some('\u{E000}'),
        code => char::from_u32(code + 1),
    });
    match bumped {
        Some(next) => {
            chars.push(next);
            Bound::Included(chars.into_iter().collect())
        }
        None => Bound::Excluded(grouped.to_string()),
    }
}

fn encode_cursor(key: &str) -> String {
    general_purpose::STANDARD.encode(key)
}

/// Falls back to the raw value for cursors that are not valid base64.
fn decode_cursor(cursor: &str) -> String {
    general_purpose::STANDARD
        .decode(cursor)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| cursor.to_string())
}

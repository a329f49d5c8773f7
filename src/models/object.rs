//! Represents an object (file or folder marker) held by the object store.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};
use std::io;

/// Payload bytes as they flow between the store and its callers.
pub type ByteStream = BodyStream<'static>;

/// Payload stream that may borrow from its source, such as a multipart
/// field still tied to its request.
pub type BodyStream<'a> = BoxStream<'a, io::Result<Bytes>>;

/// Metadata of a single object, as returned by `head` and `list`.
///
/// The payload itself is never cached alongside this struct.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    /// Flat key (path-like identifier).
    pub key: String,

    /// Payload size in bytes.
    pub size: u64,

    /// When the current version of the object was written.
    pub uploaded_at: DateTime<Utc>,

    /// Content type (MIME type), when known.
    pub content_type: Option<String>,

    /// MD5 checksum of the payload.
    pub etag: Option<String>,
}

/// An object opened for reading: metadata plus a payload stream.
pub struct StoredObject {
    pub info: ObjectInfo,
    pub body: ByteStream,
}

impl StoredObject {
    /// Buffer the whole payload in memory.
    pub async fn into_bytes(self) -> io::Result<Bytes> {
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        Ok(chunks.concat().into())
    }
}

/// Wrap an in-memory buffer as a single-chunk payload stream.
pub fn bytes_stream(bytes: impl Into<Bytes>) -> ByteStream {
    futures::stream::once(futures::future::ready(Ok(bytes.into()))).boxed()
}

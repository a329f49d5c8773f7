//! Adapter contracts for the two external stores: the flat object store and
//! the small counter store used for size accounting.

use crate::models::{
    listing::{ListPage, ListRequest},
    object::{BodyStream, ObjectInfo, StoredObject},
};
use async_trait::async_trait;
use std::io;
use thiserror::Error;

/// Largest page the list primitive hands out in one call.
pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Flat key/blob store with prefix + delimiter listing and cursor pagination.
///
/// There is no snapshot isolation: a multi-page listing may or may not observe
/// writes made while it runs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open an object for reading; `None` if the key is absent.
    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>>;

    /// Object metadata only; `None` if the key is absent.
    async fn head(&self, key: &str) -> StoreResult<Option<ObjectInfo>>;

    /// Create or fully replace the object at `key`, consuming `body` before
    /// returning.
    async fn put(
        &self,
        key: &str,
        body: BodyStream<'_>,
        content_type: Option<String>,
    ) -> StoreResult<ObjectInfo>;

    /// Remove every listed key. Absent keys are ignored.
    async fn delete(&self, keys: &[String]) -> StoreResult<()>;

    /// One page of keys starting with `request.prefix`, in lexicographic order.
    async fn list(&self, request: ListRequest) -> StoreResult<ListPage>;

    /// Cheap readiness probe.
    async fn ping(&self) -> StoreResult<()>;
}

/// Durable string key/value store holding a handful of scalars.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self, name: &str) -> StoreResult<Option<String>>;

    async fn put(&self, name: &str, value: &str) -> StoreResult<()>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Group `key` under the first delimiter following `prefix`, if any.
///
/// Returns the grouped prefix (`prefix` + segment + delimiter), or `None` when
/// the key sits directly under `prefix`.
pub(crate) fn delimited_prefix(key: &str, prefix: &str, delimiter: &str) -> Option<String> {
    let rest = key.strip_prefix(prefix)?;
    let pos = rest.find(delimiter)?;
    let mut combined = String::with_capacity(prefix.len() + pos + delimiter.len());
    combined.push_str(prefix);
    combined.push_str(&rest[..pos + delimiter.len()]);
    Some(combined)
}

#[cfg(test)]
mod tests {
    use super::delimited_prefix;

    #[test]
    fn groups_on_first_delimiter_after_prefix() {
        assert_eq!(
            delimited_prefix("a/b/c.txt", "a/", "/"),
            Some("a/b/".to_string())
        );
        assert_eq!(delimited_prefix("a/c.txt", "a/", "/"), None);
        assert_eq!(delimited_prefix("a/", "a/", "/"), None);
        assert_eq!(delimited_prefix("x/y", "", "/"), Some("x/".to_string()));
        assert_eq!(delimited_prefix("b/c", "a/", "/"), None);
    }
}

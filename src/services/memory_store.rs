//! In-process object and counter stores.
//!
//! Same contracts as the SQLite adapters, with a tunable page size so callers
//! can be driven across many pages, and write and delete fault injection for
//! exercising partial failures.

use crate::{
    models::{
        listing::{ListPage, ListRequest},
        object::{BodyStream, ObjectInfo, StoredObject, bytes_stream},
    },
    services::object_store::{
        CounterStore, MAX_PAGE_SIZE, ObjectStore, StoreError, StoreResult, delimited_prefix,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::TryStreamExt;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    ops::Bound,
    sync::Mutex,
};

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, (ObjectInfo, Bytes)>>,
    page_size: Option<usize>,
    failing_prefix: Mutex<Option<String>>,
    failing_delete_prefix: Mutex<Option<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap every page at `page_size` entries regardless of the request.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: Some(page_size.max(1)),
            ..Self::default()
        }
    }

    /// Make every `put` to a key under `prefix` fail as unavailable.
    pub fn fail_writes_under(&self, prefix: impl Into<String>) {
        *self.failing_prefix.lock().unwrap_or_else(|e| e.into_inner()) = Some(prefix.into());
    }

    /// Make `delete` stop with an error at the first key under `prefix`.
    /// Keys before it in the batch are already gone, like a committed chunk.
    pub fn fail_deletes_under(&self, prefix: impl Into<String>) {
        *self
            .failing_delete_prefix
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(prefix.into());
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, (ObjectInfo, Bytes)>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        Ok(self.lock().get(key).map(|(info, bytes)| StoredObject {
            info: info.clone(),
            body: bytes_stream(bytes.clone()),
        }))
    }

    async fn head(&self, key: &str) -> StoreResult<Option<ObjectInfo>> {
        Ok(self.lock().get(key).map(|(info, _)| info.clone()))
    }

    async fn put(
        &self,
        key: &str,
        body: BodyStream<'_>,
        content_type: Option<String>,
    ) -> StoreResult<ObjectInfo> {
        let chunks: Vec<Bytes> = body.try_collect().await?;
        let payload = Bytes::from(chunks.concat());

        let failing = self
            .failing_prefix
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if failing.is_some_and(|prefix| key.starts_with(&prefix)) {
            return Err(StoreError::Unavailable(format!("write to `{key}` rejected")));
        }

        let info = ObjectInfo {
            key: key.to_string(),
            size: payload.len() as u64,
            uploaded_at: Utc::now(),
            content_type,
            etag: Some(format!("{:x}", md5::compute(&payload))),
        };
        self.lock().insert(key.to_string(), (info.clone(), payload));
        Ok(info)
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        let failing = self
            .failing_delete_prefix
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let mut objects = self.lock();
        for key in keys {
            if failing.as_deref().is_some_and(|prefix| key.starts_with(prefix)) {
                return Err(StoreError::Unavailable(format!("delete of `{key}` rejected")));
            }
            objects.remove(key);
        }
        Ok(())
    }

    async fn list(&self, request: ListRequest) -> StoreResult<ListPage> {
        let mut limit = request.limit.clamp(1, MAX_PAGE_SIZE);
        if let Some(cap) = self.page_size {
            limit = limit.min(cap);
        }

        let objects = self.lock();
        let lower = match request.cursor.as_deref() {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Included(request.prefix.clone()),
        };
        let mut matched = objects
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(&request.prefix))
            .map(|(_, (info, _))| info.clone());

        let rows: Vec<ObjectInfo> = matched.by_ref().take(limit).collect();
        let truncated = matched.next().is_some();
        let cursor = if truncated {
            rows.last().map(|info| info.key.clone())
        } else {
            None
        };

        let mut page_objects = Vec::new();
        let mut prefixes = BTreeSet::new();
        for info in rows {
            if let Some(delim) = request.delimiter.as_deref() {
                if let Some(grouped) = delimited_prefix(&info.key, &request.prefix, delim) {
                    prefixes.insert(grouped);
                    continue;
                }
            }
            page_objects.push(info);
        }

        Ok(ListPage {
            objects: page_objects,
            delimited_prefixes: prefixes.into_iter().collect(),
            truncated,
            cursor,
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCounterStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, name: &str) -> StoreResult<Option<String>> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned())
    }

    async fn put(&self, name: &str, value: &str) -> StoreResult<()> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_are_capped_and_resumable() {
        let store = MemoryObjectStore::with_page_size(2);
        for key in ["a/1", "a/2", "a/3", "b/1"] {
            store.put(key, bytes_stream("x"), None).await.unwrap();
        }

        let request = ListRequest {
            prefix: "a/".into(),
            limit: 1000,
            ..Default::default()
        };
        let first = store.list(request.clone()).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        assert!(first.truncated);

        let second = store
            .list(ListRequest {
                cursor: first.cursor,
                ..request
            })
            .await
            .unwrap();
        assert_eq!(second.objects.len(), 1);
        assert_eq!(second.objects[0].key, "a/3");
        assert!(!second.truncated);
    }

    #[tokio::test]
    async fn injected_write_faults_only_hit_prefix() {
        let store = MemoryObjectStore::new();
        store.fail_writes_under("locked/");
        assert!(store.put("locked/x", bytes_stream("1"), None).await.is_err());
        assert!(store.put("open/x", bytes_stream("1"), None).await.is_ok());
        assert_eq!(store.keys(), vec!["open/x".to_string()]);
    }
}

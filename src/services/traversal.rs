//! Cursor-driven enumeration of every object under a prefix.
//!
//! All bucket-wide and subtree-wide work (delete, rename, move/copy, size
//! reconciliation, folder discovery) goes through [`PageCursor`] and
//! [`for_each_page`] rather than looping over the list primitive itself.

use crate::{
    models::{
        listing::{ListPage, ListRequest},
        object::ObjectInfo,
    },
    services::object_store::{MAX_PAGE_SIZE, ObjectStore, StoreError},
};
use tracing::debug;

/// Cursor over the pages of one listing, resuming from the store's
/// continuation token on each `next()`.
pub struct PageCursor<'a> {
    store: &'a dyn ObjectStore,
    prefix: String,
    delimiter: Option<String>,
    page_size: usize,
    cursor: Option<String>,
    exhausted: bool,
    pages_read: usize,
}

impl<'a> PageCursor<'a> {
    /// Recursive listing of every key starting with `prefix`.
    pub fn new(store: &'a dyn ObjectStore, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            delimiter: None,
            page_size: MAX_PAGE_SIZE,
            cursor: None,
            exhausted: false,
            pages_read: 0,
        }
    }

    /// Group keys on `delimiter` for a single-level listing.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Fetch the next page, or `None` once the store reports no more.
    pub async fn next(&mut self) -> Result<Option<ListPage>, StoreError> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self
            .store
            .list(ListRequest {
                prefix: self.prefix.clone(),
                delimiter: self.delimiter.clone(),
                cursor: self.cursor.clone(),
                limit: self.page_size,
            })
            .await?;
        self.pages_read += 1;

        match (page.truncated, page.cursor.clone()) {
            (true, Some(next)) => self.cursor = Some(next),
            _ => self.exhausted = true,
        }
        debug!(
            prefix = %self.prefix,
            page = self.pages_read,
            objects = page.objects.len(),
            prefixes = page.delimited_prefixes.len(),
            "listed page"
        );
        Ok(Some(page))
    }

    pub fn pages_read(&self) -> usize {
        self.pages_read
    }
}

/// Feed every page of a recursive listing under `prefix` to `visit`.
///
/// Stops at the first store error or the first error returned by `visit`.
pub async fn for_each_page<E, F>(
    store: &dyn ObjectStore,
    prefix: &str,
    page_size: usize,
    mut visit: F,
) -> Result<(), E>
where
    E: From<StoreError>,
    F: FnMut(ListPage) -> Result<(), E>,
{
    let mut cursor = PageCursor::new(store, prefix).with_page_size(page_size);
    while let Some(page) = cursor.next().await? {
        visit(page)?;
    }
    debug!(prefix, pages = cursor.pages_read(), "finished scan");
    Ok(())
}

/// Every object under `prefix`, accumulated across all pages.
pub async fn collect_objects(
    store: &dyn ObjectStore,
    prefix: &str,
    page_size: usize,
) -> Result<Vec<ObjectInfo>, StoreError> {
    let mut objects = Vec::new();
    for_each_page(store, prefix, page_size, |page| {
        objects.extend(page.objects);
        Ok::<_, StoreError>(())
    })
    .await?;
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::object::bytes_stream, services::memory_store::MemoryObjectStore};

    async fn seeded(page_size: usize, count: usize) -> MemoryObjectStore {
        let store = MemoryObjectStore::with_page_size(page_size);
        for i in 0..count {
            store
                .put(&format!("tree/{i:03}"), bytes_stream("x"), None)
                .await
                .unwrap();
        }
        store.put("other/1", bytes_stream("x"), None).await.unwrap();
        store
    }

    #[tokio::test]
    async fn collects_across_many_pages() {
        let store = seeded(3, 10).await;
        let objects = collect_objects(&store, "tree/", 1000).await.unwrap();
        assert_eq!(objects.len(), 10);
        assert!(objects.iter().all(|o| o.key.starts_with("tree/")));
    }

    #[tokio::test]
    async fn cursor_counts_pages_until_exhausted() {
        let store = seeded(4, 10).await;
        let mut cursor = PageCursor::new(&store, "tree/");
        let mut seen = 0;
        while let Some(page) = cursor.next().await.unwrap() {
            seen += page.objects.len();
        }
        assert_eq!(seen, 10);
        assert_eq!(cursor.pages_read(), 3);
        assert!(cursor.next().await.unwrap().is_none());
        assert_eq!(cursor.pages_read(), 3);
    }

    #[tokio::test]
    async fn empty_prefix_yields_one_empty_page() {
        let store = MemoryObjectStore::new();
        let mut pages = 0;
        for_each_page(&store, "missing/", 10, |page| {
            assert!(page.objects.is_empty());
            pages += 1;
            Ok::<_, StoreError>(())
        })
        .await
        .unwrap();
        assert_eq!(pages, 1);
    }

    #[tokio::test]
    async fn visitor_error_stops_the_scan() {
        let store = seeded(2, 6).await;
        let mut pages = 0;
        let result = for_each_page(&store, "tree/", 10, |_| {
            pages += 1;
            if pages == 2 {
                Err(StoreError::Unavailable("stop".into()))
            } else {
                Ok(())
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(pages, 2);
    }
}

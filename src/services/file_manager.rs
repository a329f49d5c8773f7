//! Folder operations emulated over the flat object store.
//!
//! Every mutation here is a sequence of independent store calls with no
//! transaction around it. A failure partway leaves whatever already happened
//! in place: a half-moved folder keeps both its old and new copies until the
//! operation is retried. Batch operations keep going past a failed target and
//! report it in a [`BatchReport`].

use crate::{
    models::{
        listing::{FileEntry, FolderEntry, FolderListing},
        object::{BodyStream, ObjectInfo, StoredObject, bytes_stream},
        path::{self, ObjectPath, PathError, PathKind},
    },
    services::{
        object_store::{MAX_PAGE_SIZE, ObjectStore, StoreError},
        size_ledger::{SizeLedger, SizeReading},
        traversal::{PageCursor, collect_objects, for_each_page},
    },
};
use bytes::Bytes;
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    io::ErrorKind,
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum FsError {
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("object store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    #[error("{} of the requested objects failed", .0.failed.len())]
    PartialFailure(BatchReport),
}

impl From<PathError> for FsError {
    fn from(err: PathError) -> Self {
        FsError::InvalidArgument(err.to_string())
    }
}

pub type FsResult<T> = Result<T, FsError>;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedTarget {
    pub key: String,
    pub error: String,
}

/// Outcome of a multi-target operation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Requested keys that were fully processed.
    pub completed: Vec<String>,
    /// Requested keys that did not exist and were passed over.
    pub skipped: Vec<String>,
    /// Individual keys whose step failed.
    pub failed: Vec<FailedTarget>,
    /// Objects written or removed.
    pub objects: usize,
    /// Payload bytes covered by `objects`.
    pub bytes: u64,
}

impl BatchReport {
    fn fail(&mut self, key: impl Into<String>, error: impl ToString) {
        self.failed.push(FailedTarget {
            key: key.into(),
            error: error.to_string(),
        });
    }

    fn into_result(self) -> FsResult<Self> {
        if self.failed.is_empty() {
            Ok(self)
        } else {
            Err(FsError::PartialFailure(self))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Move,
    Copy,
}

#[derive(Clone)]
pub struct FileManager {
    store: Arc<dyn ObjectStore>,
    ledger: SizeLedger,
    page_size: usize,
}

impl FileManager {
    pub fn new(store: Arc<dyn ObjectStore>, ledger: SizeLedger) -> Self {
        Self {
            store,
            ledger,
            page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn ledger(&self) -> &SizeLedger {
        &self.ledger
    }

    /// Immediate children of `prefix`: sub-folders from the delimiter
    /// grouping, and files that are neither folder markers nor empty.
    pub async fn list(&self, prefix: &str) -> FsResult<FolderListing> {
        let folder = ObjectPath::folder(prefix)?;
        let mut cursor = PageCursor::new(self.store.as_ref(), folder.key())
            .with_delimiter("/")
            .with_page_size(self.page_size);

        let mut folders = BTreeSet::new();
        let mut files = Vec::new();
        while let Some(page) = cursor.next().await? {
            folders.extend(page.delimited_prefixes);
            files.extend(
                page.objects
                    .into_iter()
                    .filter(|object| !path::is_folder(&object.key) && object.size > 0)
                    .map(|object| FileEntry {
                        name: path::display_name(&object.key, folder.key()).to_string(),
                        key: object.key,
                        size: object.size,
                        uploaded_at: object.uploaded_at,
                        content_type: object.content_type,
                    }),
            );
        }

        Ok(FolderListing {
            prefix: folder.key().to_string(),
            parent: (!folder.is_root()).then(|| path::parent_of(folder.key()).to_string()),
            folders: folders
                .into_iter()
                .map(|key| FolderEntry {
                    name: path::display_name(&key, folder.key()).to_string(),
                    path: key,
                })
                .collect(),
            files,
        })
    }

    /// Write a zero-byte marker at `path/`. Re-creating an existing folder
    /// simply rewrites its marker.
    pub async fn create_folder(&self, path: &str) -> FsResult<ObjectInfo> {
        let folder = ObjectPath::folder(path)?;
        if folder.is_root() {
            return Err(FsError::InvalidArgument(
                "folder path must not be empty".into(),
            ));
        }
        let marker = self
            .store
            .put(folder.key(), bytes_stream(Bytes::new()), None)
            .await?;
        info!(folder = %folder, "created folder");
        Ok(marker)
    }

    /// Store an uploaded file as `folder/file_name`, replacing any existing
    /// object at that key.
    ///
    /// A body stream failing with `InvalidData` is the client's fault and
    /// surfaces as `InvalidArgument`; other failures mean the store is down.
    pub async fn upload(
        &self,
        folder: &str,
        file_name: &str,
        body: BodyStream<'_>,
        content_type: Option<String>,
    ) -> FsResult<ObjectInfo> {
        let folder = ObjectPath::folder(folder)?;
        if file_name.is_empty() || file_name.contains('/') {
            return Err(FsError::InvalidArgument(format!(
                "invalid file name `{file_name}`"
            )));
        }
        let target = ObjectPath::parse(&format!("{}{}", folder.key(), file_name))?;

        let previous = self
            .store
            .head(target.key())
            .await?
            .map_or(0, |info| info.size);
        let info = self
            .store
            .put(target.key(), body, content_type)
            .await
            .map_err(|err| match err {
                StoreError::Io(io) if io.kind() == ErrorKind::InvalidData => {
                    FsError::InvalidArgument(format!("upload body rejected: {io}"))
                }
                other => FsError::StoreUnavailable(other),
            })?;

        self.ledger
            .schedule_adjust(info.size as i64 - previous as i64);
        info!(key = %target, size = info.size, "uploaded object");
        Ok(info)
    }

    /// Open a file for preview or download.
    pub async fn read(&self, key: &str) -> FsResult<StoredObject> {
        let target = ObjectPath::parse(key)?;
        if target.kind() == PathKind::Folder {
            return Err(FsError::InvalidArgument(format!(
                "`{target}` is a folder"
            )));
        }
        self.store
            .get(target.key())
            .await?
            .ok_or_else(|| FsError::NotFound(key.to_string()))
    }

    /// Delete files and whole folders in one batch delete.
    ///
    /// The bytes about to be freed are summed before anything is removed so
    /// the size ledger can be decremented by the same amount afterwards. If
    /// the store gives up partway, keys that survived are reported as failed
    /// and only the bytes actually freed are subtracted.
    pub async fn delete(&self, keys: &[String]) -> FsResult<BatchReport> {
        let targets = parse_targets(keys)?;
        let mut report = BatchReport::default();
        let mut doomed: BTreeMap<String, u64> = BTreeMap::new();

        for target in targets {
            match target.kind() {
                PathKind::File => match self.store.head(target.key()).await {
                    Ok(Some(info)) => {
                        doomed.insert(info.key, info.size);
                        report.completed.push(target.key().to_string());
                    }
                    Ok(None) => {
                        doomed.entry(target.key().to_string()).or_insert(0);
                        report.skipped.push(target.key().to_string());
                    }
                    Err(err) => report.fail(target.key(), err),
                },
                PathKind::Folder => {
                    match collect_objects(self.store.as_ref(), target.key(), self.page_size).await
                    {
                        Ok(objects) if objects.is_empty() => {
                            report.skipped.push(target.key().to_string());
                        }
                        Ok(objects) => {
                            for object in objects {
                                let size = if path::is_folder(&object.key) { 0 } else { object.size };
                                doomed.insert(object.key, size);
                            }
                            report.completed.push(target.key().to_string());
                        }
                        Err(err) => report.fail(target.key(), err),
                    }
                }
            }
        }

        if !doomed.is_empty() {
            let keys: Vec<String> = doomed.keys().cloned().collect();
            if let Err(err) = self.store.delete(&keys).await {
                warn!(error = %err, objects = keys.len(), "batch delete stopped partway");
                self.drop_survivors(&mut doomed, &err, &mut report).await;
            }
        }
        report.objects = doomed.len();
        report.bytes = doomed.values().sum();

        self.ledger.schedule_adjust(-(report.bytes as i64));
        info!(
            targets = keys.len(),
            objects = report.objects,
            bytes = report.bytes,
            failed = report.failed.len(),
            "deleted objects"
        );
        report.into_result()
    }

    /// Rename a file, or every object beneath a folder.
    ///
    /// A missing file is `NotFound`; a folder with no descendants is a
    /// successful no-op.
    pub async fn rename(&self, old_key: &str, new_key: &str) -> FsResult<BatchReport> {
        let source = ObjectPath::parse(old_key)?;
        let mut report = BatchReport::default();

        match source.kind() {
            PathKind::File => {
                let target = ObjectPath::parse(new_key)?;
                if target.kind() == PathKind::Folder {
                    return Err(FsError::InvalidArgument(format!(
                        "cannot rename file `{source}` to folder path `{target}`"
                    )));
                }
                if target == source {
                    if self.store.head(source.key()).await?.is_none() {
                        return Err(FsError::NotFound(old_key.to_string()));
                    }
                } else {
                    let info = self
                        .relocate_object(source.key(), target.key(), TransferMode::Move)
                        .await?
                        .ok_or_else(|| FsError::NotFound(old_key.to_string()))?;
                    report.objects = 1;
                    report.bytes = info.size;
                }
            }
            PathKind::Folder => {
                let target = ObjectPath::folder(new_key)?;
                if target.is_root() {
                    return Err(FsError::InvalidArgument(
                        "cannot rename a folder to the root".into(),
                    ));
                }
                if target != source {
                    if source.contains(&target) {
                        return Err(FsError::InvalidArgument(format!(
                            "cannot move folder `{source}` inside itself"
                        )));
                    }
                    self.transfer_tree(&source, &target, TransferMode::Move, &mut report)
                        .await?;
                }
            }
        }

        report.completed.push(source.key().to_string());
        info!(
            from = %source,
            to = new_key,
            objects = report.objects,
            failed = report.failed.len(),
            "renamed"
        );
        report.into_result()
    }

    /// Move or copy each key into `destination`, keeping its final name.
    ///
    /// Missing sources are skipped. Copies grow the size ledger by the bytes
    /// written; moves leave it untouched.
    pub async fn transfer(
        &self,
        keys: &[String],
        destination: &str,
        mode: TransferMode,
    ) -> FsResult<BatchReport> {
        let targets = parse_targets(keys)?;
        let dest = ObjectPath::folder(destination)?;
        let mut report = BatchReport::default();

        for source in targets {
            let target = source.relocated_into(&dest);
            if target == source {
                debug!(key = %source, "source already in destination");
                report.skipped.push(source.key().to_string());
                continue;
            }

            match source.kind() {
                PathKind::File => {
                    match self.relocate_object(source.key(), target.key(), mode).await {
                        Ok(Some(info)) => {
                            report.objects += 1;
                            report.bytes += info.size;
                            report.completed.push(source.key().to_string());
                        }
                        Ok(None) => report.skipped.push(source.key().to_string()),
                        Err(err) => report.fail(source.key(), err),
                    }
                }
                PathKind::Folder => {
                    if source.contains(&dest) {
                        report.fail(
                            source.key(),
                            format!("cannot place folder `{source}` inside itself"),
                        );
                        continue;
                    }
                    let failures_before = report.failed.len();
                    match self.transfer_tree(&source, &target, mode, &mut report).await {
                        Ok(false) => report.skipped.push(source.key().to_string()),
                        Ok(true) if report.failed.len() == failures_before => {
                            report.completed.push(source.key().to_string());
                        }
                        Ok(true) => {}
                        Err(err) => report.fail(source.key(), err),
                    }
                }
            }
        }

        if mode == TransferMode::Copy {
            self.ledger.schedule_adjust(report.bytes as i64);
        }
        info!(
            ?mode,
            destination = %dest,
            objects = report.objects,
            bytes = report.bytes,
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "transferred objects"
        );
        report.into_result()
    }

    /// Every folder path implied by any key in the store, deduplicated and
    /// sorted. Scans the whole bucket.
    pub async fn list_all_folders(&self) -> FsResult<Vec<String>> {
        let mut folders = BTreeSet::new();
        for_each_page(self.store.as_ref(), "", self.page_size, |page| {
            for object in &page.objects {
                folders.extend(path::ancestor_folders(&object.key).map(str::to_string));
            }
            Ok::<_, FsError>(())
        })
        .await?;
        Ok(folders.into_iter().collect())
    }

    /// Approximate total size. Counter failures are logged and read as
    /// unknown rather than failing the caller.
    pub async fn total_size(&self) -> Option<SizeReading> {
        match self.ledger.get().await {
            Ok(reading) => Some(reading),
            Err(err) => {
                warn!(error = %err, "could not read size counter");
                None
            }
        }
    }

    /// After a failed batch delete, move every key that still exists out of
    /// `doomed` and into the failed list. Only the bytes actually freed stay
    /// in `doomed`. A target that still has survivors is no longer completed.
    async fn drop_survivors(
        &self,
        doomed: &mut BTreeMap<String, u64>,
        cause: &StoreError,
        report: &mut BatchReport,
    ) {
        let mut survivors = Vec::new();
        for key in doomed.keys() {
            match self.store.head(key).await {
                Ok(None) => {}
                Ok(Some(_)) => survivors.push((key.clone(), cause.to_string())),
                Err(err) => survivors.push((key.clone(), err.to_string())),
            }
        }

        for (key, error) in survivors {
            doomed.remove(&key);
            report
                .completed
                .retain(|target| !covers(target, &key));
            report.fail(key, error);
        }
    }

    /// Copy one object to `to`, deleting `from` afterwards when moving.
    /// Returns `None` if `from` no longer exists.
    async fn relocate_object(
        &self,
        from: &str,
        to: &str,
        mode: TransferMode,
    ) -> Result<Option<ObjectInfo>, StoreError> {
        let Some(object) = self.store.get(from).await? else {
            return Ok(None);
        };
        let content_type = object.info.content_type.clone();
        let written = self.store.put(to, object.body, content_type).await?;
        if mode == TransferMode::Move {
            self.store.delete(&[from.to_string()]).await?;
        }
        debug!(from, to, ?mode, "relocated object");
        Ok(Some(written))
    }

    /// Rewrite every object under `source` beneath `target`.
    ///
    /// Descendants are enumerated up front so writes into the destination
    /// never feed back into the scan. Per-object failures land in `report`;
    /// returns `false` when `source` had no descendants at all.
    async fn transfer_tree(
        &self,
        source: &ObjectPath,
        target: &ObjectPath,
        mode: TransferMode,
        report: &mut BatchReport,
    ) -> Result<bool, StoreError> {
        let objects = collect_objects(self.store.as_ref(), source.key(), self.page_size).await?;
        if objects.is_empty() {
            return Ok(false);
        }

        for object in objects {
            let suffix = &object.key[source.key().len()..];
            let to = format!("{}{}", target.key(), suffix);
            match self.relocate_object(&object.key, &to, mode).await {
                Ok(Some(info)) => {
                    report.objects += 1;
                    report.bytes += info.size;
                }
                Ok(None) => debug!(key = %object.key, "object vanished before relocation"),
                Err(err) => report.fail(object.key, err),
            }
        }
        Ok(true)
    }
}

/// Parse every requested key, keeping the first occurrence of duplicates.
fn parse_targets(keys: &[String]) -> FsResult<Vec<ObjectPath>> {
    if keys.is_empty() {
        return Err(FsError::InvalidArgument("no keys given".into()));
    }
    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(keys.len());
    for key in keys {
        let target = ObjectPath::parse(key)?;
        if seen.insert(target.clone()) {
            targets.push(target);
        }
    }
    Ok(targets)
}

/// Whether requested `target` names `key` itself or a folder holding it.
fn covers(target: &str, key: &str) -> bool {
    if path::is_folder(target) {
        key.starts_with(target)
    } else {
        key == target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tree::FolderTree;
    use crate::services::{
        background::BackgroundTasks,
        memory_store::{MemoryCounterStore, MemoryObjectStore},
        size_ledger::CounterState,
    };

    struct Fixture {
        files: FileManager,
        store: Arc<MemoryObjectStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryObjectStore::with_page_size(3));
            let ledger = SizeLedger::new(
                Arc::new(MemoryCounterStore::new()),
                store.clone(),
                BackgroundTasks::new(),
            );
            Self {
                files: FileManager::new(store.clone(), ledger),
                store,
            }
        }

        async fn put(&self, key: &str, body: &'static str, content_type: Option<&str>) {
            self.store
                .put(key, bytes_stream(body), content_type.map(str::to_string))
                .await
                .unwrap();
        }

        async fn body(&self, key: &str) -> Option<Bytes> {
            match self.store.get(key).await.unwrap() {
                Some(object) => Some(object.into_bytes().await.unwrap()),
                None => None,
            }
        }

        /// Let pending adjustments land, then reconcile to an exact total.
        async fn settle(&self) -> u64 {
            self.files.ledger().tasks().drain().await;
            self.files.ledger().reconcile().await.unwrap()
        }

        /// Total as currently cached, after pending adjustments land.
        async fn current(&self) -> u64 {
            self.files.ledger().tasks().drain().await;
            let reading = self.files.ledger().get().await.unwrap();
            assert_eq!(reading.state, CounterState::Cached);
            reading.total_size
        }

        fn keys_under(&self, prefix: &str) -> Vec<String> {
            self.store
                .keys()
                .into_iter()
                .filter(|k| k.starts_with(prefix))
                .collect()
        }
    }

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn list_splits_folders_and_files() {
        let fx = Fixture::new();
        fx.put("docs/", "", None).await;
        fx.put("docs/a.txt", "aaa", None).await;
        fx.put("docs/empty.txt", "", None).await;
        fx.put("docs/sub/", "", None).await;
        fx.put("docs/deep/x/y.txt", "y", None).await;
        fx.put("other.txt", "o", None).await;

        let listing = fx.files.list("docs").await.unwrap();
        assert_eq!(listing.prefix, "docs/");
        assert_eq!(listing.parent.as_deref(), Some(""));
        let folders: Vec<_> = listing.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(folders, vec!["deep", "sub"]);
        let files: Vec<_> = listing.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(files, vec!["a.txt"]);

        let root = fx.files.list("").await.unwrap();
        assert!(root.parent.is_none());
        assert_eq!(root.folders.len(), 1);
        assert_eq!(root.files[0].key, "other.txt");
    }

    #[tokio::test]
    async fn create_folder_is_idempotent() {
        let fx = Fixture::new();
        fx.files.create_folder("a").await.unwrap();
        fx.files.create_folder("a/").await.unwrap();
        assert_eq!(fx.store.keys(), vec!["a/".to_string()]);
        assert!(matches!(
            fx.files.create_folder("").await,
            Err(FsError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn delete_folder_removes_every_descendant() {
        let fx = Fixture::new();
        for key in ["a/", "a/1", "a/2", "a/b/", "a/b/3", "a/b/c/4", "keep/5"] {
            fx.put(key, "12", None).await;
        }
        fx.settle().await;

        let report = fx.files.delete(&keys(&["a/"])).await.unwrap();
        assert_eq!(report.objects, 6);
        assert_eq!(report.bytes, 8);
        assert!(fx.keys_under("a/").is_empty());
        assert_eq!(fx.store.keys(), vec!["keep/5".to_string()]);

        let folders = fx.files.list_all_folders().await.unwrap();
        assert_eq!(folders, vec!["keep/".to_string()]);
    }

    #[tokio::test]
    async fn delete_counts_overlapping_targets_once() {
        let fx = Fixture::new();
        fx.put("a/f", "12345", None).await;
        let report = fx.files.delete(&keys(&["a/", "a/f"])).await.unwrap();
        assert_eq!(report.bytes, 5);
        assert_eq!(report.objects, 1);
    }

    #[tokio::test]
    async fn delete_stopped_partway_reports_survivors() {
        let fx = Fixture::new();
        fx.put("a/1", "12345", None).await;
        fx.put("a/2", "67890", None).await;
        assert_eq!(fx.settle().await, 10);
        fx.store.fail_deletes_under("a/2");

        let err = fx.files.delete(&keys(&["a/"])).await.unwrap_err();
        let report = match err {
            FsError::PartialFailure(report) => report,
            other => panic!("expected partial failure, got {other:?}"),
        };
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].key, "a/2");
        assert!(report.completed.is_empty());
        assert_eq!(report.objects, 1);
        assert_eq!(report.bytes, 5);

        assert_eq!(fx.store.keys(), vec!["a/2".to_string()]);
        assert_eq!(fx.current().await, 5);
    }

    #[tokio::test]
    async fn duplicate_targets_are_processed_once() {
        let fx = Fixture::new();
        fx.put("a/f.txt", "abc", None).await;
        fx.settle().await;

        let report = fx
            .files
            .transfer(&keys(&["a/f.txt", "a/f.txt"]), "b/", TransferMode::Copy)
            .await
            .unwrap();
        assert_eq!(report.objects, 1);
        assert_eq!(report.completed, keys(&["a/f.txt"]));
        assert_eq!(fx.current().await, 6);
    }

    #[tokio::test]
    async fn delete_rejects_malformed_keys_before_touching_store() {
        let fx = Fixture::new();
        fx.put("a/f", "1", None).await;
        let err = fx.files.delete(&keys(&["a/f", "../x"])).await.unwrap_err();
        assert!(matches!(err, FsError::InvalidArgument(_)));
        assert_eq!(fx.store.len(), 1);
        assert!(matches!(
            fx.files.delete(&[]).await,
            Err(FsError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn rename_file_round_trips() {
        let fx = Fixture::new();
        fx.put("a/f.txt", "payload", Some("text/plain")).await;

        fx.files.rename("a/f.txt", "a/g.txt").await.unwrap();
        assert!(fx.body("a/f.txt").await.is_none());
        fx.files.rename("a/g.txt", "a/f.txt").await.unwrap();

        let info = fx.store.head("a/f.txt").await.unwrap().unwrap();
        assert_eq!(info.content_type.as_deref(), Some("text/plain"));
        assert_eq!(fx.body("a/f.txt").await.unwrap(), Bytes::from("payload"));
        assert_eq!(fx.store.len(), 1);
    }

    #[tokio::test]
    async fn rename_missing_file_is_not_found() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.files.rename("nope.txt", "x.txt").await,
            Err(FsError::NotFound(_))
        ));
        assert!(matches!(
            fx.files.rename("a.txt", "dir/").await,
            Err(FsError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn rename_onto_itself_still_requires_the_file() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.files.rename("ghost.txt", "ghost.txt").await,
            Err(FsError::NotFound(_))
        ));

        fx.put("real.txt", "abc", None).await;
        let report = fx.files.rename("real.txt", "real.txt").await.unwrap();
        assert_eq!(report.completed, keys(&["real.txt"]));
        assert_eq!(report.objects, 0);
        assert_eq!(fx.body("real.txt").await.unwrap(), Bytes::from("abc"));
    }

    #[tokio::test]
    async fn rename_folder_moves_all_descendants() {
        let fx = Fixture::new();
        let originals = ["old/", "old/1", "old/2", "old/x/", "old/x/3", "old/x/y/4", "old/5"];
        for key in originals {
            fx.put(key, "z", Some("text/plain")).await;
        }

        let report = fx.files.rename("old/", "new").await.unwrap();
        assert_eq!(report.objects, originals.len());
        assert!(fx.keys_under("old/").is_empty());
        assert_eq!(fx.keys_under("new/").len(), originals.len());
        let info = fx.store.head("new/x/y/4").await.unwrap().unwrap();
        assert_eq!(info.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn rename_empty_folder_is_noop() {
        let fx = Fixture::new();
        let report = fx.files.rename("ghost/", "spirit/").await.unwrap();
        assert_eq!(report.objects, 0);
        assert!(fx.store.is_empty());
    }

    #[tokio::test]
    async fn rename_folder_into_itself_is_rejected() {
        let fx = Fixture::new();
        fx.put("a/1", "1", None).await;
        assert!(matches!(
            fx.files.rename("a/", "a/b/").await,
            Err(FsError::InvalidArgument(_))
        ));
        assert_eq!(fx.store.keys(), vec!["a/1".to_string()]);
    }

    #[tokio::test]
    async fn copy_keeps_source_and_grows_total() {
        let fx = Fixture::new();
        fx.put("a/f.txt", "0123456789", Some("text/plain")).await;
        let before = fx.settle().await;

        let report = fx
            .files
            .transfer(&keys(&["a/f.txt"]), "b/", TransferMode::Copy)
            .await
            .unwrap();
        assert_eq!(report.bytes, 10);

        assert_eq!(fx.body("a/f.txt").await.unwrap(), Bytes::from("0123456789"));
        assert_eq!(fx.body("b/f.txt").await.unwrap(), Bytes::from("0123456789"));
        let copied = fx.store.head("b/f.txt").await.unwrap().unwrap();
        assert_eq!(copied.content_type.as_deref(), Some("text/plain"));
        assert_eq!(fx.current().await, before + 10);
    }

    #[tokio::test]
    async fn move_relocates_without_changing_total() {
        let fx = Fixture::new();
        fx.put("a/f.txt", "abc", None).await;
        let before = fx.settle().await;

        fx.files
            .transfer(&keys(&["a/f.txt"]), "b", TransferMode::Move)
            .await
            .unwrap();
        assert!(fx.body("a/f.txt").await.is_none());
        assert_eq!(fx.body("b/f.txt").await.unwrap(), Bytes::from("abc"));
        assert_eq!(fx.current().await, before);
    }

    #[tokio::test]
    async fn transfer_folder_keeps_relative_layout() {
        let fx = Fixture::new();
        for key in ["src/", "src/1", "src/in/2", "src/in/deeper/3"] {
            fx.put(key, "x", None).await;
        }
        fx.files
            .transfer(&keys(&["src/"]), "dest/", TransferMode::Copy)
            .await
            .unwrap();
        assert_eq!(
            fx.keys_under("dest/"),
            keys(&["dest/src/", "dest/src/1", "dest/src/in/2", "dest/src/in/deeper/3"])
        );
        assert_eq!(fx.keys_under("src/").len(), 4);
    }

    #[tokio::test]
    async fn transfer_skips_missing_sources() {
        let fx = Fixture::new();
        fx.put("a/real", "r", None).await;
        let report = fx
            .files
            .transfer(&keys(&["a/ghost", "a/real", "nothing/"]), "b/", TransferMode::Move)
            .await
            .unwrap();
        assert_eq!(report.completed, keys(&["a/real"]));
        assert_eq!(report.skipped, keys(&["a/ghost", "nothing/"]));
        assert_eq!(fx.store.keys(), keys(&["b/real"]));
    }

    #[tokio::test]
    async fn transfer_reports_partial_failure_without_rollback() {
        let fx = Fixture::new();
        fx.put("a/ok", "1", None).await;
        fx.put("a/also", "2", None).await;
        fx.store.fail_writes_under("locked/");

        let moved = fx
            .files
            .transfer(&keys(&["a/ok"]), "b/", TransferMode::Move)
            .await;
        assert!(moved.is_ok());

        let err = fx
            .files
            .transfer(&keys(&["a/also", "b/ok"]), "locked/", TransferMode::Move)
            .await
            .unwrap_err();
        match err {
            FsError::PartialFailure(report) => {
                assert_eq!(report.failed.len(), 2);
                assert!(report.completed.is_empty());
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
        assert_eq!(fx.store.keys(), keys(&["a/also", "b/ok"]));
    }

    #[tokio::test]
    async fn transfer_continues_past_failed_target() {
        let fx = Fixture::new();
        fx.put("a/1", "1", None).await;
        fx.put("z/2", "2", None).await;
        let err = fx
            .files
            .transfer(&keys(&["a/", "z/2"]), "a/inner/", TransferMode::Copy)
            .await
            .unwrap_err();
        let FsError::PartialFailure(report) = err else {
            panic!("expected partial failure");
        };
        assert_eq!(report.failed[0].key, "a/");
        assert_eq!(report.completed, keys(&["z/2"]));
        assert!(fx.body("a/inner/2").await.is_some());
    }

    #[tokio::test]
    async fn list_all_folders_infers_ancestors() {
        let fx = Fixture::new();
        for key in ["x/y/z/file", "empty/", "top.txt", "x/w/"] {
            fx.put(key, "1", None).await;
        }
        let folders = fx.files.list_all_folders().await.unwrap();
        assert_eq!(folders, keys(&["empty/", "x/", "x/w/", "x/y/", "x/y/z/"]));

        let tree = FolderTree::from_paths(&folders);
        assert!(tree.child("x").unwrap().child("y").unwrap().child("z").is_some());
    }

    #[tokio::test]
    async fn upload_adjusts_by_size_difference() {
        let fx = Fixture::new();
        fx.settle().await;
        fx.files
            .upload("docs", "report.pdf", bytes_stream(vec![7u8; 1000]), None)
            .await
            .unwrap();
        assert_eq!(fx.current().await, 1000);

        fx.files
            .upload("docs/", "report.pdf", bytes_stream(vec![7u8; 400]), None)
            .await
            .unwrap();
        assert_eq!(fx.current().await, 400);

        assert!(matches!(
            fx.files.upload("docs", "a/b", bytes_stream("x"), None).await,
            Err(FsError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn upload_with_broken_body_is_rejected() {
        use futures::StreamExt;

        let fx = Fixture::new();
        fx.settle().await;
        let body = futures::stream::iter(vec![
            Ok(Bytes::from("part")),
            Err(std::io::Error::new(ErrorKind::InvalidData, "stream cut short")),
        ])
        .boxed();

        assert!(matches!(
            fx.files.upload("docs", "cut.bin", body, None).await,
            Err(FsError::InvalidArgument(_))
        ));
        assert!(fx.store.is_empty());
        assert_eq!(fx.current().await, 0);
    }

    #[tokio::test]
    async fn read_rejects_folders_and_missing_keys() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.files.read("docs/").await,
            Err(FsError::InvalidArgument(_))
        ));
        assert!(matches!(
            fx.files.read("docs/none").await,
            Err(FsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_more_than_cached_clamps_at_zero() {
        let fx = Fixture::new();
        fx.put("big", "0123456789", None).await;
        fx.settle().await;
        fx.files.ledger().adjust(-7).await.unwrap();

        fx.files.delete(&keys(&["big"])).await.unwrap();
        assert_eq!(fx.current().await, 0);
    }
}

//! Approximate aggregate size of every object in the store.
//!
//! The ledger keeps two scalars in the counter store: `totalSize` and
//! `lastRecalculated`. Mutations nudge `totalSize` with unsynchronized
//! read-modify-write adjustments, so concurrent writers can lose updates.
//! A full scan ([`SizeLedger::reconcile`]) is the only source of an exact
//! value; it runs lazily when a read finds the counter missing or stale.

use crate::services::{
    background::BackgroundTasks,
    object_store::{CounterStore, MAX_PAGE_SIZE, ObjectStore, StoreError},
    traversal::for_each_page,
};
use crate::models::path::is_folder;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::{debug, info, warn};

pub const TOTAL_SIZE: &str = "totalSize";
pub const LAST_RECALCULATED: &str = "lastRecalculated";

/// Age after which a cached total triggers a background reconciliation.
pub const DEFAULT_STALE_AFTER_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CounterState {
    /// No total has ever been written.
    Uninitialized,
    /// A total exists and was reconciled recently enough.
    Cached,
    /// A total exists but its last reconciliation is too old or unknown.
    Stale,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeReading {
    pub total_size: u64,
    pub last_recalculated: Option<DateTime<Utc>>,
    pub state: CounterState,
}

#[derive(Clone)]
pub struct SizeLedger {
    counters: Arc<dyn CounterStore>,
    objects: Arc<dyn ObjectStore>,
    tasks: BackgroundTasks,
    stale_after: TimeDelta,
    page_size: usize,
    reconciling: Arc<AtomicBool>,
}

impl SizeLedger {
    pub fn new(
        counters: Arc<dyn CounterStore>,
        objects: Arc<dyn ObjectStore>,
        tasks: BackgroundTasks,
    ) -> Self {
        Self {
            counters,
            objects,
            tasks,
            stale_after: TimeDelta::hours(DEFAULT_STALE_AFTER_HOURS),
            page_size: MAX_PAGE_SIZE,
            reconciling: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_stale_after(mut self, stale_after: TimeDelta) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Current total, served from the counter store without waiting on any
    /// scan. A missing counter reads as 0; missing or stale counters schedule
    /// a reconciliation in the background.
    pub async fn get(&self) -> Result<SizeReading, StoreError> {
        let total = self.read_total().await?;
        let last = self.read_last_recalculated().await?;
        let state = classify(total, last, Utc::now(), self.stale_after);

        if state != CounterState::Cached {
            debug!(?state, "size counter needs reconciliation");
            self.schedule_reconcile();
        }

        Ok(SizeReading {
            total_size: total.unwrap_or(0),
            last_recalculated: last,
            state,
        })
    }

    /// Add `delta` to the total, clamping at zero. Returns the new total.
    pub async fn adjust(&self, delta: i64) -> Result<u64, StoreError> {
        let current = self.read_total().await?.unwrap_or(0);
        let next = apply_delta(current, delta);
        self.counters.put(TOTAL_SIZE, &next.to_string()).await?;
        debug!(delta, current, next, "adjusted size counter");
        Ok(next)
    }

    /// Sum every object in the store and overwrite the counter with the
    /// exact result.
    pub async fn reconcile(&self) -> Result<u64, StoreError> {
        let mut total: u64 = 0;
        let mut objects: u64 = 0;
        for_each_page(self.objects.as_ref(), "", self.page_size, |page| {
            for object in page.objects.iter().filter(|o| !is_folder(&o.key)) {
                total = total.saturating_add(object.size);
                objects += 1;
            }
            Ok::<_, StoreError>(())
        })
        .await?;

        self.counters.put(TOTAL_SIZE, &total.to_string()).await?;
        self.counters
            .put(LAST_RECALCULATED, &Utc::now().timestamp_millis().to_string())
            .await?;
        info!(total, objects, "reconciled size counter");
        Ok(total)
    }

    /// Readiness probe for the counter store.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.counters.ping().await
    }

    /// Queue an adjustment; errors are logged, never surfaced.
    pub fn schedule_adjust(&self, delta: i64) {
        if delta == 0 {
            return;
        }
        let ledger = self.clone();
        self.tasks.submit("size-adjust", async move {
            ledger.adjust(delta).await?;
            Ok(())
        });
    }

    /// Queue a full reconciliation unless this process already runs one.
    pub fn schedule_reconcile(&self) {
        if self.reconciling.swap(true, Ordering::AcqRel) {
            debug!("size reconciliation already running");
            return;
        }
        let ledger = self.clone();
        self.tasks.submit("size-reconcile", async move {
            let result = ledger.reconcile().await;
            ledger.reconciling.store(false, Ordering::Release);
            result?;
            Ok(())
        });
    }

    async fn read_total(&self) -> Result<Option<u64>, StoreError> {
        let raw = self.counters.get(TOTAL_SIZE).await?;
        Ok(raw.and_then(|value| match value.trim().parse::<u64>() {
            Ok(total) => Some(total),
            Err(err) => {
                warn!(value = %value, error = %err, "ignoring unparseable size counter");
                None
            }
        }))
    }

    async fn read_last_recalculated(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let raw = self.counters.get(LAST_RECALCULATED).await?;
        Ok(raw.and_then(|value| {
            let parsed = value
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(DateTime::from_timestamp_millis);
            if parsed.is_none() {
                warn!(value = %value, "ignoring unparseable reconciliation timestamp");
            }
            parsed
        }))
    }
}

fn classify(
    total: Option<u64>,
    last: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    stale_after: TimeDelta,
) -> CounterState {
    match (total, last) {
        (None, _) => CounterState::Uninitialized,
        (Some(_), Some(at)) if now - at <= stale_after => CounterState::Cached,
        (Some(_), _) => CounterState::Stale,
    }
}

fn apply_delta(current: u64, delta: i64) -> u64 {
    if delta >= 0 {
        current.saturating_add(delta as u64)
    } else {
        current.saturating_sub(delta.unsigned_abs())
    }
}

//! Fire-and-forget background work.
//!
//! Work submitted here keeps running after the request that triggered it has
//! been answered. Callers get no handle back: a task either finishes or is
//! abandoned at shutdown, and its failures only reach the log.

use std::{future::Future, time::Duration};
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `work` to run detached from the caller.
    pub fn submit<F>(&self, label: &'static str, work: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.tracker.spawn(async move {
            match work.await {
                Ok(()) => debug!(task = label, "background task finished"),
                Err(err) => warn!(task = label, error = %err, "background task failed"),
            }
        });
    }

    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every submitted task, including ones submitted while
    /// waiting, has finished. The queue stays open afterwards.
    pub async fn drain(&self) {
        while !self.tracker.is_empty() {
            self.tracker.close();
            self.tracker.wait().await;
            self.tracker.reopen();
        }
    }

    /// Wait up to `grace` for running tasks. Whatever is still running after
    /// that is abandoned with the runtime.
    pub async fn shutdown(&self, grace: Duration) {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                pending = self.tracker.len(),
                "abandoning background tasks still running at shutdown"
            );
        }
    }
}

//! SQLite-backed counter store: a `counters(name, value)` table sharing the
//! metadata pool.

use crate::services::object_store::{CounterStore, StoreResult};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct SqliteCounterStore {
    db: Arc<SqlitePool>,
}

impl SqliteCounterStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CounterStore for SqliteCounterStore {
    async fn get(&self, name: &str) -> StoreResult<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM counters WHERE name = ?")
            .bind(name)
            .fetch_optional(&*self.db)
            .await?;
        Ok(value)
    }

    async fn put(&self, name: &str, value: &str) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO counters (name, value) VALUES (?, ?)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        )
        .bind(name)
        .bind(value)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM counters")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }
}

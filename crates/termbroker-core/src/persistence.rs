//! The interface the PTY session engine needs from a durable store.
//!
//! `termbroker-core` defines the contract; `termbroker-server` supplies the
//! sqlite-backed implementation. Keeping the trait here (rather than a
//! concrete `sqlx::SqlitePool` field on `Session`) is what lets the engine
//! stay free of any particular storage backend.

use async_trait::async_trait;

use crate::error::CoreResult;

/// One row of the `terminal_sessions` table.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub buffer: String,
    pub last_activity: f64,
    pub created_at: f64,
    pub active: bool,
    pub pid: Option<i32>,
    pub cwd: Option<String>,
    pub rows: u16,
    pub cols: u16,
}

#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn upsert(&self, record: SessionRecord) -> CoreResult<()>;
    async fn get(&self, id: &str) -> CoreResult<Option<SessionRecord>>;
    async fn mark_inactive(&self, id: &str) -> CoreResult<()>;
    async fn list_active(&self, owner: Option<&str>) -> CoreResult<Vec<SessionRecord>>;
    async fn update_activity(&self, id: &str, ts: f64) -> CoreResult<()>;
    async fn update_winsize(&self, id: &str, rows: u16, cols: u16) -> CoreResult<()>;
    async fn update_buffer(&self, id: &str, buffer: &str) -> CoreResult<()>;
}

/// A sink that drops every write and answers every read with "not found".
///
/// Used where a caller (tests, or a broker run without `--database-path`)
/// has no durable store to write through to; persistence is best-effort by
/// contract, so a broker with this sink still functions, it just can't
/// recover sessions across a restart.
pub struct NullPersistence;

#[async_trait]
impl PersistenceSink for NullPersistence {
    async fn upsert(&self, _record: SessionRecord) -> CoreResult<()> {
        Ok(())
    }

    async fn get(&self, _id: &str) -> CoreResult<Option<SessionRecord>> {
        Ok(None)
    }

    async fn mark_inactive(&self, _id: &str) -> CoreResult<()> {
        Ok(())
    }

    async fn list_active(&self, _owner: Option<&str>) -> CoreResult<Vec<SessionRecord>> {
        Ok(Vec::new())
    }

    async fn update_activity(&self, _id: &str, _ts: f64) -> CoreResult<()> {
        Ok(())
    }

    async fn update_winsize(&self, _id: &str, _rows: u16, _cols: u16) -> CoreResult<()> {
        Ok(())
    }

    async fn update_buffer(&self, _id: &str, _buffer: &str) -> CoreResult<()> {
        Ok(())
    }
}

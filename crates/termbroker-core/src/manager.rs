//! Process-wide registry of live Sessions: create / lookup / close,
//! timeout-based cleanup, and config broadcast.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use termbroker_types::SessionSummary;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::CoreResult;
use crate::persistence::PersistenceSink;
use crate::reader;
use crate::session::{now_epoch, Session};

struct Managed {
    session: Arc<Session>,
    reader: JoinHandle<()>,
}

/// Outcome of `reconnect`.
pub enum Reconnect {
    /// Session is live in memory; here is its replay.
    Live(String),
    /// Session was recovered from the persistence store; here is its
    /// last-flushed buffer. The caller is expected to `create` a fresh
    /// Session under the same id.
    Recovered(String),
    NotFound,
    Expired,
}

pub struct SessionManager {
    sessions: DashMap<String, Managed>,
    persistence: Arc<dyn PersistenceSink>,
    session_timeout: AtomicI64,
    buffer_size: AtomicUsize,
}

impl SessionManager {
    pub fn new(persistence: Arc<dyn PersistenceSink>, session_timeout: i64, buffer_size: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            persistence,
            session_timeout: AtomicI64::new(session_timeout),
            buffer_size: AtomicUsize::new(buffer_size),
        }
    }

    pub fn set_session_timeout(&self, seconds: i64) {
        self.session_timeout.store(seconds, Ordering::Relaxed);
    }

    pub fn set_buffer_size(&self, chunks: usize) {
        self.buffer_size.store(chunks, Ordering::Relaxed);
    }

    pub fn session_timeout(&self) -> i64 {
        self.session_timeout.load(Ordering::Relaxed)
    }

    /// Returns the live Session under `id`, replacing a dead one, or starts
    /// a fresh one.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        id: String,
        owner: String,
        name: String,
        rows: u16,
        cols: u16,
        cwd: Option<String>,
    ) -> CoreResult<Arc<Session>> {
        let existing = self.sessions.get(&id).map(|entry| entry.session.clone());
        if let Some(session) = existing {
            if session.is_alive().await {
                return Ok(session);
            }
        }
        if let Some((_, dead)) = self.sessions.remove(&id) {
            dead.reader.abort();
            dead.session.force_close().await;
        }

        let buffer_size = self.buffer_size.load(Ordering::Relaxed);
        let session = Session::start(
            id.clone(),
            owner,
            name,
            rows,
            cols,
            cwd,
            buffer_size,
            self.persistence.clone(),
        )
        .await?;

        let reader_handle = reader::spawn(session.clone());
        self.sessions.insert(
            id,
            Managed {
                session: session.clone(),
                reader: reader_handle,
            },
        );
        Ok(session)
    }

    /// The Session iff it is alive.
    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.get(id)?.session.clone();
        if session.is_alive().await {
            Some(session)
        } else {
            None
        }
    }

    pub async fn reconnect(&self, id: &str, owner: &str) -> Reconnect {
        if let Some(session) = self.get(id).await {
            return Reconnect::Live(session.replay().await);
        }

        let record = match self.persistence.get(id).await {
            Ok(Some(r)) if r.owner == owner => r,
            Ok(_) => return Reconnect::NotFound,
            Err(e) => {
                warn!(error = %e, "persistence lookup failed during reconnect");
                return Reconnect::NotFound;
            }
        };

        let timeout = self.session_timeout.load(Ordering::Relaxed);
        if now_epoch() - record.last_activity > timeout as f64 {
            if let Err(e) = self.persistence.mark_inactive(id).await {
                warn!(error = %e, "failed to mark expired session inactive");
            }
            return Reconnect::Expired;
        }

        Reconnect::Recovered(record.buffer)
    }

    pub async fn list(&self, owner: Option<&str>) -> CoreResult<Vec<SessionSummary>> {
        let timeout = self.session_timeout.load(Ordering::Relaxed);
        let now = now_epoch();
        let records = self.persistence.list_active(owner).await?;

        let mut out = Vec::with_capacity(records.len());
        for record in records {
            if now - record.last_activity > timeout as f64 {
                continue;
            }
            let running = self.sessions.contains_key(&record.id);
            out.push(SessionSummary {
                id: record.id,
                name: record.name,
                username: record.owner,
                last_activity: record.last_activity,
                created_at: record.created_at,
                running,
                rows: record.rows,
                cols: record.cols,
            });
        }
        Ok(out)
    }

    /// Forces removal regardless of attached clients.
    pub async fn close(&self, id: &str) {
        if let Some((_, managed)) = self.sessions.remove(id) {
            managed.reader.abort();
            managed.session.force_close().await;
        } else {
            let _ = self.persistence.mark_inactive(id).await;
        }
    }

    /// Closes dead or idle in-memory sessions, then marks idle persistence
    /// rows inactive.
    pub async fn cleanup(&self) -> CoreResult<usize> {
        let timeout = self.session_timeout.load(Ordering::Relaxed);
        let now = now_epoch();
        let mut closed = 0usize;

        let snapshot: Vec<(String, Arc<Session>)> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.session.clone()))
            .collect();

        let mut stale = Vec::new();
        for (id, session) in snapshot {
            let alive = session.is_alive().await;
            let idle = now - session.last_activity().await > timeout as f64;
            if !alive || idle {
                stale.push(id);
            }
        }
        for id in stale {
            self.close(&id).await;
            closed += 1;
        }

        for record in self.persistence.list_active(None).await? {
            if now - record.last_activity > timeout as f64 {
                if let Err(e) = self.persistence.mark_inactive(&record.id).await {
                    warn!(error = %e, session = %record.id, "failed to mark idle row inactive");
                }
            }
        }

        info!(closed, "cleanup pass complete");
        Ok(closed)
    }
}

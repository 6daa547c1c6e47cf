//! Binds one PTY Device to one Output History and a set of attached clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{CoreError, CoreResult};
use crate::history::OutputHistory;
use crate::persistence::{PersistenceSink, SessionRecord};
use crate::pty::PtyDevice;

/// `(principal, transport-instance)`, unique per live transport attachment.
pub type ClientId = String;

struct Inner {
    history: OutputHistory,
    /// client-id -> cursor. Also the membership set of attached clients.
    clients: HashMap<ClientId, i64>,
    running: bool,
    rows: u16,
    cols: u16,
    last_activity: f64,
}

/// Outcome of a `write` call, per the error taxonomy's `SessionDead`.
pub enum WriteOutcome {
    Ok,
    SessionClosed,
}

pub struct Session {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub cwd: Option<String>,
    pub created_at: f64,
    pty: PtyDevice,
    inner: Mutex<Inner>,
    persistence: Arc<dyn PersistenceSink>,
}

impl Session {
    /// Forks the PTY Device, marks the session running, and writes an
    /// `active=true` persistence record. Fails only if the PTY fork fails.
    pub async fn start(
        id: String,
        owner: String,
        name: String,
        rows: u16,
        cols: u16,
        cwd: Option<String>,
        buffer_size: usize,
        persistence: Arc<dyn PersistenceSink>,
    ) -> CoreResult<Arc<Session>> {
        let pty = PtyDevice::start(rows, cols, cwd.as_deref())?;
        let now = now_epoch();

        let session = Arc::new(Session {
            id: id.clone(),
            owner: owner.clone(),
            name: name.clone(),
            cwd: cwd.clone(),
            created_at: now,
            pty,
            inner: Mutex::new(Inner {
                history: OutputHistory::new(buffer_size),
                clients: HashMap::new(),
                running: true,
                rows,
                cols,
                last_activity: now,
            }),
            persistence,
        });

        if let Err(e) = session
            .persistence
            .upsert(SessionRecord {
                id,
                owner,
                name,
                buffer: String::new(),
                last_activity: now,
                created_at: now,
                active: true,
                pid: Some(session.pty.child_pid()),
                cwd,
                rows,
                cols,
            })
            .await
        {
            warn!(error = %e, "failed to persist new session record");
        }

        Ok(session)
    }

    /// Inserts `client_id` at the current head, returning the replay buffer
    /// for initial backlog rendering. Reattaching the same id resets its
    /// cursor (last-attach wins).
    pub async fn attach(&self, client_id: ClientId) -> String {
        let mut inner = self.inner.lock().await;
        let cursor = inner.history.head_index();
        inner.clients.insert(client_id, cursor);
        inner.history.replay()
    }

    /// The flat replay buffer without attaching a client. Used by the
    /// Manager to answer an in-memory `reconnect` hit.
    pub async fn replay(&self) -> String {
        self.inner.lock().await.history.replay()
    }

    /// Removes the client. If zero clients remain the session is NOT closed.
    pub async fn detach(&self, client_id: &str) {
        let replay = {
            let mut inner = self.inner.lock().await;
            inner.clients.remove(client_id);
            inner.history.replay()
        };
        if let Err(e) = self.persistence.update_buffer(&self.id, &replay).await {
            warn!(error = %e, session = %self.id, "failed to flush buffer on detach");
        }
    }

    /// Forwards to the PTY Device and bumps `last_activity` if the child is
    /// alive; otherwise returns `SessionClosed` for the caller to relay.
    pub async fn write(&self, bytes: &[u8]) -> WriteOutcome {
        let mut inner = self.inner.lock().await;
        if !inner.running || !self.pty.is_alive() {
            return WriteOutcome::SessionClosed;
        }
        self.pty.write(bytes);
        inner.last_activity = now_epoch();
        WriteOutcome::Ok
    }

    /// Forwards to the PTY Device and updates the session and its
    /// persistence record.
    pub async fn resize(&self, rows: u16, cols: u16) {
        {
            let mut inner = self.inner.lock().await;
            inner.rows = rows;
            inner.cols = cols;
        }
        self.pty.set_winsize(rows, cols);
        if let Err(e) = self.persistence.update_winsize(&self.id, rows, cols).await {
            warn!(error = %e, session = %self.id, "failed to persist winsize");
        }
    }

    /// Returns new output for `client_id`, or empty if it is not attached.
    pub async fn read_for(&self, client_id: &str) -> String {
        let mut inner = self.inner.lock().await;
        let Some(cursor) = inner.clients.get(client_id).copied() else {
            return String::new();
        };
        let (bytes, new_cursor) = inner.history.fetch(cursor);
        inner.clients.insert(client_id.to_string(), new_cursor);
        bytes
    }

    /// Appends freshly-read PTY output to the history and bumps activity.
    /// Called only by the Background Reader.
    pub async fn ingest(&self, bytes: &str) {
        let mut inner = self.inner.lock().await;
        inner.history.append(bytes);
        inner.last_activity = now_epoch();
    }

    /// Refuses if any client remains attached; otherwise marks not-running,
    /// persists `active=false`, and closes the PTY Device.
    pub async fn close(&self) -> bool {
        {
            let mut inner = self.inner.lock().await;
            if !inner.clients.is_empty() {
                return false;
            }
            inner.running = false;
        }
        self.pty.close();
        if let Err(e) = self.persistence.mark_inactive(&self.id).await {
            warn!(error = %e, session = %self.id, "failed to mark session inactive");
        }
        true
    }

    /// Forces closure regardless of attached clients. Used by the Manager.
    pub async fn force_close(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.running = false;
            inner.clients.clear();
        }
        self.pty.close();
        if let Err(e) = self.persistence.mark_inactive(&self.id).await {
            warn!(error = %e, session = %self.id, "failed to mark session inactive");
        }
    }

    pub async fn is_alive(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.running && self.pty.is_alive()
    }

    pub async fn last_activity(&self) -> f64 {
        self.inner.lock().await.last_activity
    }

    pub async fn client_count(&self) -> usize {
        self.inner.lock().await.clients.len()
    }

    pub async fn dims(&self) -> (u16, u16) {
        let inner = self.inner.lock().await;
        (inner.rows, inner.cols)
    }

    pub fn child_pid(&self) -> i32 {
        self.pty.child_pid()
    }

    /// Read up to `timeout` worth of PTY output. Used only by the
    /// Background Reader's drain loop.
    pub fn read_pty(&self, timeout: Duration) -> String {
        self.pty.read(timeout)
    }

    /// Flushes the current replay buffer and activity timestamp to the
    /// persistence record. Called periodically by the Background Reader.
    pub async fn flush(&self) -> CoreResult<()> {
        let (replay, last_activity) = {
            let inner = self.inner.lock().await;
            (inner.history.replay(), inner.last_activity)
        };
        self.persistence.update_buffer(&self.id, &replay).await?;
        self.persistence
            .update_activity(&self.id, last_activity)
            .await?;
        Ok(())
    }
}

pub fn now_epoch() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

impl From<CoreError> for String {
    fn from(e: CoreError) -> Self {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::NullPersistence;

    #[tokio::test]
    async fn attach_then_detach_then_attach_leaves_one_client_at_head() {
        let session = Session::start(
            "s1".into(),
            "alice".into(),
            "main".into(),
            24,
            80,
            None,
            100,
            Arc::new(NullPersistence),
        )
        .await
        .expect("pty fork should succeed in test sandbox");

        session.ingest("hello").await;
        let _ = session.attach("c1".into()).await;
        session.detach("c1").await;
        let _ = session.attach("c1".into()).await;

        assert_eq!(session.client_count().await, 1);
        let (bytes, _) = {
            let inner = session.inner.lock().await;
            inner.history.fetch(inner.clients["c1"])
        };
        assert_eq!(bytes, "");

        session.force_close().await;
    }

    #[tokio::test]
    async fn read_for_unknown_client_is_empty() {
        let session = Session::start(
            "s2".into(),
            "alice".into(),
            "main".into(),
            24,
            80,
            None,
            100,
            Arc::new(NullPersistence),
        )
        .await
        .unwrap();

        assert_eq!(session.read_for("ghost").await, "");
        session.force_close().await;
    }

    #[tokio::test]
    async fn close_refuses_while_clients_attached() {
        let session = Session::start(
            "s3".into(),
            "alice".into(),
            "main".into(),
            24,
            80,
            None,
            100,
            Arc::new(NullPersistence),
        )
        .await
        .unwrap();

        let _ = session.attach("c1".into()).await;
        assert!(!session.close().await);

        session.detach("c1").await;
        assert!(session.close().await);
    }
}

//! One drain loop per live Session: continuously pulls PTY output into the
//! Output History and periodically flushes the replay buffer to storage.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::session::Session;

const READ_TIMEOUT: Duration = Duration::from_millis(100);
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const LOOP_PACING: Duration = Duration::from_millis(10);

/// Spawns the Background Reader for `session` and returns its join handle.
/// The loop exits when the session stops being alive; the caller is
/// responsible for dropping/aborting the handle on explicit close.
pub fn spawn(session: Arc<Session>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_flush = Instant::now();

        loop {
            if !session.is_alive().await {
                break;
            }

            let session_for_read = session.clone();
            let chunk = tokio::task::spawn_blocking(move || {
                session_for_read.read_pty(READ_TIMEOUT)
            })
            .await
            .unwrap_or_default();

            if !chunk.is_empty() {
                session.ingest(&chunk).await;
            }

            if last_flush.elapsed() >= FLUSH_INTERVAL {
                if let Err(e) = session.flush().await {
                    warn!(error = %e, session = %session.id, "periodic flush failed");
                }
                last_flush = Instant::now();
            }

            tokio::time::sleep(LOOP_PACING).await;
        }

        if let Err(e) = session.flush().await {
            warn!(error = %e, session = %session.id, "final flush failed");
        }
        debug!(session = %session.id, "background reader exiting");
    })
}

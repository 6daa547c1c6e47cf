//! PTY session engine: owns pty file descriptors, drives a background
//! reader per session, maintains indexed output history with per-client
//! cursors, and coordinates concurrent attach/detach/write/resize.

pub mod error;
pub mod history;
pub mod manager;
pub mod persistence;
pub mod pty;
pub mod reader;
pub mod session;

pub use error::{CoreError, CoreResult};
pub use manager::{Reconnect, SessionManager};
pub use persistence::{NullPersistence, PersistenceSink, SessionRecord};
pub use pty::PtyDevice;
pub use session::{ClientId, Session, WriteOutcome};

//! SQLite-backed persistence: the `terminal_sessions` table plus a minimal
//! `users` table for bearer-token login.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use termbroker_core::{CoreError, CoreResult, PersistenceSink, SessionRecord};

pub struct Database {
    pool: Arc<SqlitePool>,
}

impl Database {
    pub async fn new(database_path: &str) -> Result<Self> {
        tracing::info!("opening sqlite database at {}", database_path);

        if let Some(parent) = std::path::Path::new(database_path).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("connecting to sqlite at {}", database_path))?;

        Self::run_migrations(&pool)
            .await
            .context("running database migrations")?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS terminal_sessions (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                name TEXT NOT NULL,
                buffer TEXT NOT NULL DEFAULT '',
                last_activity REAL NOT NULL,
                created_at REAL NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                pid INTEGER,
                cwd TEXT,
                rows INTEGER NOT NULL DEFAULT 24,
                cols INTEGER NOT NULL DEFAULT 80
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_terminal_sessions_username ON terminal_sessions(username)")
            .execute(pool)
            .await?;

        Ok(())
    }

    pub async fn create_user(&self, username: &str, password_hash: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO users (id, username, password_hash) VALUES (?1, ?2, ?3)")
            .bind(&id)
            .bind(username)
            .bind(password_hash)
            .execute(&*self.pool)
            .await?;
        Ok(id)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<(String, String)>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT id, password_hash FROM users WHERE username = ?1")
                .bind(username)
                .fetch_optional(&*self.pool)
                .await?;
        Ok(row)
    }
}

fn to_core_err(e: sqlx::Error) -> CoreError {
    CoreError::Persist(e.to_string())
}

#[async_trait]
impl PersistenceSink for Database {
    async fn upsert(&self, record: SessionRecord) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO terminal_sessions
                (id, username, name, buffer, last_activity, created_at, is_active, pid, cwd, rows, cols)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                name = excluded.name,
                buffer = excluded.buffer,
                last_activity = excluded.last_activity,
                is_active = excluded.is_active,
                pid = excluded.pid,
                cwd = excluded.cwd,
                rows = excluded.rows,
                cols = excluded.cols
            "#,
        )
        .bind(&record.id)
        .bind(&record.owner)
        .bind(&record.name)
        .bind(&record.buffer)
        .bind(record.last_activity)
        .bind(record.created_at)
        .bind(record.active)
        .bind(record.pid)
        .bind(&record.cwd)
        .bind(record.rows as i64)
        .bind(record.cols as i64)
        .execute(&*self.pool)
        .await
        .map_err(to_core_err)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> CoreResult<Option<SessionRecord>> {
        let row = sqlx::query(
            "SELECT id, username, name, buffer, last_activity, created_at, is_active, pid, cwd, rows, cols \
             FROM terminal_sessions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(to_core_err)?;

        Ok(row.map(row_to_record))
    }

    async fn mark_inactive(&self, id: &str) -> CoreResult<()> {
        sqlx::query("UPDATE terminal_sessions SET is_active = 0 WHERE id = ?1")
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(to_core_err)?;
        Ok(())
    }

    async fn list_active(&self, owner: Option<&str>) -> CoreResult<Vec<SessionRecord>> {
        let rows = if let Some(owner) = owner {
            sqlx::query(
                "SELECT id, username, name, buffer, last_activity, created_at, is_active, pid, cwd, rows, cols \
                 FROM terminal_sessions WHERE is_active = 1 AND username = ?1",
            )
            .bind(owner)
            .fetch_all(&*self.pool)
            .await
        } else {
            sqlx::query(
                "SELECT id, username, name, buffer, last_activity, created_at, is_active, pid, cwd, rows, cols \
                 FROM terminal_sessions WHERE is_active = 1",
            )
            .fetch_all(&*self.pool)
            .await
        }
        .map_err(to_core_err)?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }

    async fn update_activity(&self, id: &str, ts: f64) -> CoreResult<()> {
        sqlx::query("UPDATE terminal_sessions SET last_activity = ?1 WHERE id = ?2")
            .bind(ts)
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(to_core_err)?;
        Ok(())
    }

    async fn update_winsize(&self, id: &str, rows: u16, cols: u16) -> CoreResult<()> {
        sqlx::query("UPDATE terminal_sessions SET rows = ?1, cols = ?2 WHERE id = ?3")
            .bind(rows as i64)
            .bind(cols as i64)
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(to_core_err)?;
        Ok(())
    }

    async fn update_buffer(&self, id: &str, buffer: &str) -> CoreResult<()> {
        sqlx::query("UPDATE terminal_sessions SET buffer = ?1 WHERE id = ?2")
            .bind(buffer)
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(to_core_err)?;
        Ok(())
    }
}

fn row_to_record(row: sqlx::sqlite::SqliteRow) -> SessionRecord {
    SessionRecord {
        id: row.get("id"),
        owner: row.get("username"),
        name: row.get("name"),
        buffer: row.get("buffer"),
        last_activity: row.get("last_activity"),
        created_at: row.get("created_at"),
        active: row.get("is_active"),
        pid: row.get::<Option<i64>, _>("pid").map(|p| p as i32),
        cwd: row.get("cwd"),
        rows: row.get::<i64, _>("rows") as u16,
        cols: row.get::<i64, _>("cols") as u16,
    }
}

//! Durable work queue of `(url, timestamp)` capture units.
//!
//! The queue is the single source of truth for crawl progress: restart
//! after a crash must surface pending items exactly as they were left.
//! Insertion is idempotent, selection is insertion order (rowid), and the
//! only legal transitions within a run are `pending → completed` and
//! `pending → failed`.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};

/// SQL schema for the queue database
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS urls (
    url TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    domain TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    local_path TEXT,
    discovered_at TEXT NOT NULL,
    fetched_at TEXT,
    error TEXT,
    PRIMARY KEY (url, timestamp)
);

CREATE INDEX IF NOT EXISTS idx_urls_status ON urls(status);
"#;

/// Processing state of one queue unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Pending,
    Completed,
    Failed,
}

impl QueueStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// One `(url, timestamp)` unit of work
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub url: String,
    pub timestamp: String,
    pub domain: String,
    pub status: QueueStatus,
    pub local_path: Option<String>,
    pub discovered_at: String,
    pub fetched_at: Option<String>,
    pub error: Option<String>,
}

#[derive(sqlx::FromRow)]
struct QueueRow {
    url: String,
    timestamp: String,
    domain: String,
    status: String,
    local_path: Option<String>,
    discovered_at: String,
    fetched_at: Option<String>,
    error: Option<String>,
}

impl From<QueueRow> for QueueItem {
    fn from(row: QueueRow) -> Self {
        Self {
            url: row.url,
            timestamp: row.timestamp,
            domain: row.domain,
            status: QueueStatus::parse(&row.status),
            local_path: row.local_path,
            discovered_at: row.discovered_at,
            fetched_at: row.fetched_at,
            error: row.error,
        }
    }
}

/// Counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.pending + self.completed + self.failed
    }
}

const SELECT_COLUMNS: &str = "SELECT url, timestamp, domain, status, local_path, discovered_at, \
     fetched_at, error FROM urls";

/// File-backed queue; process-local, single writer
#[derive(Clone)]
pub struct WorkQueue {
    pool: SqlitePool,
}

impl WorkQueue {
    /// Open an existing queue or create a new one at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create queue directory")?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to open queue database")?;

        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("Failed to initialize queue schema")?;

        Ok(Self { pool })
    }

    /// Insert a unit if absent. Re-adding an existing `(url, ts)` is a
    /// no-op and preserves its status.
    pub async fn add(&self, url: &str, timestamp: &str, domain: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO urls (url, timestamp, domain, status, discovered_at) \
             VALUES (?, ?, ?, 'pending', ?)",
        )
        .bind(url)
        .bind(timestamp)
        .bind(domain)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to enqueue URL")?;
        Ok(())
    }

    /// Next pending unit in insertion order, or `None` when drained
    pub async fn next(&self) -> Result<Option<QueueItem>> {
        let row: Option<QueueRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE status = 'pending' ORDER BY rowid LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to select next queue item")?;
        Ok(row.map(QueueItem::from))
    }

    /// Fetch a specific unit
    pub async fn get(&self, url: &str, timestamp: &str) -> Result<Option<QueueItem>> {
        let row: Option<QueueRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE url = ? AND timestamp = ?"))
                .bind(url)
                .bind(timestamp)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to fetch queue item")?;
        Ok(row.map(QueueItem::from))
    }

    /// Transition `pending → completed`, recording where the page landed
    pub async fn mark_completed(&self, url: &str, timestamp: &str, local_path: &str) -> Result<()> {
        sqlx::query(
            "UPDATE urls SET status = 'completed', local_path = ?, fetched_at = ?, error = NULL \
             WHERE url = ? AND timestamp = ? AND status = 'pending'",
        )
        .bind(local_path)
        .bind(Utc::now().to_rfc3339())
        .bind(url)
        .bind(timestamp)
        .execute(&self.pool)
        .await
        .context("Failed to mark queue item completed")?;
        Ok(())
    }

    /// Transition `pending → failed`, recording the error
    pub async fn mark_failed(&self, url: &str, timestamp: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE urls SET status = 'failed', fetched_at = ?, error = ? \
             WHERE url = ? AND timestamp = ? AND status = 'pending'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(error)
        .bind(url)
        .bind(timestamp)
        .execute(&self.pool)
        .await
        .context("Failed to mark queue item failed")?;
        Ok(())
    }

    /// Counts by status
    pub async fn stats(&self) -> Result<QueueStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM urls GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .context("Failed to compute queue stats")?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            let count = count.max(0) as u64;
            match QueueStatus::parse(&status) {
                QueueStatus::Pending => stats.pending = count,
                QueueStatus::Completed => stats.completed = count,
                QueueStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }
}

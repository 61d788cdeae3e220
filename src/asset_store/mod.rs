//! Content-addressed asset store backed by SQLite and hard links.
//!
//! Two indexes drive deduplication:
//! - `wayback_url` (unique): a capture URL that was fetched once is never
//!   fetched again; later requests materialize as hard links.
//! - `content_hash`: distinct capture URLs whose bytes hash identically
//!   share one canonical file; the first inserter wins and later rows
//!   point at its path.
//!
//! The store records metadata and creates links; it never deletes files
//! during normal operation. Streaming the bytes to disk is the fetcher's
//! job; rows are committed only after a stream completes, so a crash
//! mid-download leaves an orphan file the next run overwrites cleanly.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;

/// SQL schema for the asset database
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS assets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    wayback_url TEXT NOT NULL UNIQUE,
    original_url TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    file_path TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    mime_type TEXT,
    first_downloaded TEXT NOT NULL,
    download_count INTEGER NOT NULL DEFAULT 1,
    domain TEXT,
    timestamp TEXT
);

CREATE INDEX IF NOT EXISTS idx_assets_wayback_url ON assets(wayback_url);
CREATE INDEX IF NOT EXISTS idx_assets_content_hash ON assets(content_hash);
CREATE INDEX IF NOT EXISTS idx_assets_original_url ON assets(original_url);
"#;

/// One successfully fetched asset
#[derive(Debug, Clone)]
pub struct StoredAsset {
    pub id: i64,
    /// Full archive capture URL; unique per row
    pub wayback_url: String,
    pub original_url: String,
    /// Lowercase-hex SHA-256 of the bytes at `file_path`
    pub content_hash: String,
    /// Canonical on-disk location; snapshot trees hard-link to it
    pub file_path: PathBuf,
    pub size_bytes: u64,
    pub mime_type: Option<String>,
    pub first_downloaded: String,
    /// Successful requests for this capture URL; the first download is 1
    pub download_count: u64,
    pub domain: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(sqlx::FromRow)]
struct AssetRow {
    id: i64,
    wayback_url: String,
    original_url: String,
    content_hash: String,
    file_path: String,
    size_bytes: i64,
    mime_type: Option<String>,
    first_downloaded: String,
    download_count: i64,
    domain: Option<String>,
    timestamp: Option<String>,
}

impl From<AssetRow> for StoredAsset {
    fn from(row: AssetRow) -> Self {
        Self {
            id: row.id,
            wayback_url: row.wayback_url,
            original_url: row.original_url,
            content_hash: row.content_hash,
            file_path: PathBuf::from(row.file_path),
            size_bytes: row.size_bytes.max(0) as u64,
            mime_type: row.mime_type,
            first_downloaded: row.first_downloaded,
            download_count: row.download_count.max(0) as u64,
            domain: row.domain,
            timestamp: row.timestamp,
        }
    }
}

/// Aggregate dedup numbers for reporting
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub total_assets: u64,
    pub total_bytes: u64,
    /// Requests served from the store instead of the network
    pub duplicate_requests: u64,
    /// Σ size × (download_count − 1)
    pub bytes_saved: u64,
}

const SELECT_COLUMNS: &str = "SELECT id, wayback_url, original_url, content_hash, file_path, \
     size_bytes, mime_type, first_downloaded, download_count, domain, timestamp FROM assets";

/// SQLite-backed content-addressed store
#[derive(Clone)]
pub struct AssetStore {
    pool: SqlitePool,
}

impl AssetStore {
    /// Open an existing store or create a new one at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create asset store directory")?;
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
            .context("Failed to open asset database")?;

        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("Failed to initialize asset schema")?;

        Ok(Self { pool })
    }

    /// Cheap URL-identity check; a hit entitles the caller to reuse the
    /// existing file
    pub async fn lookup(&self, wayback_url: &str) -> Result<Option<StoredAsset>> {
        let row: Option<AssetRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE wayback_url = ?"))
                .bind(wayback_url)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to query asset by wayback_url")?;
        Ok(row.map(StoredAsset::from))
    }

    /// Content-identity check; first inserter for a hash owns the
    /// canonical file
    pub async fn lookup_by_hash(&self, content_hash: &str) -> Result<Option<StoredAsset>> {
        let row: Option<AssetRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE content_hash = ? ORDER BY id LIMIT 1"
        ))
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query asset by content hash")?;
        Ok(row.map(StoredAsset::from))
    }

    /// Create `target_path` as a hard link to an existing asset's file.
    ///
    /// Parent directories are created as needed; an already-existing
    /// target is left alone and reported as such, so callers can keep
    /// manifests consistent with the files actually present. Cross-device
    /// and permission failures fall back to a byte copy; logical reuse is
    /// still recorded upstream.
    ///
    /// Returns true when a new file appeared at `target_path`.
    pub async fn materialize(&self, existing: &StoredAsset, target_path: &Path) -> Result<bool> {
        if tokio::fs::try_exists(target_path).await.unwrap_or(false) {
            return Ok(false);
        }
        link_or_copy(&existing.file_path, target_path).await?;
        Ok(true)
    }

    /// Record a freshly downloaded asset whose bytes are already streamed
    /// to `written_path`.
    ///
    /// If identical bytes are already canonical under a different path,
    /// the just-written file is replaced by a hard link and the returned
    /// row points at the canonical path. Returns the row plus a flag for
    /// whether content dedup fired.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_new(
        &self,
        wayback_url: &str,
        original_url: &str,
        content_hash: &str,
        written_path: &Path,
        size_bytes: u64,
        mime_type: Option<&str>,
        domain: &str,
        timestamp: &str,
    ) -> Result<(StoredAsset, bool)> {
        let (file_path, content_duplicate) = match self.lookup_by_hash(content_hash).await? {
            Some(canonical) if canonical.file_path != written_path => {
                tokio::fs::remove_file(written_path)
                    .await
                    .context("Failed to remove duplicate download")?;
                link_or_copy(&canonical.file_path, written_path).await?;
                (canonical.file_path, true)
            }
            _ => (written_path.to_path_buf(), false),
        };

        let first_downloaded = Utc::now().to_rfc3339();
        let file_path_str = file_path.to_string_lossy().to_string();

        sqlx::query(
            "INSERT INTO assets \
             (wayback_url, original_url, content_hash, file_path, size_bytes, mime_type, \
              first_downloaded, download_count, domain, timestamp) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(wayback_url)
        .bind(original_url)
        .bind(content_hash)
        .bind(&file_path_str)
        .bind(size_bytes as i64)
        .bind(mime_type)
        .bind(&first_downloaded)
        .bind(domain)
        .bind(timestamp)
        .execute(&self.pool)
        .await
        .context("Failed to insert asset row")?;

        let stored = self
            .lookup(wayback_url)
            .await?
            .context("Asset row missing immediately after insert")?;

        Ok((stored, content_duplicate))
    }

    /// Bump the request counter for a capture URL served from the store
    pub async fn increment_use(&self, wayback_url: &str) -> Result<()> {
        sqlx::query("UPDATE assets SET download_count = download_count + 1 WHERE wayback_url = ?")
            .bind(wayback_url)
            .execute(&self.pool)
            .await
            .context("Failed to increment download count")?;
        Ok(())
    }

    /// Totals across the store
    pub async fn stats(&self) -> Result<StoreStats> {
        let row: (i64, i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), \
                    COALESCE(SUM(size_bytes), 0), \
                    COALESCE(SUM(download_count - 1), 0), \
                    COALESCE(SUM(size_bytes * (download_count - 1)), 0) \
             FROM assets",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute store stats")?;

        Ok(StoreStats {
            total_assets: row.0.max(0) as u64,
            total_bytes: row.1.max(0) as u64,
            duplicate_requests: row.2.max(0) as u64,
            bytes_saved: row.3.max(0) as u64,
        })
    }
}

/// Hard-link `src` to `dst`, creating parents; fall back to a byte copy
/// when linking is impossible (cross-device, ACL)
async fn link_or_copy(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create link target directory")?;
    }

    match tokio::fs::hard_link(src, dst).await {
        Ok(()) => Ok(()),
        Err(link_err) => {
            log::warn!(
                "Hard link {} -> {} failed ({link_err}); copying instead",
                src.display(),
                dst.display()
            );
            tokio::fs::copy(src, dst)
                .await
                .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
            Ok(())
        }
    }
}

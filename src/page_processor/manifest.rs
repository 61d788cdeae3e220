//! Snapshot manifest and skipped-asset report persistence.
//!
//! Both files live at the snapshot root and are rewritten after every
//! page with the write-to-temp-then-rename pattern, so a crash never
//! leaves a half-written JSON document behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::fetcher::{FetchResult, SkippedAsset};
use crate::utils::is_internal_host;

const MANIFEST_FILENAME: &str = "manifest.json";
const SKIPPED_FILENAME: &str = "skipped_assets.json";

/// Asset totals for one snapshot tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSummary {
    pub total: u64,
    pub by_type: BTreeMap<String, u64>,
    #[serde(rename = "totalSizeMB")]
    pub total_size_mb: f64,
    pub external_domains: Vec<String>,
}

/// Per-snapshot metadata, rewritten on each page save
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub domain: String,
    pub timestamp: String,
    pub crawled_at: DateTime<Utc>,
    pub pages: Vec<String>,
    pub assets: AssetSummary,
    pub skipped_count: u64,
}

impl Manifest {
    /// Load the snapshot's manifest, or start a fresh one
    pub async fn load_or_new(snapshot_root: &Path, domain: &str, timestamp: &str) -> Self {
        let path = snapshot_root.join(MANIFEST_FILENAME);
        match fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(manifest) => manifest,
                Err(e) => {
                    log::warn!("Discarding unreadable manifest at {}: {e}", path.display());
                    Self::new(domain, timestamp)
                }
            },
            Err(_) => Self::new(domain, timestamp),
        }
    }

    fn new(domain: &str, timestamp: &str) -> Self {
        Self {
            domain: domain.to_string(),
            timestamp: timestamp.to_string(),
            crawled_at: Utc::now(),
            pages: Vec::new(),
            assets: AssetSummary::default(),
            skipped_count: 0,
        }
    }

    /// Fold one processed page into the totals.
    ///
    /// Only newly materialized files are counted so the manifest stays
    /// consistent with what is actually on disk when pages share assets
    /// or a crashed page is re-processed.
    pub fn record_page(&mut self, page_rel_path: &str, result: &FetchResult, skipped_total: u64) {
        if !self.pages.iter().any(|p| p == page_rel_path) {
            self.pages.push(page_rel_path.to_string());
        }

        for asset in result.fetched.iter().filter(|a| a.newly_written) {
            self.assets.total += 1;
            *self
                .assets
                .by_type
                .entry(asset.kind.label().to_string())
                .or_insert(0) += 1;
            self.assets.total_size_mb += asset.size_bytes as f64 / (1024.0 * 1024.0);

            if let Ok(url) = url::Url::parse(&asset.url)
                && let Some(host) = url.host_str()
                && !is_internal_host(host, &self.domain)
            {
                let host = host.to_lowercase();
                if !self.assets.external_domains.contains(&host) {
                    self.assets.external_domains.push(host);
                }
            }
        }
        self.assets.external_domains.sort();

        self.skipped_count = skipped_total;
    }

    /// Persist atomically to `{snapshot_root}/manifest.json`
    pub async fn save(&self, snapshot_root: &Path) -> Result<()> {
        write_json_atomic(&snapshot_root.join(MANIFEST_FILENAME), self).await
    }
}

/// Contents of `skipped_assets.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedReport {
    pub domain: String,
    pub timestamp: String,
    pub skipped: Vec<SkippedAsset>,
}

impl SkippedReport {
    /// Load the snapshot's report, or start an empty one
    pub async fn load_or_new(snapshot_root: &Path, domain: &str, timestamp: &str) -> Self {
        let path = snapshot_root.join(SKIPPED_FILENAME);
        match fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(report) => report,
                Err(e) => {
                    log::warn!(
                        "Discarding unreadable skipped report at {}: {e}",
                        path.display()
                    );
                    Self::new(domain, timestamp)
                }
            },
            Err(_) => Self::new(domain, timestamp),
        }
    }

    fn new(domain: &str, timestamp: &str) -> Self {
        Self {
            domain: domain.to_string(),
            timestamp: timestamp.to_string(),
            skipped: Vec::new(),
        }
    }

    /// Merge newly skipped assets, deduplicating by URL
    pub fn merge(&mut self, skipped: &[SkippedAsset]) {
        for asset in skipped {
            if !self.skipped.iter().any(|s| s.url == asset.url) {
                self.skipped.push(asset.clone());
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.skipped.len() as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Persist atomically to `{snapshot_root}/skipped_assets.json`
    pub async fn save(&self, snapshot_root: &Path) -> Result<()> {
        write_json_atomic(&snapshot_root.join(SKIPPED_FILENAME), self).await
    }
}

/// Atomic JSON write: temp file, sync, rename
async fn write_json_atomic<T: Serialize>(path: &PathBuf, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .context("Failed to create snapshot directory")?;
    }

    let json = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    let temp_path = path.with_extension("json.tmp");

    let mut file = fs::File::create(&temp_path)
        .await
        .context("Failed to create temp file")?;
    file.write_all(json.as_bytes())
        .await
        .context("Failed to write JSON")?;
    file.sync_all()
        .await
        .context("Failed to sync JSON to disk")?;

    fs::rename(&temp_path, path)
        .await
        .context("Failed to rename temp file into place")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::AssetKind;
    use crate::fetcher::FetchedAsset;

    fn fetched(url: &str, kind: AssetKind, size: u64, newly_written: bool) -> FetchedAsset {
        FetchedAsset {
            url: url.to_string(),
            archive_url: format!("https://web.archive.org/web/20230101000000/{url}"),
            local_path: "assets/x".to_string(),
            kind,
            size_bytes: size,
            newly_written,
        }
    }

    #[test]
    fn record_page_counts_new_files_only() {
        let mut manifest = Manifest::new("example.com", "20230101000000");
        let result = FetchResult {
            fetched: vec![
                fetched("https://example.com/a.css", AssetKind::Css, 1000, true),
                fetched("https://cdn.y.com/b.png", AssetKind::Image, 2048, true),
                fetched("https://example.com/c.js", AssetKind::Js, 512, false),
            ],
            ..FetchResult::default()
        };

        manifest.record_page("index.html", &result, 1);

        assert_eq!(manifest.pages, vec!["index.html".to_string()]);
        assert_eq!(manifest.assets.total, 2);
        assert_eq!(manifest.assets.by_type.get("css"), Some(&1));
        assert_eq!(manifest.assets.by_type.get("image"), Some(&1));
        assert_eq!(manifest.assets.by_type.get("js"), None);
        assert_eq!(manifest.assets.external_domains, vec!["cdn.y.com"]);
        assert_eq!(manifest.skipped_count, 1);
    }

    #[test]
    fn record_page_is_idempotent_for_page_list() {
        let mut manifest = Manifest::new("example.com", "20230101000000");
        let result = FetchResult::default();
        manifest.record_page("about/index.html", &result, 0);
        manifest.record_page("about/index.html", &result, 0);
        assert_eq!(manifest.pages.len(), 1);
    }

    #[tokio::test]
    async fn manifest_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut manifest = Manifest::new("example.com", "20230101000000");
        manifest.record_page("index.html", &FetchResult::default(), 0);
        manifest.save(dir.path()).await.expect("save succeeds");

        let loaded = Manifest::load_or_new(dir.path(), "example.com", "20230101000000").await;
        assert_eq!(loaded.pages, vec!["index.html".to_string()]);

        // Field names on disk follow the published schema
        let raw = std::fs::read_to_string(dir.path().join("manifest.json")).expect("file exists");
        assert!(raw.contains("\"crawledAt\""));
        assert!(raw.contains("\"skippedCount\""));
        assert!(raw.contains("\"totalSizeMB\""));
        assert!(raw.contains("\"externalDomains\""));
    }
}

//! Asset fetch orchestration.
//!
//! Takes the extractor's asset set for one page and materializes it into
//! the snapshot tree under the store's discipline: URL-identity dedup
//! before any network traffic, a Content-Length size gate before any body
//! bytes, SHA-256 hashing during the streaming write, and content-identity
//! dedup after it.
//!
//! Assets are processed sequentially with a fixed gap between downloads.
//! Politeness and deterministic resumability outweigh throughput here;
//! concurrency within a page would amplify 429 bursts and complicate the
//! global pause semantics. A 429 pauses everything for `retry_after`, then
//! the same asset is retried once; a second 429 is surfaced as an error
//! rather than silently dropped.

use std::path::Path;

use anyhow::{Result, bail};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

use crate::asset_store::AssetStore;
use crate::capture_client::CaptureClient;
use crate::config::MirrorConfig;
use crate::error::{MirrorError, MirrorResult};
use crate::extractor::{AssetKind, AssetRef};
use crate::utils::{archive_url, asset_rel_path};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Why an asset was not materialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    SizeLimit,
    FetchError,
    InvalidType,
}

/// An asset the operator may recover manually
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedAsset {
    pub url: String,
    pub reason: SkipReason,
    #[serde(rename = "sizeMB", skip_serializing_if = "Option::is_none")]
    pub size_mb: Option<f64>,
    pub archive_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An asset that made it into the snapshot tree
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub url: String,
    pub archive_url: String,
    /// Path relative to the snapshot root
    pub local_path: String,
    pub kind: AssetKind,
    pub size_bytes: u64,
    /// False when the snapshot tree already had this file (re-run after a
    /// crash, shared asset within one tree); manifests count new files only
    pub newly_written: bool,
}

/// A fetch failure recorded without aborting the page
#[derive(Debug, Clone)]
pub struct AssetError {
    pub url: String,
    pub message: String,
}

/// Deduplication accounting for one fetch batch
#[derive(Debug, Clone, Copy, Default)]
pub struct DedupStats {
    /// Same capture URL served from the store, zero network calls
    pub cache_hits: u64,
    /// Distinct capture URLs whose bytes hashed identically
    pub content_duplicates: u64,
    pub bandwidth_saved_mb: f64,
}

/// Outcome of one asset
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fetched(FetchedAsset),
    CacheHit(FetchedAsset),
    ContentDuplicate(FetchedAsset),
    Skipped(SkippedAsset),
    Error(AssetError),
}

impl FetchOutcome {
    /// Whether this outcome issued a network request (cache hits do not,
    /// and must not consume pacing)
    #[must_use]
    pub const fn consumed_network(&self) -> bool {
        !matches!(self, Self::CacheHit(_))
    }
}

/// Aggregate result for one page's asset set
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub fetched: Vec<FetchedAsset>,
    pub skipped: Vec<SkippedAsset>,
    pub errors: Vec<AssetError>,
    pub dedup: DedupStats,
}

impl FetchResult {
    /// Fold a second batch (e.g. CSS-discovered sub-assets) into this one
    pub fn merge(&mut self, other: FetchResult) {
        self.fetched.extend(other.fetched);
        self.skipped.extend(other.skipped);
        self.errors.extend(other.errors);
        self.dedup.cache_hits += other.dedup.cache_hits;
        self.dedup.content_duplicates += other.dedup.content_duplicates;
        self.dedup.bandwidth_saved_mb += other.dedup.bandwidth_saved_mb;
    }

    fn push(&mut self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Fetched(asset) => self.fetched.push(asset),
            FetchOutcome::CacheHit(asset) => {
                self.dedup.cache_hits += 1;
                self.dedup.bandwidth_saved_mb += asset.size_bytes as f64 / BYTES_PER_MB;
                self.fetched.push(asset);
            }
            FetchOutcome::ContentDuplicate(asset) => {
                self.dedup.content_duplicates += 1;
                self.fetched.push(asset);
            }
            FetchOutcome::Skipped(skipped) => self.skipped.push(skipped),
            FetchOutcome::Error(error) => self.errors.push(error),
        }
    }
}

/// Sequential, size-bounded, dedup-aware asset fetcher
#[derive(Clone)]
pub struct AssetFetcher {
    client: CaptureClient,
    store: AssetStore,
    config: MirrorConfig,
}

impl AssetFetcher {
    #[must_use]
    pub fn new(client: CaptureClient, store: AssetStore, config: MirrorConfig) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    /// Materialize `assets` into the snapshot tree rooted at
    /// `snapshot_root`.
    ///
    /// Individual asset failures are folded into the result; only a
    /// cooperative shutdown or an unrecoverable store fault aborts the
    /// batch.
    pub async fn fetch(
        &self,
        assets: &[AssetRef],
        domain: &str,
        timestamp: &str,
        snapshot_root: &Path,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<FetchResult> {
        let mut result = FetchResult::default();

        for asset in assets {
            if cancel.is_some_and(|rx| *rx.borrow()) {
                bail!("Shutdown requested between assets");
            }

            let capture_url = archive_url(self.config.archive_host(), timestamp, asset.url.as_str());
            let rel_path = asset_rel_path(&asset.url, domain);
            let target = snapshot_root.join(&rel_path);

            let outcome = match self
                .fetch_one(asset, &capture_url, &rel_path, &target, domain, timestamp)
                .await
            {
                Ok(outcome) => outcome,
                Err(MirrorError::RateLimited { retry_after }) => {
                    log::warn!(
                        "Rate limited by upstream; pausing all work for {}s",
                        retry_after.as_secs()
                    );
                    tokio::time::sleep(retry_after).await;
                    // One retry for the same asset; a repeat 429 escalates
                    match self
                        .fetch_one(asset, &capture_url, &rel_path, &target, domain, timestamp)
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            log::warn!("Asset {} failed after rate-limit retry: {err}", asset.url);
                            FetchOutcome::Error(AssetError {
                                url: asset.url.to_string(),
                                message: err.to_string(),
                            })
                        }
                    }
                }
                Err(MirrorError::NotFound(_)) => FetchOutcome::Skipped(SkippedAsset {
                    url: asset.url.to_string(),
                    reason: SkipReason::FetchError,
                    size_mb: None,
                    archive_url: capture_url.clone(),
                    error: Some("404: capture not found".to_string()),
                }),
                Err(err) => {
                    log::warn!("Asset {} failed: {err}", asset.url);
                    FetchOutcome::Error(AssetError {
                        url: asset.url.to_string(),
                        message: err.to_string(),
                    })
                }
            };

            let paced = outcome.consumed_network();
            result.push(outcome);

            if paced {
                let delay = self.config.asset_delay_ms();
                if delay > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                }
            }
        }

        Ok(result)
    }

    async fn fetch_one(
        &self,
        asset: &AssetRef,
        capture_url: &str,
        rel_path: &str,
        target: &Path,
        domain: &str,
        timestamp: &str,
    ) -> MirrorResult<FetchOutcome> {
        // Tier one: URL identity. A hit costs a hard link, not a request.
        if let Some(existing) = self.store.lookup(capture_url).await.map_err(db_fault)? {
            let newly_written = self
                .store
                .materialize(&existing, target)
                .await
                .map_err(db_fault)?;
            self.store
                .increment_use(capture_url)
                .await
                .map_err(db_fault)?;
            log::debug!("Cache hit for {capture_url}");
            return Ok(FetchOutcome::CacheHit(FetchedAsset {
                url: asset.url.to_string(),
                archive_url: capture_url.to_string(),
                local_path: rel_path.to_string(),
                kind: asset.kind,
                size_bytes: existing.size_bytes,
                newly_written,
            }));
        }

        let download = self.client.get_asset(asset.url.as_str(), timestamp).await?;

        // Size gate on the advertised length, before any body bytes
        let max_bytes = self.config.max_asset_size_bytes();
        if let Some(length) = download.content_length()
            && length > max_bytes
        {
            log::info!(
                "Skipping {} ({:.1} MB exceeds the {:.1} MB limit)",
                asset.url,
                length as f64 / BYTES_PER_MB,
                self.config.max_asset_size_mb()
            );
            return Ok(FetchOutcome::Skipped(SkippedAsset {
                url: asset.url.to_string(),
                reason: SkipReason::SizeLimit,
                size_mb: Some(length as f64 / BYTES_PER_MB),
                archive_url: capture_url.to_string(),
                error: None,
            }));
        }

        let mime_type = download.content_type();

        // Stream to disk, hashing as we go. The store row is committed
        // only after the stream completes, so a crash mid-write leaves an
        // orphan the next run overwrites.
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_fault)?;
        }
        let mut file = tokio::fs::File::create(target).await.map_err(io_fault)?;
        let mut hasher = Sha256::new();
        let mut written: u64 = 0;
        let mut stream = download.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(MirrorError::from)?;
            written += chunk.len() as u64;
            if written > max_bytes {
                // Upstream lied about (or omitted) Content-Length
                drop(file);
                let _ = tokio::fs::remove_file(target).await;
                return Ok(FetchOutcome::Skipped(SkippedAsset {
                    url: asset.url.to_string(),
                    reason: SkipReason::SizeLimit,
                    size_mb: Some(written as f64 / BYTES_PER_MB),
                    archive_url: capture_url.to_string(),
                    error: Some("Stream exceeded size limit mid-download".to_string()),
                }));
            }
            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(io_fault)?;
        }
        file.flush().await.map_err(io_fault)?;
        drop(file);

        let content_hash = hex::encode(hasher.finalize());
        let (stored, content_duplicate) = self
            .store
            .record_new(
                capture_url,
                asset.url.as_str(),
                &content_hash,
                target,
                written,
                mime_type.as_deref(),
                domain,
                timestamp,
            )
            .await
            .map_err(db_fault)?;

        let fetched = FetchedAsset {
            url: asset.url.to_string(),
            archive_url: capture_url.to_string(),
            local_path: rel_path.to_string(),
            kind: asset.kind,
            size_bytes: stored.size_bytes,
            newly_written: true,
        };

        Ok(if content_duplicate {
            log::debug!("Content duplicate: {} shares bytes with {}", asset.url, stored.file_path.display());
            FetchOutcome::ContentDuplicate(fetched)
        } else {
            FetchOutcome::Fetched(fetched)
        })
    }
}

fn db_fault(err: anyhow::Error) -> MirrorError {
    MirrorError::Corruption(format!("{err:#}"))
}

fn io_fault(err: std::io::Error) -> MirrorError {
    MirrorError::Transient(format!("I/O failure: {err}"))
}

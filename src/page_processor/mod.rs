//! Per-page processing pipeline.
//!
//! For one queue unit: wait for the off-peak gate, fetch the captured
//! document, extract and fetch its assets (plus one flat level of
//! CSS-referenced sub-assets), rewrite references for local browsing,
//! persist the snapshot tree and its manifest, update the queue, and
//! enqueue same-timestamp page links discovered in the original body.
//!
//! Pages discover more pages, but discovery is a flat enqueue: the
//! processor never re-enters itself.

pub mod manifest;

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tokio::sync::watch;
use url::Url;

use crate::capture_client::CaptureClient;
use crate::config::MirrorConfig;
use crate::error::{MirrorError, MirrorResult};
use crate::extractor::{AssetKind, AssetRef, extract_css_assets, extract_html_assets, extract_page_links};
use crate::fetcher::{AssetFetcher, FetchResult};
use crate::rewriter::{rewrite_css, rewrite_html};
use crate::scheduler::Scheduler;
use crate::utils::page_rel_path;
use crate::work_queue::{QueueItem, WorkQueue};

pub use manifest::{AssetSummary, Manifest, SkippedReport};

/// Terminal state of one processed page
#[derive(Debug)]
pub enum PageStatus {
    Completed {
        local_path: String,
        fetch: FetchResult,
    },
    Failed {
        error: String,
    },
}

/// Drives the pipeline for one queue unit at a time
pub struct PageProcessor {
    client: CaptureClient,
    fetcher: AssetFetcher,
    queue: WorkQueue,
    scheduler: Scheduler,
    config: MirrorConfig,
}

impl PageProcessor {
    #[must_use]
    pub fn new(
        client: CaptureClient,
        fetcher: AssetFetcher,
        queue: WorkQueue,
        scheduler: Scheduler,
        config: MirrorConfig,
    ) -> Self {
        Self {
            client,
            fetcher,
            queue,
            scheduler,
            config,
        }
    }

    /// Process one queue unit to a terminal state.
    ///
    /// Page-level fetch failures mark the unit `failed` and are returned
    /// as [`PageStatus::Failed`]; an `Err` from this function means the
    /// run itself should react (shutdown or database fault).
    pub async fn process(
        &self,
        item: &QueueItem,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<PageStatus> {
        self.scheduler.wait_if_needed().await;

        let page_url = match Url::parse(&item.url) {
            Ok(url) => url,
            Err(e) => {
                let error = format!("Unparseable page URL: {e}");
                self.queue
                    .mark_failed(&item.url, &item.timestamp, &error)
                    .await?;
                return Ok(PageStatus::Failed { error });
            }
        };

        let body = match self.get_page_with_backoff(&item.url, &item.timestamp).await {
            Ok(body) => body,
            Err(err) => {
                let error = err.to_string();
                log::warn!("Page {} @ {} failed: {error}", item.url, item.timestamp);
                self.queue
                    .mark_failed(&item.url, &item.timestamp, &error)
                    .await?;
                return Ok(PageStatus::Failed { error });
            }
        };

        let snapshot_root = self
            .config
            .output_dir()
            .join(&item.domain)
            .join(&item.timestamp);
        let page_rel = page_rel_path(&page_url);

        // A capture that is not text still gets saved; extraction and
        // rewriting are no-ops on content they cannot parse, and a body
        // that is not even UTF-8 has nothing for them to see.
        let Ok(text) = std::str::from_utf8(&body) else {
            self.save_page_bytes(&snapshot_root, &page_rel, &body).await?;
            let mut manifest =
                Manifest::load_or_new(&snapshot_root, &item.domain, &item.timestamp).await;
            let skipped_total = manifest.skipped_count;
            manifest.record_page(&page_rel, &FetchResult::default(), skipped_total);
            manifest.save(&snapshot_root).await?;
            let local_path = self.mark_completed(item, &page_rel).await?;
            return Ok(PageStatus::Completed {
                local_path,
                fetch: FetchResult::default(),
            });
        };

        // Asset fan-out: the page's own references first, then one flat
        // level of sub-assets referenced by the fetched stylesheets.
        let mut assets = extract_html_assets(text, &page_url, &item.domain);
        if !self.config.fetch_external_assets() {
            assets.retain(|a| !a.is_external);
        }

        let mut result = self
            .fetcher
            .fetch(&assets, &item.domain, &item.timestamp, &snapshot_root, cancel)
            .await?;

        let css_refs = self.collect_css_refs(&result, &snapshot_root, &item.domain).await;
        if !css_refs.is_empty() {
            let sub = self
                .fetcher
                .fetch(&css_refs, &item.domain, &item.timestamp, &snapshot_root, cancel)
                .await?;
            result.merge(sub);
        }

        // Skipped-asset report accumulates across the snapshot's pages
        let mut report =
            SkippedReport::load_or_new(&snapshot_root, &item.domain, &item.timestamp).await;
        report.merge(&result.skipped);
        if !report.is_empty() {
            report.save(&snapshot_root).await?;
        }

        let rewritten = rewrite_html(text, &page_url, &item.domain)?;
        self.rewrite_fetched_css(&result, &snapshot_root, &item.domain)
            .await;
        self.save_page_bytes(&snapshot_root, &page_rel, rewritten.as_bytes())
            .await?;

        let mut manifest =
            Manifest::load_or_new(&snapshot_root, &item.domain, &item.timestamp).await;
        manifest.record_page(&page_rel, &result, report.len());
        manifest.save(&snapshot_root).await?;

        let local_path = self.mark_completed(item, &page_rel).await?;

        // Same-timestamp link discovery expands one selection into the
        // full site; insertion is idempotent so repeats are free.
        let links = extract_page_links(text, &page_url, &item.domain);
        for link in &links {
            self.queue.add(link, &item.timestamp, &item.domain).await?;
        }
        if !links.is_empty() {
            log::debug!("Discovered {} same-domain links on {}", links.len(), item.url);
        }

        Ok(PageStatus::Completed {
            local_path,
            fetch: result,
        })
    }

    /// Page fetch with the global 429 pause-and-retry-once policy
    async fn get_page_with_backoff(&self, url: &str, timestamp: &str) -> MirrorResult<Vec<u8>> {
        match self.client.get_page(url, timestamp).await {
            Err(MirrorError::RateLimited { retry_after }) => {
                log::warn!(
                    "Rate limited fetching page; pausing {}s",
                    retry_after.as_secs()
                );
                tokio::time::sleep(retry_after).await;
                self.client.get_page(url, timestamp).await
            }
            other => other,
        }
    }

    /// References found inside freshly fetched stylesheets, deduplicated
    /// against everything this page already materialized.
    ///
    /// One level only: imported stylesheets are fetched, but their own
    /// references are left to the next run. The fan-out stays acyclic.
    async fn collect_css_refs(
        &self,
        result: &FetchResult,
        snapshot_root: &Path,
        domain: &str,
    ) -> Vec<AssetRef> {
        let already: HashSet<String> = result
            .fetched
            .iter()
            .map(|a| a.url.clone())
            .collect();

        let mut seen: HashSet<String> = HashSet::new();
        let mut refs = Vec::new();

        for asset in result
            .fetched
            .iter()
            .filter(|a| a.kind == AssetKind::Css && a.newly_written)
        {
            let Ok(css_url) = Url::parse(&asset.url) else {
                continue;
            };
            let path = snapshot_root.join(&asset.local_path);
            let Ok(css_text) = tokio::fs::read_to_string(&path).await else {
                continue;
            };

            for sub in extract_css_assets(&css_text, &css_url, domain) {
                if !self.config.fetch_external_assets() && sub.is_external {
                    continue;
                }
                let key = sub.url.to_string();
                if !already.contains(&key) && seen.insert(key) {
                    refs.push(sub);
                }
            }
        }

        refs
    }

    /// Rewrite freshly fetched stylesheets in place.
    ///
    /// Only newly written files are touched. A stylesheet materialized
    /// from the store was already rewritten when it first landed, and
    /// rewriting relative references twice would corrupt them. The write
    /// goes through a rename so hard-linked canonical bytes are never
    /// mutated under other snapshot trees.
    async fn rewrite_fetched_css(&self, result: &FetchResult, snapshot_root: &Path, domain: &str) {
        for asset in result
            .fetched
            .iter()
            .filter(|a| a.kind == AssetKind::Css && a.newly_written)
        {
            let Ok(css_url) = Url::parse(&asset.url) else {
                continue;
            };
            let path = snapshot_root.join(&asset.local_path);
            let css_text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("Cannot rewrite CSS {}: {e}", path.display());
                    continue;
                }
            };

            let rewritten = rewrite_css(&css_text, &css_url, domain);
            if rewritten == css_text {
                continue;
            }

            let temp = path.with_extension("css.tmp");
            let write = async {
                tokio::fs::write(&temp, rewritten.as_bytes()).await?;
                tokio::fs::rename(&temp, &path).await
            };
            if let Err(e) = write.await {
                log::warn!("Failed to write rewritten CSS {}: {e}", path.display());
            }
        }
    }

    async fn save_page_bytes(
        &self,
        snapshot_root: &Path,
        page_rel: &str,
        bytes: &[u8],
    ) -> Result<()> {
        let path = snapshot_root.join(page_rel);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create page directory")?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to save page to {}", path.display()))
    }

    async fn mark_completed(&self, item: &QueueItem, page_rel: &str) -> Result<String> {
        let local_path = format!("{}/{}/{page_rel}", item.domain, item.timestamp);
        self.queue
            .mark_completed(&item.url, &item.timestamp, &local_path)
            .await?;
        Ok(local_path)
    }
}

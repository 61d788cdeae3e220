//! Crawl supervisor: owns the main loop.
//!
//! Loads selections into the queue, drains pending units one at a time
//! through the page processor, applies inter-page pacing, aggregates
//! stats, and handles cooperative shutdown. A failure in one page never
//! aborts the run; only fatal configuration or database faults do.
//!
//! All process-wide state (the queue, the asset store, the HTTP client,
//! the scheduler gate) is constructed here once and passed down by
//! reference. There are no module-level globals.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::asset_store::{AssetStore, StoreStats};
use crate::capture_client::CaptureClient;
use crate::config::{ArchiveCredentials, MirrorConfig};
use crate::fetcher::AssetFetcher;
use crate::page_processor::{PageProcessor, PageStatus};
use crate::scheduler::Scheduler;
use crate::selections::load_selections;
use crate::work_queue::{QueueStats, WorkQueue};

/// Subdirectory of the output dir holding the two databases
const STATE_DIR: &str = ".waymirror";

/// Aggregate numbers for one run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunStats {
    pub pages_completed: u64,
    pub pages_failed: u64,
    pub queue: QueueStats,
    pub store: StoreStats,
}

/// Owns the main loop and every piece of process-wide state
pub struct CrawlSupervisor {
    config: MirrorConfig,
    queue: WorkQueue,
    store: AssetStore,
    processor: PageProcessor,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl CrawlSupervisor {
    /// Construct the full component stack.
    ///
    /// Opens (or creates) the queue and asset databases under
    /// `{output_dir}/.waymirror/`.
    pub async fn new(config: MirrorConfig, creds: &ArchiveCredentials) -> Result<Self> {
        let state_dir = config.output_dir().join(STATE_DIR);

        let queue = WorkQueue::open(&state_dir.join("queue.sqlite"))
            .await
            .context("Failed to open work queue")?;
        let store = AssetStore::open(&state_dir.join("assets.sqlite"))
            .await
            .context("Failed to open asset store")?;

        let client = CaptureClient::new(&config, creds)?;
        let fetcher = AssetFetcher::new(client.clone(), store.clone(), config.clone());
        let scheduler = Scheduler::new(config.effective_window());
        let processor = PageProcessor::new(
            client,
            fetcher,
            queue.clone(),
            scheduler,
            config.clone(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            queue,
            store,
            processor,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Handle for triggering a cooperative shutdown from outside
    #[must_use]
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Direct access to the queue (inspection, tests)
    #[must_use]
    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Direct access to the asset store (inspection, tests)
    #[must_use]
    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    /// Load selections and drain the queue.
    ///
    /// Returns when the queue is exhausted or a shutdown was requested;
    /// both are clean exits. Selections that are already `completed` or
    /// `failed` from a previous run are not reprocessed.
    pub async fn run(&self, selections_path: &Path) -> Result<RunStats> {
        let selections = load_selections(selections_path).await?;
        log::info!(
            "Loaded {} selections from {}",
            selections.len(),
            selections_path.display()
        );

        for selection in &selections {
            self.queue
                .add(&selection.url, &selection.timestamp, &selection.domain)
                .await?;
        }

        let initial = self.queue.stats().await?;
        log::info!(
            "Queue: {} pending, {} completed, {} failed",
            initial.pending,
            initial.completed,
            initial.failed
        );

        let mut stats = RunStats::default();
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            if *shutdown_rx.borrow() {
                log::info!("Shutdown requested; stopping between pages");
                break;
            }

            let Some(item) = self.queue.next().await? else {
                log::info!("Queue exhausted");
                break;
            };

            log::info!("Processing {} @ {}", item.url, item.timestamp);
            match self.processor.process(&item, Some(&shutdown_rx)).await {
                Ok(PageStatus::Completed { local_path, fetch }) => {
                    stats.pages_completed += 1;
                    log::info!(
                        "Completed {} -> {local_path} ({} assets, {} cache hits, {} content dups, {} skipped, {} errors)",
                        item.url,
                        fetch.fetched.len(),
                        fetch.dedup.cache_hits,
                        fetch.dedup.content_duplicates,
                        fetch.skipped.len(),
                        fetch.errors.len(),
                    );
                }
                Ok(PageStatus::Failed { error }) => {
                    stats.pages_failed += 1;
                    log::warn!("Failed {}: {error}", item.url);
                }
                Err(err) => {
                    if *shutdown_rx.borrow() {
                        // Interrupted mid-page: the unit stays pending and
                        // the next run redoes it cleanly
                        log::info!("Shutdown during {}; leaving it pending", item.url);
                        break;
                    }
                    stats.pages_failed += 1;
                    let error = format!("{err:#}");
                    log::error!("Processor fault on {}: {error}", item.url);
                    self.queue
                        .mark_failed(&item.url, &item.timestamp, &error)
                        .await?;
                }
            }

            let delay = self.config.page_delay_secs();
            if delay > 0 {
                // Inter-page pacing, cut short by shutdown
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
                    _ = shutdown_rx.changed() => {}
                }
            }
        }

        stats.queue = self.queue.stats().await?;
        stats.store = self.store.stats().await?;

        log::info!(
            "Run finished: {} completed, {} failed this run; queue {}/{}/{} (pending/completed/failed); \
             store holds {} assets, {:.2} MB saved by dedup",
            stats.pages_completed,
            stats.pages_failed,
            stats.queue.pending,
            stats.queue.completed,
            stats.queue.failed,
            stats.store.total_assets,
            stats.store.bytes_saved as f64 / (1024.0 * 1024.0),
        );

        Ok(stats)
    }
}

//! waymirror: resumable offline mirroring of web-archive captures.
//!
//! Given `(timestamp, url)` selections, the engine fetches each archived
//! page, discovers and fetches its sub-resources (including third-party
//! hosts), rewrites references to relative local paths, and writes a
//! self-contained snapshot tree per `(domain, timestamp)`. A durable work
//! queue makes runs resumable; a content-addressed store backed by hard
//! links deduplicates both repeated capture URLs and identical bytes.

pub mod asset_store;
pub mod capture_client;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod page_processor;
pub mod rewriter;
pub mod scheduler;
pub mod selections;
pub mod supervisor;
pub mod utils;
pub mod work_queue;

pub use asset_store::{AssetStore, StoreStats, StoredAsset};
pub use capture_client::CaptureClient;
pub use config::{ArchiveCredentials, MirrorConfig, MirrorConfigBuilder};
pub use error::{MirrorError, MirrorResult};
pub use extractor::{AssetKind, AssetRef};
pub use fetcher::{AssetFetcher, FetchOutcome, FetchResult, SkipReason, SkippedAsset};
pub use page_processor::{Manifest, PageProcessor, PageStatus, SkippedReport};
pub use scheduler::{OffPeakWindow, Scheduler};
pub use selections::{Selection, load_selections, parse_selections};
pub use supervisor::{CrawlSupervisor, RunStats};
pub use work_queue::{QueueItem, QueueStats, QueueStatus, WorkQueue};

use std::path::Path;

use anyhow::Result;

/// Run a full mirroring pass over a selections file.
///
/// Convenience wrapper that builds the supervisor stack and drains the
/// queue; embedders wanting shutdown control should construct
/// [`CrawlSupervisor`] directly.
pub async fn mirror(
    config: MirrorConfig,
    creds: &ArchiveCredentials,
    selections_path: &Path,
) -> Result<RunStats> {
    let supervisor = CrawlSupervisor::new(config, creds).await?;
    supervisor.run(selections_path).await
}

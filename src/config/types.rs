//! Core configuration types for archive mirroring

use std::path::{Path, PathBuf};

use crate::scheduler::OffPeakWindow;
use crate::utils::constants::{
    DEFAULT_ARCHIVE_HOST, DEFAULT_ASSET_DELAY_MS, DEFAULT_MAX_ASSET_SIZE_MB,
    DEFAULT_OUTPUT_DIR, DEFAULT_PAGE_DELAY_SECS, HTTP_TIMEOUT_SECS,
};

/// Configuration for one mirroring run
///
/// Two distinct delay knobs exist on purpose: `no_delay` disables the
/// pacing gaps (asset-to-asset and page-to-page) only, while the off-peak
/// gate is governed solely by `off_peak`/`ignore_schedule`. Disabling one
/// never implies the other.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub(crate) output_dir: PathBuf,
    pub(crate) archive_host: String,
    pub(crate) max_asset_size_mb: f64,
    pub(crate) asset_delay_ms: u64,
    pub(crate) page_delay_secs: u64,
    pub(crate) fetch_external_assets: bool,
    /// Reserved for a future parallel supervisor; the authenticated path
    /// always runs with 1
    pub(crate) concurrency: usize,
    pub(crate) no_delay: bool,
    pub(crate) ignore_schedule: bool,
    pub(crate) off_peak: Option<OffPeakWindow>,
    pub(crate) http_timeout_secs: u64,
}

impl MirrorConfig {
    /// Start building a configuration
    #[must_use]
    pub fn builder() -> super::MirrorConfigBuilder {
        super::MirrorConfigBuilder::default()
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    #[must_use]
    pub fn archive_host(&self) -> &str {
        &self.archive_host
    }

    #[must_use]
    pub fn max_asset_size_mb(&self) -> f64 {
        self.max_asset_size_mb
    }

    /// Size gate in bytes, derived from `max_asset_size_mb`
    #[must_use]
    pub fn max_asset_size_bytes(&self) -> u64 {
        (self.max_asset_size_mb * 1024.0 * 1024.0) as u64
    }

    #[must_use]
    pub fn asset_delay_ms(&self) -> u64 {
        if self.no_delay { 0 } else { self.asset_delay_ms }
    }

    #[must_use]
    pub fn page_delay_secs(&self) -> u64 {
        if self.no_delay { 0 } else { self.page_delay_secs }
    }

    #[must_use]
    pub fn fetch_external_assets(&self) -> bool {
        self.fetch_external_assets
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub fn no_delay(&self) -> bool {
        self.no_delay
    }

    /// The off-peak window the scheduler should honor, if any
    #[must_use]
    pub fn effective_window(&self) -> Option<OffPeakWindow> {
        if self.ignore_schedule {
            None
        } else {
            self.off_peak
        }
    }

    #[must_use]
    pub fn http_timeout_secs(&self) -> u64 {
        self.http_timeout_secs
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            archive_host: DEFAULT_ARCHIVE_HOST.to_string(),
            max_asset_size_mb: DEFAULT_MAX_ASSET_SIZE_MB,
            asset_delay_ms: DEFAULT_ASSET_DELAY_MS,
            page_delay_secs: DEFAULT_PAGE_DELAY_SECS,
            fetch_external_assets: true,
            concurrency: 1,
            no_delay: false,
            ignore_schedule: false,
            off_peak: None,
            http_timeout_secs: HTTP_TIMEOUT_SECS,
        }
    }
}

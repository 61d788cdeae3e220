//! Fluent builder for `MirrorConfig`
//!
//! Every field has a default, so `build()` is infallible; validation of
//! operator-supplied strings (window specs, sizes) happens at the CLI
//! boundary before they reach the builder.

use std::path::PathBuf;

use crate::scheduler::OffPeakWindow;

use super::types::MirrorConfig;

/// Builder for [`MirrorConfig`]
#[derive(Debug, Default)]
pub struct MirrorConfigBuilder {
    config: MirrorConfig,
}

impl MirrorConfigBuilder {
    /// Directory snapshot trees are written under
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// Upstream archive host, e.g. `web.archive.org`
    #[must_use]
    pub fn archive_host(mut self, host: impl Into<String>) -> Self {
        self.config.archive_host = host.into();
        self
    }

    /// Per-asset size ceiling in megabytes
    #[must_use]
    pub fn max_asset_size_mb(mut self, mb: f64) -> Self {
        self.config.max_asset_size_mb = mb;
        self
    }

    /// Gap between successive asset downloads within a page
    #[must_use]
    pub fn asset_delay_ms(mut self, ms: u64) -> Self {
        self.config.asset_delay_ms = ms;
        self
    }

    /// Gap between pages
    #[must_use]
    pub fn page_delay_secs(mut self, secs: u64) -> Self {
        self.config.page_delay_secs = secs;
        self
    }

    /// Whether to fetch assets hosted on third-party domains
    #[must_use]
    pub fn fetch_external_assets(mut self, fetch: bool) -> Self {
        self.config.fetch_external_assets = fetch;
        self
    }

    /// Disable pacing gaps (asset and page delays). Does not touch the
    /// off-peak gate.
    #[must_use]
    pub fn no_delay(mut self, no_delay: bool) -> Self {
        self.config.no_delay = no_delay;
        self
    }

    /// Ignore the off-peak window even when one is configured
    #[must_use]
    pub fn ignore_schedule(mut self, ignore: bool) -> Self {
        self.config.ignore_schedule = ignore;
        self
    }

    /// Off-peak window the main loop is gated on
    #[must_use]
    pub fn off_peak(mut self, window: Option<OffPeakWindow>) -> Self {
        self.config.off_peak = window;
        self
    }

    /// HTTP read timeout in seconds
    #[must_use]
    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.config.http_timeout_secs = secs;
        self
    }

    /// Finalize the configuration
    #[must_use]
    pub fn build(self) -> MirrorConfig {
        self.config
    }
}

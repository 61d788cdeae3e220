//! Shared configuration constants for waymirror
//!
//! Default values used throughout the codebase to ensure consistency
//! and avoid magic numbers.

/// Default upstream archive host
pub const DEFAULT_ARCHIVE_HOST: &str = "web.archive.org";

/// Default output directory for snapshot trees
pub const DEFAULT_OUTPUT_DIR: &str = "archived_pages";

/// Default per-asset size ceiling in megabytes
///
/// Assets with a larger Content-Length are skipped and recorded in
/// `skipped_assets.json` so the operator can fetch them manually.
pub const DEFAULT_MAX_ASSET_SIZE_MB: f64 = 50.0;

/// Default gap between successive asset downloads within a page
///
/// Conservative pacing that keeps the upstream happy. Cache hits do not
/// consume this delay.
pub const DEFAULT_ASSET_DELAY_MS: u64 = 1000;

/// Default gap between pages
pub const DEFAULT_PAGE_DELAY_SECS: u64 = 5;

/// HTTP read timeout for page and asset requests
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Maximum redirects followed for page requests
pub const MAX_REDIRECTS: usize = 5;

/// Back-off applied on a 429 response when no Retry-After header is present
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// User-Agent sent with every upstream request
///
/// Identifies the tool and its purpose so archive operators can reach out.
pub const USER_AGENT: &str = concat!(
    "waymirror/",
    env!("CARGO_PKG_VERSION"),
    " (offline mirroring of archived captures)"
);

//! Asset and link extraction from captured documents.
//!
//! The extractor is pure: no I/O, no ordering guarantee beyond "emit as
//! found, dedup by absolute URL". HTML goes through `scraper`, CSS through
//! a pair of regexes. Classification is extension-based except where the
//! referencing tag already pins the type.

pub mod css;
pub mod html;

use std::fmt;

use url::Url;

use crate::utils::is_internal_host;

pub use css::extract_css_assets;
pub use html::{extract_html_assets, extract_page_links};

/// Resource type of a referenced asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Css,
    Js,
    Image,
    Font,
    Video,
    Audio,
    Other,
}

impl AssetKind {
    /// Classify by the extension of a URL path; query strings never reach
    /// here because callers pass `Url::path()`
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let ext = match path.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return Self::Other,
        };
        match ext.as_str() {
            "css" => Self::Css,
            "js" => Self::Js,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "ico" | "bmp" => Self::Image,
            "woff" | "woff2" | "ttf" | "otf" | "eot" => Self::Font,
            "mp4" | "webm" | "ogg" | "avi" | "mov" => Self::Video,
            "mp3" | "wav" | "m4a" | "flac" => Self::Audio,
            _ => Self::Other,
        }
    }

    /// Stable lowercase label used in manifests and logs
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::Js => "js",
            Self::Image => "image",
            Self::Font => "font",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One reference to a sub-resource, resolved to an absolute URL
#[derive(Debug, Clone)]
pub struct AssetRef {
    /// Absolute URL of the asset
    pub url: Url,
    pub kind: AssetKind,
    /// Document the reference was found in
    pub source_file: String,
    /// True iff the asset's host is neither `domain` nor `www.{domain}`
    pub is_external: bool,
}

impl AssetRef {
    pub(crate) fn new(url: Url, kind: AssetKind, source: &Url, domain: &str) -> Self {
        let is_external = url
            .host_str()
            .is_none_or(|host| !is_internal_host(host, domain));
        Self {
            url,
            kind,
            source_file: source.to_string(),
            is_external,
        }
    }
}

/// Resolve a raw reference against its document URL.
///
/// Returns `None` for empty, fragment-only, `data:`, non-HTTP, and
/// unparseable references, exactly the ones extraction skips.
pub(crate) fn resolve_reference(raw: &str, base: &Url) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') || raw.starts_with("data:") {
        return None;
    }
    let resolved = base.join(raw).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        _ => None,
    }
}

//! URL and path manipulation utilities.
//!
//! Maps capture and asset URLs onto the on-disk snapshot layout. The
//! fetcher and the rewriter both go through these functions, which is what
//! guarantees that rewritten references resolve to the files the fetcher
//! actually wrote.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Matches an archive wrapper prefix, capturing the embedded original URL
static ARCHIVE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[^/]+/web/\d{1,14}(?:id_)?/(https?://.+)$")
        .expect("archive prefix regex is valid")
});

/// Derive the snapshot domain from a URL by stripping a leading `www.`
#[must_use]
pub fn derive_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_lowercase())
}

/// Exact-equality internal/external test.
///
/// A host is internal iff it equals `domain` or `www.{domain}`. Subdomains
/// are external.
#[must_use]
pub fn is_internal_host(host: &str, domain: &str) -> bool {
    let host = host.to_lowercase();
    host == domain || host == format!("www.{domain}")
}

/// Relative path of an asset inside a snapshot tree.
///
/// Same-domain assets land under `assets/`, third-party assets under
/// `assets/external/{host}/`, mirroring the source path with the leading
/// slash stripped. Query strings do not participate in the layout.
#[must_use]
pub fn asset_rel_path(asset_url: &Url, domain: &str) -> String {
    let path = asset_url.path().trim_matches('/');
    let path = if path.is_empty() { "index" } else { path };

    match asset_url.host_str() {
        Some(host) if !is_internal_host(host, domain) => {
            format!("assets/external/{}/{path}", host.to_lowercase())
        }
        _ => format!("assets/{path}"),
    }
}

/// Relative path of a rewritten page inside a snapshot tree.
///
/// The snapshot root document becomes `index.html`; paths without an
/// `.html`/`.htm` suffix get `/index.html` appended so directory-style
/// URLs stay browsable.
#[must_use]
pub fn page_rel_path(url: &Url) -> String {
    let path = url.path().trim_start_matches('/');
    if path.is_empty() {
        return "index.html".to_string();
    }
    if path.ends_with(".html") || path.ends_with(".htm") {
        return path.to_string();
    }
    format!("{}/index.html", path.trim_end_matches('/'))
}

/// Form the archive capture URL for `(original, ts)`.
///
/// URLs that already carry the `/web/{ts}/` wrapper are returned verbatim;
/// re-wrapping would produce a double-proxied request the archive rejects.
/// The host may carry an explicit scheme (useful when pointing at a local
/// test server); plain hosts get `https://`.
#[must_use]
pub fn archive_url(archive_host: &str, timestamp: &str, original: &str) -> String {
    if ARCHIVE_PREFIX_RE.is_match(original) {
        return original.to_string();
    }
    format!("{}/web/{timestamp}/{original}", archive_base(archive_host))
}

/// Form the `id_` variant that returns the original bytes unwrapped
#[must_use]
pub fn raw_archive_url(archive_host: &str, timestamp: &str, original: &str) -> String {
    if ARCHIVE_PREFIX_RE.is_match(original) {
        return original.to_string();
    }
    format!("{}/web/{timestamp}id_/{original}", archive_base(archive_host))
}

fn archive_base(archive_host: &str) -> String {
    if archive_host.contains("://") {
        archive_host.trim_end_matches('/').to_string()
    } else {
        format!("https://{archive_host}")
    }
}

/// Strip an embedded archive wrapper, returning the original URL.
///
/// Links discovered inside archived pages are frequently rendered with the
/// archive's own prefix; the queue stores originals only.
#[must_use]
pub fn strip_archive_prefix(url: &str) -> String {
    match ARCHIVE_PREFIX_RE.captures(url) {
        Some(caps) => caps[1].to_string(),
        None => url.to_string(),
    }
}

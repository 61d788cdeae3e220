//! HTML asset and link extraction via `scraper`.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::utils::{is_internal_host, strip_archive_prefix};

use super::{AssetKind, AssetRef, resolve_reference};

static STYLESHEET: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"link[rel="stylesheet"][href]"#).expect("stylesheet selector is valid")
});
static SCRIPT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script[src]").expect("script selector is valid"));
static IMG: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("img selector is valid"));
static SOURCE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("source").expect("source selector is valid"));
static VIDEO: Lazy<Selector> =
    Lazy::new(|| Selector::parse("video[src]").expect("video selector is valid"));
static AUDIO: Lazy<Selector> =
    Lazy::new(|| Selector::parse("audio[src]").expect("audio selector is valid"));
static PAGE_LINKS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a[href], link[href], img[src], script[src]")
        .expect("page link selector is valid")
});

/// Enumerate sub-resources referenced by an HTML document.
///
/// Emits in document order, deduplicated by absolute URL: the `<source>`
/// tag in particular can be matched by more than one pass and must not
/// double-emit.
#[must_use]
pub fn extract_html_assets(html: &str, page_url: &Url, domain: &str) -> Vec<AssetRef> {
    let document = Html::parse_document(html);
    let mut seen: HashSet<String> = HashSet::new();
    let mut assets = Vec::new();

    let mut push = |raw: &str, kind: AssetKind| {
        if let Some(url) = resolve_reference(raw, page_url)
            && seen.insert(url.to_string())
        {
            assets.push(AssetRef::new(url, kind, page_url, domain));
        }
    };

    for el in document.select(&STYLESHEET) {
        if let Some(href) = el.value().attr("href") {
            push(href, AssetKind::Css);
        }
    }

    for el in document.select(&SCRIPT) {
        if let Some(src) = el.value().attr("src") {
            push(src, AssetKind::Js);
        }
    }

    for el in document.select(&IMG) {
        if let Some(src) = el.value().attr("src") {
            push(src, AssetKind::Image);
        }
        if let Some(candidate) = el.value().attr("srcset").and_then(first_srcset_candidate) {
            push(&candidate, AssetKind::Image);
        }
    }

    for el in document.select(&SOURCE) {
        let kind = source_kind(&el);
        if let Some(src) = el.value().attr("src") {
            push(src, kind);
        }
        if let Some(candidate) = el.value().attr("srcset").and_then(first_srcset_candidate) {
            push(&candidate, kind);
        }
    }

    for el in document.select(&VIDEO) {
        if let Some(src) = el.value().attr("src") {
            push(src, AssetKind::Video);
        }
    }

    for el in document.select(&AUDIO) {
        if let Some(src) = el.value().attr("src") {
            push(src, AssetKind::Audio);
        }
    }

    assets
}

/// Discover same-domain page links for queue expansion.
///
/// Scans `<a>`, `<link>`, `<img>`, and `<script>` references, resolves
/// them, strips any embedded archive wrapper, and keeps only URLs whose
/// host matches the snapshot domain exactly. Returned URLs are originals,
/// deduplicated, in document order.
#[must_use]
pub fn extract_page_links(html: &str, page_url: &Url, domain: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen: HashSet<String> = HashSet::new();
    let mut links = Vec::new();

    for el in document.select(&PAGE_LINKS) {
        let raw = el
            .value()
            .attr("href")
            .or_else(|| el.value().attr("src"));
        let Some(raw) = raw else { continue };

        let raw = raw.trim();
        if raw.is_empty()
            || raw.starts_with('#')
            || raw.starts_with("data:")
            || raw.starts_with("javascript:")
            || raw.starts_with("mailto:")
            || raw.starts_with("tel:")
        {
            continue;
        }

        let Some(resolved) = resolve_reference(raw, page_url) else {
            continue;
        };

        // Archived pages often render links through the archive's own
        // prefix; the queue stores originals only.
        let original = strip_archive_prefix(resolved.as_str());
        let Ok(parsed) = Url::parse(&original) else {
            continue;
        };
        let Some(host) = parsed.host_str() else {
            continue;
        };
        if !is_internal_host(host, domain) {
            continue;
        }

        if seen.insert(original.clone()) {
            links.push(original);
        }
    }

    links
}

/// First URL out of a srcset attribute, descriptors stripped
fn first_srcset_candidate(srcset: &str) -> Option<String> {
    srcset
        .split(',')
        .next()?
        .trim()
        .split_whitespace()
        .next()
        .map(str::to_string)
}

/// `<source>` type is driven by the parent tag
fn source_kind(el: &ElementRef<'_>) -> AssetKind {
    let parent = el
        .parent()
        .and_then(ElementRef::wrap)
        .map(|p| p.value().name().to_ascii_lowercase());
    match parent.as_deref() {
        Some("video") => AssetKind::Video,
        Some("audio") => AssetKind::Audio,
        _ => AssetKind::Image,
    }
}

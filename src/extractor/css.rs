//! CSS asset extraction.
//!
//! Stylesheets reference further resources two ways: `@import` rules and
//! `url(...)` tokens. Imports are scanned first and always classified as
//! CSS; everything else is classified by extension.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use super::{AssetKind, AssetRef, resolve_reference};

/// `@import url(...)` or `@import "..."`
pub(crate) static CSS_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)@import\s+(?:url\(\s*['"]?([^'"()\s]+)['"]?\s*\)|['"]([^'"]+)['"])"#)
        .expect("CSS import regex is valid")
});

/// Any `url(...)` token
pub(crate) static CSS_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)url\(\s*['"]?([^'"()\s]+)['"]?\s*\)"#).expect("CSS url regex is valid")
});

/// Enumerate resources referenced by a stylesheet.
///
/// Emits `@import` targets first, then remaining `url(...)` occurrences,
/// deduplicated by absolute URL.
#[must_use]
pub fn extract_css_assets(css: &str, css_url: &Url, domain: &str) -> Vec<AssetRef> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut assets = Vec::new();

    let mut push = |raw: &str, kind: Option<AssetKind>| {
        if let Some(url) = resolve_reference(raw, css_url)
            && seen.insert(url.to_string())
        {
            let kind = kind.unwrap_or_else(|| AssetKind::from_path(url.path()));
            assets.push(AssetRef::new(url, kind, css_url, domain));
        }
    };

    for caps in CSS_IMPORT_RE.captures_iter(css) {
        if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
            push(m.as_str(), Some(AssetKind::Css));
        }
    }

    for caps in CSS_URL_RE.captures_iter(css) {
        if let Some(m) = caps.get(1) {
            push(m.as_str(), None);
        }
    }

    assets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> Url {
        Url::parse("https://example.com/css/site.css").expect("sheet URL parses")
    }

    #[test]
    fn imports_come_first_and_are_css() {
        let css = r#"
            body { background: url(../img/bg.png); }
            @import url("reset.css");
            @import 'vendor/grid.css';
        "#;
        let assets = extract_css_assets(css, &sheet(), "example.com");
        assert_eq!(assets.len(), 3);
        assert_eq!(assets[0].kind, AssetKind::Css);
        assert_eq!(assets[0].url.path(), "/css/reset.css");
        assert_eq!(assets[1].kind, AssetKind::Css);
        assert_eq!(assets[1].url.path(), "/css/vendor/grid.css");
        assert_eq!(assets[2].kind, AssetKind::Image);
        assert_eq!(assets[2].url.path(), "/img/bg.png");
    }

    #[test]
    fn url_tokens_classify_by_extension() {
        let css = r#"
            @font-face { src: url("/fonts/body.woff2") format("woff2"); }
            .hero { background-image: url('https://cdn.y.com/hero.jpg'); }
        "#;
        let assets = extract_css_assets(css, &sheet(), "example.com");
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].kind, AssetKind::Font);
        assert!(!assets[0].is_external);
        assert_eq!(assets[1].kind, AssetKind::Image);
        assert!(assets[1].is_external);
    }

    #[test]
    fn data_uris_and_duplicates_are_skipped() {
        let css = r#"
            .a { background: url(data:image/gif;base64,R0lGOD); }
            .b { background: url(/img/tile.png); }
            .c { background: url(/img/tile.png); }
        "#;
        let assets = extract_css_assets(css, &sheet(), "example.com");
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].url.path(), "/img/tile.png");
    }

    #[test]
    fn import_is_not_double_counted_by_url_pass() {
        let css = r#"@import url("reset.css");"#;
        let assets = extract_css_assets(css, &sheet(), "example.com");
        assert_eq!(assets.len(), 1);
    }
}

//! Reference rewriting for local browsing.
//!
//! HTML is rewritten with `lol_html` streaming handlers so only the
//! matched attributes change; text content, whitespace, and every other
//! attribute pass through byte-for-byte. CSS is rewritten with the same
//! regexes the extractor scans with, which keeps the two views of a
//! stylesheet consistent.
//!
//! Path mapping mirrors the snapshot layout: a same-domain asset at `/p`
//! becomes `assets/p`, a third-party asset on host `H` becomes
//! `assets/external/H/p`. CSS files live one level inside `assets/`, so
//! their references get a single `../` prefix.

use anyhow::{Context, Result, anyhow};
use lol_html::{HtmlRewriter, Settings, element};
use url::Url;

use crate::extractor::css::CSS_URL_RE;
use crate::extractor::resolve_reference;
use crate::utils::asset_rel_path;

use once_cell::sync::Lazy;
use regex::Regex;

/// `@import "..."` string form (the `url(...)` form is covered by
/// `CSS_URL_RE`)
static CSS_IMPORT_STRING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)@import\s+['"]([^'"]+)['"]"#).expect("CSS import string regex is valid")
});

/// Map one raw reference to its snapshot-relative path.
///
/// Returns `None` when the reference must be preserved verbatim: empty,
/// fragment-only, `data:`, or unparseable.
fn map_reference(raw: &str, base: &Url, domain: &str, prefix: &str) -> Option<String> {
    let url = resolve_reference(raw, base)?;
    Some(format!("{prefix}{}", asset_rel_path(&url, domain)))
}

/// Rewrite asset references in an HTML document located at the snapshot
/// root.
pub fn rewrite_html(html: &str, page_url: &Url, domain: &str) -> Result<String> {
    let mut output = Vec::with_capacity(html.len());

    let rewrite_attr = |attr: &'static str| {
        let page_url = page_url.clone();
        let domain = domain.to_string();
        move |el: &mut lol_html::html_content::Element<'_, '_>| {
            if let Some(value) = el.get_attribute(attr)
                && let Some(mapped) = map_reference(&value, &page_url, &domain, "")
            {
                el.set_attribute(attr, &mapped)?;
            }
            Ok(())
        }
    };

    let rewrite_srcset = || {
        let page_url = page_url.clone();
        let domain = domain.to_string();
        move |el: &mut lol_html::html_content::Element<'_, '_>| {
            if let Some(value) = el.get_attribute("srcset") {
                let mapped = rewrite_srcset_value(&value, &page_url, &domain);
                if mapped != value {
                    el.set_attribute("srcset", &mapped)?;
                }
            }
            Ok(())
        }
    };

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!(r#"link[rel="stylesheet"][href]"#, rewrite_attr("href")),
                element!("script[src]", rewrite_attr("src")),
                element!("img[src]", rewrite_attr("src")),
                element!("img[srcset]", rewrite_srcset()),
                element!("source[src]", rewrite_attr("src")),
                element!("source[srcset]", rewrite_srcset()),
                element!("video[src]", rewrite_attr("src")),
                element!("audio[src]", rewrite_attr("src")),
            ],
            ..Settings::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );

    rewriter
        .write(html.as_bytes())
        .map_err(|e| anyhow!("HTML rewrite error: {e}"))?;
    rewriter
        .end()
        .map_err(|e| anyhow!("HTML rewrite finalization error: {e}"))?;

    String::from_utf8(output).context("Invalid UTF-8 in rewritten HTML")
}

/// Rewrite references in a stylesheet that lives inside `assets/`.
#[must_use]
pub fn rewrite_css(css: &str, css_url: &Url, domain: &str) -> String {
    // String-form imports first so the url() pass does not see them
    let pass1 = CSS_IMPORT_STRING_RE.replace_all(css, |caps: &regex::Captures<'_>| {
        match map_reference(&caps[1], css_url, domain, "../") {
            Some(mapped) => format!(r#"@import "{mapped}""#),
            None => caps[0].to_string(),
        }
    });

    CSS_URL_RE
        .replace_all(&pass1, |caps: &regex::Captures<'_>| {
            match map_reference(&caps[1], css_url, domain, "../") {
                Some(mapped) => format!("url({mapped})"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn rewrite_srcset_value(srcset: &str, base: &Url, domain: &str) -> String {
    let candidates: Vec<String> = srcset
        .split(',')
        .map(|candidate| {
            let candidate = candidate.trim();
            let mut parts = candidate.splitn(2, char::is_whitespace);
            let url_part = parts.next().unwrap_or_default();
            let descriptor = parts.next();
            match map_reference(url_part, base, domain, "") {
                Some(mapped) => match descriptor {
                    Some(d) => format!("{mapped} {}", d.trim()),
                    None => mapped,
                },
                None => candidate.to_string(),
            }
        })
        .collect();
    candidates.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://example.com/").expect("page URL parses")
    }

    #[test]
    fn rewrites_internal_and_external_references() {
        let html = r#"<img src="/img/x.png"><link rel="stylesheet" href="https://cdn.y.com/s.css">"#;
        let out = rewrite_html(html, &page(), "example.com").expect("rewrite succeeds");
        assert!(out.contains(r#"src="assets/img/x.png""#), "got: {out}");
        assert!(
            out.contains(r#"href="assets/external/cdn.y.com/s.css""#),
            "got: {out}"
        );
    }

    #[test]
    fn preserves_data_and_fragment_references() {
        let html = r##"<img src="data:image/png;base64,AAAA"><link rel="stylesheet" href="#x">"##;
        let out = rewrite_html(html, &page(), "example.com").expect("rewrite succeeds");
        assert!(out.contains("data:image/png;base64,AAAA"));
        assert!(out.contains(r##"href="#x""##));
    }

    #[test]
    fn leaves_non_asset_content_untouched() {
        let html = "<p class=\"intro\">Hello <a href=\"/about\">there</a></p>\n<!-- note -->";
        let out = rewrite_html(html, &page(), "example.com").expect("rewrite succeeds");
        assert_eq!(out, html);
    }

    #[test]
    fn rewrites_each_srcset_candidate() {
        let html = r#"<img srcset="/img/a.png 1x, https://cdn.y.com/b.png 2x">"#;
        let out = rewrite_html(html, &page(), "example.com").expect("rewrite succeeds");
        assert!(
            out.contains("assets/img/a.png 1x, assets/external/cdn.y.com/b.png 2x"),
            "got: {out}"
        );
    }

    #[test]
    fn css_gets_parent_prefix() {
        let css_url = Url::parse("https://example.com/style.css").expect("URL parses");
        let css = r#"body { background: url(/img/bg.png); } @import "reset.css";"#;
        let out = rewrite_css(css, &css_url, "example.com");
        assert!(out.contains("url(../assets/img/bg.png)"), "got: {out}");
        assert!(out.contains(r#"@import "../assets/reset.css""#), "got: {out}");
    }

    #[test]
    fn css_external_and_data_references() {
        let css_url = Url::parse("https://example.com/style.css").expect("URL parses");
        let css = "a { background: url(https://cdn.y.com/i.gif); } b { background: url(data:image/gif;base64,R0); }";
        let out = rewrite_css(css, &css_url, "example.com");
        assert!(
            out.contains("url(../assets/external/cdn.y.com/i.gif)"),
            "got: {out}"
        );
        assert!(out.contains("url(data:image/gif;base64,R0)"), "got: {out}");
    }
}

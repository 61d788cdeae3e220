//! Selections file parsing.
//!
//! A selections file is the operator's input: one `TIMESTAMP|URL` pair per
//! line, where TIMESTAMP is 14 decimal digits (YYYYMMDDHHMMSS). Blank
//! lines and `#` comments are ignored; malformed lines are skipped with a
//! warning rather than aborting the load.

use std::path::Path;

use anyhow::{Context, Result};
use url::Url;

use crate::utils::derive_domain;

/// One operator-chosen capture to materialize locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// 14-digit capture timestamp
    pub timestamp: String,
    /// Absolute URL of the original page
    pub url: String,
    /// Host with any leading `www.` stripped
    pub domain: String,
}

/// Load and parse a selections file
pub async fn load_selections(path: &Path) -> Result<Vec<Selection>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read selections file {}", path.display()))?;
    Ok(parse_selections(&contents))
}

/// Parse selections from file contents
#[must_use]
pub fn parse_selections(contents: &str) -> Vec<Selection> {
    let mut selections = Vec::new();

    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match parse_line(line) {
            Some(selection) => selections.push(selection),
            None => {
                log::warn!("Skipping malformed selection on line {}: {line}", lineno + 1);
            }
        }
    }

    selections
}

fn parse_line(line: &str) -> Option<Selection> {
    let (timestamp, url_str) = line.split_once('|')?;
    let timestamp = timestamp.trim();
    let url_str = url_str.trim();

    if timestamp.len() != 14 || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let url = Url::parse(url_str).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let domain = derive_domain(&url)?;

    Some(Selection {
        timestamp: timestamp.to_string(),
        url: url_str.to_string(),
        domain,
    })
}

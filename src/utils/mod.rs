pub mod constants;
pub mod url_utils;

pub use constants::*;
pub use url_utils::{
    archive_url, asset_rel_path, derive_domain, is_internal_host, page_rel_path, raw_archive_url,
    strip_archive_prefix,
};

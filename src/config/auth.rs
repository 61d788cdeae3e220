//! Credential loading for the upstream archive.
//!
//! The archive requires a logged-in cookie pair for capture requests; an
//! optional S3-style key pair adds an `Authorization: LOW` header. Both
//! come from the process environment so secrets never land in shell
//! history or config files.

use std::env;

use crate::error::{MirrorError, MirrorResult};

/// Environment variable holding the `logged-in-user` cookie value
pub const ENV_LOGGED_IN_USER: &str = "ARCHIVE_LOGGED_IN_USER";
/// Environment variable holding the `logged-in-sig` cookie value
pub const ENV_LOGGED_IN_SIG: &str = "ARCHIVE_LOGGED_IN_SIG";
/// Optional S3-style access key
pub const ENV_S3_ACCESS: &str = "ARCHIVE_S3_ACCESS";
/// Optional S3-style secret key
pub const ENV_S3_SECRET: &str = "ARCHIVE_S3_SECRET";

/// Authentication material for the archive
#[derive(Debug, Clone)]
pub struct ArchiveCredentials {
    pub(crate) logged_in_user: String,
    pub(crate) logged_in_sig: String,
    pub(crate) s3_access: Option<String>,
    pub(crate) s3_secret: Option<String>,
}

impl ArchiveCredentials {
    /// Load credentials from the environment.
    ///
    /// Missing required variables are a fatal startup error; the optional
    /// S3 pair is only used when both halves are present.
    pub fn from_env() -> MirrorResult<Self> {
        let logged_in_user = require(ENV_LOGGED_IN_USER)?;
        let logged_in_sig = require(ENV_LOGGED_IN_SIG)?;

        let s3_access = env::var(ENV_S3_ACCESS).ok().filter(|v| !v.is_empty());
        let s3_secret = env::var(ENV_S3_SECRET).ok().filter(|v| !v.is_empty());
        if s3_access.is_some() != s3_secret.is_some() {
            log::warn!(
                "Only one of {ENV_S3_ACCESS}/{ENV_S3_SECRET} is set; S3 authorization disabled"
            );
        }

        Ok(Self {
            logged_in_user,
            logged_in_sig,
            s3_access,
            s3_secret,
        })
    }

    /// Construct credentials directly (tests, embedding)
    #[must_use]
    pub fn new(logged_in_user: impl Into<String>, logged_in_sig: impl Into<String>) -> Self {
        Self {
            logged_in_user: logged_in_user.into(),
            logged_in_sig: logged_in_sig.into(),
            s3_access: None,
            s3_secret: None,
        }
    }

    /// Attach the optional S3-style key pair
    #[must_use]
    pub fn with_s3_keys(mut self, access: impl Into<String>, secret: impl Into<String>) -> Self {
        self.s3_access = Some(access.into());
        self.s3_secret = Some(secret.into());
        self
    }

    /// Value for the `Cookie` request header
    #[must_use]
    pub fn cookie_header(&self) -> String {
        format!(
            "logged-in-user={}; logged-in-sig={}",
            self.logged_in_user, self.logged_in_sig
        )
    }

    /// Value for the `Authorization` header, when the S3 pair is complete
    #[must_use]
    pub fn authorization_header(&self) -> Option<String> {
        match (&self.s3_access, &self.s3_secret) {
            (Some(access), Some(secret)) => Some(format!("LOW {access}:{secret}")),
            _ => None,
        }
    }
}

fn require(name: &str) -> MirrorResult<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(MirrorError::FatalConfig(format!(
            "Required environment variable {name} is not set"
        ))),
    }
}

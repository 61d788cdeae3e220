//! Configuration module for archive mirroring
//!
//! Provides the `MirrorConfig` struct and its builder, plus the credential
//! loader for the upstream archive. All knobs have sensible defaults; only
//! the credentials are mandatory and those come from the environment.

pub mod auth;
pub mod builder;
pub mod types;

pub use auth::ArchiveCredentials;
pub use builder::MirrorConfigBuilder;
pub use types::MirrorConfig;

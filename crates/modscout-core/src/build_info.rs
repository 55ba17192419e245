//! Build metadata embedded by `build.rs`.
//!
//! Surfaced in the health response, the CLI long version, and the
//! `User-Agent` sent to the registry and repository host.

use serde::Serialize;

/// Short git commit hash at build time.
pub const GIT_HASH: &str = env!("MODSCOUT_GIT_HASH");

/// Build time as Unix epoch seconds.
pub const BUILD_TIMESTAMP: &str = env!("MODSCOUT_BUILD_TIMESTAMP");

/// Cargo profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("MODSCOUT_BUILD_PROFILE");

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `"0.1.0 (abc1234, debug)"`
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}

/// `User-Agent` header value for outbound requests.
pub fn user_agent() -> String {
    format!("modscout/{VERSION}")
}

/// Serializable snapshot of the build metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub profile: &'static str,
    pub built_at: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            profile: BUILD_PROFILE,
            built_at: BUILD_TIMESTAMP,
        }
    }
}

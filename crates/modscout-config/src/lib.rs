#![deny(unsafe_code)]

//! Configuration loading, validation, and access policy for modscout.
//!
//! Loads TOML configuration files and validates them against expected schemas.
//! Provides the [`AppConfig`] type as the central configuration structure,
//! and the [`policy`] module for the namespace allow-list / module deny-list.

/// Namespace allow-list and module deny-list.
pub mod policy;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

/// Environment variable overriding `policy.allowed_namespaces` (comma-separated).
pub const ENV_ALLOWED_NAMESPACES: &str = "MODSCOUT_ALLOWED_NAMESPACES";
/// Environment variable overriding `policy.excluded_modules` (comma-separated).
pub const ENV_EXCLUDED_MODULES: &str = "MODSCOUT_EXCLUDED_MODULES";
/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "MODSCOUT_LOG_LEVEL";

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Namespace allow-list and module deny-list.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Module registry endpoint.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Source repository host.
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Resolution cache for pinned module references.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Configuration for the HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the server listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Port the server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Access policy as expressed in TOML.
///
/// ## TOML Example
///
/// ```toml
/// [policy]
/// allowed_namespaces = ["terraform-ibm-modules"]
/// excluded_modules = ["terraform-ibm-modules/legacy-vpc/ibm"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Registry namespaces whose modules may be used. `"*"` allows any.
    #[serde(default = "default_allowed_namespaces")]
    pub allowed_namespaces: Vec<String>,

    /// Module families (`namespace/name/target`) that must never be used.
    #[serde(default)]
    pub excluded_modules: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_namespaces: default_allowed_namespaces(),
            excluded_modules: Vec::new(),
        }
    }
}

fn default_allowed_namespaces() -> Vec<String> {
    vec![policy::DEFAULT_NAMESPACE.to_string()]
}

/// Module registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the registry's module API.
    #[serde(default = "default_registry_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Search term used by the health probe.
    #[serde(default = "default_probe_query")]
    pub probe_query: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: default_registry_base_url(),
            timeout_secs: default_timeout_secs(),
            probe_query: default_probe_query(),
        }
    }
}

fn default_registry_base_url() -> String {
    "https://registry.terraform.io/v1/modules".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_probe_query() -> String {
    "vpc".to_string()
}

/// Source repository host configuration.
///
/// ## TOML Example
///
/// ```toml
/// [repository]
/// token_env = "GITHUB_TOKEN"
/// tag_prefix = "v"
/// max_file_bytes = 262144
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Repository host recognized in module source URLs.
    #[serde(default = "default_repository_host")]
    pub host: String,

    /// REST API base URL for trees and rate limits.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Base URL serving raw file contents.
    #[serde(default = "default_raw_url")]
    pub raw_url: String,

    /// Environment variable holding the API token. The token itself never
    /// appears in the config file.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Prefix applied to a module version to form its release tag.
    /// Empty means the bare version is the tag.
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of file fetches in flight for one request.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Files larger than this are omitted.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Maximum number of files returned by one content request.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Remaining API quota at or below which the host reports degraded.
    #[serde(default = "default_min_remaining_quota")]
    pub min_remaining_quota: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            host: default_repository_host(),
            api_url: default_api_url(),
            raw_url: default_raw_url(),
            token_env: default_token_env(),
            tag_prefix: default_tag_prefix(),
            timeout_secs: default_timeout_secs(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            max_file_bytes: default_max_file_bytes(),
            max_files: default_max_files(),
            min_remaining_quota: default_min_remaining_quota(),
        }
    }
}

impl RepositoryConfig {
    /// Read the API token from the configured environment variable.
    pub fn token(&self) -> Option<SecretToken> {
        let value = std::env::var(&self.token_env).ok()?;
        if value.trim().is_empty() {
            return None;
        }
        Some(SecretToken::new(value.trim()))
    }
}

fn default_repository_host() -> String {
    "github.com".to_string()
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_raw_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_tag_prefix() -> String {
    "v".to_string()
}

fn default_max_concurrent_fetches() -> usize {
    4
}

fn default_max_file_bytes() -> u64 {
    256 * 1024 // 256 KiB
}

fn default_max_files() -> usize {
    50
}

fn default_min_remaining_quota() -> u64 {
    10
}

/// Resolution cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether pinned lookups are cached at all.
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Maximum number of entries per cache.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Entry lifetime in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    256
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

/// An API token that is zeroized on drop and never printed.
#[derive(Clone)]
pub struct SecretToken(Zeroizing<String>);

impl SecretToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Borrow the raw token for use in a request header.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken([REDACTED])")
    }
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MODSCOUT_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup, then re-validate.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_ALLOWED_NAMESPACES) {
            debug!(var = ENV_ALLOWED_NAMESPACES, "Overriding allowed namespaces");
            self.policy.allowed_namespaces = split_list(&value);
        }
        if let Some(value) = lookup(ENV_EXCLUDED_MODULES) {
            debug!(var = ENV_EXCLUDED_MODULES, "Overriding excluded modules");
            self.policy.excluded_modules = split_list(&value);
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = value.trim().to_string();
        }
        self.validate()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen_port == 0 {
            return Err(ConfigError::Validation(
                "server.listen_port must be non-zero".to_string(),
            ));
        }
        if self.server.listen_addr.is_empty() {
            return Err(ConfigError::Validation(
                "server.listen_addr must not be empty".to_string(),
            ));
        }
        if self.logging.level.is_empty() {
            return Err(ConfigError::Validation(
                "logging.level must not be empty".to_string(),
            ));
        }

        // Validate policy
        if self.policy.allowed_namespaces.is_empty() {
            return Err(ConfigError::Validation(
                "policy.allowed_namespaces must list at least one namespace".to_string(),
            ));
        }
        for (i, ns) in self.policy.allowed_namespaces.iter().enumerate() {
            if ns.trim().is_empty() || (ns != policy::ANY_NAMESPACE && ns.contains('/')) {
                return Err(ConfigError::Validation(format!(
                    "policy.allowed_namespaces[{i}] must be a bare namespace, got {ns:?}"
                )));
            }
        }
        for (i, id) in self.policy.excluded_modules.iter().enumerate() {
            let segments: Vec<&str> = id.split('/').collect();
            if segments.len() != 3 || segments.iter().any(|s| s.trim().is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "policy.excluded_modules[{i}] must be \"namespace/name/target\", got {id:?}"
                )));
            }
        }

        // Validate upstream endpoints
        for (field, value) in [
            ("registry.base_url", &self.registry.base_url),
            ("repository.api_url", &self.repository.api_url),
            ("repository.raw_url", &self.repository.raw_url),
        ] {
            if !(value.starts_with("https://") || value.starts_with("http://")) {
                return Err(ConfigError::Validation(format!(
                    "{field} must be an http(s) URL, got {value:?}"
                )));
            }
        }
        if self.registry.timeout_secs == 0 || self.repository.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "registry.timeout_secs and repository.timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.registry.probe_query.trim().is_empty() {
            return Err(ConfigError::Validation(
                "registry.probe_query must not be empty".to_string(),
            ));
        }
        if self.repository.host.is_empty() {
            return Err(ConfigError::Validation(
                "repository.host must not be empty".to_string(),
            ));
        }
        if self.repository.max_concurrent_fetches == 0 {
            return Err(ConfigError::Validation(
                "repository.max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.repository.max_file_bytes == 0 {
            return Err(ConfigError::Validation(
                "repository.max_file_bytes must be non-zero".to_string(),
            ));
        }
        if self.repository.max_files == 0 {
            return Err(ConfigError::Validation(
                "repository.max_files must be at least 1".to_string(),
            ));
        }

        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(ConfigError::Validation(
                "cache.capacity must be at least 1 when the cache is enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the [`AccessPolicy`](policy::AccessPolicy) from the loaded policy config.
    pub fn build_access_policy(&self) -> policy::AccessPolicy {
        policy::AccessPolicy::new(
            &self.policy.allowed_namespaces,
            &self.policy.excluded_modules,
        )
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

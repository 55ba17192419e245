//! Configuration builders for tests.
//!
//! [`TestConfigBuilder`] produces in-memory [`AppConfig`] values;
//! [`TestConfigFile`] writes one to a temporary `modscout.toml` for tests
//! that exercise file loading.

use std::path::{Path, PathBuf};

use modscout_config::AppConfig;
use tempfile::TempDir;

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .allowed_namespaces(&["terraform-ibm-modules"])
///     .max_files(5)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.server.listen_port = port;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn allowed_namespaces(mut self, namespaces: &[&str]) -> Self {
        self.config.policy.allowed_namespaces = namespaces.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn excluded_modules(mut self, modules: &[&str]) -> Self {
        self.config.policy.excluded_modules = modules.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn registry_url(mut self, url: &str) -> Self {
        self.config.registry.base_url = url.to_string();
        self
    }

    /// Point both GitHub endpoints at one base URL (e.g. a local test server).
    pub fn repository_urls(mut self, api_url: &str, raw_url: &str) -> Self {
        self.config.repository.api_url = api_url.to_string();
        self.config.repository.raw_url = raw_url.to_string();
        self
    }

    pub fn tag_prefix(mut self, prefix: &str) -> Self {
        self.config.repository.tag_prefix = prefix.to_string();
        self
    }

    pub fn max_files(mut self, n: usize) -> Self {
        self.config.repository.max_files = n;
        self
    }

    pub fn max_file_bytes(mut self, n: u64) -> Self {
        self.config.repository.max_file_bytes = n;
        self
    }

    pub fn max_concurrent_fetches(mut self, n: usize) -> Self {
        self.config.repository.max_concurrent_fetches = n;
        self
    }

    pub fn cache(mut self, enabled: bool, capacity: usize, ttl_secs: u64) -> Self {
        self.config.cache.enabled = enabled;
        self.config.cache.capacity = capacity;
        self.config.cache.ttl_secs = ttl_secs;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A `modscout.toml` inside a temporary directory, removed on drop.
pub struct TestConfigFile {
    _dir: TempDir,
    path: PathBuf,
}

impl TestConfigFile {
    /// Write raw TOML.
    pub fn new(contents: &str) -> Self {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("create temp dir: {e}"));
        let path = dir.path().join("modscout.toml");
        std::fs::write(&path, contents).unwrap_or_else(|e| panic!("write config: {e}"));
        Self { _dir: dir, path }
    }

    /// Serialize `config` and write it.
    pub fn from_config(config: &AppConfig) -> Self {
        let contents =
            toml::to_string(config).unwrap_or_else(|e| panic!("serialize config: {e}"));
        Self::new(&contents)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

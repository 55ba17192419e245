//! The module and content resolution engine.
//!
//! Every operation that takes a module identifier runs the same pipeline:
//!
//! 1. parse the identifier (local, no network)
//! 2. check the access policy (local, no network)
//! 3. validate any other request arguments (local, no network)
//! 4. resolve the version and fetch registry metadata
//! 5. locate the repository and read its tree / files
//!
//! Failures in steps 1–3 therefore never cost an outbound request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use modscout_config::AppConfig;
use modscout_config::policy::{AccessPolicy, PolicyDecision};
use tracing::{debug, info, warn};

use crate::cache::ResolutionCache;
use crate::content::{
    ContentBundle, ContentFilter, ContentGroup, ContentListing, classify, describe,
    has_binary_extension,
};
use crate::error::{ClientSetupError, EngineError};
use crate::health::{HealthAggregator, HealthStatus};
use crate::reference::{self, ModuleReference};
use crate::registry::{
    HttpRegistryClient, MAX_SEARCH_LIMIT, ModuleDetail, RegistryClient, SearchResults, clamp_limit,
};
use crate::repository::{
    ContentOmission, FileBatch, GitHubContentClient, LocatedRepository, OmissionReason,
    RepositoryContentClient, RepositoryLocator, RepositoryRef, TagConvention, TreeEntry,
};

pub const DEFAULT_MAX_FILES: usize = 50;
pub const DEFAULT_MAX_FILE_BYTES: u64 = 256 * 1024;

pub struct ModuleEngine {
    registry: Arc<dyn RegistryClient>,
    repository: Arc<dyn RepositoryContentClient>,
    policy: AccessPolicy,
    locator: RepositoryLocator,
    health: HealthAggregator,
    detail_cache: Option<ResolutionCache<ModuleDetail>>,
    location_cache: Option<ResolutionCache<LocatedRepository>>,
    max_files: usize,
    max_file_bytes: u64,
}

impl ModuleEngine {
    /// An engine with default limits, a `github.com` locator using `v`
    /// tags, and no caching.
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        repository: Arc<dyn RepositoryContentClient>,
        policy: AccessPolicy,
    ) -> Self {
        let health = HealthAggregator::new(registry.clone(), repository.clone());
        Self {
            registry,
            repository,
            policy,
            locator: RepositoryLocator::new("github.com", TagConvention::default()),
            health,
            detail_cache: None,
            location_cache: None,
            max_files: DEFAULT_MAX_FILES,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    /// Wire an engine from configuration around the given clients.
    pub fn from_config(
        config: &AppConfig,
        registry: Arc<dyn RegistryClient>,
        repository: Arc<dyn RepositoryContentClient>,
    ) -> Self {
        let probe_timeout = Duration::from_secs(
            config
                .registry
                .timeout_secs
                .min(config.repository.timeout_secs),
        );
        let mut engine = Self::new(registry, repository, config.build_access_policy())
            .with_locator(RepositoryLocator::from_config(&config.repository))
            .with_limits(config.repository.max_files, config.repository.max_file_bytes)
            .with_health_probe(
                config.registry.probe_query.clone(),
                probe_timeout,
                config.repository.min_remaining_quota,
            );
        engine.detail_cache = ResolutionCache::from_config(&config.cache);
        engine.location_cache = ResolutionCache::from_config(&config.cache);
        engine
    }

    /// Build the HTTP clients described by `config` and wire an engine.
    pub fn connect(config: &AppConfig) -> Result<Self, ClientSetupError> {
        let registry = Arc::new(HttpRegistryClient::from_config(&config.registry)?);
        let repository = Arc::new(GitHubContentClient::from_config(&config.repository)?);
        info!(
            registry = %config.registry.base_url,
            repository = %config.repository.api_url,
            "Engine connected"
        );
        Ok(Self::from_config(config, registry, repository))
    }

    pub fn with_locator(mut self, locator: RepositoryLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_limits(mut self, max_files: usize, max_file_bytes: u64) -> Self {
        self.max_files = max_files;
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn with_health_probe(
        mut self,
        query: impl Into<String>,
        timeout: Duration,
        min_remaining_quota: u64,
    ) -> Self {
        self.health = HealthAggregator::new(self.registry.clone(), self.repository.clone())
            .with_probe_query(query)
            .with_probe_timeout(timeout)
            .with_min_remaining_quota(min_remaining_quota);
        self
    }

    /// Enable the pinned-resolution caches.
    pub fn with_cache(mut self, capacity: usize, ttl: Duration) -> Self {
        self.detail_cache = ResolutionCache::new(capacity, ttl);
        self.location_cache = ResolutionCache::new(capacity, ttl);
        self
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Fail with `PolicyDenied` unless the policy admits the reference.
    pub fn authorize(&self, reference: &ModuleReference) -> Result<(), EngineError> {
        match self
            .policy
            .evaluate(reference.namespace(), &reference.module_id())
        {
            PolicyDecision::Allowed => Ok(()),
            PolicyDecision::Denied(reason) => {
                debug!(module = %reference, %reason, "Access policy denied module");
                Err(EngineError::PolicyDenied {
                    module: reference.to_string(),
                    reason: reason.to_string(),
                })
            }
        }
    }

    /// Search the registry, keeping only policy-allowed modules in registry
    /// order.
    pub async fn search_modules(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<SearchResults, EngineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::InvalidRequest(
                "search query must not be empty".to_string(),
            ));
        }
        let limit = clamp_limit(limit);
        // Over-fetch so policy filtering can still fill the page.
        let window = (limit * 2).clamp(limit, MAX_SEARCH_LIMIT);

        let results = self.registry.search(query, window).await?;
        let fetched = results.modules.len();
        let results = results
            .retain(|m| {
                self.policy
                    .is_allowed(m.reference.namespace(), &m.reference.module_id())
            })
            .truncate(limit);

        debug!(
            query,
            fetched,
            returned = results.modules.len(),
            "Search complete"
        );
        Ok(results)
    }

    pub async fn get_module_details(&self, module_id: &str) -> Result<ModuleDetail, EngineError> {
        let reference = ModuleReference::parse(module_id)?;
        self.authorize(&reference)?;
        self.detail_for(&reference).await
    }

    /// Group the module's repository into root, examples and submodules,
    /// with descriptions taken from each group's README.
    pub async fn list_content(&self, module_id: &str) -> Result<ContentListing, EngineError> {
        let reference = ModuleReference::parse(module_id)?;
        self.authorize(&reference)?;

        let detail = self.detail_for(&reference).await?;
        let located = self.locate(&reference, &detail)?;
        let root = located.subdir.clone().unwrap_or_default();
        let (repo, entries) = self
            .list_tree_with_fallback(&reference, &located, &root)
            .await?;

        let relative: Vec<TreeEntry> = entries
            .into_iter()
            .filter_map(|e| {
                let path = strip_root(&e.path, &root)?.to_string();
                Some(TreeEntry { path, ..e })
            })
            .filter(|e| !e.path.is_empty())
            .collect();

        let mut classification = classify(&relative);
        for group in classification.groups_mut() {
            rebase(group, &root);
        }

        let readmes: Vec<String> = classification
            .groups()
            .filter_map(|g| g.readme_path().map(str::to_string))
            .collect();
        let texts = self.fetch_readmes(&repo, &readmes).await;
        for group in classification.groups_mut() {
            group.description = group
                .readme_path()
                .and_then(|p| texts.get(p))
                .and_then(|text| describe(text));
        }

        Ok(ContentListing {
            module: detail.reference,
            repository: repo,
            root: classification.root,
            examples: classification.examples,
            submodules: classification.submodules,
        })
    }

    /// Fetch the files under `path` that pass the include/exclude globs.
    ///
    /// `exclude = None` applies the default test-file exclusions. Files that
    /// are binary, too large, over the file budget, or fail individually are
    /// reported in `omitted`.
    pub async fn get_content(
        &self,
        module_id: &str,
        path: &str,
        include: &[String],
        exclude: Option<&[String]>,
    ) -> Result<ContentBundle, EngineError> {
        let reference = ModuleReference::parse(module_id)?;
        self.authorize(&reference)?;
        let path = validate_content_path(path)?;
        let filter = ContentFilter::new(include, exclude)?;

        let detail = self.detail_for(&reference).await?;
        let located = self.locate(&reference, &detail)?;
        let root = join_path(located.subdir.as_deref().unwrap_or(""), path);
        let (repo, entries) = self
            .list_tree_with_fallback(&reference, &located, &root)
            .await?;
        if entries.is_empty() {
            return Err(EngineError::PathNotFound {
                repository: repo.location(),
                path: root,
            });
        }

        let files: Vec<TreeEntry> = entries.into_iter().filter(TreeEntry::is_file).collect();
        let selected = filter.filter(files, &root);

        let mut omitted = Vec::new();
        let mut to_fetch = Vec::new();
        for entry in selected {
            let reason = if has_binary_extension(&entry.path) {
                Some(OmissionReason::Binary)
            } else if let Some(size) = entry.size_bytes.filter(|s| *s > self.max_file_bytes) {
                Some(OmissionReason::TooLarge {
                    size_bytes: size,
                    limit_bytes: self.max_file_bytes,
                })
            } else if to_fetch.len() >= self.max_files {
                Some(OmissionReason::FileLimit {
                    limit: self.max_files,
                })
            } else {
                None
            };
            match reason {
                Some(reason) => omitted.push(ContentOmission::new(entry.path, reason)),
                None => to_fetch.push(entry.path),
            }
        }

        let batch = if to_fetch.is_empty() {
            FileBatch::default()
        } else {
            self.repository
                .get_files(&repo, &to_fetch)
                .await
                .map_err(|e| e.for_module(&reference))?
        };
        omitted.extend(batch.omitted);
        if !omitted.is_empty() {
            warn!(
                module = %detail.reference,
                omitted = omitted.len(),
                "Some requested files were omitted"
            );
        }

        Ok(ContentBundle {
            module: detail.reference,
            repository: repo,
            path: root,
            files: batch.files,
            omitted,
        })
    }

    pub async fn health(&self) -> HealthStatus {
        self.health.check().await
    }

    /// Registry metadata for a reference, from the cache when the request
    /// was pinned.
    async fn detail_for(&self, reference: &ModuleReference) -> Result<ModuleDetail, EngineError> {
        let key = reference.pinned_key();
        if let (Some(key), Some(cache)) = (&key, &self.detail_cache)
            && let Some(hit) = cache.get(key)
        {
            return Ok(hit);
        }

        let pinned = reference::resolve(reference, self.registry.as_ref())
            .await
            .map_err(|e| e.for_module(reference))?;
        let detail = self
            .registry
            .get_detail(&pinned)
            .await
            .map_err(|e| e.for_module(reference))?;

        if let (Some(key), Some(cache)) = (key, &self.detail_cache) {
            cache.put(key, detail.clone());
        }
        Ok(detail)
    }

    fn locate(
        &self,
        requested: &ModuleReference,
        detail: &ModuleDetail,
    ) -> Result<LocatedRepository, EngineError> {
        let key = requested.pinned_key();
        if let (Some(key), Some(cache)) = (&key, &self.location_cache)
            && let Some(hit) = cache.get(key)
        {
            return Ok(hit);
        }

        let located = self.locator.locate(detail, requested.version_spec())?;
        if let (Some(key), Some(cache)) = (key, &self.location_cache) {
            cache.put(key, located.clone());
        }
        Ok(located)
    }

    /// List the tree at the primary ref, retrying at the default branch only
    /// when the primary ref does not exist and a fallback was offered.
    async fn list_tree_with_fallback(
        &self,
        reference: &ModuleReference,
        located: &LocatedRepository,
        path: &str,
    ) -> Result<(RepositoryRef, Vec<TreeEntry>), EngineError> {
        let attributed = |e: EngineError| e.for_module(reference);
        match self.repository.list_tree(&located.primary, path).await {
            Ok(entries) => Ok((located.primary.clone(), entries)),
            Err(err @ EngineError::RefNotFound { .. }) => match &located.fallback {
                Some(fallback) => {
                    warn!(
                        missing = %located.primary,
                        fallback = %fallback,
                        "Release tag not found, reading default branch"
                    );
                    let entries = self
                        .repository
                        .list_tree(fallback, path)
                        .await
                        .map_err(attributed)?;
                    Ok((fallback.clone(), entries))
                }
                None => Err(err),
            },
            Err(err) => Err(attributed(err)),
        }
    }

    /// README bodies by path. A failed fetch only loses descriptions.
    async fn fetch_readmes(&self, repo: &RepositoryRef, paths: &[String]) -> HashMap<String, String> {
        if paths.is_empty() {
            return HashMap::new();
        }
        match self.repository.get_files(repo, paths).await {
            Ok(batch) => batch.files.into_iter().map(|f| (f.path, f.text)).collect(),
            Err(e) => {
                warn!(repository = %repo, error = %e, "Could not fetch READMEs for descriptions");
                HashMap::new()
            }
        }
    }
}

/// Reject content paths that could escape the repository. Returns the path
/// without a trailing slash; `""` is the repository root.
fn validate_content_path(path: &str) -> Result<&str, EngineError> {
    let invalid = |reason: &str| EngineError::InvalidRequest(format!("invalid content path {path:?}: {reason}"));

    if path.starts_with('/') {
        return Err(invalid("must be relative to the module root"));
    }
    if path.contains('\\') {
        return Err(invalid("backslashes are not allowed"));
    }
    if path.chars().any(char::is_control) {
        return Err(invalid("control characters are not allowed"));
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok("");
    }
    for segment in trimmed.split('/') {
        match segment {
            "" => return Err(invalid("empty path segment")),
            "." | ".." => return Err(invalid("path traversal is not allowed")),
            _ => {}
        }
    }
    Ok(trimmed)
}

fn join_path(base: &str, path: &str) -> String {
    match (base.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{path}"),
    }
}

fn strip_root<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    if root.is_empty() {
        return Some(path);
    }
    if path == root {
        return Some("");
    }
    path.strip_prefix(root)?.strip_prefix('/')
}

/// Make a group classified under `root` repository-relative again.
fn rebase(group: &mut ContentGroup, root: &str) {
    if root.is_empty() {
        return;
    }
    group.path = join_path(root, &group.path);
    for file in &mut group.files {
        *file = join_path(root, file);
    }
}

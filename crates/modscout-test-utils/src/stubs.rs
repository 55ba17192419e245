//! In-memory [`RegistryClient`] and [`RepositoryContentClient`] stubs.
//!
//! Both stubs count every call so tests can assert that local failures
//! (bad identifiers, policy denials) never reach a client. Delays and
//! failure modes simulate slow or unavailable upstreams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use modscout_core::BoxFuture;
use modscout_core::error::EngineError;
use modscout_core::reference::{self, ModuleReference};
use modscout_core::registry::{ModuleDetail, ModuleSummary, RegistryClient, SearchResults};
use modscout_core::repository::{
    ContentOmission, FileBatch, FileContent, OmissionReason, RateLimitSnapshot,
    RepositoryContentClient, RepositoryRef, TreeEntry, is_within,
};
use tracing::trace;

// ── Registry ────────────────────────────────────────────────────────────

/// Registry stub. Search returns registered hits in insertion order; the
/// latest version of a family is the last one registered.
#[derive(Default)]
pub struct StubRegistry {
    hits: Vec<ModuleSummary>,
    details: HashMap<String, ModuleDetail>,
    latest: HashMap<String, String>,
    failure: Option<EngineError>,
    delay: Option<Duration>,
    search_calls: AtomicUsize,
    detail_calls: AtomicUsize,
    version_calls: AtomicUsize,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module version: its detail, a search hit, and latest version.
    pub fn with_module(mut self, detail: ModuleDetail) -> Self {
        let summary = ModuleSummary {
            reference: detail.reference.clone(),
            description: detail.description.clone(),
            downloads: 0,
            verified: false,
            source_url: Some(detail.source_url.clone()),
            published_at: detail.published_at.clone(),
        };
        if let Some(version) = detail.reference.version() {
            self.latest
                .insert(detail.reference.module_id(), version.to_string());
        }
        self.hits.retain(|h| h.reference.module_id() != summary.reference.module_id());
        self.hits.push(summary);
        self.details.insert(detail.reference.to_string(), detail);
        self
    }

    /// Add a search hit without a detail record.
    pub fn with_search_hit(mut self, summary: ModuleSummary) -> Self {
        self.hits.push(summary);
        self
    }

    pub fn with_latest(mut self, module_id: &str, version: &str) -> Self {
        self.latest.insert(module_id.to_string(), version.to_string());
        self
    }

    /// Fail every call with `err`.
    pub fn failing(mut self, err: EngineError) -> Self {
        self.failure = Some(err);
        self
    }

    /// Sleep before answering every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    pub fn version_calls(&self) -> usize {
        self.version_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.search_calls() + self.detail_calls() + self.version_calls()
    }

    async fn respond(&self) -> Result<(), EngineError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl RegistryClient for StubRegistry {
    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<SearchResults, EngineError>> {
        Box::pin(async move {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            trace!(query, limit, "Stub registry search");
            self.respond().await?;

            let needle = query.trim().to_ascii_lowercase();
            if needle.is_empty() {
                return Err(EngineError::InvalidRequest(
                    "search query must not be empty".to_string(),
                ));
            }
            let modules = self
                .hits
                .iter()
                .filter(|h| {
                    h.reference.name().contains(&needle)
                        || h.description.to_ascii_lowercase().contains(&needle)
                })
                .take(limit)
                .cloned()
                .collect();
            Ok(SearchResults::new(query.trim(), modules))
        })
    }

    fn get_detail<'a>(
        &'a self,
        reference: &'a ModuleReference,
    ) -> BoxFuture<'a, Result<ModuleDetail, EngineError>> {
        Box::pin(async move {
            let pinned = reference::resolve(reference, self).await?;
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            self.respond().await?;

            self.details
                .get(&pinned.to_string())
                .cloned()
                .ok_or_else(|| EngineError::ModuleNotFound {
                    module: pinned.to_string(),
                })
        })
    }

    fn latest_version<'a>(
        &'a self,
        reference: &'a ModuleReference,
    ) -> BoxFuture<'a, Result<String, EngineError>> {
        Box::pin(async move {
            self.version_calls.fetch_add(1, Ordering::SeqCst);
            self.respond().await?;

            self.latest
                .get(&reference.module_id())
                .cloned()
                .ok_or_else(|| EngineError::ModuleNotFound {
                    module: reference.module_id(),
                })
        })
    }
}

// ── Repository ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum StubFile {
    Text(String),
    Binary,
    Unavailable(String),
}

/// Repository stub. Trees are keyed by ref (`v8.4.0`, `HEAD`, ...) and
/// shared across repositories; file bodies are keyed by path.
pub struct StubRepository {
    trees: HashMap<String, Vec<TreeEntry>>,
    files: HashMap<String, StubFile>,
    quota: RateLimitSnapshot,
    failure: Option<EngineError>,
    list_delay: Option<Duration>,
    rate_limit_delay: Option<Duration>,
    list_calls: AtomicUsize,
    get_files_calls: AtomicUsize,
    rate_limit_calls: AtomicUsize,
    listed: Mutex<Vec<RepositoryRef>>,
    fetched: Mutex<Vec<String>>,
}

impl Default for StubRepository {
    fn default() -> Self {
        Self {
            trees: HashMap::new(),
            files: HashMap::new(),
            quota: RateLimitSnapshot {
                limit: 5000,
                remaining: 4999,
                reset_epoch_secs: 1_700_000_000,
            },
            failure: None,
            list_delay: None,
            rate_limit_delay: None,
            list_calls: AtomicUsize::new(0),
            get_files_calls: AtomicUsize::new(0),
            rate_limit_calls: AtomicUsize::new(0),
            listed: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
        }
    }
}

impl StubRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tree at `reference` made of text files, registering their bodies.
    pub fn with_text_tree(mut self, reference: &str, files: &[(&str, &str)]) -> Self {
        let entries = files
            .iter()
            .map(|(path, text)| TreeEntry::file(*path, Some(text.len() as u64)))
            .collect();
        for (path, text) in files {
            self.files
                .insert(path.to_string(), StubFile::Text(text.to_string()));
        }
        self.trees.insert(reference.to_string(), entries);
        self
    }

    /// A tree at `reference` with explicit entries; bodies are added separately.
    pub fn with_tree(mut self, reference: &str, entries: Vec<TreeEntry>) -> Self {
        self.trees.insert(reference.to_string(), entries);
        self
    }

    pub fn with_file(mut self, path: &str, text: &str) -> Self {
        self.files
            .insert(path.to_string(), StubFile::Text(text.to_string()));
        self
    }

    pub fn with_binary_file(mut self, path: &str) -> Self {
        self.files.insert(path.to_string(), StubFile::Binary);
        self
    }

    /// A file whose fetch fails upstream (timeout, 5xx) with `detail`.
    pub fn with_unavailable_file(mut self, path: &str, detail: &str) -> Self {
        self.files
            .insert(path.to_string(), StubFile::Unavailable(detail.to_string()));
        self
    }

    pub fn with_rate_limit(mut self, quota: RateLimitSnapshot) -> Self {
        self.quota = quota;
        self
    }

    /// Fail tree listings and file fetches with `err`.
    pub fn failing(mut self, err: EngineError) -> Self {
        self.failure = Some(err);
        self
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = Some(delay);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_files_calls(&self) -> usize {
        self.get_files_calls.load(Ordering::SeqCst)
    }

    pub fn rate_limit_calls(&self) -> usize {
        self.rate_limit_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.list_calls() + self.get_files_calls() + self.rate_limit_calls()
    }

    /// Every ref `list_tree` was called with, in call order.
    pub fn listed_refs(&self) -> Vec<RepositoryRef> {
        self.listed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every path passed to `get_files`, in call order.
    pub fn fetched_paths(&self) -> Vec<String> {
        self.fetched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RepositoryContentClient for StubRepository {
    fn list_tree<'a>(
        &'a self,
        repo: &'a RepositoryRef,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Vec<TreeEntry>, EngineError>> {
        Box::pin(async move {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.listed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(repo.clone());
            if let Some(delay) = self.list_delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(err) = &self.failure {
                return Err(err.clone());
            }

            let tree = self
                .trees
                .get(&repo.reference)
                .ok_or_else(|| EngineError::RefNotFound {
                    repository: repo.location(),
                    reference: repo.reference.clone(),
                })?;
            Ok(tree
                .iter()
                .filter(|e| is_within(&e.path, path))
                .cloned()
                .collect())
        })
    }

    fn get_files<'a>(
        &'a self,
        _repo: &'a RepositoryRef,
        paths: &'a [String],
    ) -> BoxFuture<'a, Result<FileBatch, EngineError>> {
        Box::pin(async move {
            self.get_files_calls.fetch_add(1, Ordering::SeqCst);
            self.fetched
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(paths.iter().cloned());
            if let Some(err) = &self.failure {
                return Err(err.clone());
            }

            let mut batch = FileBatch::default();
            for path in paths {
                match self.files.get(path) {
                    Some(StubFile::Text(text)) => batch.files.push(FileContent {
                        path: path.clone(),
                        text: text.clone(),
                    }),
                    Some(StubFile::Binary) => batch
                        .omitted
                        .push(ContentOmission::new(path.as_str(), OmissionReason::Binary)),
                    Some(StubFile::Unavailable(detail)) => batch.omitted.push(ContentOmission::new(
                        path.as_str(),
                        OmissionReason::Unavailable {
                            detail: detail.clone(),
                        },
                    )),
                    None => batch
                        .omitted
                        .push(ContentOmission::new(path.as_str(), OmissionReason::NotFound)),
                }
            }
            Ok(batch)
        })
    }

    fn rate_limit(&self) -> BoxFuture<'_, Result<RateLimitSnapshot, EngineError>> {
        Box::pin(async move {
            self.rate_limit_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.rate_limit_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.quota)
        })
    }

    fn last_rate_limit(&self) -> Option<RateLimitSnapshot> {
        (self.rate_limit_calls() > 0).then_some(self.quota)
    }
}

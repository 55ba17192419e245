//! GitHub content client.
//!
//! Trees and quota come from the REST API (`api_url`); file bodies come from
//! the raw content host (`raw_url`), which does not count against the API
//! quota. Every API response updates the last seen [`RateLimitSnapshot`].

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use modscout_config::{RepositoryConfig, SecretToken};
use reqwest::header::{ACCEPT, CONTENT_LENGTH, HeaderMap};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::BoxFuture;
use crate::build_info;
use crate::error::{
    ClientSetupError, EngineError, Stage, describe_transport_error, parse_base_url,
};

use super::*;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Bytes inspected for a NUL when deciding whether a file is binary.
const BINARY_SNIFF_BYTES: usize = 8000;

pub struct GitHubContentClient {
    client: Client,
    api_url: Url,
    raw_url: Url,
    token: Option<SecretToken>,
    max_concurrent_fetches: usize,
    max_file_bytes: u64,
    last_rate_limit: Mutex<Option<RateLimitSnapshot>>,
}

impl GitHubContentClient {
    pub fn new(api_url: &str, raw_url: &str, timeout: Duration) -> Result<Self, ClientSetupError> {
        let api_url = parse_base_url("repository.api_url", api_url)?;
        let raw_url = parse_base_url("repository.raw_url", raw_url)?;
        let client = Client::builder()
            .user_agent(build_info::user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            api_url,
            raw_url,
            token: None,
            max_concurrent_fetches: 4,
            max_file_bytes: 256 * 1024,
            last_rate_limit: Mutex::new(None),
        })
    }

    /// Build a client from the `[repository]` section, reading the token from
    /// the configured environment variable.
    pub fn from_config(config: &RepositoryConfig) -> Result<Self, ClientSetupError> {
        let client = Self::new(
            &config.api_url,
            &config.raw_url,
            Duration::from_secs(config.timeout_secs),
        )?
        .with_max_concurrent_fetches(config.max_concurrent_fetches)
        .with_max_file_bytes(config.max_file_bytes);

        Ok(match config.token() {
            Some(token) => client.with_token(token),
            None => {
                debug!(env = %config.token_env, "No repository token set, using anonymous quota");
                client
            }
        })
    }

    pub fn with_token(mut self, token: SecretToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_max_concurrent_fetches(mut self, n: usize) -> Self {
        self.max_concurrent_fetches = n.max(1);
        self
    }

    pub fn with_max_file_bytes(mut self, n: u64) -> Self {
        self.max_file_bytes = n;
        self
    }

    fn api_endpoint(&self, segments: &[&str]) -> Url {
        join_segments(&self.api_url, segments)
    }

    fn raw_file_url(&self, repo: &RepositoryRef, path: &str) -> Url {
        let mut segments = vec![repo.owner.as_str(), repo.repo.as_str()];
        segments.extend(repo.reference.split('/'));
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        join_segments(&self.raw_url, &segments)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        }
    }

    async fn api_get(&self, stage: Stage, url: Url) -> Result<Response, EngineError> {
        debug!(%stage, %url, "Repository API request");
        let resp = self
            .authorized(self.client.get(url))
            .header(ACCEPT, GITHUB_ACCEPT)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .send()
            .await
            .map_err(|e| EngineError::repository(stage, &e))?;

        if let Some(snapshot) = snapshot_from_headers(resp.headers()) {
            self.record_rate_limit(snapshot);
        }
        Ok(resp)
    }

    fn record_rate_limit(&self, snapshot: RateLimitSnapshot) {
        *self
            .last_rate_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    /// `GET git/trees/{tree_ish}?recursive=1`, mapping failures to errors.
    async fn fetch_tree(&self, repo: &RepositoryRef, tree_ish: &str) -> Result<ApiTree, EngineError> {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.repo.as_str(), "git", "trees"];
        segments.extend(tree_ish.split('/'));
        let mut url = self.api_endpoint(&segments);
        url.query_pairs_mut().append_pair("recursive", "1");

        let resp = self.api_get(Stage::ListTree, url).await?;
        if let Some(err) = status_error(resp.status(), resp.headers(), repo, Stage::ListTree) {
            return Err(err);
        }

        resp.json().await.map_err(|e| {
            EngineError::repository_unavailable(Stage::ListTree, format!("malformed response: {e}"))
        })
    }

    async fn fetch_file(&self, repo: &RepositoryRef, path: &str) -> Result<FileContent, ContentOmission> {
        let omit = |reason| ContentOmission::new(path, reason);
        let url = self.raw_file_url(repo, path);
        debug!(%url, "Fetching file");

        let mut resp = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| {
                omit(OmissionReason::Unavailable {
                    detail: describe_transport_error(&e),
                })
            })?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(omit(OmissionReason::NotFound));
        }
        if !status.is_success() {
            return Err(omit(OmissionReason::Unavailable {
                detail: format!("unexpected HTTP status {status}"),
            }));
        }

        let too_large = |size_bytes| {
            omit(OmissionReason::TooLarge {
                size_bytes,
                limit_bytes: self.max_file_bytes,
            })
        };
        if let Some(size) = content_length(resp.headers())
            && size > self.max_file_bytes
        {
            return Err(too_large(size));
        }

        // Without a Content-Length the ceiling is enforced while reading;
        // the reported size is then the bytes read before giving up.
        let mut bytes = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| {
            omit(OmissionReason::Unavailable {
                detail: describe_transport_error(&e),
            })
        })? {
            bytes.extend_from_slice(&chunk);
            if bytes.len() as u64 > self.max_file_bytes {
                return Err(too_large(bytes.len() as u64));
            }
        }

        match decode_text(&bytes) {
            Some(text) => Ok(FileContent {
                path: path.to_string(),
                text,
            }),
            None => Err(omit(OmissionReason::Binary)),
        }
    }
}

impl RepositoryContentClient for GitHubContentClient {
    fn list_tree<'a>(
        &'a self,
        repo: &'a RepositoryRef,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Vec<TreeEntry>, EngineError>> {
        Box::pin(async move {
            let body = self.fetch_tree(repo, &repo.reference).await?;
            let path = path.trim_matches('/');
            if !body.truncated || path.is_empty() {
                if body.truncated {
                    warn!(repository = %repo, "Repository tree listing was truncated by the host");
                }
                return Ok(tree_entries(body, path));
            }

            // The full listing was cut short; list the requested directory on its own.
            debug!(repository = %repo, path, "Tree truncated, listing subtree");
            let subtree = format!("{}:{path}", repo.reference);
            match self.fetch_tree(repo, &subtree).await {
                Ok(sub) => {
                    if sub.truncated {
                        warn!(repository = %repo, path, "Subtree listing was truncated by the host");
                    }
                    Ok(subtree_entries(sub, path))
                }
                // Not a directory (a single file, or absent): use what the full listing had.
                Err(EngineError::RefNotFound { .. }) => Ok(tree_entries(body, path)),
                Err(err) => Err(err),
            }
        })
    }

    fn get_files<'a>(
        &'a self,
        repo: &'a RepositoryRef,
        paths: &'a [String],
    ) -> BoxFuture<'a, Result<FileBatch, EngineError>> {
        Box::pin(async move {
            let fetches: Vec<_> = paths.iter().map(|path| self.fetch_file(repo, path)).collect();
            let outcomes: Vec<Result<FileContent, ContentOmission>> = stream::iter(fetches)
                .buffered(self.max_concurrent_fetches)
                .collect()
                .await;

            let mut batch = FileBatch::default();
            for outcome in outcomes {
                match outcome {
                    Ok(file) => batch.files.push(file),
                    Err(omission) => {
                        debug!(path = %omission.path, reason = %omission.reason, "File omitted");
                        batch.omitted.push(omission);
                    }
                }
            }
            Ok(batch)
        })
    }

    fn rate_limit(&self) -> BoxFuture<'_, Result<RateLimitSnapshot, EngineError>> {
        Box::pin(async move {
            let resp = self
                .api_get(Stage::RateLimit, self.api_endpoint(&["rate_limit"]))
                .await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(EngineError::repository_unavailable(
                    Stage::RateLimit,
                    format!("unexpected HTTP status {status}"),
                ));
            }

            let body: ApiRateLimit = resp.json().await.map_err(|e| {
                EngineError::repository_unavailable(Stage::RateLimit, format!("malformed response: {e}"))
            })?;
            let snapshot = RateLimitSnapshot {
                limit: body.resources.core.limit,
                remaining: body.resources.core.remaining,
                reset_epoch_secs: body.resources.core.reset,
            };
            self.record_rate_limit(snapshot);
            Ok(snapshot)
        })
    }

    fn last_rate_limit(&self) -> Option<RateLimitSnapshot> {
        *self
            .last_rate_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn join_segments(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Map a non-success tree response to an error.
fn status_error(
    status: StatusCode,
    headers: &HeaderMap,
    repo: &RepositoryRef,
    stage: Stage,
) -> Option<EngineError> {
    if status.is_success() {
        return None;
    }

    let exhausted = snapshot_from_headers(headers).filter(RateLimitSnapshot::is_exhausted);
    let err = match status {
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS if exhausted.is_some() => {
            let reset = exhausted.map(|s| s.reset_epoch_secs).unwrap_or_default();
            EngineError::repository_unavailable(
                stage,
                format!("rate limit exhausted, resets at epoch {reset}"),
            )
        }
        StatusCode::NOT_FOUND | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            EngineError::RefNotFound {
                repository: repo.location(),
                reference: repo.reference.clone(),
            }
        }
        StatusCode::UNAUTHORIZED => EngineError::repository_unavailable(
            stage,
            "authentication rejected (check the repository token)",
        ),
        other => EngineError::repository_unavailable(stage, format!("unexpected HTTP status {other}")),
    };
    Some(err)
}

fn snapshot_from_headers(headers: &HeaderMap) -> Option<RateLimitSnapshot> {
    let read = |name: &str| -> Option<u64> { headers.get(name)?.to_str().ok()?.trim().parse().ok() };
    Some(RateLimitSnapshot {
        limit: read("x-ratelimit-limit")?,
        remaining: read("x-ratelimit-remaining")?,
        reset_epoch_secs: read("x-ratelimit-reset")?,
    })
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
}

/// UTF-8 text without NUL bytes in its head, or `None` for binary content.
fn decode_text(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(BINARY_SNIFF_BYTES)];
    if head.contains(&0) {
        return None;
    }
    std::str::from_utf8(bytes).ok().map(str::to_string)
}

fn tree_entries(body: ApiTree, root: &str) -> Vec<TreeEntry> {
    body.tree
        .into_iter()
        .filter(|e| is_within(&e.path, root))
        .filter_map(|e| match e.kind.as_str() {
            "blob" => Some(TreeEntry::file(e.path, e.size)),
            "tree" => Some(TreeEntry::directory(e.path)),
            // Git submodules ("commit") have no content here.
            _ => None,
        })
        .collect()
}

/// Entries of a subtree listing, whose paths are relative to `root`.
fn subtree_entries(body: ApiTree, root: &str) -> Vec<TreeEntry> {
    let mut entries = vec![TreeEntry::directory(root)];
    entries.extend(body.tree.into_iter().filter_map(|e| {
        let path = format!("{root}/{}", e.path);
        match e.kind.as_str() {
            "blob" => Some(TreeEntry::file(path, e.size)),
            "tree" => Some(TreeEntry::directory(path)),
            _ => None,
        }
    }));
    entries
}

// ── GitHub API types (private) ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiTree {
    #[serde(default)]
    tree: Vec<ApiTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct ApiTreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiRateLimit {
    resources: ApiRateResources,
}

#[derive(Debug, Deserialize)]
struct ApiRateResources {
    core: ApiRate,
}

#[derive(Debug, Deserialize)]
struct ApiRate {
    limit: u64,
    remaining: u64,
    reset: u64,
}

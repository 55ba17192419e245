//! Terraform Registry v1 API client.
//!
//! Implements [`RegistryClient`] over three endpoints:
//!
//! - `GET {base}/search?q=..&limit=..&offset=0`
//! - `GET {base}/{namespace}/{name}/{target}/{version}`
//! - `GET {base}/{namespace}/{name}/{target}/versions`

use std::collections::BTreeSet;
use std::time::Duration;

use modscout_config::RegistryConfig;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::BoxFuture;
use crate::build_info;
use crate::error::{ClientSetupError, EngineError, Stage, parse_base_url};
use crate::reference::{self, ModuleReference};

use super::types::*;
use super::{RegistryClient, clamp_limit};

/// Registry client backed by `reqwest`.
pub struct HttpRegistryClient {
    client: Client,
    base_url: Url,
}

impl HttpRegistryClient {
    /// Create a client for the registry at `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientSetupError> {
        let base_url = parse_base_url("registry.base_url", base_url)?;
        let client = Client::builder()
            .user_agent(build_info::user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &RegistryConfig) -> Result<Self, ClientSetupError> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    /// Replace the underlying HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// GET `url` and decode the JSON body. A 404 yields `Ok(None)`.
    async fn fetch<T: DeserializeOwned>(&self, stage: Stage, url: Url) -> Result<Option<T>, EngineError> {
        debug!(%stage, %url, "Registry request");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::registry(stage, &e))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(EngineError::registry_unavailable(
                stage,
                format!("unexpected HTTP status {status}"),
            ));
        }

        resp.json::<T>()
            .await
            .map(Some)
            .map_err(|e| EngineError::registry_unavailable(stage, format!("malformed response: {e}")))
    }
}

impl RegistryClient for HttpRegistryClient {
    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<SearchResults, EngineError>> {
        Box::pin(async move {
            let query = query.trim();
            if query.is_empty() {
                return Err(EngineError::InvalidRequest(
                    "search query must not be empty".to_string(),
                ));
            }
            let limit = clamp_limit(limit);

            let mut url = self.endpoint(&["search"]);
            url.query_pairs_mut()
                .append_pair("q", query)
                .append_pair("limit", &limit.to_string())
                .append_pair("offset", "0");

            let body: ApiSearchResponse =
                self.fetch(Stage::Search, url)
                    .await?
                    .ok_or_else(|| {
                        EngineError::registry_unavailable(
                            Stage::Search,
                            "search endpoint returned HTTP 404",
                        )
                    })?;

            let modules = body
                .modules
                .into_iter()
                .filter_map(summary_from_api)
                .take(limit)
                .collect();
            Ok(SearchResults::new(query, modules))
        })
    }

    fn get_detail<'a>(
        &'a self,
        reference: &'a ModuleReference,
    ) -> BoxFuture<'a, Result<ModuleDetail, EngineError>> {
        Box::pin(async move {
            let pinned = reference::resolve(reference, self).await?;
            let not_found = || EngineError::ModuleNotFound {
                module: pinned.to_string(),
            };
            let Some(version) = pinned.version() else {
                return Err(not_found());
            };

            let url = self.endpoint(&[
                pinned.namespace(),
                pinned.name(),
                pinned.target(),
                version,
            ]);
            let body: ApiModuleDetail = self
                .fetch(Stage::Detail, url)
                .await?
                .ok_or_else(not_found)?;

            detail_from_api(body)
        })
    }

    fn latest_version<'a>(
        &'a self,
        reference: &'a ModuleReference,
    ) -> BoxFuture<'a, Result<String, EngineError>> {
        Box::pin(async move {
            let not_found = || EngineError::ModuleNotFound {
                module: reference.module_id(),
            };

            let url = self.endpoint(&[
                reference.namespace(),
                reference.name(),
                reference.target(),
                "versions",
            ]);
            let body: ApiVersionsResponse = self
                .fetch(Stage::LatestVersion, url)
                .await?
                .ok_or_else(not_found)?;

            let published: Vec<String> = body
                .modules
                .into_iter()
                .flat_map(|m| m.versions)
                .map(|v| v.version)
                .collect();

            select_latest(&published).ok_or_else(not_found)
        })
    }
}

/// Highest semver release, or the highest pre-release when no release exists.
/// Unparseable version strings are ignored.
fn select_latest(versions: &[String]) -> Option<String> {
    let parsed: Vec<semver::Version> = versions
        .iter()
        .filter_map(|raw| semver::Version::parse(raw.trim().trim_start_matches(['v', 'V'])).ok())
        .collect();

    let best_release = parsed.iter().filter(|v| v.pre.is_empty()).max();
    best_release
        .or_else(|| parsed.iter().max())
        .map(|v| v.to_string())
}

/// Convert a search hit, skipping entries whose identifier fails validation.
fn summary_from_api(module: ApiModule) -> Option<ModuleSummary> {
    match module.reference() {
        Ok(reference) => Some(ModuleSummary {
            reference,
            description: module.description.unwrap_or_default(),
            downloads: module.downloads,
            verified: module.verified,
            source_url: module.source.filter(|s| !s.is_empty()),
            published_at: module.published_at,
        }),
        Err(e) => {
            warn!(error = %e, "Skipping registry search result with invalid identifier");
            None
        }
    }
}

fn detail_from_api(body: ApiModuleDetail) -> Result<ModuleDetail, EngineError> {
    let reference = body
        .module
        .reference()
        .map_err(|e| {
            EngineError::registry_unavailable(Stage::Detail, format!("malformed response: {e}"))
        })?;

    let inputs = body
        .root
        .inputs
        .into_iter()
        .map(|i| ModuleInput {
            name: i.name,
            type_name: i.type_name,
            description: i.description.filter(|d| !d.is_empty()),
            default: decode_default(i.default),
            required: i.required,
        })
        .collect();

    let outputs = body
        .root
        .outputs
        .into_iter()
        .map(|o| ModuleOutput {
            name: o.name,
            description: o.description.filter(|d| !d.is_empty()),
        })
        .collect();

    let providers: BTreeSet<ProviderRequirement> = body
        .root
        .provider_dependencies
        .into_iter()
        .map(|p| ProviderRequirement {
            name: p.name,
            namespace: p.namespace,
            version_constraint: Some(p.version).filter(|v| !v.is_empty()),
        })
        .collect();

    let dependencies = body
        .root
        .dependencies
        .iter()
        .filter_map(|d| dependency_reference(&d.source, &d.version))
        .collect();

    Ok(ModuleDetail {
        reference,
        description: body.module.description.unwrap_or_default(),
        source_url: body.module.source.unwrap_or_default(),
        published_at: body.module.published_at,
        inputs,
        outputs,
        providers,
        dependencies,
        submodules: body.submodules.into_iter().map(|s| s.path).collect(),
        examples: body.examples.into_iter().map(|s| s.path).collect(),
    })
}

/// The registry encodes defaults as JSON text; an empty string means none.
fn decode_default(raw: Option<serde_json::Value>) -> Option<serde_json::Value> {
    match raw? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => {
            Some(serde_json::from_str(&s).unwrap_or(serde_json::Value::String(s)))
        }
        other => Some(other),
    }
}

/// A dependency is a registry module only when its source has registry form
/// (`namespace/name/target`, optionally prefixed by the public registry host).
/// An exact version constraint pins it; anything else leaves it at latest.
fn dependency_reference(source: &str, constraint: &str) -> Option<ModuleReference> {
    let source = source
        .strip_prefix("registry.terraform.io/")
        .unwrap_or(source);
    if source.contains("//") || source.contains(':') || source.starts_with('.') {
        return None;
    }
    let segments: Vec<&str> = source.split('/').collect();
    if segments.len() != 3 || segments[0].contains('.') {
        return None;
    }

    let exact = constraint
        .trim()
        .trim_start_matches('=')
        .trim()
        .trim_start_matches(['v', 'V']);
    let version = semver::Version::parse(exact).ok().map(|v| v.to_string());

    ModuleReference::new(segments[0], segments[1], segments[2], version.as_deref()).ok()
}

// ── Registry API types (private) ────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiSearchResponse {
    #[serde(default)]
    modules: Vec<ApiModule>,
}

#[derive(Debug, Deserialize)]
struct ApiModule {
    namespace: String,
    name: String,
    provider: String,
    version: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    downloads: u64,
    #[serde(default)]
    verified: bool,
}

impl ApiModule {
    fn reference(&self) -> Result<ModuleReference, EngineError> {
        ModuleReference::new(&self.namespace, &self.name, &self.provider, Some(&self.version))
    }
}

#[derive(Debug, Deserialize)]
struct ApiModuleDetail {
    #[serde(flatten)]
    module: ApiModule,
    #[serde(default)]
    root: ApiSubmodule,
    #[serde(default)]
    submodules: Vec<ApiSubmodule>,
    #[serde(default)]
    examples: Vec<ApiSubmodule>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiSubmodule {
    #[serde(default)]
    path: String,
    #[serde(default)]
    inputs: Vec<ApiInput>,
    #[serde(default)]
    outputs: Vec<ApiOutput>,
    #[serde(default)]
    dependencies: Vec<ApiDependency>,
    #[serde(default)]
    provider_dependencies: Vec<ApiProviderDependency>,
}

#[derive(Debug, Deserialize)]
struct ApiInput {
    name: String,
    #[serde(rename = "type", default)]
    type_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    default: Option<serde_json::Value>,
    #[serde(default)]
    required: bool,
}

#[derive(Debug, Deserialize)]
struct ApiOutput {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiDependency {
    #[serde(default)]
    source: String,
    #[serde(default)]
    version: String,
}

#[derive(Debug, Deserialize)]
struct ApiProviderDependency {
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    version: String,
}

#[derive(Debug, Deserialize)]
struct ApiVersionsResponse {
    #[serde(default)]
    modules: Vec<ApiVersionList>,
}

#[derive(Debug, Deserialize)]
struct ApiVersionList {
    #[serde(default)]
    versions: Vec<ApiVersion>,
}

#[derive(Debug, Deserialize)]
struct ApiVersion {
    version: String,
}

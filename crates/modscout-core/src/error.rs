//! Engine error taxonomy.
//!
//! Every failure the engine can report to a caller is an [`EngineError`].
//! Errors name the identifier involved and, for upstream failures, the
//! [`Stage`] that was running, so a caller can explain the failure instead
//! of guessing at a workaround. Per-file problems during content retrieval
//! are not errors; see [`crate::repository::ContentOmission`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// The operation stage an upstream failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Search,
    LatestVersion,
    Detail,
    ListTree,
    GetFiles,
    RateLimit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Search => "search",
            Stage::LatestVersion => "latest_version",
            Stage::Detail => "detail",
            Stage::ListTree => "list_tree",
            Stage::GetFiles => "get_files",
            Stage::RateLimit => "rate_limit",
        };
        f.write_str(name)
    }
}

/// Errors returned by engine operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid module reference {input:?}: {reason}")]
    InvalidReference { input: String, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("module '{module}' denied by access policy: {reason}")]
    PolicyDenied { module: String, reason: String },

    #[error("module not found in registry: {module}")]
    ModuleNotFound { module: String },

    #[error("source repository for '{module}' is not a recognized repository URL: {source_url:?}")]
    SourceUnresolvable { module: String, source_url: String },

    #[error("ref '{reference}' not found in repository {repository}")]
    RefNotFound {
        repository: String,
        reference: String,
    },

    #[error("path '{path}' not found in repository {repository}")]
    PathNotFound { repository: String, path: String },

    #[error("registry unavailable during {stage}: {detail}")]
    RegistryUnavailable {
        stage: Stage,
        detail: String,
        module: Option<String>,
    },

    #[error("repository host unavailable during {stage}: {detail}")]
    RepositoryUnavailable {
        stage: Stage,
        detail: String,
        module: Option<String>,
    },
}

impl EngineError {
    /// Stable, machine-readable kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidReference { .. } => "invalid_reference",
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::PolicyDenied { .. } => "policy_denied",
            EngineError::ModuleNotFound { .. } => "module_not_found",
            EngineError::SourceUnresolvable { .. } => "source_unresolvable",
            EngineError::RefNotFound { .. } => "ref_not_found",
            EngineError::PathNotFound { .. } => "path_not_found",
            EngineError::RegistryUnavailable { .. } => "registry_unavailable",
            EngineError::RepositoryUnavailable { .. } => "repository_unavailable",
        }
    }

    /// The module identifier the error is about, when there is one.
    pub fn module(&self) -> Option<&str> {
        match self {
            EngineError::InvalidReference { input, .. } => Some(input),
            EngineError::PolicyDenied { module, .. }
            | EngineError::ModuleNotFound { module }
            | EngineError::SourceUnresolvable { module, .. } => Some(module),
            EngineError::RegistryUnavailable { module, .. }
            | EngineError::RepositoryUnavailable { module, .. } => module.as_deref(),
            _ => None,
        }
    }

    /// The upstream stage that failed, for transport errors.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            EngineError::RegistryUnavailable { stage, .. }
            | EngineError::RepositoryUnavailable { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Whether the error was raised before any outbound call.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidReference { .. }
                | EngineError::InvalidRequest(_)
                | EngineError::PolicyDenied { .. }
        )
    }

    /// A registry failure not yet attributed to a module.
    pub fn registry_unavailable(stage: Stage, detail: impl Into<String>) -> Self {
        EngineError::RegistryUnavailable {
            stage,
            detail: detail.into(),
            module: None,
        }
    }

    /// A repository host failure not yet attributed to a module.
    pub fn repository_unavailable(stage: Stage, detail: impl Into<String>) -> Self {
        EngineError::RepositoryUnavailable {
            stage,
            detail: detail.into(),
            module: None,
        }
    }

    /// Attribute an upstream failure to `module` unless it already names one.
    /// Other variants are returned unchanged.
    pub fn for_module(mut self, module: &impl fmt::Display) -> Self {
        if let EngineError::RegistryUnavailable { module: slot, .. }
        | EngineError::RepositoryUnavailable { module: slot, .. } = &mut self
            && slot.is_none()
        {
            *slot = Some(module.to_string());
        }
        self
    }

    pub(crate) fn registry(stage: Stage, err: &reqwest::Error) -> Self {
        Self::registry_unavailable(stage, describe_transport_error(err))
    }

    pub(crate) fn repository(stage: Stage, err: &reqwest::Error) -> Self {
        Self::repository_unavailable(stage, describe_transport_error(err))
    }
}

/// Errors building an upstream HTTP client from configuration.
#[derive(Debug, thiserror::Error)]
pub enum ClientSetupError {
    #[error("invalid {field} URL {value:?}: {detail}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        detail: String,
    },

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Parse a configured base URL, rejecting URLs that cannot carry a path.
pub(crate) fn parse_base_url(field: &'static str, value: &str) -> Result<url::Url, ClientSetupError> {
    let invalid = |detail: String| ClientSetupError::InvalidUrl {
        field,
        value: value.to_string(),
        detail,
    };
    let url = url::Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid("URL cannot be a base".to_string()));
    }
    Ok(url)
}

/// Render a reqwest error so timeouts are recognizable in health details.
pub(crate) fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

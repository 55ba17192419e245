//! JSON request and error bodies for the tool endpoints.
//!
//! Successful responses serialize the engine's own result types directly.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Stage};

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchModulesRequest {
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

/// Body for endpoints that take only a module identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRequest {
    pub module_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetContentRequest {
    pub module_id: String,
    /// Repository-relative directory or file; empty for the root.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub include_files: Vec<String>,
    /// Omit to apply the default test-file exclusions.
    #[serde(default)]
    pub exclude_files: Option<Vec<String>>,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
}

impl From<&EngineError> for ErrorResponse {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            module: err.module().map(str::to_string),
            stage: err.stage(),
        }
    }
}

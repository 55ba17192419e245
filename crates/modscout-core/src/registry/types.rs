//! Registry value types shared by every [`RegistryClient`](super::RegistryClient)
//! implementation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::reference::ModuleReference;

/// One search hit, in registry ranking order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSummary {
    /// Pinned reference taken from the registry response.
    pub reference: ModuleReference,
    pub description: String,
    pub downloads: u64,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
}

/// Whether a successful search found anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Found,
    /// The registry answered and genuinely had no matches.
    ConfirmedEmpty,
}

/// Search outcome. Failures never take this shape; they are errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub modules: Vec<ModuleSummary>,
    pub status: SearchStatus,
}

impl SearchResults {
    /// Build results, tagging an empty list as [`SearchStatus::ConfirmedEmpty`].
    pub fn new(query: impl Into<String>, modules: Vec<ModuleSummary>) -> Self {
        let status = if modules.is_empty() {
            SearchStatus::ConfirmedEmpty
        } else {
            SearchStatus::Found
        };
        Self {
            query: query.into(),
            modules,
            status,
        }
    }

    /// Keep only the modules matching `keep`, recomputing the status.
    pub fn retain(mut self, keep: impl FnMut(&ModuleSummary) -> bool) -> Self {
        self.modules.retain(keep);
        Self::new(self.query, self.modules)
    }

    /// Truncate to at most `limit` modules, recomputing the status.
    pub fn truncate(mut self, limit: usize) -> Self {
        self.modules.truncate(limit);
        Self::new(self.query, self.modules)
    }

    pub fn is_confirmed_empty(&self) -> bool {
        self.status == SearchStatus::ConfirmedEmpty
    }
}

/// A declared module input variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInput {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    pub required: bool,
}

/// A declared module output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleOutput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A provider the module requires.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderRequirement {
    pub name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_constraint: Option<String>,
}

/// Full interface of one pinned module version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDetail {
    pub reference: ModuleReference,
    pub description: String,
    pub source_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    pub inputs: Vec<ModuleInput>,
    pub outputs: Vec<ModuleOutput>,
    pub providers: BTreeSet<ProviderRequirement>,
    /// Registry modules this module calls.
    pub dependencies: Vec<ModuleReference>,
    /// Submodule directory paths, e.g. `modules/flow-logs`.
    pub submodules: Vec<String>,
    /// Example directory paths, e.g. `examples/basic`.
    pub examples: Vec<String>,
}

impl ModuleDetail {
    pub fn required_inputs(&self) -> impl Iterator<Item = &ModuleInput> {
        self.inputs.iter().filter(|i| i.required)
    }
}

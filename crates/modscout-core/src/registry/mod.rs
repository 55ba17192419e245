//! Module registry access.
//!
//! [`RegistryClient`] is the seam between the engine and the public module
//! registry. [`HttpRegistryClient`] talks to the Terraform Registry v1 API;
//! tests substitute stubs.

pub mod http;
pub mod types;

pub use http::HttpRegistryClient;
pub use types::{
    ModuleDetail, ModuleInput, ModuleOutput, ModuleSummary, ProviderRequirement, SearchResults,
    SearchStatus,
};

use crate::BoxFuture;
use crate::error::EngineError;
use crate::reference::ModuleReference;

/// Upper bound on the number of search results requested at once.
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Clamp a caller-supplied search limit into `1..=MAX_SEARCH_LIMIT`.
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_SEARCH_LIMIT)
}

/// Read-only access to a module registry.
///
/// Implementations must be `Send + Sync` so a single client can be shared by
/// concurrent requests. Uses `BoxFuture` for object safety.
pub trait RegistryClient: Send + Sync {
    /// Search the registry. Results keep the registry's ranking.
    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<SearchResults, EngineError>>;

    /// Fetch the full interface of a module version.
    fn get_detail<'a>(
        &'a self,
        reference: &'a ModuleReference,
    ) -> BoxFuture<'a, Result<ModuleDetail, EngineError>>;

    /// The latest published version of a module family.
    fn latest_version<'a>(
        &'a self,
        reference: &'a ModuleReference,
    ) -> BoxFuture<'a, Result<String, EngineError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(5), 5);
        assert_eq!(clamp_limit(1_000), MAX_SEARCH_LIMIT);
    }
}

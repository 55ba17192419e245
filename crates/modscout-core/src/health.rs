//! Dependency health aggregation.
//!
//! Probes the registry (a one-result search) and the content host (a quota
//! query) concurrently, each under its own timeout, and folds the outcomes
//! into a [`HealthStatus`]. A check never fails: an unreachable dependency is
//! reported in the status, not as an error.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::build_info;
use crate::registry::RegistryClient;
use crate::repository::{RateLimitSnapshot, RepositoryContentClient};

pub const REGISTRY_DEPENDENCY: &str = "registry";
pub const REPOSITORY_DEPENDENCY: &str = "repository";

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overall {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyState {
    Healthy,
    Degraded,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub status: DependencyState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitSnapshot>,
}

impl DependencyHealth {
    fn new(status: DependencyState, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: Some(detail.into()),
            rate_limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub overall: Overall,
    pub version: String,
    pub dependencies: BTreeMap<String, DependencyHealth>,
}

impl HealthStatus {
    /// Fold dependency results; healthy only if every dependency is.
    pub fn from_dependencies(dependencies: BTreeMap<String, DependencyHealth>) -> Self {
        let overall = if dependencies
            .values()
            .all(|d| d.status == DependencyState::Healthy)
        {
            Overall::Healthy
        } else {
            Overall::Degraded
        };
        Self {
            overall,
            version: build_info::version_string(),
            dependencies,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.overall == Overall::Healthy
    }
}

pub struct HealthAggregator {
    registry: Arc<dyn RegistryClient>,
    repository: Arc<dyn RepositoryContentClient>,
    probe_query: String,
    probe_timeout: Duration,
    min_remaining_quota: u64,
}

impl HealthAggregator {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        repository: Arc<dyn RepositoryContentClient>,
    ) -> Self {
        Self {
            registry,
            repository,
            probe_query: "vpc".to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            min_remaining_quota: 10,
        }
    }

    pub fn with_probe_query(mut self, query: impl Into<String>) -> Self {
        self.probe_query = query.into();
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Quota at or below this marks the repository dependency degraded.
    pub fn with_min_remaining_quota(mut self, quota: u64) -> Self {
        self.min_remaining_quota = quota;
        self
    }

    pub async fn check(&self) -> HealthStatus {
        let (registry, repository) = tokio::join!(self.probe_registry(), self.probe_repository());

        let status = HealthStatus::from_dependencies(BTreeMap::from([
            (REGISTRY_DEPENDENCY.to_string(), registry),
            (REPOSITORY_DEPENDENCY.to_string(), repository),
        ]));
        if status.is_healthy() {
            debug!("Health check passed");
        } else {
            warn!(dependencies = ?status.dependencies, "Health check degraded");
        }
        status
    }

    async fn probe_registry(&self) -> DependencyHealth {
        match tokio::time::timeout(self.probe_timeout, self.registry.search(&self.probe_query, 1)).await {
            Ok(Ok(results)) => DependencyHealth::new(
                DependencyState::Healthy,
                format!("search probe returned {} result(s)", results.modules.len()),
            ),
            Ok(Err(e)) => DependencyHealth::new(DependencyState::Unavailable, e.to_string()),
            Err(_) => DependencyHealth::new(
                DependencyState::Unavailable,
                format!("probe timed out after {:?}", self.probe_timeout),
            ),
        }
    }

    async fn probe_repository(&self) -> DependencyHealth {
        match tokio::time::timeout(self.probe_timeout, self.repository.rate_limit()).await {
            Ok(Ok(quota)) => {
                let remaining = format!("{}/{} API requests remaining", quota.remaining, quota.limit);
                let mut health = if quota.remaining <= self.min_remaining_quota {
                    DependencyHealth::new(
                        DependencyState::Degraded,
                        format!(
                            "rate limit nearly exhausted: {remaining}, resets at epoch {}",
                            quota.reset_epoch_secs
                        ),
                    )
                } else {
                    DependencyHealth::new(DependencyState::Healthy, remaining)
                };
                health.rate_limit = Some(quota);
                health
            }
            Ok(Err(e)) => DependencyHealth::new(DependencyState::Unavailable, e.to_string()),
            Err(_) => DependencyHealth::new(
                DependencyState::Unavailable,
                format!("probe timed out after {:?}", self.probe_timeout),
            ),
        }
    }
}

//! A [`ModuleEngine`] wired to stub clients.

use std::sync::Arc;

use modscout_config::AppConfig;
use modscout_config::policy::AccessPolicy;
use modscout_core::ModuleEngine;

use crate::stubs::{StubRegistry, StubRepository};

/// Engine plus handles to its stubs for call-count assertions.
pub struct TestEngine {
    pub engine: ModuleEngine,
    pub registry: Arc<StubRegistry>,
    pub repository: Arc<StubRepository>,
}

impl TestEngine {
    /// Engine with the given policy and default limits, no caching.
    pub fn new(registry: StubRegistry, repository: StubRepository, policy: AccessPolicy) -> Self {
        let registry = Arc::new(registry);
        let repository = Arc::new(repository);
        let engine = ModuleEngine::new(registry.clone(), repository.clone(), policy);
        Self {
            engine,
            registry,
            repository,
        }
    }

    /// Engine wired from `config` (policy, limits, tag prefix, cache).
    pub fn from_config(
        config: &AppConfig,
        registry: StubRegistry,
        repository: StubRepository,
    ) -> Self {
        let registry = Arc::new(registry);
        let repository = Arc::new(repository);
        let engine = ModuleEngine::from_config(config, registry.clone(), repository.clone());
        Self {
            engine,
            registry,
            repository,
        }
    }

    /// Replace the engine, e.g. after applying a `with_*` builder.
    pub fn map_engine(mut self, f: impl FnOnce(ModuleEngine) -> ModuleEngine) -> Self {
        self.engine = f(self.engine);
        self
    }

    /// Total calls made to either stub.
    pub fn outbound_calls(&self) -> usize {
        self.registry.calls() + self.repository.calls()
    }
}

#![deny(unsafe_code)]

//! modscout core engine.
//!
//! Resolves infrastructure-as-code module references against a public module
//! registry and the source repositories behind them, and shapes repository
//! content into filtered, size-bounded results for an AI assistant. All
//! operations are read-only.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future, the return type for async trait
/// methods that must stay object-safe (`Arc<dyn RegistryClient>` and friends).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Bounded LRU + TTL cache keyed by pinned references.
pub mod cache;
/// Glob filtering and example/submodule classification of repository trees.
pub mod content;
/// The engine: policy-checked search, details, listing and content retrieval.
pub mod engine;
/// Error taxonomy shared by every operation.
pub mod error;
/// Registry and repository-host health probing.
pub mod health;
/// Module identifier parsing, normalization and version resolution.
pub mod reference;
/// Module registry client trait and Terraform Registry implementation.
pub mod registry;
/// Repository content client trait, GitHub implementation and locator.
pub mod repository;
/// axum router exposing the engine as JSON tool endpoints.
pub mod server;

pub use engine::ModuleEngine;
pub use error::{ClientSetupError, EngineError, Stage};
pub use health::HealthStatus;
pub use reference::{ModuleReference, PinnedKey, VersionSpec};
pub use registry::RegistryClient;
pub use repository::RepositoryContentClient;

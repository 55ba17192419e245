#![deny(unsafe_code)]

//! Shared test utilities for the modscout workspace.
//!
//! Stub registry and repository clients, engine and config builders, and
//! tracing helpers, so crate tests can exercise the engine without network
//! access.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! modscout-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod engine;
pub mod fixtures;
pub mod stubs;
pub mod tracing_setup;

pub use config::{TestConfigBuilder, TestConfigFile};
pub use engine::TestEngine;
pub use stubs::{StubRegistry, StubRepository};

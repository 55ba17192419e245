//! Tracing initialisation for tests that do not use `#[test_log::test]`.
//!
//! The subscriber is installed at most once per process, so every test may
//! call [`init_test_tracing`].

use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber honouring `RUST_LOG` (default `warn`,
/// with `modscout_core=debug`). Later calls are ignored.
///
/// # Example
///
/// ```ignore
/// #[tokio::test]
/// async fn lists_content() {
///     modscout_test_utils::tracing_setup::init_test_tracing();
///     // engine debug events now show up in failing test output
/// }
/// ```
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,modscout_core=debug")),
        )
        .with_test_writer()
        .try_init();
}

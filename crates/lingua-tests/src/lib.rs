//! Test infrastructure for lingua-ci.
//!
//! In-memory fakes for every port plus fixtures for the canonical test
//! tree. Integration suites live under `tests/` and run entirely on these
//! fakes: no network, no database.

pub mod fakes;
pub mod fixtures;

pub use fakes::*;
pub use fixtures::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,lingua_scheduler=debug")),
        )
        .with_test_writer()
        .try_init();
}

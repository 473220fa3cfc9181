//! Log output for test runs.

use std::env;
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when neither `RUST_LOG` nor `TESTBED_LOG_LEVEL` is set.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Filter directive from the environment.
///
/// - `TESTBED_LOG_LEVEL`: test bed specific filter
/// - `RUST_LOG`: fallback
pub fn log_filter() -> String {
    env::var("TESTBED_LOG_LEVEL")
        .or_else(|_| env::var("RUST_LOG"))
        .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
}

/// Install a fmt subscriber writing through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_new(log_filter())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    // Already initialized by an earlier test: keep that subscriber.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_test_writer()
        .try_init();
}

//! Shared fixtures for the `jobflow` integration tests.
//!
//! - [`builders`] assembles job definitions without TOML.
//! - [`driver`] steps a `CoreRuntime` by hand, no Tokio needed.
//! - [`fake_executor`] answers dispatched tasks immediately.
//! - [`recording`] captures what the core reports.

pub mod builders;
pub mod driver;
pub mod fake_executor;
pub mod recording;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use jobflow::logging::LOG_ENV;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Installs a per-test subscriber once per test binary.
///
/// Output is captured by the harness and only shown for failing tests
/// (or with `--nocapture`). `JOBFLOW_LOG=jobflow::job=debug cargo test`
/// narrows it down.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Awaits `f`, panicking if it takes longer than five seconds.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(TEST_TIMEOUT, f)
        .await
        .expect("test timed out")
}

//! Shared helpers for the `nodeagent` test suites.
//!
//! - [`builders`]: config builders rooted in a per-test temp dir.
//! - [`child`]: isolated runs that re-run the test binary as the child.
//! - [`fake_client`]: scripted clients that count what the agent did.
//! - [`observe`]: a tracing layer that counts emitted log events.

pub mod builders;
pub mod child;
pub mod fake_client;
pub mod observe;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests, once per test binary.
///
/// Output goes through `with_test_writer()`, so it only shows for failing
/// tests unless run with `-- --nocapture`. The filter is read from
/// `NODEAGENT_LOG` (e.g. `NODEAGENT_LOG=nodeagent=debug cargo test`) and
/// defaults to `warn` to keep passing runs quiet.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("NODEAGENT_LOG")
            .unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, failing the test if it takes longer than `limit`.
pub async fn with_timeout<F, T>(limit: Duration, f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, f)
        .await
        .unwrap_or_else(|_| panic!("test timed out after {limit:?}"))
}

pub mod builders;
pub mod fake_step;

use std::sync::Once;

use hostdag::logging::{build_filter, LOG_ENV};
use tracing_subscriber::fmt;

static INIT: Once = Once::new();

/// Install a test subscriber once per test binary.
///
/// Output goes through `with_test_writer()`, so it only shows for failing
/// tests. The filter is read from `HOSTDAG_LOG` like the binary, e.g.
/// `HOSTDAG_LOG=hostdag::dag=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let env = std::env::var(LOG_ENV).ok();
        let _ = fmt()
            .with_env_filter(build_filter(None, env.as_deref()))
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, failing the test if it takes longer than five seconds.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("test timed out after 5 seconds")
}

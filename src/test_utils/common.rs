use std::time::Duration;

use crate::ClientBuilder;
use crate::ReconnectPolicy;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    env_logger::init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// Builder with deadlines short enough for failover and expiry tests.
pub(crate) fn fast_builder(endpoints: Vec<String>) -> ClientBuilder {
    ClientBuilder::new(endpoints)
        .session_timeout(Duration::from_millis(1500))
        .connect_timeout(Duration::from_secs(2))
        .operation_timeout(Duration::from_secs(2))
        .reconnect_policy(ReconnectPolicy {
            base_delay_ms: 10,
            max_delay_ms: 100,
        })
}

/// Polls `check` every 10ms until it holds or `within` elapses.
pub(crate) async fn eventually<F>(
    within: Duration,
    mut check: F,
) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

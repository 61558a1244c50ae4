//! Redis connection helpers.

use core_config::redis::RedisConfig;
use redis::aio::ConnectionManager;
use redis::Client;
use std::time::Duration;
use tracing::{info, warn};

/// Connect to Redis and return a ConnectionManager.
///
/// The ConnectionManager reconnects on its own after transient failures;
/// the initial PING verifies the server is actually reachable.
pub async fn connect(url: &str) -> redis::RedisResult<ConnectionManager> {
    info!(url = %url, "Connecting to Redis");

    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;

    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;

    info!("Connected to Redis");
    Ok(manager)
}

/// Connect using a RedisConfig.
pub async fn connect_from_config(config: &RedisConfig) -> redis::RedisResult<ConnectionManager> {
    connect(&config.url).await
}

/// Connect with startup retries.
///
/// Doubles the delay between attempts (500ms, 1s, 2s, ...) to ride out the
/// broker coming up alongside the worker.
pub async fn connect_with_retry(
    url: &str,
    max_attempts: u32,
) -> redis::RedisResult<ConnectionManager> {
    let max_attempts = max_attempts.max(1);
    let mut delay = Duration::from_millis(500);

    for attempt in 1..=max_attempts {
        match connect(url).await {
            Ok(manager) => return Ok(manager),
            Err(e) if attempt < max_attempts => {
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Redis connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!("loop returns on the last attempt")
}

//! Shared fixtures for the chat integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use chatbus::ChatConfig;

pub const TOPIC: &str = "global.chat";

/// Configuration with short waits so tests do not sit on production backoffs.
pub fn fast_config() -> ChatConfig {
    ChatConfig {
        topic: TOPIC.to_string(),
        probe_timeout_ms: 20,
        retry_backoff_ms: 5,
        auditor_retry_backoff_ms: 5,
        poll_interval_ms: 10,
        ..ChatConfig::default()
    }
}

/// Poll `check` until it holds, panicking after about two seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

//! Bootstrap utilities for chatbus binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Default filter when `CHATBUS_LOG` is not set. Kept quiet so diagnostics
/// do not interleave with chat lines on the terminal.
const DEFAULT_LOG_FILTER: &str = "warn";

/// Initialize tracing with the CHATBUS_LOG environment variable.
///
/// Diagnostics go to stderr; stdout carries the chat protocol.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

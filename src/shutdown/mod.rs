//! Ordered teardown of a running participant.
//!
//! ```text
//! Running -> CancelRequested -> ConsumerStopped -> Closed
//! ```
//!
//! The consumer is cancelled and joined before the publisher is flushed and
//! closed. The join has no deadline: a consumer stuck in its sink holds up
//! shutdown until the sink returns.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{BusError, Publisher};
use crate::console::Console;
use crate::consume::{ConsumeResult, ConsumeStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    CancelRequested,
    ConsumerStopped,
    Closed,
}

/// How the consumer task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerExit {
    /// Stopped by cancellation.
    Cancelled(ConsumeStats),
    /// Ended earlier on its own error, already reported to the operator.
    Failed(String),
    /// The task could not be joined (panicked or aborted).
    Lost(String),
}

#[derive(Debug)]
pub struct ShutdownReport {
    pub consumer: ConsumerExit,
    /// Error raised while flushing the publisher, if any.
    pub publisher_error: Option<BusError>,
}

pub struct ShutdownCoordinator {
    state: ShutdownState,
    cancel: CancellationToken,
    consumer: Option<JoinHandle<ConsumeResult>>,
    publisher: Option<Box<dyn Publisher>>,
    console: Arc<dyn Console>,
}

impl ShutdownCoordinator {
    pub fn new(
        cancel: CancellationToken,
        consumer: JoinHandle<ConsumeResult>,
        publisher: Box<dyn Publisher>,
        console: Arc<dyn Console>,
    ) -> Self {
        Self {
            state: ShutdownState::Running,
            cancel,
            consumer: Some(consumer),
            publisher: Some(publisher),
            console,
        }
    }

    pub fn state(&self) -> ShutdownState {
        self.state
    }

    /// Run every remaining step.
    pub async fn shutdown(mut self) -> ShutdownReport {
        self.request_cancel();
        let consumer = self.await_consumer().await;
        let publisher_error = self.close_publisher().await;

        ShutdownReport {
            consumer,
            publisher_error,
        }
    }

    /// Running -> CancelRequested. Does not block.
    pub fn request_cancel(&mut self) {
        if self.state != ShutdownState::Running {
            return;
        }
        self.cancel.cancel();
        self.transition(ShutdownState::CancelRequested);
    }

    /// CancelRequested -> ConsumerStopped. Waits for the consumer task to
    /// finish its cleanup.
    pub async fn await_consumer(&mut self) -> ConsumerExit {
        self.request_cancel();

        let exit = match self.consumer.take() {
            None => ConsumerExit::Lost("consumer already joined".to_string()),
            Some(handle) => match handle.await {
                Ok(Ok(stats)) => ConsumerExit::Cancelled(stats),
                Ok(Err(e)) => {
                    debug!(error = %e, "Consumer had already terminated");
                    ConsumerExit::Failed(e.to_string())
                }
                Err(e) => {
                    warn!(error = %e, "Interrupted while closing consumer");
                    self.console
                        .line("⚠️ Interrupted while closing consumer.");
                    ConsumerExit::Lost(e.to_string())
                }
            },
        };

        self.transition(ShutdownState::ConsumerStopped);
        exit
    }

    /// ConsumerStopped -> Closed. Flushes and closes the publisher.
    pub async fn close_publisher(&mut self) -> Option<BusError> {
        if self.state == ShutdownState::Running || self.state == ShutdownState::CancelRequested {
            self.await_consumer().await;
        }

        let error = match self.publisher.take() {
            Some(publisher) => publisher.close().await.err(),
            None => None,
        };
        if let Some(ref e) = error {
            warn!(error = %e, "Failed to close publisher");
            self.console.line(&format!("⚠️ {}", e));
        }

        self.transition(ShutdownState::Closed);
        error
    }

    fn transition(&mut self, next: ShutdownState) {
        if self.state != next {
            info!(from = ?self.state, to = ?next, "Shutdown state changed");
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests;

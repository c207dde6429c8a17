//! Background consume loop.
//!
//! Polls the subscription with a bounded wait and hands each record to the
//! sink in arrival order. Cancellation surfaces from the poll as
//! `BusError::Interrupted` and ends the loop normally; a sink failure ends it
//! with an error. On every exit path, a panicking sink included, the
//! subscription and the sink are closed exactly once.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::bus::{BusError, Subscription};
use crate::console::Console;
use crate::sink::{MessageSink, SinkError};

/// Why the consume loop failed.
#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("Consumer poll failed: {0}")]
    Bus(#[from] BusError),
}

/// Final tally of a loop that ended through cancellation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeStats {
    pub polls: usize,
    pub delivered: usize,
}

/// Result of the consumer task.
pub type ConsumeResult = Result<ConsumeStats, ConsumeError>;

pub struct ConsumeLoop<S> {
    subscription: Box<dyn Subscription>,
    sink: S,
    poll_interval: Duration,
    console: Arc<dyn Console>,
}

impl<S: MessageSink + 'static> ConsumeLoop<S> {
    pub fn new(
        subscription: Box<dyn Subscription>,
        sink: S,
        poll_interval: Duration,
        console: Arc<dyn Console>,
    ) -> Self {
        Self {
            subscription,
            sink,
            poll_interval,
            console,
        }
    }

    /// Run on a dedicated task until `cancel` fires or the sink fails.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<ConsumeResult> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(self, cancel: CancellationToken) -> ConsumeResult {
        let Self {
            mut subscription,
            mut sink,
            poll_interval,
            console,
        } = self;

        let mut stats = ConsumeStats::default();
        let outcome = AssertUnwindSafe(drive(
            subscription.as_mut(),
            &mut sink,
            poll_interval,
            &cancel,
            &mut stats,
        ))
        .catch_unwind()
        .await;

        subscription.close().await;
        let closed = sink.close().await;

        // Released above; the panic still reaches whoever joins this task.
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(panic) => {
                error!(delivered = stats.delivered, "Consumer panicked");
                std::panic::resume_unwind(panic)
            }
        };

        match outcome.and(closed.map_err(ConsumeError::from)) {
            Ok(()) => {
                info!(
                    polls = stats.polls,
                    delivered = stats.delivered,
                    "Consumer stopped"
                );
                Ok(stats)
            }
            Err(e) => {
                error!(error = %e, delivered = stats.delivered, "Consumer terminated");
                console.line(&format!("❌ {}", e));
                Err(e)
            }
        }
    }
}

async fn drive<S: MessageSink>(
    subscription: &mut dyn Subscription,
    sink: &mut S,
    poll_interval: Duration,
    cancel: &CancellationToken,
    stats: &mut ConsumeStats,
) -> Result<(), ConsumeError> {
    loop {
        stats.polls += 1;
        let batch = match subscription.poll(poll_interval, cancel).await {
            Ok(batch) => batch,
            Err(BusError::Interrupted) => {
                debug!("Consumer poll interrupted");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        for record in &batch {
            sink.deliver(record).await?;
            stats.delivered += 1;
        }
    }
}

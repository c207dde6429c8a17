//! Foreground publish loop.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, Lines};
use tracing::{debug, warn};

use crate::bus::Publisher;
use crate::console::{read_line, Console};
use crate::identity::Identity;
use crate::message::ChatMessage;

/// Input line that ends the loop. Matched case-insensitively, never published.
pub const SENTINEL: &str = "exit";

/// Whether `line` is the sentinel command.
pub fn is_sentinel(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(SENTINEL)
}

/// Why the publish loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Sentinel,
    EndOfInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishSummary {
    pub outcome: PublishOutcome,
    pub published: usize,
    pub failed: usize,
}

/// Reads operator lines and publishes each one as a tagged chat message.
///
/// The publisher stays open when the loop returns; closing it is the
/// shutdown coordinator's job.
pub struct PublishLoop<'a> {
    publisher: &'a dyn Publisher,
    topic: &'a str,
    identity: &'a Identity,
    console: Arc<dyn Console>,
}

impl<'a> PublishLoop<'a> {
    pub fn new(
        publisher: &'a dyn Publisher,
        topic: &'a str,
        identity: &'a Identity,
        console: Arc<dyn Console>,
    ) -> Self {
        Self {
            publisher,
            topic,
            identity,
            console,
        }
    }

    pub async fn run<R>(&self, input: &mut Lines<R>) -> PublishSummary
    where
        R: AsyncBufRead + Unpin,
    {
        let mut published = 0;
        let mut failed = 0;

        let outcome = loop {
            let line = match read_line(input).await {
                Ok(Some(line)) => line,
                Ok(None) => break PublishOutcome::EndOfInput,
                Err(e) => {
                    warn!(error = %e, "Failed to read input, treating as end of input");
                    break PublishOutcome::EndOfInput;
                }
            };

            if is_sentinel(&line) {
                break PublishOutcome::Sentinel;
            }

            let message = ChatMessage::new(self.identity.clone(), line);
            match self
                .publisher
                .send(self.topic, Some(message.key()), &message.wire_value())
                .await
            {
                Ok(()) => {
                    published += 1;
                    debug!(topic = %self.topic, "Message enqueued");
                }
                Err(e) => {
                    failed += 1;
                    warn!(topic = %self.topic, error = %e, "Failed to publish message");
                    self.console.line(&format!("❌ {}", e));
                }
            }
        };

        PublishSummary {
            outcome,
            published,
            failed,
        }
    }
}

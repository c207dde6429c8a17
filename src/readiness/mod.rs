//! Startup gate: wait for the bus and the chat topic.
//!
//! No subscription or publisher exists until `wait_until_ready` returns.
//! Waiting is unbounded; the operator gets one chance to abort (participant)
//! or to decline topic creation (broker handler).

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ConstantBackoff, ConstantBuilder};
use tokio::io::{AsyncBufRead, Lines};
use tracing::{debug, info, warn};

use crate::bus::{BusError, TopicAdmin, TopicSpec};
use crate::console::{read_line, Console};
use crate::identity::Role;

/// Operator reply that aborts the participant wait.
pub const ABORT_COMMAND: &str = "exit";
/// Operator reply that declines topic creation.
pub const DECLINE_COMMAND: &str = "n";

/// Result of a single probe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    Unreachable,
    TopicMissing,
    Ready,
}

#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("Operator aborted the wait for topic '{0}'")]
    Aborted(String),

    #[error("Operator declined creation of topic '{0}'")]
    CreationDeclined(String),

    #[error("Failed to create topic '{topic}': {source}")]
    TopicCreation {
        topic: String,
        #[source]
        source: BusError,
    },

    #[error("Failed to read operator input: {0}")]
    Input(#[from] std::io::Error),
}

/// Polls topic metadata until the chat topic is usable.
pub struct ReadinessProber<'a, A: ?Sized> {
    admin: &'a A,
    role: Role,
    probe_timeout: Duration,
    retry_backoff: Duration,
    console: Arc<dyn Console>,
}

impl<'a, A: TopicAdmin + ?Sized> ReadinessProber<'a, A> {
    pub fn new(
        admin: &'a A,
        role: Role,
        probe_timeout: Duration,
        retry_backoff: Duration,
        console: Arc<dyn Console>,
    ) -> Self {
        Self {
            admin,
            role,
            probe_timeout,
            retry_backoff,
            console,
        }
    }

    /// One attempt: list topics and look for `topic`.
    pub async fn probe(&self, topic: &str) -> ReadinessState {
        match self.admin.list_topics(self.probe_timeout).await {
            Ok(topics) if topics.contains(topic) => ReadinessState::Ready,
            Ok(_) => ReadinessState::TopicMissing,
            Err(e) => {
                debug!(error = %e, "Bus not reachable");
                ReadinessState::Unreachable
            }
        }
    }

    /// Block until `topic` exists, prompting the operator as the role requires.
    pub async fn wait_until_ready<R>(
        &self,
        topic: &str,
        input: &mut Lines<R>,
    ) -> Result<ReadinessState, ReadinessError>
    where
        R: AsyncBufRead + Unpin,
    {
        match self.role {
            Role::Participant => self.wait_as_participant(topic, input).await,
            Role::Auditor => self.wait_as_auditor(topic, input).await,
        }
    }

    fn backoff(&self) -> ConstantBackoff {
        ConstantBuilder::default()
            .with_delay(self.retry_backoff)
            .with_max_times(usize::MAX)
            .build()
    }

    async fn wait_as_participant<R>(
        &self,
        topic: &str,
        input: &mut Lines<R>,
    ) -> Result<ReadinessState, ReadinessError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut backoff = self.backoff();
        let mut first_failure = true;

        loop {
            let state = self.probe(topic).await;
            if state == ReadinessState::Ready {
                self.console.line(&format!(
                    "✅ Connected to Kafka. Topic '{}' is available.",
                    topic
                ));
                info!(topic = %topic, "Topic available");
                return Ok(state);
            }

            if first_failure {
                self.console
                    .line("⏳ Kafka or topic not available yet. Retry or exit? [r/exit]");
                match read_line(input).await? {
                    Some(choice) if !choice.eq_ignore_ascii_case(ABORT_COMMAND) => {}
                    _ => {
                        warn!(topic = %topic, "Operator aborted readiness wait");
                        return Err(ReadinessError::Aborted(topic.to_string()));
                    }
                }
                first_failure = false;
            } else {
                self.console.line("🔁 Still waiting on Kafka broker/topic...");
                debug!(topic = %topic, ?state, "Topic not ready, backing off");
                tokio::time::sleep(backoff.next().unwrap_or(self.retry_backoff)).await;
            }
        }
    }

    async fn wait_as_auditor<R>(
        &self,
        topic: &str,
        input: &mut Lines<R>,
    ) -> Result<ReadinessState, ReadinessError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut backoff = self.backoff();

        loop {
            match self.probe(topic).await {
                ReadinessState::Ready => {
                    self.console
                        .line(&format!("✅ Topic '{}' already exists.", topic));
                    return Ok(ReadinessState::Ready);
                }
                ReadinessState::TopicMissing => {
                    return self.confirm_and_create(topic, input).await;
                }
                ReadinessState::Unreachable => {
                    self.console.line("⏳ Still waiting for Kafka broker...");
                    tokio::time::sleep(backoff.next().unwrap_or(self.retry_backoff)).await;
                }
            }
        }
    }

    async fn confirm_and_create<R>(
        &self,
        topic: &str,
        input: &mut Lines<R>,
    ) -> Result<ReadinessState, ReadinessError>
    where
        R: AsyncBufRead + Unpin,
    {
        self.console.prompt(&format!(
            "⚠️  Topic '{}' not found. Create it now? [Y/n]: ",
            topic
        ));
        match read_line(input).await? {
            Some(answer) if !answer.eq_ignore_ascii_case(DECLINE_COMMAND) => {}
            _ => {
                warn!(topic = %topic, "Operator declined topic creation");
                return Err(ReadinessError::CreationDeclined(topic.to_string()));
            }
        }

        self.console
            .line(&format!("📡 Creating topic '{}'...", topic));
        self.admin
            .create_topic(&TopicSpec::single(topic))
            .await
            .map_err(|source| ReadinessError::TopicCreation {
                topic: topic.to_string(),
                source,
            })?;

        self.console.line("✅ Topic created successfully.");
        info!(topic = %topic, "Topic created");
        Ok(ReadinessState::Ready)
    }
}

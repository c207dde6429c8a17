//! One participant run, from readiness to farewell.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, Lines};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::{BusError, ChatBus, OffsetPolicy};
use crate::config::ChatConfig;
use crate::console::Console;
use crate::consume::ConsumeLoop;
use crate::identity::{Identity, Role};
use crate::publish::{PublishLoop, PublishSummary};
use crate::readiness::{ReadinessError, ReadinessProber};
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::sink::MessageSink;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("Failed to open message sink: {0}")]
    Sink(#[source] io::Error),
}

impl SessionError {
    /// The operator chose not to go on at a readiness prompt. Not a failure
    /// of the bus or of the host.
    pub fn is_declined(&self) -> bool {
        matches!(
            self,
            SessionError::Readiness(ReadinessError::Aborted(_))
                | SessionError::Readiness(ReadinessError::CreationDeclined(_))
        )
    }
}

#[derive(Debug)]
pub struct SessionSummary {
    pub publish: PublishSummary,
    pub shutdown: ShutdownReport,
}

pub struct Session {
    config: ChatConfig,
    role: Role,
    offset: OffsetPolicy,
    identity: Identity,
    console: Arc<dyn Console>,
}

impl Session {
    pub fn new(
        config: ChatConfig,
        role: Role,
        offset: OffsetPolicy,
        identity: Identity,
        console: Arc<dyn Console>,
    ) -> Self {
        Self {
            config,
            role,
            offset,
            identity,
            console,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Run until the operator leaves.
    ///
    /// `make_sink` is only called once the topic is ready and both bus
    /// handles exist. If it fails, both handles are closed before returning.
    pub async fn run<B, R, S, F>(
        &self,
        bus: &B,
        input: &mut Lines<R>,
        make_sink: F,
    ) -> Result<SessionSummary, SessionError>
    where
        B: ChatBus + ?Sized,
        R: AsyncBufRead + Unpin,
        S: MessageSink + 'static,
        F: FnOnce() -> io::Result<S>,
    {
        let topic = self.config.topic.as_str();
        info!(
            topic = %topic,
            identity = %self.identity,
            offset = %self.offset,
            "Starting session"
        );

        ReadinessProber::new(
            bus,
            self.role,
            self.config.probe_timeout(),
            self.config.retry_backoff(self.role),
            self.console.clone(),
        )
        .wait_until_ready(topic, input)
        .await?;

        let subscription = bus
            .subscribe(topic, self.config.group_id(self.role), self.offset)
            .await?;

        let publisher = match bus.publisher().await {
            Ok(publisher) => publisher,
            Err(e) => {
                subscription.close().await;
                return Err(e.into());
            }
        };

        let sink = match make_sink() {
            Ok(sink) => sink,
            Err(e) => {
                error!(error = %e, "Failed to open message sink");
                subscription.close().await;
                if let Err(close_error) = publisher.close().await {
                    warn!(error = %close_error, "Failed to close publisher");
                }
                return Err(SessionError::Sink(e));
            }
        };

        let cancel = CancellationToken::new();
        let consumer = ConsumeLoop::new(
            subscription,
            sink,
            self.config.poll_interval(),
            self.console.clone(),
        )
        .spawn(cancel.clone());

        self.console.line(self.banner());

        let publish = PublishLoop::new(
            publisher.as_ref(),
            topic,
            &self.identity,
            self.console.clone(),
        )
        .run(input)
        .await;
        info!(
            outcome = ?publish.outcome,
            published = publish.published,
            failed = publish.failed,
            "Publish loop finished"
        );

        let shutdown = ShutdownCoordinator::new(cancel, consumer, publisher, self.console.clone())
            .shutdown()
            .await;

        self.console.line(self.farewell());
        Ok(SessionSummary { publish, shutdown })
    }

    fn banner(&self) -> &'static str {
        match self.role {
            Role::Participant => {
                "🟢 Connected to Kafka chat. Type your message (or 'exit' to quit):"
            }
            Role::Auditor => "🧠 Broker ready. Type to broadcast or 'exit' to stop:",
        }
    }

    fn farewell(&self) -> &'static str {
        match self.role {
            Role::Participant => "👋 Disconnected from chat.",
            Role::Auditor => "👋 Broker shutting down.",
        }
    }
}

//! Message bus capabilities used by chat participants.
//!
//! This module contains:
//! - `TopicAdmin` trait: topic listing and provisioning
//! - `ChatBus` trait: subscription and publisher construction
//! - `Subscription` / `Publisher` traits: the consume and publish paths
//! - Implementations: Kafka (feature `kafka`), in-process channel bus

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

// Implementation modules
pub mod channel;
#[cfg(feature = "kafka")]
pub mod kafka;

// Re-exports
pub use channel::{BusEvent, ChannelBus};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaBus, KafkaBusConfig};

// ============================================================================
// Types
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Topic creation failed: {0}")]
    TopicCreation(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Poll failed: {0}")]
    Poll(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    /// The poll was aborted by the subscription's cancellation token.
    #[error("Poll interrupted by cancellation")]
    Interrupted,
}

/// Where a fresh subscription starts reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OffsetPolicy {
    /// Earliest retained message on the topic.
    FromBeginning,
    /// Only messages published after the subscription is established.
    #[default]
    FromLatest,
}

impl OffsetPolicy {
    /// Interpret the `--from` flag: `beginning` (any case) selects
    /// `FromBeginning`, anything else (or nothing) selects `FromLatest`.
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some(value) if value.eq_ignore_ascii_case("beginning") => Self::FromBeginning,
            _ => Self::FromLatest,
        }
    }

    /// Kafka `auto.offset.reset` value.
    pub fn auto_offset_reset(self) -> &'static str {
        match self {
            Self::FromBeginning => "earliest",
            Self::FromLatest => "latest",
        }
    }
}

impl fmt::Display for OffsetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.auto_offset_reset())
    }
}

/// Topic provisioning request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication: i32,
}

impl TopicSpec {
    /// Single partition, replication factor 1.
    pub fn single(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: 1,
            replication: 1,
        }
    }
}

/// A message delivered by a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRecord {
    pub topic: String,
    pub key: Option<String>,
    pub value: String,
    pub offset: i64,
}

// ============================================================================
// Traits
// ============================================================================

/// Topic listing and creation.
#[async_trait]
pub trait TopicAdmin: Send + Sync {
    /// List topic names known to the bus, giving up after `timeout`.
    async fn list_topics(&self, timeout: Duration) -> Result<HashSet<String>>;

    /// Create a topic. Creating a topic that already exists is not an error.
    async fn create_topic(&self, spec: &TopicSpec) -> Result<()>;
}

/// Connection set shared by the consume and publish paths of a participant.
///
/// Implementations:
/// - `KafkaBus`: librdkafka consumer/producer/admin clients
/// - `ChannelBus`: in-process retained log for tests
#[async_trait]
pub trait ChatBus: TopicAdmin {
    /// Subscribe to `topic` as a member of `group_id`, starting at `offset`.
    async fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
        offset: OffsetPolicy,
    ) -> Result<Box<dyn Subscription>>;

    /// Construct a publisher.
    async fn publisher(&self) -> Result<Box<dyn Publisher>>;
}

/// Consume side of the bus, owned by exactly one consume loop.
#[async_trait]
pub trait Subscription: Send {
    /// Wait up to `max_wait` for newly available records.
    ///
    /// Returns an empty batch when the wait elapses without traffic and
    /// `BusError::Interrupted` once `cancel` has fired.
    async fn poll(
        &mut self,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChatRecord>>;

    /// Leave the topic and release the underlying connection.
    async fn close(self: Box<Self>);
}

/// Publish side of the bus.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Enqueue a record. Does not wait for broker acknowledgement.
    async fn send(&self, topic: &str, key: Option<&str>, value: &str) -> Result<()>;

    /// Flush outstanding records and release producer resources.
    async fn close(self: Box<Self>) -> Result<()>;
}

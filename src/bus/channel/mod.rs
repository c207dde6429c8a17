//! In-process channel bus.
//!
//! Keeps a retained, append-only log per topic so that offset policies behave
//! like a single-partition Kafka topic. Every clone of a `ChannelBus` shares
//! the same logs, which lets several participants run against one bus in
//! tests without an external broker.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    BusError, ChatBus, ChatRecord, OffsetPolicy, Publisher, Result, Subscription, TopicAdmin,
    TopicSpec,
};

/// Lifecycle events recorded by the channel bus, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    TopicCreated(String),
    Subscribed { topic: String, offset: OffsetPolicy },
    SubscriptionClosed(String),
    PublisherCreated,
    Published { topic: String, value: String },
    PublisherClosed,
}

#[derive(Default)]
struct Shared {
    topics: RwLock<HashMap<String, Vec<ChatRecord>>>,
    appended: Notify,
    events: RwLock<Vec<BusEvent>>,
    unreachable: AtomicBool,
    fail_create: AtomicBool,
    fail_flush: AtomicBool,
    list_calls: AtomicUsize,
    polls: AtomicUsize,
}

impl Shared {
    async fn record(&self, event: BusEvent) {
        self.events.write().await.push(event);
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(BusError::Connection("channel bus unreachable".to_string()));
        }
        Ok(())
    }
}

/// In-memory bus with retained per-topic history.
#[derive(Clone, Default)]
pub struct ChannelBus {
    shared: Arc<Shared>,
}

impl ChannelBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every admin and subscribe call fail with a connection error.
    pub fn set_reachable(&self, reachable: bool) {
        self.shared.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Make `create_topic` fail.
    pub fn set_fail_create(&self, fail: bool) {
        self.shared.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make publisher `close` report a flush failure. The publisher is still
    /// released.
    pub fn set_fail_flush(&self, fail: bool) {
        self.shared.fail_flush.store(fail, Ordering::SeqCst);
    }

    /// Number of `list_topics` calls made so far.
    pub fn list_calls(&self) -> usize {
        self.shared.list_calls.load(Ordering::SeqCst)
    }

    /// Number of `poll` calls made so far, across all subscriptions.
    pub fn poll_count(&self) -> usize {
        self.shared.polls.load(Ordering::SeqCst)
    }

    /// Snapshot of the lifecycle event log.
    pub async fn events(&self) -> Vec<BusEvent> {
        self.shared.events.read().await.clone()
    }

    /// Snapshot of the retained records of a topic.
    pub async fn records(&self, topic: &str) -> Vec<ChatRecord> {
        self.shared
            .topics
            .read()
            .await
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TopicAdmin for ChannelBus {
    async fn list_topics(&self, _timeout: Duration) -> Result<HashSet<String>> {
        self.shared.list_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.ensure_reachable()?;
        Ok(self.shared.topics.read().await.keys().cloned().collect())
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<()> {
        self.shared.ensure_reachable()?;
        if self.shared.fail_create.load(Ordering::SeqCst) {
            return Err(BusError::TopicCreation(format!(
                "channel bus refused to create '{}'",
                spec.name
            )));
        }

        let created = {
            let mut topics = self.shared.topics.write().await;
            if topics.contains_key(&spec.name) {
                false
            } else {
                topics.insert(spec.name.clone(), Vec::new());
                true
            }
        };

        if created {
            info!(topic = %spec.name, "Channel topic created");
            self.shared
                .record(BusEvent::TopicCreated(spec.name.clone()))
                .await;
        }
        Ok(())
    }
}

#[async_trait]
impl ChatBus for ChannelBus {
    async fn subscribe(
        &self,
        topic: &str,
        _group_id: &str,
        offset: OffsetPolicy,
    ) -> Result<Box<dyn Subscription>> {
        self.shared
            .ensure_reachable()
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        let position = match offset {
            OffsetPolicy::FromBeginning => 0,
            OffsetPolicy::FromLatest => self
                .shared
                .topics
                .read()
                .await
                .get(topic)
                .map_or(0, Vec::len),
        };

        debug!(topic = %topic, %offset, position, "Channel subscription established");
        self.shared
            .record(BusEvent::Subscribed {
                topic: topic.to_string(),
                offset,
            })
            .await;

        Ok(Box::new(ChannelSubscription {
            shared: Arc::clone(&self.shared),
            topic: topic.to_string(),
            position,
        }))
    }

    async fn publisher(&self) -> Result<Box<dyn Publisher>> {
        self.shared.record(BusEvent::PublisherCreated).await;
        Ok(Box::new(ChannelPublisher {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct ChannelSubscription {
    shared: Arc<Shared>,
    topic: String,
    position: usize,
}

impl ChannelSubscription {
    async fn take_available(&mut self) -> Vec<ChatRecord> {
        let topics = self.shared.topics.read().await;
        let Some(log) = topics.get(&self.topic) else {
            return Vec::new();
        };
        let batch = log.get(self.position..).map(<[_]>::to_vec).unwrap_or_default();
        self.position = log.len();
        batch
    }
}

#[async_trait]
impl Subscription for ChannelSubscription {
    async fn poll(
        &mut self,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChatRecord>> {
        let shared = Arc::clone(&self.shared);
        shared.polls.fetch_add(1, Ordering::SeqCst);
        let deadline = Instant::now() + max_wait;

        loop {
            // Register for wakeups before looking at the log so an append
            // landing between the check and the wait is not missed.
            let notified = shared.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if cancel.is_cancelled() {
                return Err(BusError::Interrupted);
            }

            let batch = self.take_available().await;
            if !batch.is_empty() {
                return Ok(batch);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BusError::Interrupted),
                _ = notified.as_mut() => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(Vec::new()),
            }
        }
    }

    async fn close(self: Box<Self>) {
        debug!(topic = %self.topic, "Channel subscription closed");
        self.shared
            .record(BusEvent::SubscriptionClosed(self.topic.clone()))
            .await;
    }
}

struct ChannelPublisher {
    shared: Arc<Shared>,
}

#[async_trait]
impl Publisher for ChannelPublisher {
    async fn send(&self, topic: &str, key: Option<&str>, value: &str) -> Result<()> {
        {
            let mut topics = self.shared.topics.write().await;
            let log = topics.entry(topic.to_string()).or_default();
            log.push(ChatRecord {
                topic: topic.to_string(),
                key: key.map(str::to_string),
                value: value.to_string(),
                offset: log.len() as i64,
            });
        }
        self.shared.appended.notify_waiters();
        self.shared
            .record(BusEvent::Published {
                topic: topic.to_string(),
                value: value.to_string(),
            })
            .await;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.shared.record(BusEvent::PublisherClosed).await;
        if self.shared.fail_flush.load(Ordering::SeqCst) {
            return Err(BusError::Publish(
                "channel bus refused to flush".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;

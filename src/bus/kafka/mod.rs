//! Kafka chat bus implementation.
//!
//! All participants share one topic. Message key: sender identity.
//! Consumers join a per-role consumer group and start from the position
//! selected by the offset policy when the group has no committed offset.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{BaseConsumer, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    BusError, ChatBus, ChatRecord, OffsetPolicy, Publisher, Result, Subscription, TopicAdmin,
    TopicSpec,
};
use crate::config::ChatConfig;

/// Upper bound on records drained into a single poll batch.
const MAX_POLL_RECORDS: usize = 500;

/// Configuration for Kafka connection.
#[derive(Clone, Debug)]
pub struct KafkaBusConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// SASL username (optional, for authenticated clusters).
    pub sasl_username: Option<String>,
    /// SASL password (optional, for authenticated clusters).
    pub sasl_password: Option<String>,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512).
    pub sasl_mechanism: Option<String>,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
    /// SSL CA certificate path (for SSL connections).
    pub ssl_ca_location: Option<String>,
}

impl KafkaBusConfig {
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            sasl_username: None,
            sasl_password: None,
            sasl_mechanism: None,
            security_protocol: None,
            ssl_ca_location: None,
        }
    }

    /// Build from application configuration.
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            bootstrap_servers: config.bootstrap_servers.clone(),
            sasl_username: config.sasl_username.clone(),
            sasl_password: config.sasl_password.clone(),
            sasl_mechanism: config.sasl_mechanism.clone(),
            security_protocol: config.security_protocol.clone(),
            ssl_ca_location: config.ssl_ca_location.clone(),
        }
    }

    /// Add SASL authentication.
    pub fn with_sasl(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        mechanism: impl Into<String>,
    ) -> Self {
        self.sasl_username = Some(username.into());
        self.sasl_password = Some(password.into());
        self.sasl_mechanism = Some(mechanism.into());
        self.security_protocol = Some("SASL_SSL".to_string());
        self
    }

    /// Set security protocol.
    pub fn with_security_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.security_protocol = Some(protocol.into());
        self
    }

    /// Set SSL CA certificate location.
    pub fn with_ssl_ca(mut self, ca_location: impl Into<String>) -> Self {
        self.ssl_ca_location = Some(ca_location.into());
        self
    }

    fn build_admin_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);

        self.apply_security_config(&mut config);
        config
    }

    fn build_producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);

        self.apply_security_config(&mut config);
        config
    }

    fn build_consumer_config(&self, group_id: &str, offset: OffsetPolicy) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("group.id", group_id);
        config.set("enable.auto.commit", "true");
        config.set("auto.offset.reset", offset.auto_offset_reset());

        self.apply_security_config(&mut config);
        config
    }

    /// Apply security settings to a ClientConfig.
    fn apply_security_config(&self, config: &mut ClientConfig) {
        if let Some(ref protocol) = self.security_protocol {
            config.set("security.protocol", protocol);
        }

        if let Some(ref mechanism) = self.sasl_mechanism {
            config.set("sasl.mechanism", mechanism);
        }

        if let Some(ref username) = self.sasl_username {
            config.set("sasl.username", username);
        }

        if let Some(ref password) = self.sasl_password {
            config.set("sasl.password", password);
        }

        if let Some(ref ca_location) = self.ssl_ca_location {
            config.set("ssl.ca.location", ca_location);
        }
    }
}

/// Kafka connection set: an admin client and a metadata client, plus a
/// consumer and producer per `subscribe` / `publisher` call.
pub struct KafkaBus {
    admin: AdminClient<DefaultClientContext>,
    metadata: Arc<BaseConsumer>,
    config: KafkaBusConfig,
}

impl KafkaBus {
    /// Create the admin client. Does not contact the brokers yet.
    pub fn new(config: KafkaBusConfig) -> Result<Self> {
        let admin: AdminClient<DefaultClientContext> =
            config.build_admin_config().create().map_err(|e| {
                BusError::Connection(format!("Failed to create Kafka admin client: {}", e))
            })?;
        let metadata: BaseConsumer = config.build_admin_config().create().map_err(|e| {
            BusError::Connection(format!("Failed to create Kafka metadata client: {}", e))
        })?;

        debug!(
            bootstrap_servers = %config.bootstrap_servers,
            "Kafka admin client created"
        );

        Ok(Self {
            admin,
            metadata: Arc::new(metadata),
            config,
        })
    }
}

#[async_trait]
impl TopicAdmin for KafkaBus {
    async fn list_topics(&self, timeout: Duration) -> Result<HashSet<String>> {
        let client = Arc::clone(&self.metadata);
        let metadata = tokio::task::spawn_blocking(move || {
            client.fetch_metadata(None, Timeout::After(timeout))
        })
        .await
        .map_err(|e| BusError::Connection(format!("Metadata task failed: {}", e)))?
        .map_err(|e| match e {
            KafkaError::MetadataFetch(RDKafkaErrorCode::OperationTimedOut) => {
                BusError::Timeout(timeout)
            }
            e => BusError::Connection(format!("Failed to list topics: {}", e)),
        })?;

        Ok(metadata
            .topics()
            .iter()
            .map(|t| t.name().to_string())
            .collect())
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<()> {
        let new_topic = NewTopic::new(
            &spec.name,
            spec.partitions,
            TopicReplication::Fixed(spec.replication),
        );
        let options = AdminOptions::new().operation_timeout(Some(Duration::from_secs(10)));

        let results = self
            .admin
            .create_topics(&[new_topic], &options)
            .await
            .map_err(|e| BusError::TopicCreation(e.to_string()))?;

        for result in results {
            match result {
                Ok(name) => info!(topic = %name, "Kafka topic created"),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    debug!(topic = %name, "Kafka topic already exists")
                }
                Err((name, code)) => {
                    return Err(BusError::TopicCreation(format!("{}: {}", name, code)));
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ChatBus for KafkaBus {
    async fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
        offset: OffsetPolicy,
    ) -> Result<Box<dyn Subscription>> {
        let consumer: StreamConsumer = self
            .config
            .build_consumer_config(group_id, offset)
            .create()
            .map_err(|e| BusError::Subscribe(format!("Failed to create Kafka consumer: {}", e)))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| BusError::Subscribe(format!("Failed to subscribe to {}: {}", topic, e)))?;

        info!(topic = %topic, group_id = %group_id, %offset, "Subscribed to Kafka topic");

        Ok(Box::new(KafkaSubscription {
            consumer,
            topic: topic.to_string(),
        }))
    }

    async fn publisher(&self) -> Result<Box<dyn Publisher>> {
        let producer: FutureProducer = self
            .config
            .build_producer_config()
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka producer: {}", e)))?;

        debug!(
            bootstrap_servers = %self.config.bootstrap_servers,
            "Kafka producer created"
        );

        Ok(Box::new(KafkaPublisher { producer }))
    }
}

fn to_record(message: &BorrowedMessage<'_>) -> ChatRecord {
    ChatRecord {
        topic: message.topic().to_string(),
        key: message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned()),
        value: String::from_utf8_lossy(message.payload().unwrap_or_default()).into_owned(),
        offset: message.offset(),
    }
}

struct KafkaSubscription {
    consumer: StreamConsumer,
    topic: String,
}

#[async_trait]
impl Subscription for KafkaSubscription {
    async fn poll(
        &mut self,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChatRecord>> {
        let mut batch = Vec::new();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BusError::Interrupted),
            received = tokio::time::timeout(max_wait, self.consumer.recv()) => match received {
                Err(_) => return Ok(batch),
                Ok(Ok(message)) => batch.push(to_record(&message)),
                Ok(Err(e)) => return Err(BusError::Poll(e.to_string())),
            },
        }

        // Drain whatever is already buffered without waiting again.
        while batch.len() < MAX_POLL_RECORDS {
            match self.consumer.recv().now_or_never() {
                Some(Ok(message)) => batch.push(to_record(&message)),
                Some(Err(e)) => {
                    warn!(error = %e, "Kafka consumer error while draining batch");
                    break;
                }
                None => break,
            }
        }

        debug!(topic = %self.topic, records = batch.len(), "Polled Kafka batch");
        Ok(batch)
    }

    async fn close(self: Box<Self>) {
        self.consumer.unsubscribe();
        debug!(topic = %self.topic, "Kafka consumer closed");
    }
}

struct KafkaPublisher {
    producer: FutureProducer,
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn send(&self, topic: &str, key: Option<&str>, value: &str) -> Result<()> {
        let mut record: FutureRecord<'_, str, str> = FutureRecord::to(topic).payload(value);
        if let Some(k) = key {
            record = record.key(k);
        }

        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(e, _)| BusError::Publish(e.to_string()))?;

        let topic = topic.to_string();
        tokio::spawn(async move {
            match delivery.await {
                Ok(Ok((partition, offset))) => {
                    debug!(topic = %topic, partition, offset, "Kafka delivery confirmed")
                }
                Ok(Err((e, _))) => warn!(topic = %topic, error = %e, "Kafka delivery failed"),
                Err(_) => warn!(topic = %topic, "Kafka delivery cancelled"),
            }
        });

        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let producer = self.producer;
        tokio::task::spawn_blocking(move || producer.flush(Timeout::Never))
            .await
            .map_err(|e| BusError::Publish(format!("Flush task failed: {}", e)))?
            .map_err(|e| BusError::Publish(format!("Failed to flush producer: {}", e)))?;

        debug!("Kafka producer flushed and closed");
        Ok(())
    }
}

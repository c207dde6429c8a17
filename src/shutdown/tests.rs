use std::time::Duration;

use async_trait::async_trait;

use super::*;
use crate::bus::{BusEvent, ChannelBus, ChatBus, ChatRecord, OffsetPolicy, TopicAdmin, TopicSpec};
use crate::consume::{ConsumeError, ConsumeLoop};
use crate::sink::{ConsoleSink, MessageSink, SinkError};
use crate::test_utils::CapturedConsole;

const TOPIC: &str = "global.chat";

async fn running(bus: &ChannelBus, console: &Arc<CapturedConsole>) -> ShutdownCoordinator {
    bus.create_topic(&TopicSpec::single(TOPIC)).await.unwrap();
    let subscription = bus
        .subscribe(TOPIC, "group", OffsetPolicy::FromLatest)
        .await
        .unwrap();
    let publisher = bus.publisher().await.unwrap();
    let cancel = CancellationToken::new();

    let handle = ConsumeLoop::new(
        subscription,
        ConsoleSink::new(console.clone()),
        Duration::from_millis(10),
        console.clone(),
    )
    .spawn(cancel.clone());

    ShutdownCoordinator::new(cancel, handle, publisher, console.clone())
}

fn position(events: &[BusEvent], wanted: &BusEvent) -> usize {
    events
        .iter()
        .position(|e| e == wanted)
        .unwrap_or_else(|| panic!("{:?} missing from {:?}", wanted, events))
}

#[tokio::test]
async fn test_consumer_closed_before_publisher() {
    let bus = ChannelBus::new();
    let console = Arc::new(CapturedConsole::default());
    let coordinator = running(&bus, &console).await;

    let report = coordinator.shutdown().await;

    assert!(matches!(report.consumer, ConsumerExit::Cancelled(_)));
    assert!(report.publisher_error.is_none());

    let events = bus.events().await;
    let consumer_closed = position(&events, &BusEvent::SubscriptionClosed(TOPIC.to_string()));
    let publisher_closed = position(&events, &BusEvent::PublisherClosed);
    assert!(consumer_closed < publisher_closed);
}

#[tokio::test]
async fn test_states_advance_in_order() {
    let bus = ChannelBus::new();
    let console = Arc::new(CapturedConsole::default());
    let mut coordinator = running(&bus, &console).await;

    assert_eq!(coordinator.state(), ShutdownState::Running);

    coordinator.request_cancel();
    assert_eq!(coordinator.state(), ShutdownState::CancelRequested);

    coordinator.await_consumer().await;
    assert_eq!(coordinator.state(), ShutdownState::ConsumerStopped);
    assert!(!bus.events().await.contains(&BusEvent::PublisherClosed));

    coordinator.close_publisher().await;
    assert_eq!(coordinator.state(), ShutdownState::Closed);
    assert!(bus.events().await.contains(&BusEvent::PublisherClosed));
}

#[tokio::test]
async fn test_close_publisher_joins_consumer_first() {
    let bus = ChannelBus::new();
    let console = Arc::new(CapturedConsole::default());
    let mut coordinator = running(&bus, &console).await;

    coordinator.close_publisher().await;

    let events = bus.events().await;
    assert!(
        position(&events, &BusEvent::SubscriptionClosed(TOPIC.to_string()))
            < position(&events, &BusEvent::PublisherClosed)
    );
}

#[tokio::test]
async fn test_failed_consumer_still_closes_publisher() {
    let bus = ChannelBus::new();
    let console = Arc::new(CapturedConsole::default());
    let publisher = bus.publisher().await.unwrap();
    let handle = tokio::spawn(async {
        Err(ConsumeError::Sink(SinkError::AuditWrite(std::io::Error::other(
            "disk full",
        ))))
    });

    let report = ShutdownCoordinator::new(
        CancellationToken::new(),
        handle,
        publisher,
        console.clone(),
    )
    .shutdown()
    .await;

    assert!(matches!(report.consumer, ConsumerExit::Failed(_)));
    assert!(bus.events().await.contains(&BusEvent::PublisherClosed));
}

/// Sink that panics on its first record.
struct PanickingSink;

#[async_trait]
impl MessageSink for PanickingSink {
    async fn deliver(&mut self, _record: &ChatRecord) -> Result<(), SinkError> {
        panic!("sink exploded");
    }
}

#[tokio::test]
async fn test_lost_consumer_warns_and_continues() {
    let bus = ChannelBus::new();
    bus.create_topic(&TopicSpec::single(TOPIC)).await.unwrap();
    let subscription = bus
        .subscribe(TOPIC, "group", OffsetPolicy::FromBeginning)
        .await
        .unwrap();
    let publisher = bus.publisher().await.unwrap();
    publisher.send(TOPIC, None, "boom").await.unwrap();

    let console = Arc::new(CapturedConsole::default());
    let cancel = CancellationToken::new();
    let handle = ConsumeLoop::new(
        subscription,
        PanickingSink,
        Duration::from_millis(10),
        console.clone(),
    )
    .spawn(cancel.clone());

    let report = ShutdownCoordinator::new(cancel, handle, publisher, console.clone())
        .shutdown()
        .await;

    assert!(matches!(report.consumer, ConsumerExit::Lost(_)));
    assert!(console.contains("⚠️ Interrupted while closing consumer."));
    let events = bus.events().await;
    assert!(
        position(&events, &BusEvent::SubscriptionClosed(TOPIC.to_string()))
            < position(&events, &BusEvent::PublisherClosed)
    );
}

#[tokio::test]
async fn test_flush_failure_reported_after_consumer_stopped() {
    let bus = ChannelBus::new();
    bus.set_fail_flush(true);
    let console = Arc::new(CapturedConsole::default());
    let coordinator = running(&bus, &console).await;

    let report = coordinator.shutdown().await;

    assert!(matches!(report.consumer, ConsumerExit::Cancelled(_)));
    assert!(matches!(report.publisher_error, Some(BusError::Publish(_))));
    assert!(console.contains("⚠️ Publish failed"));
}

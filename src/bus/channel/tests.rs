use super::*;

const TOPIC: &str = "global.chat";
const WAIT: Duration = Duration::from_millis(50);

async fn bus_with_topic() -> ChannelBus {
    let bus = ChannelBus::new();
    bus.create_topic(&TopicSpec::single(TOPIC)).await.unwrap();
    bus
}

#[tokio::test]
async fn test_list_topics_reports_created_topics() {
    let bus = bus_with_topic().await;

    let topics = bus.list_topics(WAIT).await.unwrap();

    assert!(topics.contains(TOPIC));
    assert_eq!(bus.list_calls(), 1);
}

#[tokio::test]
async fn test_unreachable_bus_fails_admin_calls() {
    let bus = ChannelBus::new();
    bus.set_reachable(false);

    assert!(matches!(
        bus.list_topics(WAIT).await,
        Err(BusError::Connection(_))
    ));
    assert!(bus.create_topic(&TopicSpec::single(TOPIC)).await.is_err());
    assert!(matches!(
        bus.subscribe(TOPIC, "group", OffsetPolicy::FromLatest).await,
        Err(BusError::Subscribe(_))
    ));
}

#[tokio::test]
async fn test_create_existing_topic_is_noop() {
    let bus = bus_with_topic().await;
    bus.create_topic(&TopicSpec::single(TOPIC)).await.unwrap();

    let created = bus
        .events()
        .await
        .into_iter()
        .filter(|e| matches!(e, BusEvent::TopicCreated(_)))
        .count();
    assert_eq!(created, 1);
}

#[tokio::test]
async fn test_from_beginning_sees_history() {
    let bus = bus_with_topic().await;
    let publisher = bus.publisher().await.unwrap();
    publisher.send(TOPIC, Some("a"), "[a] first").await.unwrap();

    let mut subscription = bus
        .subscribe(TOPIC, "group", OffsetPolicy::FromBeginning)
        .await
        .unwrap();
    let batch = subscription
        .poll(WAIT, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].value, "[a] first");
    assert_eq!(batch[0].key.as_deref(), Some("a"));
    assert_eq!(batch[0].offset, 0);
}

#[tokio::test]
async fn test_from_latest_skips_history() {
    let bus = bus_with_topic().await;
    let publisher = bus.publisher().await.unwrap();
    publisher.send(TOPIC, Some("a"), "[a] old").await.unwrap();

    let mut subscription = bus
        .subscribe(TOPIC, "group", OffsetPolicy::FromLatest)
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    assert!(subscription.poll(WAIT, &cancel).await.unwrap().is_empty());

    publisher.send(TOPIC, Some("a"), "[a] new").await.unwrap();
    let batch = subscription.poll(WAIT, &cancel).await.unwrap();

    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].value, "[a] new");
    assert_eq!(batch[0].offset, 1);
}

#[tokio::test]
async fn test_poll_wakes_on_publish() {
    let bus = bus_with_topic().await;
    let mut subscription = bus
        .subscribe(TOPIC, "group", OffsetPolicy::FromLatest)
        .await
        .unwrap();

    let publishing = bus.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let publisher = publishing.publisher().await.unwrap();
        publisher.send(TOPIC, None, "late").await.unwrap();
    });

    let batch = subscription
        .poll(Duration::from_secs(5), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].value, "late");
}

#[tokio::test]
async fn test_poll_returns_interrupted_after_cancel() {
    let bus = bus_with_topic().await;
    let mut subscription = bus
        .subscribe(TOPIC, "group", OffsetPolicy::FromLatest)
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = subscription.poll(Duration::from_secs(5), &cancel).await;
    assert!(matches!(result, Err(BusError::Interrupted)));
}

#[tokio::test]
async fn test_cancel_aborts_blocked_poll() {
    let bus = bus_with_topic().await;
    let mut subscription = bus
        .subscribe(TOPIC, "group", OffsetPolicy::FromLatest)
        .await
        .unwrap();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let result = subscription.poll(Duration::from_secs(30), &cancel).await;
    assert!(matches!(result, Err(BusError::Interrupted)));
}

#[tokio::test]
async fn test_burst_is_delivered_in_order() {
    let bus = bus_with_topic().await;
    let mut subscription = bus
        .subscribe(TOPIC, "group", OffsetPolicy::FromLatest)
        .await
        .unwrap();
    let publisher = bus.publisher().await.unwrap();
    for i in 0..20 {
        publisher
            .send(TOPIC, None, &format!("msg-{}", i))
            .await
            .unwrap();
    }

    let batch = subscription
        .poll(WAIT, &CancellationToken::new())
        .await
        .unwrap();
    let values: Vec<_> = batch.iter().map(|r| r.value.clone()).collect();
    let expected: Vec<_> = (0..20).map(|i| format!("msg-{}", i)).collect();
    assert_eq!(values, expected);
}

#[tokio::test]
async fn test_lifecycle_events_are_recorded() {
    let bus = bus_with_topic().await;
    let subscription = bus
        .subscribe(TOPIC, "group", OffsetPolicy::FromBeginning)
        .await
        .unwrap();
    let publisher = bus.publisher().await.unwrap();
    publisher.send(TOPIC, None, "hi").await.unwrap();
    subscription.close().await;
    publisher.close().await.unwrap();

    assert_eq!(
        bus.events().await,
        vec![
            BusEvent::TopicCreated(TOPIC.to_string()),
            BusEvent::Subscribed {
                topic: TOPIC.to_string(),
                offset: OffsetPolicy::FromBeginning,
            },
            BusEvent::PublisherCreated,
            BusEvent::Published {
                topic: TOPIC.to_string(),
                value: "hi".to_string(),
            },
            BusEvent::SubscriptionClosed(TOPIC.to_string()),
            BusEvent::PublisherClosed,
        ]
    );
}

#[tokio::test]
async fn test_failed_flush_still_releases_publisher() {
    let bus = bus_with_topic().await;
    bus.set_fail_flush(true);
    let publisher = bus.publisher().await.unwrap();

    let result = publisher.close().await;

    assert!(matches!(result, Err(BusError::Publish(_))));
    assert_eq!(bus.events().await.last(), Some(&BusEvent::PublisherClosed));
}

//! Consumer group scenarios against the in-process broker.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tempfile::TempDir;

use kafkavelo::config::{FanoutMode, TopicMode};
use kafkavelo::consumer::{GroupRunner, member_topic_sets, spawn_group_fault_drain};
use kafkavelo::driver::{BrokerDriver, loopback::LoopbackDriver};
use kafkavelo::lifecycle::Lifecycle;
use kafkavelo::naming::random_group_id;
use kafkavelo::provision::TopicProvisioner;
use kafkavelo::topic_file::{read_topic_names, write_topic_names};
use kafkavelo::velocity::VelocityCounter;

const ADDR: &str = "127.0.0.1:9092";

async fn wait_for_count(counter: &VelocityCounter, expected: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while counter.snapshot() < expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out at {} of {expected} messages",
            counter.snapshot()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Start one runner per topic set; returns the runners after every member's
/// readiness signal has closed.
async fn start_members(
    driver: &LoopbackDriver,
    lifecycle: &Lifecycle,
    group: &str,
    topic_sets: Vec<Vec<String>>,
    counter: &Arc<VelocityCounter>,
) -> Vec<Arc<GroupRunner>> {
    let mut runners = Vec::new();
    for (index, topics) in topic_sets.into_iter().enumerate() {
        let (consumer, faults) = driver.join_group(ADDR, group).await.unwrap();
        spawn_group_fault_drain(lifecycle, lifecycle.token(), faults);
        let runner = Arc::new(GroupRunner::new(
            consumer,
            topics,
            counter.clone(),
            lifecycle.token(),
        ));
        let worker = runner.clone();
        lifecycle.spawn(&format!("consumer-member-{index}"), async move {
            let _ = worker.run().await;
        });
        runners.push(runner);
    }
    for runner in &runners {
        tokio::time::timeout(Duration::from_secs(5), runner.wait_ready())
            .await
            .expect("readiness signal never closed");
    }
    runners
}

#[tokio::test]
async fn test_multi_topic_mode_with_member_per_topic() {
    let driver = LoopbackDriver::new();
    let lifecycle = Lifecycle::new();
    let counter = Arc::new(VelocityCounter::new());

    let admin = driver.connect_admin(ADDR).await.unwrap();
    let created = TopicProvisioner::new(admin)
        .create_multiple_topics(3)
        .await
        .unwrap();

    // the topic file is the only coupling between the two runs
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("topics.txt");
    write_topic_names(&path, &created).unwrap();
    let topics = read_topic_names(&path).unwrap();
    assert_eq!(topics, created, "no trailing blank entries");

    let (producer, _faults) = driver.open_producer(ADDR).await.unwrap();
    for topic in &topics {
        for _ in 0..10 {
            producer.send(topic, Bytes::from_static(b"dummy message")).await;
        }
    }

    let group = random_group_id();
    let sets = member_topic_sets(TopicMode::Multi, FanoutMode::Multi, &topics, 0);
    assert_eq!(sets.len(), 3);
    start_members(&driver, &lifecycle, &group, sets, &counter).await;
    assert_eq!(driver.broker().member_count(&group), 3);

    wait_for_count(&counter, 30).await;
    lifecycle.shutdown().await;
    assert_eq!(counter.snapshot(), 30);
}

#[tokio::test]
async fn test_single_topic_mode_with_shared_members() {
    let driver = LoopbackDriver::new();
    let lifecycle = Lifecycle::new();
    let counter = Arc::new(VelocityCounter::new());

    let admin = driver.connect_admin(ADDR).await.unwrap();
    let topic = TopicProvisioner::new(admin)
        .create_single_topic(4)
        .await
        .unwrap();

    let (producer, _faults) = driver.open_producer(ADDR).await.unwrap();
    for _ in 0..20 {
        producer.send(&topic, Bytes::from_static(b"dummy message")).await;
    }

    let group = random_group_id();
    let topics = vec![topic.clone()];
    let sets = member_topic_sets(TopicMode::Single, FanoutMode::Multi, &topics, 2);
    start_members(&driver, &lifecycle, &group, sets, &counter).await;

    // the broker balances the four partitions across the two members;
    // every message is consumed exactly once
    wait_for_count(&counter, 20).await;

    // acks were issued in receipt order before counting, so by now each
    // partition's committed offset covers its five round-robin records
    let broker = driver.broker();
    for partition in 0..4 {
        assert_eq!(
            broker.committed_offset(&group, &topic, partition),
            Some(5),
            "partition {partition} not fully acknowledged"
        );
    }

    lifecycle.shutdown().await;
    assert_eq!(counter.snapshot(), 20);
}

#[tokio::test]
async fn test_late_joiner_triggers_rebalance_and_both_consume() {
    let driver = LoopbackDriver::new();
    let lifecycle = Lifecycle::new();
    let counter = Arc::new(VelocityCounter::new());

    let admin = driver.connect_admin(ADDR).await.unwrap();
    let topic = TopicProvisioner::new(admin)
        .create_single_topic(2)
        .await
        .unwrap();
    let topics = vec![topic.clone()];
    let group = random_group_id();

    let first = start_members(
        &driver,
        &lifecycle,
        &group,
        vec![topics.clone()],
        &counter,
    )
    .await;

    let (producer, _faults) = driver.open_producer(ADDR).await.unwrap();
    for _ in 0..10 {
        producer.send(&topic, Bytes::from_static(b"dummy message")).await;
    }
    wait_for_count(&counter, 10).await;

    // a second member ends the first member's session; its outer loop
    // re-enters and both consume the next batch
    start_members(&driver, &lifecycle, &group, vec![topics.clone()], &counter).await;
    assert_eq!(driver.broker().member_count(&group), 2);

    for _ in 0..10 {
        producer.send(&topic, Bytes::from_static(b"dummy message")).await;
    }
    wait_for_count(&counter, 20).await;

    lifecycle.shutdown().await;
    assert_eq!(counter.snapshot(), 20);
    drop(first);
}

#[tokio::test]
async fn test_unknown_topic_surfaces_consumer_fault() {
    let driver = LoopbackDriver::new();
    let counter = Arc::new(VelocityCounter::new());
    let group = random_group_id();

    let (consumer, mut faults) = driver.join_group(ADDR, &group).await.unwrap();
    let token = tokio_util::sync::CancellationToken::new();
    let runner = Arc::new(GroupRunner::new(
        consumer,
        vec!["missing0000".to_string()],
        counter,
        token.clone(),
    ));

    let worker = runner.clone();
    let handle = tokio::spawn(async move { worker.run().await });
    let fault = tokio::time::timeout(Duration::from_secs(1), faults.recv())
        .await
        .expect("no consumer fault surfaced")
        .unwrap();
    assert!(fault.reason.contains("unknown topic"));

    // the fault is observational: the member keeps running until cancelled
    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("runner ignored cancellation")
        .unwrap()
        .unwrap();
}

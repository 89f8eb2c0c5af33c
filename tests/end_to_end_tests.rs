//! Full pipeline: producer fleet and consumer group running concurrently
//! against the in-process broker, drained by one shutdown.

use std::sync::Arc;
use std::time::Duration;

use kafkavelo::config::{FanoutMode, TopicMode};
use kafkavelo::consumer::{GroupRunner, member_topic_sets};
use kafkavelo::driver::{BrokerDriver, loopback::LoopbackDriver};
use kafkavelo::lifecycle::{Lifecycle, RunState};
use kafkavelo::naming::random_group_id;
use kafkavelo::producer::ProducerFleet;
use kafkavelo::provision::TopicProvisioner;
use kafkavelo::velocity::VelocityCounter;

const ADDR: &str = "127.0.0.1:9092";

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_produce_and_consume_pipeline() {
    let driver = LoopbackDriver::new();
    let lifecycle = Lifecycle::new();
    let produced = Arc::new(VelocityCounter::new());
    let consumed = Arc::new(VelocityCounter::new());

    let admin = driver.connect_admin(ADDR).await.unwrap();
    let topics = TopicProvisioner::new(admin)
        .create_multiple_topics(2)
        .await
        .unwrap();

    // consumers first, so claims are live when the fleet starts
    let group = random_group_id();
    let sets = member_topic_sets(TopicMode::Multi, FanoutMode::Multi, &topics, 0);
    let mut runners = Vec::new();
    for topics in sets {
        let (consumer, _faults) = driver.join_group(ADDR, &group).await.unwrap();
        let runner = Arc::new(GroupRunner::new(
            consumer,
            topics,
            consumed.clone(),
            lifecycle.token(),
        ));
        let worker = runner.clone();
        lifecycle.spawn("consumer-member", async move {
            let _ = worker.run().await;
        });
        runners.push(runner);
    }
    for runner in &runners {
        tokio::time::timeout(Duration::from_secs(5), runner.wait_ready())
            .await
            .expect("readiness signal never closed");
    }

    let (producer, _faults) = driver.open_producer(ADDR).await.unwrap();
    let fleet = ProducerFleet::new(producer, produced.clone(), lifecycle.token());
    fleet.spawn_multi_topic(&lifecycle, &topics);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while consumed.snapshot() == 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "nothing consumed while producing"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    lifecycle.shutdown().await;
    assert_eq!(lifecycle.state(), RunState::Stopped);

    assert!(produced.snapshot() > 0);
    assert!(consumed.snapshot() > 0);
    // the consumer cannot have counted more than was ever produced
    assert!(consumed.snapshot() <= produced.snapshot());
}

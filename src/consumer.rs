//! Consumer group runner.
//!
//! Drives one or more group members against the configured topics:
//!
//! - single fan-out: one member subscribed to every configured topic;
//! - multi fan-out: P members all on the same single topic (the broker
//!   balances partitions across them), or one dedicated member per topic.
//!
//! Each member runs an outer retry loop re-entering the group-consumption
//! call until the shared token is cancelled — rebalances and transient
//! session ends return control even when the member should keep running. A
//! non-cancellation error out of that call is fatal and terminates the
//! whole process. The loop re-enters immediately, with no backoff.
//!
//! Claim processing acknowledges every delivered message to the session
//! before counting it, and returns the moment the session's own context
//! completes — that is the rebalance/shutdown signal for that specific
//! claim, distinct from the process-wide token. Offset commits run on the
//! broker client's auto-commit interval, not from here.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{FanoutMode, TopicMode};
use crate::driver::{
    ClaimHandler, ConsumerFault, FaultStream, GroupConsumer, GroupSession, PartitionClaim,
};
use crate::error::{Error, Result};
use crate::lifecycle::Lifecycle;
use crate::velocity::VelocityCounter;

/// One consumer group member's run loop.
pub struct GroupRunner {
    consumer: Arc<dyn GroupConsumer>,
    topics: Vec<String>,
    token: CancellationToken,
    handler: Arc<ThroughputHandler>,
}

impl GroupRunner {
    pub fn new(
        consumer: Arc<dyn GroupConsumer>,
        topics: Vec<String>,
        counter: Arc<VelocityCounter>,
        token: CancellationToken,
    ) -> Self {
        Self {
            consumer,
            topics,
            token,
            handler: Arc::new(ThroughputHandler::new(counter)),
        }
    }

    /// Block until this member's first session is set up and partitions are
    /// assigned — or until the member gives up. Returns immediately on
    /// later calls.
    pub async fn wait_ready(&self) {
        let receiver = self.handler.ready_rx.lock().await.take();
        if let Some(receiver) = receiver {
            // an Err means the member stopped before ever becoming ready;
            // the runner's own result reports why
            let _ = receiver.await;
        }
    }

    /// Re-enter group consumption until the shared token is cancelled.
    pub async fn run(&self) -> Result<()> {
        let result = loop {
            if let Err(err) = self
                .consumer
                .consume(&self.token, &self.topics, self.handler.clone())
                .await
            {
                break Err(match err {
                    err @ Error::FatalConsume { .. } => err,
                    other => Error::FatalConsume {
                        topics: self.topics.clone(),
                        reason: other.to_string(),
                    },
                });
            }
            // a clean return is a rebalance or cancellation; only the
            // token decides whether this member is done
            if self.token.is_cancelled() {
                info!("consumer runner stopped. topics: {:?}", self.topics);
                break Ok(());
            }
        };
        self.handler.abandon_ready();
        result
    }
}

/// Session-protocol callbacks: ack-then-count per message, readiness on
/// first setup.
struct ThroughputHandler {
    counter: Arc<VelocityCounter>,
    ready_tx: StdMutex<Option<oneshot::Sender<()>>>,
    ready_rx: TokioMutex<Option<oneshot::Receiver<()>>>,
}

impl ThroughputHandler {
    fn new(counter: Arc<VelocityCounter>) -> Self {
        let (ready_tx, ready_rx) = oneshot::channel();
        Self {
            counter,
            ready_tx: StdMutex::new(Some(ready_tx)),
            ready_rx: TokioMutex::new(Some(ready_rx)),
        }
    }

    /// Drop the readiness signal so `wait_ready` cannot block forever once
    /// the member has stopped.
    fn abandon_ready(&self) {
        self.ready_tx.lock().unwrap().take();
    }
}

#[async_trait]
impl ClaimHandler for ThroughputHandler {
    async fn setup(&self, _session: &dyn GroupSession) {
        // closed exactly once, on the first successful session setup
        if let Some(ready) = self.ready_tx.lock().unwrap().take() {
            let _ = ready.send(());
        }
        debug!("consumer session set up");
    }

    async fn cleanup(&self, _session: &dyn GroupSession) {
        debug!("consumer session cleaned up");
    }

    async fn consume_claim(&self, session: &dyn GroupSession, claim: &mut dyn PartitionClaim) {
        loop {
            tokio::select! {
                delivered = claim.recv() => match delivered {
                    Some(record) => {
                        session.ack(&record);
                        self.counter.increment();
                    }
                    None => return,
                },
                _ = session.done().cancelled() => {
                    info!(
                        "consumer claim stopped. topic: {}. partition: {}",
                        claim.topic(),
                        claim.partition()
                    );
                    return;
                }
            }
        }
    }
}

/// Topic subscription for each member under the configured fan-out.
///
/// - single fan-out: one member over every topic;
/// - multi fan-out over one topic: `member_count` members over the same
///   topic list;
/// - multi fan-out over many topics: one member per topic.
pub fn member_topic_sets(
    topic_mode: TopicMode,
    fanout: FanoutMode,
    topics: &[String],
    member_count: usize,
) -> Vec<Vec<String>> {
    match (topic_mode, fanout) {
        (_, FanoutMode::Single) => vec![topics.to_vec()],
        (TopicMode::Single, FanoutMode::Multi) => {
            (0..member_count).map(|_| topics.to_vec()).collect()
        }
        (TopicMode::Multi, FanoutMode::Multi) => {
            topics.iter().map(|t| vec![t.clone()]).collect()
        }
    }
}

/// Drain a group's error stream into the log until it closes or the run is
/// cancelled. These errors are observational; consumption continues.
pub fn spawn_group_fault_drain(
    lifecycle: &Lifecycle,
    token: CancellationToken,
    mut faults: FaultStream<ConsumerFault>,
) {
    lifecycle.spawn("consumer-fault-drain", async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                fault = faults.recv() => match fault {
                    Some(fault) => {
                        warn!("consumer error in group {}: {}", fault.group, fault.reason);
                    }
                    None => return,
                },
            }
        }
    });
}

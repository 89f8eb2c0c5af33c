//! Producer worker fleet.
//!
//! Fans out concurrent send loops against the provisioned topics:
//!
//! - single-topic mode: one topic with P partitions, P workers all sending
//!   to it, relying on the broker's partitioner to spread the load;
//! - multi-topic mode: one worker per single-partition topic.
//!
//! Each worker runs a tight loop: poll the shared token (non-blocking),
//! submit one fixed dummy record fire-and-forget, increment the velocity
//! counter. Workers never wait for per-message delivery acknowledgments;
//! failed deliveries arrive on the fault stream and are drained into the
//! log by a background task without pausing or retrying anything. On
//! cancellation a worker simply exits its loop — in-flight sends are not
//! flushed, matching the bounded shutdown drain.

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::constants::DUMMY_PAYLOAD;
use crate::driver::{AsyncProducer, DeliveryFault, FaultStream};
use crate::lifecycle::Lifecycle;
use crate::velocity::VelocityCounter;

/// Spawns and configures producer workers over one shared producer handle.
pub struct ProducerFleet {
    producer: Arc<dyn AsyncProducer>,
    counter: Arc<VelocityCounter>,
    token: CancellationToken,
}

impl ProducerFleet {
    pub fn new(
        producer: Arc<dyn AsyncProducer>,
        counter: Arc<VelocityCounter>,
        token: CancellationToken,
    ) -> Self {
        Self {
            producer,
            counter,
            token,
        }
    }

    /// Single-topic fan-out: `workers` independent senders on one topic.
    pub fn spawn_single_topic(&self, lifecycle: &Lifecycle, topic: &str, workers: usize) {
        for index in 0..workers {
            self.spawn_worker(lifecycle, topic.to_string(), index);
        }
    }

    /// Multi-topic fan-out: one sender per topic.
    pub fn spawn_multi_topic(&self, lifecycle: &Lifecycle, topics: &[String]) {
        for (index, topic) in topics.iter().enumerate() {
            self.spawn_worker(lifecycle, topic.clone(), index);
        }
    }

    fn spawn_worker(&self, lifecycle: &Lifecycle, topic: String, index: usize) {
        let producer = self.producer.clone();
        let counter = self.counter.clone();
        let token = self.token.clone();
        lifecycle.spawn(&format!("producer-worker-{index}"), async move {
            let payload = Bytes::from_static(DUMMY_PAYLOAD);
            loop {
                if token.is_cancelled() {
                    info!("producer worker {index} for topic {topic} stopped");
                    return;
                }
                producer.send(&topic, payload.clone()).await;
                counter.increment();
                // the send path may accept without parking this task; yield
                // so cancellation and the reporter stay schedulable
                tokio::task::yield_now().await;
            }
        });
    }
}

/// Drain delivery faults into the log until the stream closes or the run is
/// cancelled. Faults are observational: no retry, no backpressure change.
pub fn spawn_fault_drain(
    lifecycle: &Lifecycle,
    token: CancellationToken,
    mut faults: FaultStream<DeliveryFault>,
) {
    lifecycle.spawn("delivery-fault-drain", async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                fault = faults.recv() => match fault {
                    Some(fault) => {
                        warn!("could not produce message to topic {}: {}", fault.topic, fault.reason);
                    }
                    None => return,
                },
            }
        }
    });
}

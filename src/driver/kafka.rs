//! librdkafka binding (Cargo feature `kafka`).
//!
//! Binds the driver traits to a real broker through the `rdkafka` crate:
//!
//! - admin: `rdkafka::admin::AdminClient` with an operation timeout;
//! - producer: `ThreadedProducer` configured for no-response acks, with a
//!   delivery callback feeding the fault stream; queue-full backpressure is
//!   absorbed by a brief awaited retry in `send`;
//! - consumer: `StreamConsumer` with 500ms auto-commit and explicit offset
//!   store as the per-message acknowledgment. The single consumer stream is
//!   demultiplexed into per-(topic, partition) claims so the session
//!   protocol sees one claim per owned partition.
//!
//! A partition revoked mid-session stops receiving but keeps its claim
//! parked until the session ends; eager claim teardown would need
//! rebalance-callback plumbing the harness does not depend on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::ClientContext;
use rdkafka::admin::{AdminClient as RdAdmin, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, ConsumerContext, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{BaseRecord, DeliveryResult, ProducerContext, ThreadedProducer};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    AdminClient, AsyncProducer, BrokerDriver, ClaimHandler, ConsumerFault, DeliveryFault,
    FaultStream, GroupConsumer, GroupSession, InboundRecord, PartitionClaim, TopicSpec,
};
use crate::constants::AUTO_COMMIT_INTERVAL;
use crate::error::{Error, Result};

/// Driver producing rdkafka-backed handles.
pub struct KafkaDriver;

impl KafkaDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for KafkaDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerDriver for KafkaDriver {
    async fn connect_admin(&self, addr: &str) -> Result<Arc<dyn AdminClient>> {
        let inner: RdAdmin<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", addr)
            .create()
            .map_err(|e| Error::Connect {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Arc::new(KafkaAdmin { inner }))
    }

    async fn open_producer(
        &self,
        addr: &str,
    ) -> Result<(Arc<dyn AsyncProducer>, FaultStream<DeliveryFault>)> {
        let (faults_tx, faults_rx) = mpsc::unbounded_channel();
        let context = DeliveryFaultContext {
            faults: faults_tx.clone(),
        };
        let inner: ThreadedProducer<DeliveryFaultContext> = ClientConfig::new()
            .set("bootstrap.servers", addr)
            // no per-message delivery response; throughput over certainty
            .set("request.required.acks", "0")
            .set("linger.ms", "1000")
            .create_with_context(context)
            .map_err(|e| Error::Connect {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        Ok((
            Arc::new(KafkaProducer {
                inner,
                faults: faults_tx,
            }),
            faults_rx,
        ))
    }

    async fn join_group(
        &self,
        addr: &str,
        group: &str,
    ) -> Result<(Arc<dyn GroupConsumer>, FaultStream<ConsumerFault>)> {
        let (faults_tx, faults_rx) = mpsc::unbounded_channel();
        let context = GroupFaultContext {
            group: group.to_string(),
            faults: faults_tx,
        };
        let consumer: StreamConsumer<GroupFaultContext> = ClientConfig::new()
            .set("bootstrap.servers", addr)
            .set("group.id", group)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "true")
            .set(
                "auto.commit.interval.ms",
                AUTO_COMMIT_INTERVAL.as_millis().to_string(),
            )
            // the ack path stores offsets explicitly; auto-commit only
            // flushes what was stored
            .set("enable.auto.offset.store", "false")
            .create_with_context(context)
            .map_err(|e| Error::Connect {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        Ok((
            Arc::new(KafkaGroupMember {
                consumer: Arc::new(consumer),
            }),
            faults_rx,
        ))
    }
}

struct KafkaAdmin {
    inner: RdAdmin<DefaultClientContext>,
}

#[async_trait]
impl AdminClient for KafkaAdmin {
    async fn create_topics(&self, specs: &[TopicSpec], timeout: Duration) -> Result<()> {
        let new_topics: Vec<NewTopic<'_>> = specs
            .iter()
            .map(|spec| {
                NewTopic::new(
                    &spec.name,
                    spec.partitions,
                    TopicReplication::Fixed(spec.replication as i32),
                )
            })
            .collect();
        let options = AdminOptions::new().operation_timeout(Some(timeout));
        let results = self
            .inner
            .create_topics(new_topics.iter(), &options)
            .await
            .map_err(|e| Error::Admin(e.to_string()))?;
        for result in results {
            result.map_err(|(name, code)| Error::Admin(format!("{name}: {code}")))?;
        }
        Ok(())
    }
}

struct DeliveryFaultContext {
    faults: UnboundedSender<DeliveryFault>,
}

impl ClientContext for DeliveryFaultContext {}

impl ProducerContext for DeliveryFaultContext {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _opaque: ()) {
        if let Err((err, message)) = result {
            let _ = self.faults.send(DeliveryFault {
                topic: message.topic().to_string(),
                reason: err.to_string(),
            });
        }
    }
}

struct KafkaProducer {
    inner: ThreadedProducer<DeliveryFaultContext>,
    faults: UnboundedSender<DeliveryFault>,
}

#[async_trait]
impl AsyncProducer for KafkaProducer {
    async fn send(&self, topic: &str, payload: Bytes) {
        let mut record: BaseRecord<'_, (), [u8]> =
            BaseRecord::to(topic).payload(payload.as_ref());
        loop {
            match self.inner.send(record) {
                Ok(()) => return,
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), returned)) => {
                    // client buffer is full; this is the worker's
                    // backpressure suspension point
                    record = returned;
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                Err((err, _)) => {
                    let _ = self.faults.send(DeliveryFault {
                        topic: topic.to_string(),
                        reason: err.to_string(),
                    });
                    return;
                }
            }
        }
    }
}

struct GroupFaultContext {
    group: String,
    faults: UnboundedSender<ConsumerFault>,
}

impl ClientContext for GroupFaultContext {
    fn error(&self, error: KafkaError, reason: &str) {
        let _ = self.faults.send(ConsumerFault {
            group: self.group.clone(),
            reason: format!("{error}: {reason}"),
        });
    }
}

impl ConsumerContext for GroupFaultContext {}

struct KafkaGroupMember {
    consumer: Arc<StreamConsumer<GroupFaultContext>>,
}

#[async_trait]
impl GroupConsumer for KafkaGroupMember {
    async fn consume(
        &self,
        ctx: &CancellationToken,
        topics: &[String],
        handler: Arc<dyn ClaimHandler>,
    ) -> Result<()> {
        let refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer.subscribe(&refs).map_err(|e| Error::FatalConsume {
            topics: topics.to_vec(),
            reason: e.to_string(),
        })?;

        let session_token = ctx.child_token();
        let session = Arc::new(KafkaSession {
            consumer: self.consumer.clone(),
            done: session_token.clone(),
        });
        handler.setup(session.as_ref()).await;

        let mut claims: HashMap<(String, i32), UnboundedSender<InboundRecord>> = HashMap::new();
        let mut workers = JoinSet::new();
        let result = loop {
            tokio::select! {
                _ = ctx.cancelled() => break Ok(()),
                received = self.consumer.recv() => match received {
                    Ok(message) => {
                        let record = InboundRecord {
                            topic: message.topic().to_string(),
                            partition: message.partition(),
                            offset: message.offset(),
                            payload: Bytes::copy_from_slice(message.payload().unwrap_or_default()),
                        };
                        drop(message);
                        let key = (record.topic.clone(), record.partition);
                        let sender = claims.entry(key).or_insert_with(|| {
                            let (tx, rx) = mpsc::unbounded_channel();
                            debug!(
                                "claim opened. topic: {}. partition: {}",
                                record.topic, record.partition
                            );
                            let mut claim = KafkaClaim {
                                topic: record.topic.clone(),
                                partition: record.partition,
                                rx,
                            };
                            let handler = handler.clone();
                            let session = session.clone();
                            workers.spawn(async move {
                                handler.consume_claim(&*session, &mut claim).await;
                            });
                            tx
                        });
                        let _ = sender.send(record);
                    }
                    Err(err) => break Err(Error::FatalConsume {
                        topics: topics.to_vec(),
                        reason: err.to_string(),
                    }),
                },
            }
        };

        session_token.cancel();
        claims.clear();
        while workers.join_next().await.is_some() {}
        handler.cleanup(session.as_ref()).await;
        result
    }
}

struct KafkaSession {
    consumer: Arc<StreamConsumer<GroupFaultContext>>,
    done: CancellationToken,
}

impl GroupSession for KafkaSession {
    fn ack(&self, record: &InboundRecord) {
        if let Err(err) = self
            .consumer
            .store_offset(&record.topic, record.partition, record.offset)
        {
            warn!(
                "could not store offset {} for {}/{}: {err}",
                record.offset, record.topic, record.partition
            );
        }
    }

    fn done(&self) -> &CancellationToken {
        &self.done
    }
}

struct KafkaClaim {
    topic: String,
    partition: i32,
    rx: UnboundedReceiver<InboundRecord>,
}

#[async_trait]
impl PartitionClaim for KafkaClaim {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn partition(&self) -> i32 {
        self.partition
    }

    async fn recv(&mut self) -> Option<InboundRecord> {
        self.rx.recv().await
    }
}

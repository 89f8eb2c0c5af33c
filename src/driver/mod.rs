//! Broker capability interface.
//!
//! Everything touching the wire protocol of the broker lives behind the
//! traits in this module; the workload core only drives them. Two bindings
//! are provided:
//!
//! - [`loopback`]: a complete in-process broker used by the integration
//!   tests and available from the binaries for smoke runs;
//! - `kafka` (Cargo feature `kafka`): librdkafka via the `rdkafka` crate,
//!   for runs against a real broker.
//!
//! # Fatal vs observational failures
//!
//! Connection, administrative, and session-level failures come back as
//! [`Error`](crate::error::Error) values and abort the run. Per-message
//! failures never do: producers surface them as [`DeliveryFault`]s and
//! group consumers as [`ConsumerFault`]s on unbounded channels, which the
//! core drains into the log without pausing any worker.
//!
//! # Session protocol
//!
//! Group consumption is callback-driven. A driver's
//! [`GroupConsumer::consume`] call covers exactly one session generation:
//! it invokes [`ClaimHandler::setup`] once partitions are assigned, runs
//! [`ClaimHandler::consume_claim`] for each owned partition, and invokes
//! [`ClaimHandler::cleanup`] after every claim has returned. The session's
//! own completion signal ([`GroupSession::done`]) is distinct from the
//! process-wide token: it fires on rebalance as well as shutdown, and a
//! handler must stop processing the moment it does. Acknowledgments go
//! through [`GroupSession::ack`] before the session completes; offset
//! commits themselves run on the broker client's background interval.

pub mod loopback;

#[cfg(feature = "kafka")]
pub mod kafka;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// A topic creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication: i16,
}

/// One message delivered to a consumer.
#[derive(Debug, Clone)]
pub struct InboundRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Bytes,
}

/// A failed asynchronous send. Observational only; never retried.
#[derive(Debug, Clone)]
pub struct DeliveryFault {
    pub topic: String,
    pub reason: String,
}

/// An error surfaced on a consumer group's error stream outside of claim
/// processing. Observational only; consumption continues.
#[derive(Debug, Clone)]
pub struct ConsumerFault {
    pub group: String,
    pub reason: String,
}

/// Receiving half of a fault channel.
pub type FaultStream<T> = mpsc::UnboundedReceiver<T>;

/// Administrative interface: topic creation.
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Create the given topics in one batched request, bounded by `timeout`.
    async fn create_topics(&self, specs: &[TopicSpec], timeout: Duration) -> Result<()>;
}

/// Asynchronous send path of a producer client.
#[async_trait]
pub trait AsyncProducer: Send + Sync {
    /// Queue one record, fire-and-forget.
    ///
    /// Resolves once the client's buffer accepts the record; it may suspend
    /// briefly under backpressure but never waits for a delivery
    /// acknowledgment. Delivery errors surface later on the fault stream.
    async fn send(&self, topic: &str, payload: Bytes);
}

/// An active assignment to read one partition within a session.
#[async_trait]
pub trait PartitionClaim: Send {
    fn topic(&self) -> &str;

    fn partition(&self) -> i32;

    /// Next message in broker delivery order, or `None` when the claim's
    /// stream has ended.
    async fn recv(&mut self) -> Option<InboundRecord>;
}

/// Handle onto one group session generation, shared by its claims.
pub trait GroupSession: Send + Sync {
    /// Acknowledge a delivered message. Must be called before the session
    /// completes; the client's auto-commit machinery picks it up.
    fn ack(&self, record: &InboundRecord);

    /// Completion signal for this session only — fires on rebalance as
    /// well as process shutdown.
    fn done(&self) -> &CancellationToken;
}

/// Callback-driven session protocol, implemented by the workload core.
#[async_trait]
pub trait ClaimHandler: Send + Sync {
    /// Called once per session, after partition assignment and before any
    /// claim runs.
    async fn setup(&self, session: &dyn GroupSession);

    /// Called once per session, after every claim has returned.
    async fn cleanup(&self, session: &dyn GroupSession);

    /// Drive one partition claim. Must return promptly once the claim's
    /// stream ends or `session.done()` fires.
    async fn consume_claim(&self, session: &dyn GroupSession, claim: &mut dyn PartitionClaim);
}

/// One consumer group member.
#[async_trait]
pub trait GroupConsumer: Send + Sync {
    /// Drive one session generation against `topics`.
    ///
    /// Returns `Ok(())` when the session ends cleanly — a rebalance ended
    /// it, or `ctx` was cancelled. Callers re-enter in a loop until `ctx`
    /// is done; an `Err` while `ctx` is live is fatal to the run.
    async fn consume(
        &self,
        ctx: &CancellationToken,
        topics: &[String],
        handler: Arc<dyn ClaimHandler>,
    ) -> Result<()>;
}

/// Factory for the broker-facing handles.
#[async_trait]
pub trait BrokerDriver: Send + Sync {
    /// Connect the administrative interface.
    async fn connect_admin(&self, addr: &str) -> Result<Arc<dyn AdminClient>>;

    /// Open an asynchronous producer and its delivery-fault stream.
    async fn open_producer(
        &self,
        addr: &str,
    ) -> Result<(Arc<dyn AsyncProducer>, FaultStream<DeliveryFault>)>;

    /// Join `group` as a new member and return its handle plus the group's
    /// error stream. Topics are chosen per consume call.
    async fn join_group(
        &self,
        addr: &str,
        group: &str,
    ) -> Result<(Arc<dyn GroupConsumer>, FaultStream<ConsumerFault>)>;
}

/// Driver selector for the binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    /// librdkafka binding; requires the `kafka` Cargo feature.
    Kafka,
    /// In-process broker, always available.
    Loopback,
}

impl std::str::FromStr for DriverKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "kafka" => Ok(DriverKind::Kafka),
            "loopback" => Ok(DriverKind::Loopback),
            other => Err(Error::Config(format!(
                "unknown driver {other:?}, expected kafka or loopback"
            ))),
        }
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverKind::Kafka => write!(f, "kafka"),
            DriverKind::Loopback => write!(f, "loopback"),
        }
    }
}

/// Build the selected driver.
pub fn build_driver(kind: DriverKind) -> Result<Arc<dyn BrokerDriver>> {
    match kind {
        DriverKind::Loopback => Ok(Arc::new(loopback::LoopbackDriver::new())),
        #[cfg(feature = "kafka")]
        DriverKind::Kafka => Ok(Arc::new(kafka::KafkaDriver::new())),
        #[cfg(not(feature = "kafka"))]
        DriverKind::Kafka => Err(Error::Config(
            "built without the `kafka` feature; use --driver loopback".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_kind_from_str() {
        assert_eq!("kafka".parse::<DriverKind>().unwrap(), DriverKind::Kafka);
        assert_eq!("KAFKA".parse::<DriverKind>().unwrap(), DriverKind::Kafka);
        assert_eq!(
            "loopback".parse::<DriverKind>().unwrap(),
            DriverKind::Loopback
        );
        assert!("memphis".parse::<DriverKind>().is_err());
    }

    #[test]
    fn test_driver_kind_display_roundtrip() {
        for kind in [DriverKind::Kafka, DriverKind::Loopback] {
            assert_eq!(kind.to_string().parse::<DriverKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_loopback_always_builds() {
        assert!(build_driver(DriverKind::Loopback).is_ok());
    }
}

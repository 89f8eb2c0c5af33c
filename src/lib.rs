//! # Kafkavelo
//! Throughput benchmarking harness for Kafka-shaped pub/sub brokers.
//!
//! Kafkavelo spins up configurable fleets of producer and consumer workers
//! against topics/partitions and reports a running messages-per-second
//! velocity metric. The crate is the workload orchestration core: fanning
//! out N independent workers, tracking aggregate throughput with a shared
//! atomic counter, and coordinating graceful shutdown through one shared
//! cancellation token. The broker itself sits behind the capability traits
//! in [`driver`] — an in-process [`loopback`](driver::loopback) broker is
//! always available, and the `kafka` Cargo feature binds the same traits to
//! librdkafka for runs against a real cluster.
//!
//! # Goals
//! - Measure sustained message velocity, not delivery guarantees
//! - Keep every broker-facing concern behind a narrow trait seam
//! - Cooperative cancellation everywhere; a signal drains the run in
//!   bounded time
//!
//! ## Running a producer workload
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use kafkavelo::driver::{BrokerDriver, loopback::LoopbackDriver};
//! use kafkavelo::lifecycle::Lifecycle;
//! use kafkavelo::producer::ProducerFleet;
//! use kafkavelo::provision::TopicProvisioner;
//! use kafkavelo::velocity::{VelocityCounter, VelocityReporter};
//!
//! #[tokio::main]
//! async fn main() -> kafkavelo::Result<()> {
//!     let driver = LoopbackDriver::new();
//!     let lifecycle = Lifecycle::new();
//!     let counter = Arc::new(VelocityCounter::new());
//!
//!     let admin = driver.connect_admin("127.0.0.1:9092").await?;
//!     let topic = TopicProvisioner::new(admin).create_single_topic(4).await?;
//!
//!     let (producer, _faults) = driver.open_producer("127.0.0.1:9092").await?;
//!     let fleet = ProducerFleet::new(producer, counter.clone(), lifecycle.token());
//!     fleet.spawn_single_topic(&lifecycle, &topic, 4);
//!
//!     lifecycle.spawn(
//!         "velocity-reporter",
//!         VelocityReporter::new("produce", counter, lifecycle.token()).run(),
//!     );
//!     lifecycle.run_until_signal().await
//! }
//! ```
//!
//! The `kafkavelo-producer` and `kafkavelo-consumer` binaries wire this up
//! behind CLI flags; see their `--help`.

#![forbid(unsafe_code)]

pub mod config;
pub mod constants;
pub mod consumer;
pub mod driver;
pub mod error;
pub mod lifecycle;
pub mod naming;
pub mod producer;
pub mod provision;
pub mod telemetry;
pub mod topic_file;
pub mod velocity;

pub use error::{Error, Result};

pub mod prelude {
    //! Main exports for assembling a benchmark run.
    pub use crate::config::{ConsumerRunConfig, FanoutMode, ProducerRunConfig, TopicMode};
    pub use crate::consumer::{GroupRunner, member_topic_sets, spawn_group_fault_drain};
    pub use crate::driver::{
        AdminClient, AsyncProducer, BrokerDriver, DriverKind, GroupConsumer, TopicSpec,
        build_driver,
    };
    pub use crate::error::{Error, Result};
    pub use crate::lifecycle::{Lifecycle, RunState};
    pub use crate::producer::{ProducerFleet, spawn_fault_drain};
    pub use crate::provision::TopicProvisioner;
    pub use crate::velocity::{VelocityCounter, VelocityReporter};
}

//! Producer-side benchmark entry point.
//!
//! Provisions the run's topics, writes their names to the shared topic
//! file, fans out the producer worker fleet, and reports produce velocity
//! until a termination signal drains the run.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use kafkavelo::config::{ProducerRunConfig, TopicMode};
use kafkavelo::constants::{DEFAULT_BROKER_ADDR, DEFAULT_TOPIC_FILE};
use kafkavelo::driver::{DriverKind, build_driver};
use kafkavelo::lifecycle::Lifecycle;
use kafkavelo::producer::{ProducerFleet, spawn_fault_drain};
use kafkavelo::provision::TopicProvisioner;
use kafkavelo::telemetry::{LogFormat, init_logging};
use kafkavelo::topic_file::write_topic_names;
use kafkavelo::Result;
use kafkavelo::velocity::{VelocityCounter, VelocityReporter};

#[derive(Parser, Debug)]
#[command(name = "kafkavelo-producer")]
#[command(about = "Produce-side throughput benchmark for Kafka-shaped brokers")]
struct Args {
    /// Topic mode. [single, multi]
    #[arg(long = "t-mode")]
    t_mode: TopicMode,

    /// Number of topics (for multi mode)
    #[arg(long = "t-num", default_value_t = 10)]
    t_num: usize,

    /// Number of partitions (for single mode)
    #[arg(long = "p-num", default_value_t = 10)]
    p_num: i32,

    /// File to output created topic names
    #[arg(long = "t-file-path", default_value = DEFAULT_TOPIC_FILE)]
    t_file_path: PathBuf,

    /// Broker address
    #[arg(long, default_value = DEFAULT_BROKER_ADDR)]
    broker: String,

    /// Broker driver. [kafka, loopback]
    #[arg(long, default_value = "kafka")]
    driver: DriverKind,
}

#[tokio::main]
async fn main() {
    if let Err(e) = init_logging(LogFormat::from_env()) {
        eprintln!("could not initialize logging: {e}");
    }
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = ProducerRunConfig {
        broker_addr: args.broker,
        topic_mode: args.t_mode,
        topic_count: args.t_num,
        partition_count: args.p_num,
        topic_file: args.t_file_path,
    };
    config.validate()?;

    let lifecycle = Lifecycle::new();
    let counter = Arc::new(VelocityCounter::new());
    let driver = build_driver(args.driver)?;

    // the administrative connection lives only as long as provisioning
    let admin = driver.connect_admin(&config.broker_addr).await?;
    let provisioner = TopicProvisioner::new(admin);

    let (producer, faults) = driver.open_producer(&config.broker_addr).await?;
    let fleet = ProducerFleet::new(producer, counter.clone(), lifecycle.token());

    lifecycle.spawn(
        "velocity-reporter",
        VelocityReporter::new("produce", counter, lifecycle.token()).run(),
    );
    spawn_fault_drain(&lifecycle, lifecycle.token(), faults);

    let topics = match config.topic_mode {
        TopicMode::Single => {
            info!(
                "starting producer. topic mode: {}, partitions: {}",
                config.topic_mode, config.partition_count
            );
            let topic = provisioner
                .create_single_topic(config.partition_count)
                .await?;
            fleet.spawn_single_topic(&lifecycle, &topic, config.partition_count as usize);
            vec![topic]
        }
        TopicMode::Multi => {
            info!(
                "starting producer. topic mode: {}, topics: {}",
                config.topic_mode, config.topic_count
            );
            let topics = provisioner
                .create_multiple_topics(config.topic_count)
                .await?;
            fleet.spawn_multi_topic(&lifecycle, &topics);
            topics
        }
    };
    // provisioning is done; release the administrative connection
    drop(provisioner);
    write_topic_names(&config.topic_file, &topics)?;

    lifecycle.run_until_signal().await?;
    info!("produce finished");
    Ok(())
}

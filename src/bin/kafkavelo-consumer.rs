//! Consumer-side benchmark entry point.
//!
//! Loads the topic names written by the producer run, joins a consumer
//! group under a fresh random-suffixed id, fans out group members per the
//! configured modes, and reports consume velocity until a termination
//! signal drains the run.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use kafkavelo::config::{ConsumerRunConfig, FanoutMode, TopicMode};
use kafkavelo::constants::{DEFAULT_BROKER_ADDR, DEFAULT_TOPIC_FILE};
use kafkavelo::consumer::{GroupRunner, member_topic_sets, spawn_group_fault_drain};
use kafkavelo::driver::{DriverKind, build_driver};
use kafkavelo::lifecycle::Lifecycle;
use kafkavelo::naming::random_group_id;
use kafkavelo::telemetry::{LogFormat, init_logging};
use kafkavelo::topic_file::read_topic_names;
use kafkavelo::velocity::{VelocityCounter, VelocityReporter};
use kafkavelo::{Error, Result};

#[derive(Parser, Debug)]
#[command(name = "kafkavelo-consumer")]
#[command(about = "Consume-side throughput benchmark for Kafka-shaped brokers")]
struct Args {
    /// Topic mode. [single, multi]
    #[arg(long = "t-mode")]
    t_mode: TopicMode,

    /// Consumer fan-out mode. [single, multi]
    #[arg(long = "c-mode")]
    c_mode: FanoutMode,

    /// Number of group members (for single topic mode with multi fan-out)
    #[arg(long = "p-num", default_value_t = 10)]
    p_num: usize,

    /// File to read topic names
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
    let config = ConsumerRunConfig {
        broker_addr: args.broker,
        topic_mode: args.t_mode,
        fanout_mode: args.c_mode,
        member_count: args.p_num,
        topic_file: args.t_file_path,
    };
    config.validate()?;

    let topics = read_topic_names(&config.topic_file)?;
    if topics.is_empty() {
        return Err(Error::Config(format!(
            "no topic names in {}",
            config.topic_file.display()
        )));
    }

    let group = random_group_id();
    let lifecycle = Lifecycle::new();
    let counter = Arc::new(VelocityCounter::new());
    let driver = build_driver(args.driver)?;

    info!(
        "starting consumer group: {group}. topic mode: {}. consumer mode: {}. topics: {topics:?}",
        config.topic_mode, config.fanout_mode
    );

    lifecycle.spawn(
        "velocity-reporter",
        VelocityReporter::new("consume", counter.clone(), lifecycle.token()).run(),
    );

    let member_sets = member_topic_sets(
        config.topic_mode,
        config.fanout_mode,
        &topics,
        config.member_count,
    );
    let mut runners = Vec::with_capacity(member_sets.len());
    for (index, member_topics) in member_sets.into_iter().enumerate() {
        let (consumer, faults) = driver.join_group(&config.broker_addr, &group).await?;
        spawn_group_fault_drain(&lifecycle, lifecycle.token(), faults);

        let runner = Arc::new(GroupRunner::new(
            consumer,
            member_topics,
            counter.clone(),
            lifecycle.token(),
        ));
        let worker = runner.clone();
        lifecycle.spawn(&format!("consumer-member-{index}"), async move {
            if let Err(e) = worker.run().await {
                // a fatal session error terminates the whole process, not
                // just this member
                error!("{e}");
                std::process::exit(1);
            }
        });
        runners.push(runner);
    }

    for runner in &runners {
        runner.wait_ready().await;
    }
    info!("all consumer members ready");

    lifecycle.run_until_signal().await?;
    info!("consume finished");
    Ok(())
}

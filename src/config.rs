//! Run configuration.
//!
//! Mode selectors and per-run settings for the producer and consumer
//! binaries. Defaults match the common benchmarking setup: ten partitions
//! or ten topics, `topics.txt` as the shared topic-name file, a local
//! broker.

use std::path::PathBuf;

use crate::constants::{DEFAULT_BROKER_ADDR, DEFAULT_TOPIC_FILE};
use crate::error::{Error, Result};

/// How the run's topics are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicMode {
    /// One topic with P partitions.
    Single,
    /// T single-partition topics.
    Multi,
}

impl std::str::FromStr for TopicMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "single" => Ok(TopicMode::Single),
            "multi" => Ok(TopicMode::Multi),
            other => Err(Error::Config(format!(
                "unknown topic mode {other:?}, expected single or multi"
            ))),
        }
    }
}

impl std::fmt::Display for TopicMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopicMode::Single => write!(f, "single"),
            TopicMode::Multi => write!(f, "multi"),
        }
    }
}

/// How many consumer instances the run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutMode {
    /// Exactly one group member for all configured topics.
    Single,
    /// Many members: P on one topic, or one per topic.
    Multi,
}

impl std::str::FromStr for FanoutMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "single" => Ok(FanoutMode::Single),
            "multi" => Ok(FanoutMode::Multi),
            other => Err(Error::Config(format!(
                "unknown consumer mode {other:?}, expected single or multi"
            ))),
        }
    }
}

impl std::fmt::Display for FanoutMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FanoutMode::Single => write!(f, "single"),
            FanoutMode::Multi => write!(f, "multi"),
        }
    }
}

/// Settings for a producer run.
#[derive(Debug, Clone)]
pub struct ProducerRunConfig {
    pub broker_addr: String,
    pub topic_mode: TopicMode,
    /// Topic count in multi-topic mode.
    pub topic_count: usize,
    /// Partition count in single-topic mode; also the worker count.
    pub partition_count: i32,
    /// Where the created topic names are written for the consumer run.
    pub topic_file: PathBuf,
}

impl Default for ProducerRunConfig {
    fn default() -> Self {
        Self {
            broker_addr: DEFAULT_BROKER_ADDR.to_string(),
            topic_mode: TopicMode::Single,
            topic_count: 10,
            partition_count: 10,
            topic_file: PathBuf::from(DEFAULT_TOPIC_FILE),
        }
    }
}

impl ProducerRunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.broker_addr.is_empty() {
            return Err(Error::Config("broker address must not be empty".into()));
        }
        match self.topic_mode {
            TopicMode::Single if self.partition_count < 1 => Err(Error::Config(format!(
                "partition count must be at least 1, got {}",
                self.partition_count
            ))),
            TopicMode::Multi if self.topic_count < 1 => Err(Error::Config(format!(
                "topic count must be at least 1, got {}",
                self.topic_count
            ))),
            _ => Ok(()),
        }
    }
}

/// Settings for a consumer run.
#[derive(Debug, Clone)]
pub struct ConsumerRunConfig {
    pub broker_addr: String,
    pub topic_mode: TopicMode,
    pub fanout_mode: FanoutMode,
    /// Member count for multi fan-out over a single topic.
    pub member_count: usize,
    /// Topic names written by the producer run.
    pub topic_file: PathBuf,
}

impl Default for ConsumerRunConfig {
    fn default() -> Self {
        Self {
            broker_addr: DEFAULT_BROKER_ADDR.to_string(),
            topic_mode: TopicMode::Single,
            fanout_mode: FanoutMode::Single,
            member_count: 10,
            topic_file: PathBuf::from(DEFAULT_TOPIC_FILE),
        }
    }
}

impl ConsumerRunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.broker_addr.is_empty() {
            return Err(Error::Config("broker address must not be empty".into()));
        }
        if self.fanout_mode == FanoutMode::Multi
            && self.topic_mode == TopicMode::Single
            && self.member_count < 1
        {
            return Err(Error::Config(format!(
                "member count must be at least 1, got {}",
                self.member_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("single".parse::<TopicMode>().unwrap(), TopicMode::Single);
        assert_eq!("MULTI".parse::<TopicMode>().unwrap(), TopicMode::Multi);
        assert!("".parse::<TopicMode>().is_err());
        assert!("both".parse::<FanoutMode>().is_err());
        assert_eq!("multi".parse::<FanoutMode>().unwrap(), FanoutMode::Multi);
    }

    #[test]
    fn test_mode_display_roundtrip() {
        for mode in [TopicMode::Single, TopicMode::Multi] {
            assert_eq!(mode.to_string().parse::<TopicMode>().unwrap(), mode);
        }
        for mode in [FanoutMode::Single, FanoutMode::Multi] {
            assert_eq!(mode.to_string().parse::<FanoutMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_producer_defaults_validate() {
        assert!(ProducerRunConfig::default().validate().is_ok());
        assert!(ConsumerRunConfig::default().validate().is_ok());
    }

    #[test]
    fn test_producer_rejects_zero_partitions() {
        let config = ProducerRunConfig {
            topic_mode: TopicMode::Single,
            partition_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_producer_ignores_topic_count_in_single_mode() {
        let config = ProducerRunConfig {
            topic_mode: TopicMode::Single,
            topic_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_consumer_rejects_zero_members() {
        let config = ConsumerRunConfig {
            topic_mode: TopicMode::Single,
            fanout_mode: FanoutMode::Multi,
            member_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

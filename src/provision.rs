//! Topic provisioning.
//!
//! Creates the run's target topics through the broker's administrative
//! interface: either one topic with P partitions, or N single-partition
//! topics in one batched request. Provisioning failure is fatal — the run
//! has nothing to measure without its targets.

use std::sync::Arc;

use tracing::info;

use crate::constants::{CREATE_TOPICS_TIMEOUT, REPLICATION_FACTOR};
use crate::driver::{AdminClient, TopicSpec};
use crate::error::{Error, Result};
use crate::naming::random_topic_name;

/// Creates topics with generated names; owns the administrative handle for
/// the duration of provisioning.
pub struct TopicProvisioner {
    admin: Arc<dyn AdminClient>,
}

impl TopicProvisioner {
    pub fn new(admin: Arc<dyn AdminClient>) -> Self {
        Self { admin }
    }

    /// Create one topic with `partitions` partitions; returns its name.
    pub async fn create_single_topic(&self, partitions: i32) -> Result<String> {
        if partitions < 1 {
            return Err(Error::Config(format!(
                "partition count must be at least 1, got {partitions}"
            )));
        }
        let specs = vec![TopicSpec {
            name: random_topic_name(),
            partitions,
            replication: REPLICATION_FACTOR,
        }];
        let mut names = self.request(specs).await?;
        Ok(names.remove(0))
    }

    /// Create `count` single-partition topics in one batched request;
    /// returns their names.
    pub async fn create_multiple_topics(&self, count: usize) -> Result<Vec<String>> {
        if count < 1 {
            return Err(Error::Config(format!(
                "topic count must be at least 1, got {count}"
            )));
        }
        let specs = (0..count)
            .map(|_| TopicSpec {
                name: random_topic_name(),
                partitions: 1,
                replication: REPLICATION_FACTOR,
            })
            .collect();
        self.request(specs).await
    }

    async fn request(&self, specs: Vec<TopicSpec>) -> Result<Vec<String>> {
        self.admin
            .create_topics(&specs, CREATE_TOPICS_TIMEOUT)
            .await
            .map_err(|e| Error::Provision(e.to_string()))?;
        let names: Vec<String> = specs.into_iter().map(|s| s.name).collect();
        info!("created topics: {names:?}");
        Ok(names)
    }
}

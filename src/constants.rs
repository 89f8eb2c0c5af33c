//! Centralized configuration constants.
//!
//! This module consolidates the tunables used throughout the harness.
//! Having them in one place makes it easier to:
//!
//! - Understand the workload parameters at a glance
//! - Update values consistently
//! - Document the rationale for each constant

use std::time::Duration;

// =============================================================================
// Topic Provisioning
// =============================================================================

/// Length of generated topic names.
///
/// Names are random lowercase-hex strings. With 16^10 possible names,
/// collisions within a single run are vanishingly unlikely and are not
/// actively checked.
pub const TOPIC_NAME_LEN: usize = 10;

/// Replication factor for every provisioned topic.
///
/// The harness measures client-side throughput, not durability; a single
/// replica keeps the broker-side write path minimal.
pub const REPLICATION_FACTOR: i16 = 1;

/// Upper bound on a topic-creation administrative request.
pub const CREATE_TOPICS_TIMEOUT: Duration = Duration::from_secs(20);

// =============================================================================
// Workload
// =============================================================================

/// Payload sent by every producer worker.
///
/// Content is irrelevant to the measurement; a fixed value avoids
/// allocation in the send loop.
pub const DUMMY_PAYLOAD: &[u8] = b"dummy message";

/// Interval between velocity report samples.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Offset auto-commit interval for group consumers.
///
/// Commits run from the broker client's own background machinery; the
/// harness acknowledges each message but never batches commits itself.
pub const AUTO_COMMIT_INTERVAL: Duration = Duration::from_millis(500);

// =============================================================================
// Lifecycle
// =============================================================================

/// Ceiling on the shutdown drain phase.
///
/// Workers are awaited after cancellation; any still running when this
/// delay elapses are abandoned and the process exits.
pub const DRAIN_CEILING: Duration = Duration::from_secs(5);

// =============================================================================
// Defaults
// =============================================================================

/// Default broker address.
pub const DEFAULT_BROKER_ADDR: &str = "127.0.0.1:9092";

/// Default topic-name file shared between producer and consumer runs.
pub const DEFAULT_TOPIC_FILE: &str = "topics.txt";

/// Prefix for generated consumer group ids.
pub const GROUP_ID_PREFIX: &str = "bench-group-";

/// Length of the random suffix appended to consumer group ids.
///
/// A fresh suffix per process run keeps runs from joining each other's
/// groups and inheriting committed offsets.
pub const GROUP_ID_SUFFIX_LEN: usize = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_are_positive() {
        assert!(CREATE_TOPICS_TIMEOUT > Duration::ZERO);
        assert!(REPORT_INTERVAL > Duration::ZERO);
        assert!(AUTO_COMMIT_INTERVAL > Duration::ZERO);
        assert!(DRAIN_CEILING > Duration::ZERO);
    }

    #[test]
    fn test_topic_name_len() {
        assert_eq!(TOPIC_NAME_LEN, 10);
    }

    #[test]
    fn test_replication_factor_is_one() {
        assert_eq!(REPLICATION_FACTOR, 1);
    }
}

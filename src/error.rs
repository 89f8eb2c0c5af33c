//! Crate-level errors.
//!
//! # Error Handling Patterns
//!
//! The harness uses two patterns based on how a failure affects the
//! measurement:
//!
//! ## Fail-Fast (Propagate Errors)
//!
//! Used for setup-time operations where failure means the run cannot
//! produce a meaningful measurement:
//! - Broker connections
//! - Topic provisioning
//! - Initial consumer group join
//! - A group-consumption call returning while the run is still live
//!
//! These surface as [`Error`] variants, propagate with `?`, and abort the
//! whole process, not just the offending worker.
//!
//! ## Best-Effort (Log and Continue)
//!
//! Used for steady-state per-message failures, which are swallowed into
//! logs to preserve throughput measurement fidelity:
//! - Individual asynchronous delivery failures
//! - Errors surfaced on a consumer group's error stream outside of claim
//!   processing
//!
//! These never appear as [`Error`] variants; they travel on the driver
//! fault channels ([`DeliveryFault`], [`ConsumerFault`]) and are drained
//! by logging tasks.
//!
//! [`DeliveryFault`]: crate::driver::DeliveryFault
//! [`ConsumerFault`]: crate::driver::ConsumerFault

use std::io;
use std::result;

use thiserror::Error as ThisError;

/// Result type for harness operations.
pub type Result<T> = result::Result<T, Error>;

/// Fatal harness errors.
///
/// Every variant aborts the run; see the module docs for the split between
/// fatal and observational failures.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The broker was unreachable.
    #[error("could not connect to broker at {addr}: {reason}")]
    Connect { addr: String, reason: String },

    /// An administrative request failed or timed out.
    #[error("administrative request failed: {0}")]
    Admin(String),

    /// Topic creation failed; the run has no target to produce into.
    #[error("could not provision topics: {0}")]
    Provision(String),

    /// The group-consumption call returned an error while the shared
    /// context was still live.
    #[error("consumer group session failed for topics {topics:?}: {reason}")]
    FatalConsume { topics: Vec<String>, reason: String },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// An error in the filesystem glue (topic-name file).
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Attach a path to a raw io error.
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

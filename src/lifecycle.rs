//! Run lifecycle coordination.
//!
//! One [`Lifecycle`] per process owns the root cancellation token and a
//! tracked set of worker tasks. The run moves through three states:
//!
//! - `Running`: the token is live; workers, reporter, and fault drains all
//!   execute normally.
//! - `Draining`: entered on SIGINT/SIGTERM (or [`Lifecycle::shutdown`]).
//!   The token is cancelled — an idempotent one-shot broadcast every holder
//!   observes — and no new work is submitted. In-flight asynchronous work
//!   completes best-effort.
//! - `Stopped`: all tracked workers have been awaited, bounded by the drain
//!   ceiling; workers still running at the ceiling are abandoned.
//!
//! Cancellation is cooperative: producer loops poll the token between
//! sends, consumer loops race it against their blocking receives. There is
//! no preemption.

use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::DRAIN_CEILING;
use crate::error::{Error, Result};

/// Lifecycle states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Draining,
    Stopped,
}

/// Owns the shared cancellation token and the set of spawned workers.
pub struct Lifecycle {
    token: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
    state: Mutex<RunState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(JoinSet::new()),
            state: Mutex::new(RunState::Running),
        }
    }

    /// A clone of the shared cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap()
    }

    /// Spawn a tracked worker task.
    ///
    /// Tracked tasks are awaited during the drain phase; `name` is for log
    /// correlation only.
    pub fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!("spawning worker task: {name}");
        self.tasks.lock().unwrap().spawn(future);
    }

    /// Block until an interrupt or termination signal arrives, then drain.
    pub async fn run_until_signal(&self) -> Result<()> {
        wait_for_signal().await?;
        info!("termination signal received");
        self.shutdown().await;
        Ok(())
    }

    /// Cancel the shared token and wait for tracked workers, bounded by the
    /// drain ceiling. Idempotent: later calls find nothing left to drain.
    pub async fn shutdown(&self) {
        self.set_state(RunState::Draining);
        info!("draining: cancelling workers");
        self.token.cancel();

        let mut tasks = {
            let mut guard = self.tasks.lock().unwrap();
            std::mem::take(&mut *guard)
        };
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(DRAIN_CEILING, drain).await.is_err() {
            warn!(
                "drain ceiling of {DRAIN_CEILING:?} reached, abandoning remaining workers"
            );
        }

        self.set_state(RunState::Stopped);
        info!("stopped");
    }

    fn set_state(&self, next: RunState) {
        *self.state.lock().unwrap() = next;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate()).map_err(|e| Error::io("signal", e))?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map_err(|e| Error::io("signal", e)),
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::io("signal", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_states_progress_in_order() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), RunState::Running);
        lifecycle.shutdown().await;
        assert_eq!(lifecycle.state(), RunState::Stopped);
    }

    #[tokio::test]
    async fn test_cancellation_is_broadcast_to_all_holders() {
        let lifecycle = Lifecycle::new();
        let observed = Arc::new(AtomicBool::new(false));

        for _ in 0..4 {
            let token = lifecycle.token();
            let observed = observed.clone();
            lifecycle.spawn("observer", async move {
                token.cancelled().await;
                observed.store(true, Ordering::SeqCst);
            });
        }

        lifecycle.shutdown().await;
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_workers() {
        let lifecycle = Lifecycle::new();
        let finished = Arc::new(AtomicBool::new(false));
        let token = lifecycle.token();
        let flag = finished.clone();
        lifecycle.spawn("slow-worker", async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });

        lifecycle.shutdown().await;
        assert!(
            finished.load(Ordering::SeqCst),
            "drain must wait for workers under the ceiling"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_ceiling_abandons_stuck_worker() {
        let lifecycle = Lifecycle::new();
        lifecycle.spawn("stuck-worker", async {
            // never observes cancellation
            std::future::pending::<()>().await;
        });

        lifecycle.shutdown().await;
        assert_eq!(lifecycle.state(), RunState::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_idempotent() {
        let lifecycle = Lifecycle::new();
        lifecycle.shutdown().await;
        lifecycle.shutdown().await;
        assert_eq!(lifecycle.state(), RunState::Stopped);
    }
}

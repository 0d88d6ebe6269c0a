//! Periodic garbage collection on a tokio runtime.
//!
//! The scheduler is a small actor: one task owns the interval and
//! receives commands over a channel, and every pass runs on the blocking
//! pool because the sweeps do synchronous file I/O.

use std::sync::Arc;
use std::time::Duration;

use latchkey_store::LockStore;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::{GarbageCollector, GcError, GcReport};

enum GcCommand {
    RunNow {
        reply: oneshot::Sender<Result<GcReport, GcError>>,
    },
    Shutdown,
}

/// Handle to a running periodic collector.
///
/// Dropping the handle stops the task after its current pass.
pub struct GcScheduler {
    sender: mpsc::Sender<GcCommand>,
    task: JoinHandle<()>,
}

impl GcScheduler {
    /// Starts running `collector` every `interval`.
    ///
    /// Must be called from within a tokio runtime. The first pass runs one
    /// full interval after spawning.
    pub fn spawn<S: LockStore>(
        collector: Arc<GarbageCollector<S>>,
        interval: Duration,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(8);
        let task = tokio::spawn(run(collector, interval, receiver));
        tracing::info!(interval_secs = interval.as_secs_f64(), "gc scheduler started");
        Self { sender, task }
    }

    /// Runs a pass right away and waits for its report.
    pub async fn run_now(&self) -> Result<GcReport, GcError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(GcCommand::RunNow { reply })
            .await
            .map_err(|_| GcError::SchedulerStopped)?;
        rx.await.map_err(|_| GcError::SchedulerStopped)?
    }

    /// Stops the scheduler and waits for the task to end.
    pub async fn shutdown(self) {
        let _ = self.sender.send(GcCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "gc scheduler task failed");
        }
    }
}

async fn run<S: LockStore>(
    collector: Arc<GarbageCollector<S>>,
    interval: Duration,
    mut receiver: mpsc::Receiver<GcCommand>,
) {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = pass(&collector).await {
                    tracing::error!(error = %e, "scheduled gc pass failed");
                }
            }
            cmd = receiver.recv() => match cmd {
                Some(GcCommand::RunNow { reply }) => {
                    let _ = reply.send(pass(&collector).await);
                }
                Some(GcCommand::Shutdown) | None => break,
            },
        }
    }

    tracing::info!("gc scheduler stopped");
}

async fn pass<S: LockStore>(
    collector: &Arc<GarbageCollector<S>>,
) -> Result<GcReport, GcError> {
    let collector = Arc::clone(collector);
    tokio::task::spawn_blocking(move || collector.collect()).await?
}

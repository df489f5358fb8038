//! Check scheduling and the worker pool
//!
//! A single fixed-interval timer enumerates the generated runtime configs
//! and enqueues one job per file into a bounded queue, drained by a fixed
//! pool of long-lived workers. A worker runs one job to completion before
//! dequeuing the next, so it holds at most one engine subprocess and one
//! local port at any instant.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::pipeline::JobRunner;

const MIN_QUEUE_CAPACITY: usize = 16;

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between check cycles
    pub interval: Duration,
    /// Number of long-lived workers
    pub workers: usize,
    /// Directory of generated runtime configs to enumerate each cycle
    pub output_dir: PathBuf,
}

/// Fires check cycles and fans jobs out to the worker pool
pub struct Scheduler {
    config: SchedulerConfig,
    runner: Arc<dyn JobRunner>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, runner: Arc<dyn JobRunner>) -> Self {
        Self { config, runner }
    }

    /// Run the scheduler until shutdown is signalled.
    ///
    /// Shutdown ordering: the timer loop exits first so no new jobs are
    /// enqueued, the queue sender drops, and workers drain what remains
    /// before exiting.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let workers = self.config.workers.max(1);
        let capacity = (workers * 2).max(MIN_QUEUE_CAPACITY);
        let (job_tx, job_rx) = mpsc::channel::<PathBuf>(capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));

        info!(
            workers,
            interval_secs = self.config.interval.as_secs(),
            "Starting scheduler"
        );

        let mut worker_tasks = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let job_rx = job_rx.clone();
            let runner = self.runner.clone();
            worker_tasks.push(tokio::spawn(async move {
                worker_loop(worker_id, job_rx, runner).await;
            }));
        }

        let mut tick = interval(self.config.interval);
        tick.tick().await; // Skip the immediate tick; first cycle fires after one interval.

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if self.enqueue_cycle(&job_tx, &mut shutdown).await {
                        info!("Scheduler shutting down");
                        break;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Scheduler shutting down");
                        break;
                    }
                }
            }
        }

        drop(job_tx);
        let _ = futures::future::join_all(worker_tasks).await;
        info!("All workers stopped");
    }

    /// Enumerate the output directory and enqueue one job per config file.
    ///
    /// Saturation policy: bounded queue with blocking enqueue; a full queue
    /// delays the cycle and is logged so backpressure stays observable. The
    /// blocking send races against the shutdown signal so a saturated queue
    /// can never stall teardown. Returns true once shutdown is observed.
    async fn enqueue_cycle(
        &self,
        job_tx: &mpsc::Sender<PathBuf>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let entries = match std::fs::read_dir(&self.config.output_dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!(
                    dir = %self.config.output_dir.display(),
                    "cannot enumerate runtime configs: {}", e
                );
                return false;
            }
        };

        let mut enqueued = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            match job_tx.try_send(path) {
                Ok(()) => enqueued += 1,
                Err(TrySendError::Full(path)) => {
                    warn!(
                        config = %path.display(),
                        "job queue full, check cycle delayed by backpressure"
                    );
                    tokio::select! {
                        sent = job_tx.send(path) => {
                            if sent.is_err() {
                                return false;
                            }
                            enqueued += 1;
                        }
                        _ = shutdown.changed() => {
                            debug!(jobs = enqueued, "check cycle abandoned by shutdown");
                            return *shutdown.borrow();
                        }
                    }
                }
                Err(TrySendError::Closed(_)) => return false,
            }
        }

        info!(jobs = enqueued, "check cycle enqueued");
        false
    }
}

/// Workers run until the queue closes, so jobs already enqueued when
/// shutdown fires are still drained. Only the timer loop watches the
/// shutdown signal.
async fn worker_loop(
    worker_id: usize,
    job_rx: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
    runner: Arc<dyn JobRunner>,
) {
    debug!(worker_id, "worker started");

    loop {
        // The lock is held only while waiting for a job, never while
        // running one.
        let job = {
            let mut rx = job_rx.lock().await;
            rx.recv().await
        };

        match job {
            Some(config_path) => {
                debug!(worker_id, config = %config_path.display(), "job started");
                runner.run(&config_path).await;
            }
            None => break,
        }
    }

    debug!(worker_id, "worker stopped");
}

/// Handle for managing the scheduler lifecycle
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl SchedulerHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for SchedulerHandle {
    fn default() -> Self {
        Self::new().0
    }
}

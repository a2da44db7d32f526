//! Bounded pool running background cache rebuilds.
//!
//! Submissions go into a bounded queue without waiting. A dispatcher task
//! drains the queue and runs each job once one of `workers` permits is free.
//! A full queue rejects the job instead of blocking the reader that found the
//! stale entry; rejections are logged, counted and returned to the caller.

use crate::metrics::RebuildMetrics;
use bastion_config::RebuildSettings;
use bastion_core::{BastionError, BastionResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Capacity of the outcome broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct RebuildExecutorConfig {
    /// Number of rebuilds allowed to run at once.
    pub workers: usize,

    /// Pending rebuilds held before submissions are rejected.
    pub queue_capacity: usize,

    /// Grace period for running rebuilds on shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for RebuildExecutorConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_capacity: 1024,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&RebuildSettings> for RebuildExecutorConfig {
    fn from(settings: &RebuildSettings) -> Self {
        Self {
            workers: settings.workers,
            queue_capacity: settings.queue_capacity,
            shutdown_timeout: settings.shutdown_timeout(),
        }
    }
}

/// A unit of background work.
///
/// A job owns everything it needs, including any lock it must release; the
/// executor only runs it and records the outcome.
pub trait RebuildJob: Send + 'static {
    /// Cache key being rebuilt, for logs and events.
    fn key(&self) -> &str;

    /// Runs the job to completion.
    fn run(self: Box<Self>) -> BoxFuture<'static, BastionResult<()>>;
}

/// How a rebuild ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// The cache entry was refreshed.
    Completed,
    /// The job failed; the stale entry stays in place.
    Failed(String),
}

/// Published on the executor's event channel after every job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildEvent {
    /// Cache key the job rebuilt.
    pub key: String,
    /// Result of the job.
    pub outcome: RebuildOutcome,
}

/// Executor statistics.
#[derive(Debug, Clone)]
pub struct RebuildExecutorStats {
    /// Executor ID.
    pub id: String,
    /// Configured concurrency.
    pub workers: usize,
    /// Jobs accepted.
    pub submitted: u64,
    /// Jobs completed.
    pub completed: u64,
    /// Jobs failed.
    pub failed: u64,
    /// Jobs rejected.
    pub rejected: u64,
    /// Jobs running right now.
    pub running: usize,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

/// Fixed-size pool for background rebuilds.
///
/// Constructed explicitly and shared by `Arc` between every strategy that
/// needs it.
pub struct RebuildExecutor {
    id: String,
    config: RebuildExecutorConfig,
    sender: Mutex<Option<mpsc::Sender<Box<dyn RebuildJob>>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    permits: Arc<Semaphore>,
    events: broadcast::Sender<RebuildEvent>,
    counters: Arc<Counters>,
}

impl RebuildExecutor {
    /// Starts the executor on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn start(config: RebuildExecutorConfig) -> Self {
        let workers = config.workers.max(1);
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let id = format!("rebuild-{}", Uuid::new_v4());
        let permits = Arc::new(Semaphore::new(workers));
        let counters = Arc::new(Counters::default());

        let dispatcher = tokio::spawn(
            Self::dispatch(
                id.clone(),
                workers,
                receiver,
                permits.clone(),
                events.clone(),
                counters.clone(),
            )
            .instrument(tracing::info_span!("rebuild_dispatcher")),
        );

        info!(
            executor_id = %id,
            workers,
            queue_capacity = config.queue_capacity,
            "Rebuild executor started"
        );

        Self {
            id,
            config: RebuildExecutorConfig { workers, ..config },
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
            permits,
            events,
            counters,
        }
    }

    /// Enqueues a job without waiting.
    ///
    /// Fails with [`BastionError::RebuildRejected`] when the queue is full or
    /// the executor has shut down; the job is dropped in that case.
    pub fn submit(&self, job: Box<dyn RebuildJob>) -> BastionResult<()> {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(self.reject(job.key(), "shutdown"));
        };

        match sender.try_send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                RebuildMetrics::submitted();
                Ok(())
            }
            Err(TrySendError::Full(job)) => Err(self.reject(job.key(), "queue_full")),
            Err(TrySendError::Closed(job)) => Err(self.reject(job.key(), "shutdown")),
        }
    }

    fn reject(&self, key: &str, reason: &'static str) -> BastionError {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        RebuildMetrics::rejected(reason);
        warn!(executor_id = %self.id, key = %key, reason, "Rebuild rejected");
        BastionError::RebuildRejected(format!("{} ({})", key, reason))
    }

    /// Subscribes to job outcomes.
    ///
    /// Only events published after the call are received.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RebuildEvent> {
        self.events.subscribe()
    }

    /// Stops intake, lets queued jobs start, and waits for running jobs up to
    /// the shutdown timeout.
    pub async fn shutdown(&self) {
        info!(executor_id = %self.id, "Stopping rebuild executor...");
        drop(self.sender.lock().take());

        let dispatcher = self.dispatcher.lock().take();
        let workers = u32::try_from(self.config.workers).unwrap_or(u32::MAX);
        let drained = timeout(self.config.shutdown_timeout, async {
            if let Some(dispatcher) = dispatcher {
                let _ = dispatcher.await;
            }
            let _ = self.permits.acquire_many(workers).await;
        })
        .await;

        if drained.is_err() {
            warn!(
                executor_id = %self.id,
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "Rebuilds still running at shutdown timeout"
            );
        }

        info!(
            executor_id = %self.id,
            completed = self.counters.completed.load(Ordering::Relaxed),
            failed = self.counters.failed.load(Ordering::Relaxed),
            rejected = self.counters.rejected.load(Ordering::Relaxed),
            "Rebuild executor stopped"
        );
    }

    /// Whether the executor still accepts jobs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Executor ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> RebuildExecutorStats {
        RebuildExecutorStats {
            id: self.id.clone(),
            workers: self.config.workers,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            running: self.config.workers - self.permits.available_permits(),
        }
    }

    async fn dispatch(
        id: String,
        workers: usize,
        mut receiver: mpsc::Receiver<Box<dyn RebuildJob>>,
        permits: Arc<Semaphore>,
        events: broadcast::Sender<RebuildEvent>,
        counters: Arc<Counters>,
    ) {
        while let Some(job) = receiver.recv().await {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };

            let id = id.clone();
            let permits = permits.clone();
            let events = events.clone();
            let counters = counters.clone();
            let key = job.key().to_string();

            tokio::spawn(
                async move {
                    RebuildMetrics::active(&id, workers - permits.available_permits());
                    debug!(key = %key, "Rebuild started");
                    let started = Instant::now();

                    let result = AssertUnwindSafe(job.run())
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            Err(BastionError::internal(format!("rebuild of '{}' panicked", key)))
                        });

                    let elapsed = started.elapsed();
                    RebuildMetrics::finished(result.is_ok(), elapsed);

                    let outcome = match result {
                        Ok(()) => {
                            counters.completed.fetch_add(1, Ordering::Relaxed);
                            debug!(key = %key, elapsed_ms = whole_millis(elapsed), "Rebuild completed");
                            RebuildOutcome::Completed
                        }
                        Err(e) => {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            error!(key = %key, error = %e, "Rebuild failed");
                            RebuildOutcome::Failed(e.to_string())
                        }
                    };

                    drop(permit);
                    RebuildMetrics::active(&id, workers - permits.available_permits());
                    // No subscribers is fine.
                    let _ = events.send(RebuildEvent { key, outcome });
                }
                .instrument(tracing::info_span!("rebuild")),
            );
        }

        debug!(executor_id = %id, "Rebuild dispatcher exited");
    }
}

/// Milliseconds for logging, saturating at `u64::MAX`.
fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

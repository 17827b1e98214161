//! Queue manager: admission ledger, dispatch loop, concurrency gate and
//! outcome store.
//!
//! ## Data flow
//!
//! ```text
//! submit() ──► ledger (parking_lot) + mpsc FIFO
//!                              │
//!                   dispatch loop (one task): Semaphore permit, then next job
//!                              │ spawn per job with its permit (TaskTracker)
//!                              ▼
//!                        callback(job) ──► DashMap<JobId, Outcome>
//!                                                          │
//!                                  await_outcome() ◄───────┘   sweeper purges after TTL
//! ```
//!
//! The ledger holds every job that has been admitted and not yet completed,
//! in admission order, flagged waiting or executing. Positions, depth,
//! active count and wait estimates are all read from it.

use crate::job::{Job, JobId, Outcome};
use crate::metrics;
use crate::OrchestratorError;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::{QueueConfig, WaitEstimate};

/// Per-job function installed by [`QueueManager::start_worker`].
pub type JobCallback<T> =
    Arc<dyn Fn(Job) -> BoxFuture<'static, Result<T, OrchestratorError>> + Send + Sync>;

type QueueHook = Arc<dyn Fn(QueueSnapshot) + Send + Sync>;

/// Serialisable point-in-time view of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    /// Jobs admitted but not yet executing.
    pub depth: usize,
    /// Jobs currently executing under the gate.
    pub active: usize,
    /// Outcomes stored and not yet collected.
    pub outcomes_held: usize,
    /// Admission bound.
    pub capacity: usize,
    /// Gate size.
    pub concurrency: usize,
    /// Whether the dispatch loop is running.
    pub worker_running: bool,
}

#[derive(Debug)]
struct LedgerEntry {
    id: JobId,
    duration_secs: f64,
    executing: bool,
}

/// In-flight jobs in admission order.
#[derive(Debug, Default)]
struct Ledger {
    entries: VecDeque<LedgerEntry>,
    waiting: usize,
    executing: usize,
}

impl Ledger {
    fn index_of(&self, id: &JobId) -> Option<usize> {
        self.entries.iter().position(|e| &e.id == id)
    }
}

struct Inner<T> {
    config: QueueConfig,
    ledger: Mutex<Ledger>,
    tx: mpsc::UnboundedSender<Job>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>,
    gate: Arc<Semaphore>,
    outcomes: DashMap<JobId, Outcome<T>>,
    tracker: TaskTracker,
    hook: RwLock<Option<QueueHook>>,
    running: AtomicBool,
}

struct WorkerHandle {
    cancel: CancellationToken,
    dispatch: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

/// Bounded, gated job queue with an outcome store.
///
/// `T` is the success payload each job's callback produces.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use tokio_transcription_orchestrator::{Job, QueueConfig, QueueManager, RoutingContext};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let queue: QueueManager<String> = QueueManager::new(QueueConfig::new(10, 2));
/// queue.start_worker(|job: Job| async move { Ok(format!("done {}", job.input)) });
///
/// let job = Job::new("user-1", "/tmp/a.ogg", RoutingContext::new(12.0));
/// let id = job.id.clone();
/// let position = queue.submit(job)?;
/// println!("queued at position {position}");
///
/// let outcome = queue
///     .await_outcome(&id, Duration::from_secs(5), Duration::from_millis(50))
///     .await?;
/// println!("{:?}", outcome.into_result());
/// # Ok(())
/// # }
/// ```
pub struct QueueManager<T> {
    inner: Arc<Inner<T>>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl<T> std::fmt::Debug for QueueManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ledger = self.inner.ledger.lock();
        f.debug_struct("QueueManager")
            .field("capacity", &self.inner.config.capacity)
            .field("concurrency", &self.inner.config.concurrency)
            .field("depth", &ledger.waiting)
            .field("active", &ledger.executing)
            .field("worker_running", &self.inner.running.load(Ordering::Acquire))
            .finish()
    }
}

impl<T> Drop for QueueManager<T> {
    /// Cancels the dispatch loop and the sweeper so they release the shared
    /// state. Jobs already running finish on their own.
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().take() {
            handle.cancel.cancel();
            debug!("queue: dropped while running, worker cancelled");
        }
    }
}

impl<T: Send + Sync + 'static> QueueManager<T> {
    /// Create a stopped queue. Call [`QueueManager::start_worker`] to begin
    /// executing jobs; submissions are accepted before that.
    ///
    /// A `concurrency` of 0 is treated as 1.
    pub fn new(config: QueueConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            inner: Arc::new(Inner {
                config,
                ledger: Mutex::new(Ledger::default()),
                tx,
                rx: tokio::sync::Mutex::new(rx),
                gate,
                outcomes: DashMap::new(),
                tracker: TaskTracker::new(),
                hook: RwLock::new(None),
                running: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// The configuration this queue was built with.
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Admit a job.
    ///
    /// # Returns
    ///
    /// The job's 1-based position among all jobs not yet completed
    /// (waiting and executing).
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::AdmissionRejected`] if `capacity` jobs are
    ///   already waiting to begin execution
    /// - [`OrchestratorError::DuplicateJob`] if the id is still in flight or
    ///   has an uncollected outcome
    ///
    /// A rejected submission leaves no state behind.
    pub fn submit(&self, job: Job) -> Result<usize, OrchestratorError> {
        let id = job.id.clone();
        let duration_secs = job.declared_duration();

        let position = {
            let mut ledger = self.inner.ledger.lock();
            if ledger.index_of(&id).is_some() || self.inner.outcomes.contains_key(&id) {
                metrics::inc_rejected("duplicate");
                return Err(OrchestratorError::DuplicateJob { id });
            }
            if ledger.waiting >= self.inner.config.capacity {
                metrics::inc_rejected("capacity");
                debug!(job_id = %id, capacity = self.inner.config.capacity, "queue: admission rejected");
                return Err(OrchestratorError::AdmissionRejected {
                    capacity: self.inner.config.capacity,
                });
            }
            self.inner
                .tx
                .send(job)
                .map_err(|_| OrchestratorError::Other("queue channel closed".to_string()))?;
            ledger.entries.push_back(LedgerEntry {
                id: id.clone(),
                duration_secs,
                executing: false,
            });
            ledger.waiting += 1;
            ledger.entries.len()
        };

        metrics::inc_submitted();
        self.inner.publish_gauges();
        info!(job_id = %id, position, duration_secs, "queue: job admitted");
        Ok(position)
    }

    /// Jobs admitted but not yet executing.
    pub fn depth(&self) -> usize {
        self.inner.ledger.lock().waiting
    }

    /// Jobs currently executing under the concurrency gate.
    pub fn active_count(&self) -> usize {
        self.inner.ledger.lock().executing
    }

    /// Current 1-based position of a job still in flight.
    pub fn position(&self, id: &JobId) -> Option<usize> {
        self.inner.ledger.lock().index_of(id).map(|i| i + 1)
    }

    /// Estimate when a job will start and how long it will take.
    ///
    /// Sums the declared durations of every job ahead of `id` (executing and
    /// waiting), divides by the gate size and scales by `rate_factor`. The
    /// job's own duration is scaled the same way. Unknown ids yield zeros.
    pub fn estimate_wait(&self, id: &JobId, rate_factor: f64) -> WaitEstimate {
        let ledger = self.inner.ledger.lock();
        let Some(index) = ledger.index_of(id) else {
            return WaitEstimate::default();
        };
        let ahead: f64 = ledger
            .entries
            .iter()
            .take(index)
            .map(|e| e.duration_secs)
            .sum();
        let own = ledger.entries[index].duration_secs;
        let concurrency = self.inner.config.concurrency.max(1) as f64;
        WaitEstimate {
            wait_secs: ahead / concurrency * rate_factor,
            processing_secs: own * rate_factor,
        }
    }

    /// Wait for a job's outcome, then remove and return it.
    ///
    /// Checks every `poll_interval` (at least 1ms). Only the calling task is
    /// suspended.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::OutcomeTimeout`] if `timeout` elapses first. The
    /// job may still complete later; its outcome is then stored and purged
    /// normally.
    pub async fn await_outcome(
        &self,
        id: &JobId,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Outcome<T>, OrchestratorError> {
        let poll_interval = poll_interval.max(Duration::from_millis(1));
        let wait = async {
            loop {
                if let Some(outcome) = self.try_take_outcome(id) {
                    return outcome;
                }
                tokio::time::sleep(poll_interval).await;
            }
        };
        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            debug!(job_id = %id, ?timeout, "queue: await timed out");
            OrchestratorError::OutcomeTimeout {
                id: id.clone(),
                timeout,
            }
        })
    }

    /// Remove and return a job's outcome if it is ready.
    pub fn try_take_outcome(&self, id: &JobId) -> Option<Outcome<T>> {
        self.inner.outcomes.remove(id).map(|(_, outcome)| outcome)
    }

    /// Number of stored, uncollected outcomes.
    pub fn outcomes_held(&self) -> usize {
        self.inner.outcomes.len()
    }

    /// Drop outcomes older than the configured TTL.
    ///
    /// # Returns
    ///
    /// The number of outcomes removed.
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    /// Point-in-time view of the queue.
    pub fn snapshot(&self) -> QueueSnapshot {
        self.inner.snapshot()
    }

    /// Install a callback fired whenever a job begins executing.
    ///
    /// Best-effort: a panic inside the hook is logged and swallowed.
    /// Replaces any previously installed hook.
    pub fn set_queue_changed_hook<F>(&self, hook: F)
    where
        F: Fn(QueueSnapshot) + Send + Sync + 'static,
    {
        *self.inner.hook.write() = Some(Arc::new(hook));
    }

    /// Whether the dispatch loop is running.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Install the per-job callback and start the dispatch loop and the
    /// outcome sweeper.
    ///
    /// # Returns
    ///
    /// `true` if the worker was started, `false` if it was already running
    /// (the first callback is kept).
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start_worker<F, Fut>(&self, callback: F) -> bool
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, OrchestratorError>> + Send + 'static,
    {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            debug!("queue: worker already running, start ignored");
            return false;
        }

        let callback: JobCallback<T> = Arc::new(move |job| callback(job).boxed());
        let cancel = CancellationToken::new();
        self.inner.tracker.reopen();

        let dispatch = self.inner.tracker.spawn(dispatch_loop(
            Arc::clone(&self.inner),
            callback,
            cancel.child_token(),
        ));
        let sweeper = self
            .inner
            .tracker
            .spawn(sweep_loop(Arc::clone(&self.inner), cancel.child_token()));

        *worker = Some(WorkerHandle {
            cancel,
            dispatch,
            sweeper,
        });
        self.inner.running.store(true, Ordering::Release);
        info!(
            capacity = self.inner.config.capacity,
            concurrency = self.inner.config.concurrency,
            "queue: worker started"
        );
        true
    }

    /// Stop the dispatch loop and the sweeper and wait for both to exit.
    ///
    /// Jobs already handed to a per-job task finish naturally; jobs still in
    /// the FIFO stay there for the next [`QueueManager::start_worker`].
    /// A no-op when not running.
    pub async fn stop_worker(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        handle.cancel.cancel();
        for (task, join) in [("dispatch", handle.dispatch), ("sweeper", handle.sweeper)] {
            if let Err(e) = join.await {
                error!(task, error = %e, "queue: worker task ended abnormally");
            }
        }
        self.inner.running.store(false, Ordering::Release);
        info!("queue: worker stopped");
    }

    /// Stop the worker, then wait up to `grace` for in-flight jobs.
    ///
    /// # Returns
    ///
    /// `true` if every per-job task finished within `grace`.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.stop_worker().await;
        self.inner.tracker.close();
        let drained = tokio::time::timeout(grace, self.inner.tracker.wait())
            .await
            .is_ok();
        if drained {
            info!("queue: shutdown complete");
        } else {
            warn!(
                ?grace,
                still_running = self.inner.tracker.len(),
                "queue: grace period elapsed with jobs still running"
            );
        }
        drained
    }
}

impl<T: Send + Sync + 'static> Inner<T> {
    fn snapshot(&self) -> QueueSnapshot {
        let (depth, active) = {
            let ledger = self.ledger.lock();
            (ledger.waiting, ledger.executing)
        };
        QueueSnapshot {
            depth,
            active,
            outcomes_held: self.outcomes.len(),
            capacity: self.config.capacity,
            concurrency: self.config.concurrency,
            worker_running: self.running.load(Ordering::Acquire),
        }
    }

    fn publish_gauges(&self) {
        let (depth, active) = {
            let ledger = self.ledger.lock();
            (ledger.waiting, ledger.executing)
        };
        metrics::set_queue_depth(depth as i64);
        metrics::set_active_jobs(active as i64);
    }

    fn mark_executing(&self, id: &JobId) {
        let mut ledger = self.ledger.lock();
        if let Some(i) = ledger.index_of(id) {
            if !ledger.entries[i].executing {
                ledger.entries[i].executing = true;
                ledger.waiting -= 1;
                ledger.executing += 1;
            }
        }
    }

    /// Retire the ledger entry and store the outcome in one step, so a job
    /// is always visible in exactly one of the two.
    fn complete(&self, outcome: Outcome<T>) {
        let mut ledger = self.ledger.lock();
        if let Some(i) = ledger.index_of(&outcome.job_id) {
            if let Some(entry) = ledger.entries.remove(i) {
                if entry.executing {
                    ledger.executing -= 1;
                } else {
                    ledger.waiting -= 1;
                }
            }
        }
        self.outcomes.insert(outcome.job_id.clone(), outcome);
    }

    fn notify_hook(&self) {
        let Some(hook) = self.hook.read().clone() else {
            return;
        };
        let snapshot = self.snapshot();
        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| hook(snapshot))) {
            warn!(
                panic = %panic_message(panic.as_ref()),
                "queue: queue-changed hook panicked, ignoring"
            );
        }
    }

    fn purge_expired(&self) -> usize {
        let ttl = self.config.outcome_ttl();
        let before = self.outcomes.len();
        self.outcomes
            .retain(|_, outcome| outcome.completed_at.elapsed() < ttl);
        let removed = before.saturating_sub(self.outcomes.len());
        if removed > 0 {
            info!(removed, ?ttl, "queue: purged uncollected outcomes");
        }
        removed
    }
}

async fn dispatch_loop<T: Send + Sync + 'static>(
    inner: Arc<Inner<T>>,
    callback: JobCallback<T>,
    cancel: CancellationToken,
) {
    let mut rx = inner.rx.lock().await;
    debug!("queue: dispatch loop running");
    loop {
        // Slot first, then job: jobs leave the FIFO only once they can start,
        // so start order is admission order and a stop never strands a job.
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&inner.gate).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    error!("queue: concurrency gate closed");
                    break;
                }
            },
        };
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        debug!(job_id = %job.id, "queue: dispatching");
        inner.tracker.spawn(execute(
            Arc::clone(&inner),
            Arc::clone(&callback),
            job,
            permit,
        ));
    }
    debug!("queue: dispatch loop exited");
}

async fn execute<T: Send + Sync + 'static>(
    inner: Arc<Inner<T>>,
    callback: JobCallback<T>,
    job: Job,
    permit: OwnedSemaphorePermit,
) {
    let id = job.id.clone();
    inner.mark_executing(&id);
    inner.publish_gauges();
    inner.notify_hook();
    debug!(job_id = %id, "queue: job executing");

    let started = Instant::now();
    let result = match AssertUnwindSafe(async move { callback(job).await })
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(job_id = %id, panic = %message, "queue: job callback panicked");
            Err(OrchestratorError::JobPanicked(message))
        }
    };
    let execution_time = started.elapsed();

    match &result {
        Ok(_) => {
            metrics::inc_completed("success");
            info!(job_id = %id, elapsed_ms = execution_time.as_millis() as u64, "queue: job completed");
        }
        Err(e) => {
            metrics::inc_completed("error");
            warn!(job_id = %id, error = %e, "queue: job failed");
        }
    }

    inner.complete(Outcome {
        job_id: id,
        result,
        execution_time,
        completed_at: Instant::now(),
    });
    drop(permit);
    inner.publish_gauges();
}

async fn sweep_loop<T: Send + Sync + 'static>(inner: Arc<Inner<T>>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(inner.config.purge_interval().max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                inner.purge_expired();
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

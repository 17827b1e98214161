//! Process-wide service wiring.
//!
//! ## Responsibility
//! Build the [`Router`] and the [`QueueManager`] once from an [`AppConfig`]
//! and a [`ProviderRegistry`], connect the queue's per-job callback to the
//! router, and own their startup and shutdown order.
//!
//! ## Guarantees
//! - Explicit: hosts hold a `ServiceContext` and pass it by reference; there
//!   is no global state
//! - Ordered shutdown: the queue drains before providers are shut down
//!
//! ## NOT Responsible For
//! - Transport or user interaction (host concern)
//! - Parsing configuration (that belongs to `config`)

use crate::config::AppConfig;
use crate::job::{Job, JobId, RoutingContext, TranscriptionResult};
use crate::provider::ProviderRegistry;
use crate::queue::{QueueManager, WaitEstimate};
use crate::routing::{ProcessingPlan, Router};
use crate::OrchestratorError;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// The router and queue of one orchestrator instance.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use tokio_transcription_orchestrator::{config::AppConfig, Job, RoutingContext, ServiceContext};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = ServiceContext::from_config(AppConfig::default());
/// service.initialize().await?;
/// service.start();
///
/// let job = Job::new("user-1", "/tmp/voice.ogg", RoutingContext::new(8.0));
/// let id = job.id.clone();
/// service.submit(job)?;
/// let result = service.await_result(&id, Duration::from_secs(30)).await?;
/// println!("{}", result.text);
///
/// service.shutdown(Duration::from_secs(5)).await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ServiceContext {
    config: AppConfig,
    router: Arc<Router>,
    queue: QueueManager<TranscriptionResult>,
}

impl ServiceContext {
    /// Build the service from a config and an already-populated registry.
    /// The routing strategy comes from `config.routing`.
    pub fn new(config: AppConfig, registry: ProviderRegistry) -> Self {
        let router = Router::new(registry, config.routing.build());
        Self::with_router(config, router)
    }

    /// Build the service with the providers listed in the config.
    pub fn from_config(config: AppConfig) -> Self {
        let registry = config.build_registry();
        Self::new(config, registry)
    }

    /// Build the service around a pre-built router (e.g. one with a
    /// benchmark factory attached).
    pub fn with_router(config: AppConfig, router: Router) -> Self {
        let queue = QueueManager::new(config.queue.clone());
        Self {
            config,
            router: Arc::new(router),
            queue,
        }
    }

    /// The configuration this service was built from.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The shared router.
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// The job queue.
    pub fn queue(&self) -> &QueueManager<TranscriptionResult> {
        &self.queue
    }

    /// Bring up every registered provider.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::ProviderInitFailed`] for the first failure.
    pub async fn initialize(&self) -> Result<(), OrchestratorError> {
        self.router.initialize_all().await
    }

    /// Start the queue worker with each job routed through the router.
    ///
    /// # Returns
    ///
    /// `false` if the worker was already running.
    pub fn start(&self) -> bool {
        let router = Arc::clone(&self.router);
        let started = self.queue.start_worker(move |job: Job| {
            let router = Arc::clone(&router);
            async move { router.transcribe(&job.input, &job.context).await }
        });
        if started {
            info!(
                strategy = self.router.strategy().name(),
                providers = ?self.router.registry().names(),
                "service started"
            );
        }
        started
    }

    /// Submit a job. See [`QueueManager::submit`].
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::AdmissionRejected`] or
    /// [`OrchestratorError::DuplicateJob`].
    pub fn submit(&self, job: Job) -> Result<usize, OrchestratorError> {
        self.queue.submit(job)
    }

    /// Wait for a job and return its transcription, polling at the
    /// configured interval.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::OutcomeTimeout`] if `timeout` elapses first, or
    /// the job's own error.
    pub async fn await_result(
        &self,
        id: &JobId,
        timeout: Duration,
    ) -> Result<TranscriptionResult, OrchestratorError> {
        self.queue
            .await_outcome(id, timeout, self.config.queue.poll_interval())
            .await?
            .into_result()
    }

    /// Wait estimate scaled by the configured rate factor.
    pub fn estimate_wait(&self, id: &JobId) -> WaitEstimate {
        self.queue.estimate_wait(id, self.config.queue.rate_factor)
    }

    /// Downstream processing the active strategy asks for.
    pub fn processing_plan(&self, context: &RoutingContext) -> ProcessingPlan {
        self.router.processing_plan(context)
    }

    /// Stop the queue, wait up to `grace` for in-flight jobs, then shut
    /// down every provider.
    ///
    /// # Returns
    ///
    /// `true` if every in-flight job finished within `grace`.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let drained = self.queue.shutdown(grace).await;
        self.router.shutdown_all().await;
        info!(drained, "service stopped");
        drained
    }
}

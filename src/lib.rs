//! # tokio-transcription-orchestrator
//!
//! Coordinates many concurrent, long-running transcription jobs over Tokio:
//! bounded admission, a fixed-size execution gate, and pluggable routing
//! across interchangeable transcription providers.
//!
//! ## Architecture
//!
//! ```text
//! submit(Job) ──► QueueManager (bounded FIFO) ──► dispatch loop
//!                                                   │
//!                                  per-job task ◄───┘  (acquires gate slot)
//!                                       │
//!                                       ▼
//!                          Router ──► RoutingStrategy::select
//!                                       │
//!                                       ▼
//!                     TranscriptionProvider (fallback once on failure)
//!                                       │
//!                                       ▼
//!                          Outcome stored by JobId ──► await_outcome
//! ```
//!
//! ## Modules
//!
//! - [`queue`]: admission control, concurrency gate, outcome store
//! - [`routing`]: strategies and the provider [`routing::Router`]
//! - [`provider`]: the provider capability trait and in-memory backends
//! - [`job`]: jobs, routing context, outcomes
//! - [`config`]: TOML configuration, validation, schema export
//! - [`context`]: the process-wide [`context::ServiceContext`]
//! - [`metrics`]: Prometheus metrics

// ── Lint policy ───────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod context;
pub mod job;
pub mod metrics;
pub mod provider;
pub mod queue;
pub mod routing;

// Re-exports for convenience
pub use context::ServiceContext;
pub use job::{Job, JobId, Outcome, Priority, RoutingContext, TranscriptionResult};
pub use provider::{
    EchoProvider, ProviderError, ProviderRegistry, ScriptedProvider, TranscriptionProvider,
};
pub use queue::{QueueConfig, QueueManager, QueueSnapshot, WaitEstimate};
pub use routing::{Router, RoutingStrategy};

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"`: structured JSON output for log aggregators
/// - anything else (including unset): human-readable pretty output
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).
///
/// # Errors
///
/// Returns [`OrchestratorError::Other`] if the global subscriber has already
/// been set (e.g. by a previous call or a test harness).
///
/// # Example
///
/// ```no_run
/// # use tokio_transcription_orchestrator::{init_tracing, OrchestratorError};
/// # fn example() -> Result<(), OrchestratorError> {
/// init_tracing()?;
/// # Ok(()) }
/// ```
pub fn init_tracing() -> Result<(), OrchestratorError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| OrchestratorError::Other(format!("tracing init failed: {e}")))
}

/// Top-level orchestrator errors.
///
/// Every failure surfaced by the queue, the router or a strategy maps to a
/// variant here. Use [`OrchestratorError::kind`] when only the category
/// matters (e.g. when a host translates errors into user-facing text).
#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    /// The queue is at capacity. Nothing was admitted.
    #[error("admission rejected: queue at capacity ({capacity} waiting jobs)")]
    AdmissionRejected {
        /// Configured admission bound.
        capacity: usize,
    },

    /// A job with the same id is still in flight.
    #[error("job {id} is already queued or executing")]
    DuplicateJob {
        /// The conflicting job id.
        id: JobId,
    },

    /// No outcome appeared for the job before the deadline.
    ///
    /// The job itself keeps running; its outcome is stored (and purged)
    /// normally.
    #[error("timed out after {timeout:?} waiting for outcome of job {id}")]
    OutcomeTimeout {
        /// Job that was awaited.
        id: JobId,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// A strategy chose a provider that is not registered.
    #[error("provider '{requested}' is not registered (available: {})", .available.join(", "))]
    ProviderUnavailable {
        /// Provider name the strategy asked for.
        requested: String,
        /// Registered provider names, sorted.
        available: Vec<String>,
    },

    /// The provider failed while executing the job.
    #[error("provider '{provider}' failed: {source}")]
    ExecutionFailed {
        /// Provider that failed.
        provider: String,
        /// Provider-level cause.
        #[source]
        source: ProviderError,
    },

    /// A provider could not be brought up.
    #[error("provider '{provider}' failed to initialize: {source}")]
    ProviderInitFailed {
        /// Provider that failed.
        provider: String,
        /// Provider-level cause.
        #[source]
        source: ProviderError,
    },

    /// The per-job callback panicked.
    #[error("job callback panicked: {0}")]
    JobPanicked(String),

    /// A benchmark run was requested but the router cannot perform one.
    #[error("benchmark unavailable: {0}")]
    BenchmarkUnavailable(String),

    /// A configuration value is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}

/// Coarse error category, stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`OrchestratorError::AdmissionRejected`].
    AdmissionRejected,
    /// See [`OrchestratorError::DuplicateJob`].
    DuplicateJob,
    /// See [`OrchestratorError::OutcomeTimeout`].
    Timeout,
    /// See [`OrchestratorError::ProviderUnavailable`].
    ProviderUnavailable,
    /// See [`OrchestratorError::ExecutionFailed`] and [`OrchestratorError::JobPanicked`].
    ExecutionFailed,
    /// See [`OrchestratorError::ProviderInitFailed`].
    ProviderInitFailed,
    /// See [`OrchestratorError::BenchmarkUnavailable`].
    BenchmarkUnavailable,
    /// See [`OrchestratorError::Config`].
    Config,
    /// See [`OrchestratorError::Other`].
    Other,
}

impl OrchestratorError {
    /// Return the coarse category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AdmissionRejected { .. } => ErrorKind::AdmissionRejected,
            Self::DuplicateJob { .. } => ErrorKind::DuplicateJob,
            Self::OutcomeTimeout { .. } => ErrorKind::Timeout,
            Self::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            Self::ExecutionFailed { .. } | Self::JobPanicked(_) => ErrorKind::ExecutionFailed,
            Self::ProviderInitFailed { .. } => ErrorKind::ProviderInitFailed,
            Self::BenchmarkUnavailable(_) => ErrorKind::BenchmarkUnavailable,
            Self::Config(_) => ErrorKind::Config,
            Self::Other(_) => ErrorKind::Other,
        }
    }
}

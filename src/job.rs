//! # Job: the unit of submitted work
//!
//! ## Responsibility
//! Define the job identifier, the per-job routing context, the provider
//! success payload, and the stored outcome of a finished job.
//!
//! ## Guarantees
//! - Immutable: a [`Job`] is never mutated after submission
//! - Serializable: [`RoutingContext`] and [`TranscriptionResult`] round-trip
//!   through serde so hosts can persist or forward them
//! - Opaque input: the input reference is carried, never inspected
//!
//! ## NOT Responsible For
//! - Admission and execution (see: `queue`)
//! - Provider selection (see: `routing`)

use crate::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant, SystemTime};

/// Unique job identifier.
///
/// Either supplied by the caller (e.g. a chat message id) or generated as a
/// UUID v4 via [`JobId::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(
    /// The raw string ID.
    pub String,
);

impl JobId {
    /// Create a [`JobId`] from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Return the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Informational priority tag attached to a job.
///
/// The queue is strict FIFO; the tag is forwarded to providers and hosts
/// only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background work.
    Low,
    /// Default.
    #[default]
    Normal,
    /// User is actively waiting.
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Per-job routing inputs, read-only once submitted.
///
/// # Example
///
/// ```rust
/// use tokio_transcription_orchestrator::RoutingContext;
/// let ctx = RoutingContext::new(95.0)
///     .with_language("de")
///     .with_override("large-v3");
/// assert_eq!(ctx.duration_secs, 95.0);
/// assert_eq!(ctx.provider_override.as_deref(), Some("large-v3"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingContext {
    /// Declared duration of the input, in seconds.
    pub duration_secs: f64,
    /// Language hint (ISO 639-1), if known.
    #[serde(default)]
    pub language: Option<String>,
    /// Informational priority tag.
    #[serde(default)]
    pub priority: Priority,
    /// Explicit provider name or model override.
    #[serde(default)]
    pub provider_override: Option<String>,
    /// Disable the downstream refinement phase for this job.
    #[serde(default)]
    pub skip_refinement: bool,
}

impl RoutingContext {
    /// Create a context for an input of the given declared duration.
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            ..Default::default()
        }
    }

    /// Set the language hint.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the priority tag.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set an explicit provider or model override.
    pub fn with_override(mut self, provider_or_model: impl Into<String>) -> Self {
        self.provider_override = Some(provider_or_model.into());
        self
    }

    /// Disable downstream refinement.
    pub fn without_refinement(mut self) -> Self {
        self.skip_refinement = true;
        self
    }
}

/// A submitted unit of work.
///
/// # Example
///
/// ```rust
/// use tokio_transcription_orchestrator::{Job, RoutingContext};
/// let job = Job::new("chat-42", "/var/audio/voice-1.ogg", RoutingContext::new(12.5));
/// assert_eq!(job.declared_duration(), 12.5);
/// ```
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique id.
    pub id: JobId,
    /// Reference to whoever submitted the job (user or chat id).
    pub owner: String,
    /// Opaque reference to the input (path, URI, blob key).
    pub input: String,
    /// Routing inputs, including the declared duration.
    pub context: RoutingContext,
    /// When the job was created.
    pub submitted_at: SystemTime,
}

impl Job {
    /// Create a job with a generated id.
    pub fn new(owner: impl Into<String>, input: impl Into<String>, context: RoutingContext) -> Self {
        Self {
            id: JobId::generate(),
            owner: owner.into(),
            input: input.into(),
            context,
            submitted_at: SystemTime::now(),
        }
    }

    /// Replace the generated id with a caller-supplied one.
    pub fn with_id(mut self, id: impl Into<JobId>) -> Self {
        self.id = id.into();
        self
    }

    /// Declared duration in seconds.
    pub fn declared_duration(&self) -> f64 {
        self.context.duration_secs
    }
}

/// Success payload returned by a transcription provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// Transcribed text.
    pub text: String,
    /// Name of the provider that produced it.
    pub provider: String,
    /// Model used, if the provider reports one.
    #[serde(default)]
    pub model: Option<String>,
    /// Detected or forced language.
    #[serde(default)]
    pub language: Option<String>,
    /// Time spent inside the provider.
    #[serde(default)]
    pub processing_time: Duration,
}

impl TranscriptionResult {
    /// Create a result with only text and provider set.
    pub fn new(text: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            provider: provider.into(),
            model: None,
            language: None,
            processing_time: Duration::ZERO,
        }
    }
}

/// Stored result of a finished job.
///
/// Written exactly once by the execution task; removed by whoever collects
/// it, or purged after the configured TTL.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    /// Job this outcome belongs to.
    pub job_id: JobId,
    /// Payload on success, structured error otherwise.
    pub result: Result<T, OrchestratorError>,
    /// Wall-clock time spent in the callback.
    pub execution_time: Duration,
    /// When the outcome was stored.
    pub completed_at: Instant,
}

impl<T> Outcome<T> {
    /// Returns `true` if the job succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Consume the outcome, returning the inner result.
    pub fn into_result(self) -> Result<T, OrchestratorError> {
        self.result
    }
}

//! Transcription provider abstraction and in-memory implementations
//!
//! Defines the [`TranscriptionProvider`] trait every backend implements, the
//! read-only [`ProviderRegistry`] the router selects from, and two in-process
//! backends:
//! - [`EchoProvider`]: demo/testing provider that echoes its input reference
//! - [`ScriptedProvider`]: deterministic success/failure provider for tests,
//!   benchmarks and fallback drills
//!
//! Real backends (local Whisper, hosted speech APIs) live in the host and
//! only need to implement the trait.

use crate::job::{RoutingContext, TranscriptionResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Errors a provider may raise.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// `transcribe` was called before `initialize`.
    #[error("provider '{provider}' is not initialized")]
    NotInitialized {
        /// Provider name.
        provider: String,
    },

    /// The input reference does not resolve to anything.
    #[error("input not found: {input}")]
    InputNotFound {
        /// The unresolved input reference.
        input: String,
    },

    /// The provider gave up after its own deadline.
    #[error("provider timed out after {after:?}")]
    Timeout {
        /// Elapsed time before giving up.
        after: Duration,
    },

    /// Backend-specific failure.
    #[error("{0}")]
    Backend(String),
}

/// Trait for transcription backends.
///
/// Implementations must be thread-safe (Send + Sync) for use across tasks.
/// The trait is object-safe to allow dynamic dispatch via
/// `Arc<dyn TranscriptionProvider>`. Enforcing a per-call timeout is the
/// provider's own responsibility.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Registry name of this provider (e.g. `"faster-whisper"`).
    fn name(&self) -> &str;

    /// Declared model, used for override matching (e.g. `"large-v3"`).
    fn model(&self) -> Option<&str> {
        None
    }

    /// Bring the provider up. Must be idempotent.
    async fn initialize(&self) -> Result<(), ProviderError>;

    /// Transcribe the referenced input.
    async fn transcribe(
        &self,
        input: &str,
        context: &RoutingContext,
    ) -> Result<TranscriptionResult, ProviderError>;

    /// Tear the provider down. Must be idempotent.
    async fn shutdown(&self) -> Result<(), ProviderError>;

    /// Returns `true` once `initialize` has succeeded and until `shutdown`.
    fn is_initialized(&self) -> bool;
}

// ============================================================================
// Registry
// ============================================================================

/// Name → provider map, populated once at startup.
///
/// Read-only after construction, so concurrent reads need no locking.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tokio_transcription_orchestrator::{EchoProvider, ProviderRegistry};
///
/// let registry = ProviderRegistry::new()
///     .with_provider(Arc::new(EchoProvider::new("echo")));
/// assert!(registry.contains("echo"));
/// assert_eq!(registry.names(), vec!["echo".to_string()]);
/// ```
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn TranscriptionProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider under its own [`TranscriptionProvider::name`].
    ///
    /// A later provider with the same name replaces the earlier one.
    pub fn with_provider(mut self, provider: Arc<dyn TranscriptionProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    /// Build a registry from an iterator of providers.
    pub fn from_providers(
        providers: impl IntoIterator<Item = Arc<dyn TranscriptionProvider>>,
    ) -> Self {
        providers
            .into_iter()
            .fold(Self::new(), |registry, p| registry.with_provider(p))
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn TranscriptionProvider>> {
        self.providers.get(name)
    }

    /// Returns `true` if a provider is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered names, sorted for deterministic iteration and messages.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Iterate providers in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn TranscriptionProvider>)> {
        let mut entries: Vec<_> = self
            .providers
            .iter()
            .map(|(name, p)| (name.as_str(), p))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

// ============================================================================
// Echo Provider
// ============================================================================

/// Echo provider for demos and smoke tests.
///
/// Returns the input reference as the transcript after a simulated delay.
/// Unlike [`ScriptedProvider`] it enforces the initialize-before-use
/// contract.
pub struct EchoProvider {
    name: String,
    model: Option<String>,
    /// Simulated transcription delay
    pub delay: Duration,
    initialized: AtomicBool,
}

impl EchoProvider {
    /// Create an echo provider with a 10ms delay.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: None,
            delay: Duration::from_millis(10),
            initialized: AtomicBool::new(false),
        }
    }

    /// Set the simulated delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Declare a model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[async_trait]
impl TranscriptionProvider for EchoProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    async fn initialize(&self) -> Result<(), ProviderError> {
        if !self.initialized.swap(true, Ordering::SeqCst) {
            tracing::debug!(provider = %self.name, "echo provider initialized");
        }
        Ok(())
    }

    async fn transcribe(
        &self,
        input: &str,
        context: &RoutingContext,
    ) -> Result<TranscriptionResult, ProviderError> {
        if !self.is_initialized() {
            return Err(ProviderError::NotInitialized {
                provider: self.name.clone(),
            });
        }
        if input.trim().is_empty() {
            return Err(ProviderError::InputNotFound {
                input: input.to_string(),
            });
        }

        let started = Instant::now();
        tokio::time::sleep(self.delay).await;

        Ok(TranscriptionResult {
            text: input.to_string(),
            provider: self.name.clone(),
            model: self.model.clone(),
            language: context.language.clone(),
            processing_time: started.elapsed(),
        })
    }

    async fn shutdown(&self) -> Result<(), ProviderError> {
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Scripted Provider
// ============================================================================

/// Deterministic provider: always succeeds with fixed text, or always fails
/// with a fixed error. Counts its calls.
pub struct ScriptedProvider {
    name: String,
    model: Option<String>,
    reply: Result<String, ProviderError>,
    delay: Duration,
    fail_init: bool,
    fail_shutdown: bool,
    calls: AtomicUsize,
    initialized: AtomicBool,
}

impl ScriptedProvider {
    /// Provider that always returns `text`.
    pub fn succeeding(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_reply(name, Ok(text.into()))
    }

    /// Provider that always fails with `error`.
    pub fn failing(name: impl Into<String>, error: ProviderError) -> Self {
        Self::with_reply(name, Err(error))
    }

    fn with_reply(name: impl Into<String>, reply: Result<String, ProviderError>) -> Self {
        Self {
            name: name.into(),
            model: None,
            reply,
            delay: Duration::ZERO,
            fail_init: false,
            fail_shutdown: false,
            calls: AtomicUsize::new(0),
            initialized: AtomicBool::new(false),
        }
    }

    /// Declare a model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sleep this long inside every `transcribe` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make `initialize` fail.
    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Make `shutdown` fail.
    pub fn failing_shutdown(mut self) -> Self {
        self.fail_shutdown = true;
        self
    }

    /// Number of `transcribe` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    async fn initialize(&self) -> Result<(), ProviderError> {
        if self.fail_init {
            return Err(ProviderError::Backend(format!(
                "{} could not load its model",
                self.name
            )));
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn transcribe(
        &self,
        _input: &str,
        context: &RoutingContext,
    ) -> Result<TranscriptionResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            Ok(text) => Ok(TranscriptionResult {
                text: text.clone(),
                provider: self.name.clone(),
                model: self.model.clone(),
                language: context.language.clone(),
                processing_time: self.delay,
            }),
            Err(e) => Err(e.clone()),
        }
    }

    async fn shutdown(&self) -> Result<(), ProviderError> {
        self.initialized.store(false, Ordering::SeqCst);
        if self.fail_shutdown {
            return Err(ProviderError::Backend(format!(
                "{} did not release its device",
                self.name
            )));
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

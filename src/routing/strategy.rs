//! Routing strategy contract and the two fixed-provider strategies.
//!
//! A [`RoutingStrategy`] is a pure decision component: given a job's
//! [`RoutingContext`] and the registered providers it names the provider to
//! run, and optionally one fallback. Strategy-specific knowledge consumed
//! downstream (refinement, structuring, fixed model hints, benchmark plans)
//! is exposed through small capability methods with neutral defaults, so
//! callers never need to know which concrete strategy is active.

use crate::job::RoutingContext;
use crate::provider::ProviderRegistry;
use crate::OrchestratorError;
use serde::Serialize;

use super::benchmark::BenchmarkPlan;

/// Fixed provider/model pair a strategy always uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderHint {
    /// Provider name.
    pub provider: String,
    /// Model name, if pinned.
    pub model: Option<String>,
}

/// What the downstream (out-of-core) phases should do with a finished job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingPlan {
    /// Run the refinement pass over a draft transcript.
    pub refine: bool,
    /// Run the structuring pass.
    pub structure: bool,
    /// Show the user a draft before the final text.
    pub show_draft: bool,
    /// Emoji richness level for formatted output.
    pub emoji_level: Option<u8>,
}

/// Pluggable provider-selection policy.
///
/// Implementations must be cheap and side-effect free apart from logging;
/// they are called once per job on the execution path.
pub trait RoutingStrategy: Send + Sync {
    /// Short identifier used in logs and metrics (e.g. `"hybrid"`).
    fn name(&self) -> &str;

    /// Choose the provider that should serve this job.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::ProviderUnavailable`] if the chosen name is not
    /// registered.
    fn select(
        &self,
        context: &RoutingContext,
        registry: &ProviderRegistry,
    ) -> Result<String, OrchestratorError>;

    /// Returns `true` if [`RoutingStrategy::fallback_for`] may yield a name.
    fn supports_fallback(&self) -> bool {
        false
    }

    /// One-shot fallback for a provider that just failed.
    fn fallback_for(&self, _failed: &str) -> Option<String> {
        None
    }

    /// Fixed provider/model this strategy always uses, if any.
    fn provider_hint(&self) -> Option<ProviderHint> {
        None
    }

    /// Downstream processing for a job with this context.
    fn processing_plan(&self, _context: &RoutingContext) -> ProcessingPlan {
        ProcessingPlan::default()
    }

    /// Fan-out plan, for strategies that compare providers.
    fn benchmark_plan(&self) -> Option<&BenchmarkPlan> {
        None
    }
}

/// Return `name` if registered, otherwise a `ProviderUnavailable` error
/// listing what is available.
pub(crate) fn ensure_registered(
    name: &str,
    registry: &ProviderRegistry,
) -> Result<String, OrchestratorError> {
    if registry.contains(name) {
        Ok(name.to_string())
    } else {
        Err(OrchestratorError::ProviderUnavailable {
            requested: name.to_string(),
            available: registry.names(),
        })
    }
}

// ============================================================================
// Single provider
// ============================================================================

/// Always routes to one fixed provider. No fallback.
#[derive(Debug, Clone)]
pub struct SingleProviderStrategy {
    provider: String,
}

impl SingleProviderStrategy {
    /// Route everything to `provider`.
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

impl RoutingStrategy for SingleProviderStrategy {
    fn name(&self) -> &str {
        "single"
    }

    fn select(
        &self,
        _context: &RoutingContext,
        registry: &ProviderRegistry,
    ) -> Result<String, OrchestratorError> {
        ensure_registered(&self.provider, registry)
    }
}

// ============================================================================
// Fallback
// ============================================================================

/// Fixed primary with a one-shot secondary.
///
/// The secondary is only offered for a failure of the primary, so a
/// failing secondary never chains to anything else.
#[derive(Debug, Clone)]
pub struct FallbackStrategy {
    primary: String,
    secondary: String,
    enabled: bool,
}

impl FallbackStrategy {
    /// Primary with `secondary` as fallback, fallback enabled.
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
            enabled: true,
        }
    }

    /// Enable or disable the fallback attempt.
    pub fn with_fallback_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The primary provider name.
    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// The secondary provider name.
    pub fn secondary(&self) -> &str {
        &self.secondary
    }
}

impl RoutingStrategy for FallbackStrategy {
    fn name(&self) -> &str {
        "fallback"
    }

    fn select(
        &self,
        _context: &RoutingContext,
        registry: &ProviderRegistry,
    ) -> Result<String, OrchestratorError> {
        ensure_registered(&self.primary, registry)
    }

    fn supports_fallback(&self) -> bool {
        self.enabled
    }

    fn fallback_for(&self, failed: &str) -> Option<String> {
        (self.enabled && failed == self.primary).then(|| self.secondary.clone())
    }
}

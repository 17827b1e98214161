//! Duration-threshold routing.
//!
//! Short inputs go to the slower, higher-quality provider; long inputs go to
//! the fast draft provider and are flagged for a downstream refinement pass.
//! A per-job override (provider name or model) bypasses the threshold.

use crate::job::RoutingContext;
use crate::provider::ProviderRegistry;
use crate::OrchestratorError;
use tracing::{debug, warn};

use super::strategy::{ensure_registered, ProcessingPlan, RoutingStrategy};

/// Threshold policy: `d < threshold` → quality, `d >= threshold` → draft.
///
/// The cut-point is a single value with no hysteresis; a job exactly at the
/// threshold routes to the draft provider.
///
/// # Example
///
/// ```rust
/// use tokio_transcription_orchestrator::routing::HybridStrategy;
/// let hybrid = HybridStrategy::new("quality", "draft", 600.0);
/// assert!(!hybrid.requires_refinement(599.9));
/// assert!(hybrid.requires_refinement(600.0));
/// ```
#[derive(Debug, Clone)]
pub struct HybridStrategy {
    quality_provider: String,
    draft_provider: String,
    threshold_secs: f64,
    fallback_enabled: bool,
}

impl HybridStrategy {
    /// Create a hybrid strategy.
    pub fn new(
        quality_provider: impl Into<String>,
        draft_provider: impl Into<String>,
        threshold_secs: f64,
    ) -> Self {
        Self {
            quality_provider: quality_provider.into(),
            draft_provider: draft_provider.into(),
            threshold_secs,
            fallback_enabled: false,
        }
    }

    /// Let a failed quality run fall back to the draft provider and vice
    /// versa.
    pub fn with_cross_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// The duration cut-point in seconds.
    pub fn threshold_secs(&self) -> f64 {
        self.threshold_secs
    }

    /// Whether a job of this duration gets the refinement pass.
    pub fn requires_refinement(&self, duration_secs: f64) -> bool {
        duration_secs >= self.threshold_secs
    }

    /// Resolve an explicit override to a registered provider name.
    ///
    /// Exact provider-name match first, then a case-insensitive substring
    /// match against each provider's declared model, in name order.
    fn resolve_override(&self, wanted: &str, registry: &ProviderRegistry) -> Option<String> {
        if registry.contains(wanted) {
            return Some(wanted.to_string());
        }
        let needle = wanted.to_lowercase();
        registry
            .iter()
            .find(|(_, provider)| {
                provider
                    .model()
                    .is_some_and(|model| model.to_lowercase().contains(&needle))
            })
            .map(|(name, _)| name.to_string())
    }
}

impl RoutingStrategy for HybridStrategy {
    fn name(&self) -> &str {
        "hybrid"
    }

    fn select(
        &self,
        context: &RoutingContext,
        registry: &ProviderRegistry,
    ) -> Result<String, OrchestratorError> {
        if let Some(wanted) = context.provider_override.as_deref() {
            match self.resolve_override(wanted, registry) {
                Some(name) => {
                    debug!(requested = wanted, provider = %name, "hybrid: override applied");
                    return Ok(name);
                }
                None => warn!(
                    requested = wanted,
                    available = ?registry.names(),
                    "hybrid: override matches no registered provider, routing by duration"
                ),
            }
        }

        let chosen = if context.duration_secs >= self.threshold_secs {
            &self.draft_provider
        } else {
            &self.quality_provider
        };
        debug!(
            duration_secs = context.duration_secs,
            threshold_secs = self.threshold_secs,
            provider = %chosen,
            "hybrid: routed by duration"
        );
        ensure_registered(chosen, registry)
    }

    fn supports_fallback(&self) -> bool {
        self.fallback_enabled
    }

    fn fallback_for(&self, failed: &str) -> Option<String> {
        if !self.fallback_enabled {
            return None;
        }
        if failed == self.quality_provider {
            Some(self.draft_provider.clone())
        } else if failed == self.draft_provider {
            Some(self.quality_provider.clone())
        } else {
            None
        }
    }

    fn processing_plan(&self, context: &RoutingContext) -> ProcessingPlan {
        ProcessingPlan {
            refine: !context.skip_refinement && self.requires_refinement(context.duration_secs),
            ..ProcessingPlan::default()
        }
    }
}

//! Fixed-model routing with structuring predicates.
//!
//! Every job goes to the same provider/model. Long inputs are additionally
//! flagged for the downstream structuring pass and for showing the user a
//! draft first.

use crate::job::RoutingContext;
use crate::provider::ProviderRegistry;
use crate::OrchestratorError;

use super::strategy::{ensure_registered, ProcessingPlan, ProviderHint, RoutingStrategy};

/// Always routes to one provider/model; exposes structuring predicates.
///
/// # Example
///
/// ```rust
/// use tokio_transcription_orchestrator::routing::StructureStrategy;
/// let s = StructureStrategy::new("faster-whisper", "large-v3", 20.0);
/// assert!(!s.requires_structuring(19.9));
/// assert!(s.requires_structuring(20.0));
/// ```
#[derive(Debug, Clone)]
pub struct StructureStrategy {
    provider: String,
    model: String,
    draft_threshold_secs: f64,
    emoji_level: u8,
}

impl StructureStrategy {
    /// Create a structure strategy with emoji level 1.
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        draft_threshold_secs: f64,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            draft_threshold_secs,
            emoji_level: 1,
        }
    }

    /// Set the emoji richness level.
    pub fn with_emoji_level(mut self, level: u8) -> Self {
        self.emoji_level = level;
        self
    }

    /// Whether a job of this duration gets the structuring pass.
    pub fn requires_structuring(&self, duration_secs: f64) -> bool {
        duration_secs >= self.draft_threshold_secs
    }

    /// Whether the user should see a draft before the structured text.
    pub fn should_show_draft(&self, duration_secs: f64) -> bool {
        duration_secs >= self.draft_threshold_secs
    }

    /// Fixed emoji richness level.
    pub fn emoji_level(&self) -> u8 {
        self.emoji_level
    }
}

impl RoutingStrategy for StructureStrategy {
    fn name(&self) -> &str {
        "structure"
    }

    fn select(
        &self,
        _context: &RoutingContext,
        registry: &ProviderRegistry,
    ) -> Result<String, OrchestratorError> {
        ensure_registered(&self.provider, registry)
    }

    fn provider_hint(&self) -> Option<ProviderHint> {
        Some(ProviderHint {
            provider: self.provider.clone(),
            model: Some(self.model.clone()),
        })
    }

    fn processing_plan(&self, context: &RoutingContext) -> ProcessingPlan {
        ProcessingPlan {
            refine: false,
            structure: self.requires_structuring(context.duration_secs),
            show_draft: self.should_show_draft(context.duration_secs),
            emoji_level: Some(self.emoji_level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{EchoProvider, TranscriptionProvider};
    use std::sync::Arc;

    #[test]
    fn test_structuring_threshold_boundary() {
        let s = StructureStrategy::new("fw", "large-v3", 20.0);
        assert!(!s.requires_structuring(19.9));
        assert!(s.requires_structuring(20.0));
        assert!(!s.should_show_draft(19.9));
        assert!(s.should_show_draft(20.0));
    }

    #[test]
    fn test_provider_hint_is_fixed() {
        let s = StructureStrategy::new("fw", "large-v3", 20.0);
        let hint = s.provider_hint();
        assert_eq!(hint.as_ref().map(|h| h.provider.as_str()), Some("fw"));
        assert_eq!(
            hint.and_then(|h| h.model).as_deref(),
            Some("large-v3")
        );
    }

    #[test]
    fn test_select_ignores_duration_and_override() {
        let registry = ProviderRegistry::new()
            .with_provider(Arc::new(EchoProvider::new("fw")) as Arc<dyn TranscriptionProvider>)
            .with_provider(Arc::new(EchoProvider::new("other")));
        let s = StructureStrategy::new("fw", "large-v3", 20.0);
        for ctx in [
            RoutingContext::new(1.0),
            RoutingContext::new(10_000.0).with_override("other"),
        ] {
            assert_eq!(s.select(&ctx, &registry).ok().as_deref(), Some("fw"));
        }
    }

    #[test]
    fn test_processing_plan_carries_emoji_level() {
        let s = StructureStrategy::new("fw", "large-v3", 20.0).with_emoji_level(3);
        let plan = s.processing_plan(&RoutingContext::new(45.0));
        assert!(plan.structure);
        assert!(plan.show_draft);
        assert!(!plan.refine);
        assert_eq!(plan.emoji_level, Some(3));
        assert_eq!(s.emoji_level(), 3);
    }
}

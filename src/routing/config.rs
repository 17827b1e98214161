//! Routing strategy configuration.
//!
//! [`StrategyConfig`] is the serialisable description of the active
//! [`RoutingStrategy`]. It is internally tagged by `kind`, so a TOML file
//! selects a strategy with e.g.
//!
//! ```toml
//! [routing]
//! kind = "hybrid"
//! quality_provider = "whisper-large"
//! draft_provider = "whisper-small"
//! threshold_secs = 60.0
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::benchmark::{BenchmarkPlan, BenchmarkStrategy};
use super::hybrid::HybridStrategy;
use super::strategy::{FallbackStrategy, RoutingStrategy, SingleProviderStrategy};
use super::structure::StructureStrategy;

// ── Default value functions ────────────────────────────────────────────

/// Default provider name for single-provider routing.
fn default_provider() -> String {
    "echo".to_string()
}

/// Fallback attempts are on unless disabled.
fn default_fallback_enabled() -> bool {
    true
}

/// Default hybrid cut-point in seconds of declared audio.
fn default_hybrid_threshold_secs() -> f64 {
    60.0
}

/// Default duration at which the structuring pass and draft kick in.
fn default_draft_threshold_secs() -> f64 {
    20.0
}

/// Default emoji richness level.
fn default_emoji_level() -> u8 {
    1
}

// ── StrategyConfig ─────────────────────────────────────────────────────

/// Which routing strategy to run, with its parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Always the same provider.
    Single {
        /// Provider name.
        #[serde(default = "default_provider")]
        provider: String,
    },
    /// Fixed primary with a one-shot secondary.
    Fallback {
        /// Primary provider name.
        primary: String,
        /// Secondary provider name.
        secondary: String,
        /// Whether the secondary is attempted at all.
        #[serde(default = "default_fallback_enabled")]
        enabled: bool,
    },
    /// Duration-threshold routing.
    Hybrid {
        /// Provider for inputs shorter than the threshold.
        quality_provider: String,
        /// Provider for inputs at or above the threshold.
        draft_provider: String,
        /// Cut-point in seconds.
        #[serde(default = "default_hybrid_threshold_secs")]
        threshold_secs: f64,
        /// Retry a failed run on the other provider.
        #[serde(default)]
        cross_fallback: bool,
    },
    /// Fixed provider/model plus structuring predicates.
    Structure {
        /// Provider name.
        provider: String,
        /// Model name.
        model: String,
        /// Structuring / draft cut-point in seconds.
        #[serde(default = "default_draft_threshold_secs")]
        draft_threshold_secs: f64,
        /// Emoji richness level.
        #[serde(default = "default_emoji_level")]
        emoji_level: u8,
    },
    /// Fan-out comparison across a provider grid.
    Benchmark {
        /// The grid to compare.
        #[serde(flatten)]
        plan: BenchmarkPlan,
    },
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::Single {
            provider: default_provider(),
        }
    }
}

impl StrategyConfig {
    /// The `kind` tag, as written in config files.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Single { .. } => "single",
            Self::Fallback { .. } => "fallback",
            Self::Hybrid { .. } => "hybrid",
            Self::Structure { .. } => "structure",
            Self::Benchmark { .. } => "benchmark",
        }
    }

    /// Provider names this strategy may route to, used for config
    /// cross-checks against the registry.
    pub fn referenced_providers(&self) -> Vec<&str> {
        match self {
            Self::Single { provider } => vec![provider.as_str()],
            Self::Fallback {
                primary, secondary, ..
            } => vec![primary.as_str(), secondary.as_str()],
            Self::Hybrid {
                quality_provider,
                draft_provider,
                ..
            } => vec![quality_provider.as_str(), draft_provider.as_str()],
            Self::Structure { provider, .. } => vec![provider.as_str()],
            Self::Benchmark { .. } => Vec::new(),
        }
    }

    /// Build the strategy this config describes.
    pub fn build(&self) -> Arc<dyn RoutingStrategy> {
        match self.clone() {
            Self::Single { provider } => Arc::new(SingleProviderStrategy::new(provider)),
            Self::Fallback {
                primary,
                secondary,
                enabled,
            } => Arc::new(FallbackStrategy::new(primary, secondary).with_fallback_enabled(enabled)),
            Self::Hybrid {
                quality_provider,
                draft_provider,
                threshold_secs,
                cross_fallback,
            } => Arc::new(
                HybridStrategy::new(quality_provider, draft_provider, threshold_secs)
                    .with_cross_fallback(cross_fallback),
            ),
            Self::Structure {
                provider,
                model,
                draft_threshold_secs,
                emoji_level,
            } => Arc::new(
                StructureStrategy::new(provider, model, draft_threshold_secs)
                    .with_emoji_level(emoji_level),
            ),
            Self::Benchmark { plan } => Arc::new(BenchmarkStrategy::new(plan)),
        }
    }
}

/// Validate a [`StrategyConfig`], returning one message per violation.
///
/// # Returns
///
/// An empty `Vec` on success.
pub fn validate(config: &StrategyConfig) -> Vec<String> {
    let mut errors = Vec::new();

    for name in config.referenced_providers() {
        if name.trim().is_empty() {
            errors.push(format!("routing.{}: provider names must not be empty", config.kind()));
        }
    }

    match config {
        StrategyConfig::Fallback {
            primary, secondary, ..
        } if primary == secondary => {
            errors.push(format!(
                "routing.secondary must differ from routing.primary, both are '{primary}'"
            ));
        }
        StrategyConfig::Hybrid { threshold_secs, .. } => {
            if !threshold_secs.is_finite() || *threshold_secs < 0.0 {
                errors.push(format!(
                    "routing.threshold_secs must be a finite value >= 0, got {threshold_secs}"
                ));
            }
        }
        StrategyConfig::Structure {
            draft_threshold_secs,
            model,
            ..
        } => {
            if !draft_threshold_secs.is_finite() || *draft_threshold_secs < 0.0 {
                errors.push(format!(
                    "routing.draft_threshold_secs must be a finite value >= 0, got {draft_threshold_secs}"
                ));
            }
            if model.trim().is_empty() {
                errors.push("routing.model must not be empty".to_string());
            }
        }
        StrategyConfig::Benchmark { plan } => {
            if plan.combinations().is_empty() {
                errors.push(
                    "routing: benchmark plan needs at least one provider, model, precision, beam size and device"
                        .to_string(),
                );
            }
            if plan.beam_sizes.contains(&0) {
                errors.push("routing.beam_sizes must all be >= 1".to_string());
            }
            if plan.max_cached_providers == 0 {
                errors.push("routing.max_cached_providers must be >= 1".to_string());
            }
            if let Some(reference) = &plan.reference {
                if !plan.combinations().contains(reference) {
                    errors.push(format!(
                        "routing.reference '{reference}' is not one of the plan's combinations"
                    ));
                }
            }
        }
        _ => {}
    }

    errors
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> StrategyConfig {
        toml::from_str(src)
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: deserialize: {e}")))
    }

    #[test]
    fn test_default_is_single_echo() {
        let cfg = StrategyConfig::default();
        assert_eq!(cfg.kind(), "single");
        assert_eq!(cfg.build().name(), "single");
    }

    #[test]
    fn test_hybrid_defaults_applied() {
        let cfg = parse(
            r#"
kind = "hybrid"
quality_provider = "q"
draft_provider = "d"
"#,
        );
        assert_eq!(
            cfg,
            StrategyConfig::Hybrid {
                quality_provider: "q".into(),
                draft_provider: "d".into(),
                threshold_secs: 60.0,
                cross_fallback: false,
            }
        );
        assert_eq!(cfg.build().name(), "hybrid");
    }

    #[test]
    fn test_structure_builds_with_hint() {
        let cfg = parse(
            r#"
kind = "structure"
provider = "fw"
model = "large-v3"
emoji_level = 2
"#,
        );
        let strategy = cfg.build();
        assert_eq!(strategy.name(), "structure");
        assert_eq!(
            strategy.provider_hint().and_then(|h| h.model).as_deref(),
            Some("large-v3")
        );
        let plan = strategy.processing_plan(&crate::job::RoutingContext::new(20.0));
        assert!(plan.structure);
        assert_eq!(plan.emoji_level, Some(2));
    }

    #[test]
    fn test_benchmark_plan_flattened() {
        let cfg = parse(
            r#"
kind = "benchmark"
providers = ["fw"]
models = ["small", "large"]
precisions = ["int8"]
beam_sizes = [1, 5]
devices = ["cpu"]
"#,
        );
        let strategy = cfg.build();
        let combos = strategy.benchmark_plan().map(|p| p.combinations().len());
        assert_eq!(combos, Some(4));
        assert!(validate(&cfg).is_empty());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result: Result<StrategyConfig, _> = toml::from_str("kind = \"roulette\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_fallback_same_provider_fails() {
        let cfg = StrategyConfig::Fallback {
            primary: "a".into(),
            secondary: "a".into(),
            enabled: true,
        };
        let errors = validate(&cfg);
        assert!(errors.iter().any(|e| e.contains("secondary")));
    }

    #[test]
    fn test_validate_negative_threshold_fails() {
        let cfg = StrategyConfig::Hybrid {
            quality_provider: "q".into(),
            draft_provider: "d".into(),
            threshold_secs: -1.0,
            cross_fallback: false,
        };
        assert!(validate(&cfg).iter().any(|e| e.contains("threshold_secs")));
    }

    #[test]
    fn test_validate_empty_benchmark_plan_collects_all_errors() {
        let cfg = StrategyConfig::Benchmark {
            plan: BenchmarkPlan {
                providers: Vec::new(),
                models: vec!["m".into()],
                precisions: vec!["int8".into()],
                beam_sizes: vec![0],
                devices: vec!["cpu".into()],
                reference: None,
                max_cached_providers: 0,
            },
        };
        let errors = validate(&cfg);
        assert_eq!(errors.len(), 3, "got: {errors:?}");
    }

    #[test]
    fn test_referenced_providers() {
        let cfg = StrategyConfig::Fallback {
            primary: "a".into(),
            secondary: "b".into(),
            enabled: true,
        };
        assert_eq!(cfg.referenced_providers(), vec!["a", "b"]);
    }
}

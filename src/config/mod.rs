//! # Stage: Declarative Service Configuration
//!
//! ## Responsibility
//! Parse and validate the TOML file describing the queue bounds, the active
//! routing strategy and the providers to register.
//! ```text
//! cargo run -- orchestrator.toml
//! ```
//!
//! ## Guarantees
//! - Deterministic: same TOML input always produces the same `AppConfig`
//! - Validated: all semantic constraints are checked before a config is accepted
//! - Defaulted: every optional field has a documented default, an empty file
//!   is a valid config
//! - Schema-exportable: JSON Schema output enables IDE autocomplete
//!
//! ## NOT Responsible For
//! - Building the running service from config (that belongs to `context`)
//! - Strategy semantics (that belongs to `routing`)

pub mod loader;
pub mod validation;

use crate::provider::{EchoProvider, ProviderRegistry, TranscriptionProvider};
use crate::queue::QueueConfig;
use crate::routing::StrategyConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// ── Default value functions ──────────────────────────────────────────────

/// Default simulated provider delay: 10ms.
fn default_delay_ms() -> u64 {
    10
}

/// Default provider set: a single echo provider named `"echo"`.
fn default_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig {
        name: "echo".to_string(),
        kind: ProviderKind::Echo,
        model: None,
        delay_ms: default_delay_ms(),
    }]
}

// ── Top-level config ─────────────────────────────────────────────────────

/// Root configuration for an orchestrator instance.
///
/// # Example
///
/// ```toml
/// [queue]
/// capacity = 20
/// concurrency = 2
///
/// [routing]
/// kind = "fallback"
/// primary = "local"
/// secondary = "cloud"
///
/// [[providers]]
/// name = "local"
/// kind = "echo"
///
/// [[providers]]
/// name = "cloud"
/// kind = "echo"
/// model = "large-v3"
/// ```
///
/// # Panics
///
/// This type never panics during construction or access.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AppConfig {
    /// Admission bound, concurrency gate and outcome retention.
    #[serde(default)]
    pub queue: QueueConfig,
    /// The active routing strategy.
    #[serde(default)]
    pub routing: StrategyConfig,
    /// Providers to register at startup.
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            routing: StrategyConfig::default(),
            providers: default_providers(),
        }
    }
}

impl AppConfig {
    /// Build a registry holding every configured provider.
    pub fn build_registry(&self) -> ProviderRegistry {
        ProviderRegistry::from_providers(self.providers.iter().map(ProviderConfig::build))
    }
}

// ── Providers ────────────────────────────────────────────────────────────

/// Which provider implementation backs a configured name.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// In-process echo backend.
    Echo,
}

/// One provider to register.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProviderConfig {
    /// Registry name, referenced by the routing strategy.
    pub name: String,
    /// Backing implementation.
    pub kind: ProviderKind,
    /// Declared model, matched by model overrides.
    pub model: Option<String>,
    /// Simulated processing delay in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl ProviderConfig {
    /// Instantiate the configured provider.
    pub fn build(&self) -> Arc<dyn TranscriptionProvider> {
        match self.kind {
            ProviderKind::Echo => {
                let mut provider = EchoProvider::new(self.name.as_str())
                    .with_delay(Duration::from_millis(self.delay_ms));
                if let Some(model) = &self.model {
                    provider = provider.with_model(model.as_str());
                }
                Arc::new(provider)
            }
        }
    }
}

/// Export the JSON Schema for [`AppConfig`].
///
/// # Errors
///
/// Returns `serde_json::Error` if schema serialization fails.
///
/// # Panics
///
/// This function never panics.
pub fn export_schema() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(AppConfig);
    serde_json::to_string_pretty(&schema)
}

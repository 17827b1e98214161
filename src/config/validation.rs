//! Configuration validation engine.
//!
//! ## Responsibility
//! Validate semantic constraints on a parsed [`AppConfig`] that cannot be
//! expressed through the type system alone (range checks, provider names
//! the strategy refers to).
//!
//! ## Guarantees
//! - Every validation rule has at least one test that triggers it
//! - Validation collects *all* errors before returning (no short-circuit)
//! - Error messages include the field path and the invalid value
//!
//! ## NOT Responsible For
//! - Parsing TOML (that belongs to `loader`)
//! - File I/O (that belongs to `loader`)

use std::collections::HashSet;

use super::AppConfig;
use crate::routing::config as routing_config;

/// Errors arising from configuration parsing, validation, or I/O.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("Parse error in {file}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        file: String,
        /// Underlying TOML deserialization error.
        #[source]
        source: toml::de::Error,
    },

    /// One or more semantic validation rules failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A specific field has an out-of-range or contradictory value.
    #[error("Field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        /// Dot-separated field path (e.g., "queue.capacity").
        field: String,
        /// String representation of the invalid value.
        value: String,
        /// Human-readable explanation of the constraint.
        reason: String,
    },

    /// File I/O error.
    #[error("IO error reading {file}: {source}")]
    Io {
        /// Path of the file that could not be read.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for crate::OrchestratorError {
    fn from(err: ConfigError) -> Self {
        crate::OrchestratorError::Config(err.to_string())
    }
}

/// Validate all semantic constraints on an [`AppConfig`].
///
/// Collects every violation before returning so the caller sees the full
/// scope of issues at once.
///
/// # Returns
///
/// - `Ok(())` if all constraints pass.
/// - `Err(Vec<ConfigError>)` with every violation found.
///
/// # Panics
///
/// This function never panics.
pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // ── Queue ────────────────────────────────────────────────────────
    for (field, value, reason) in config.queue.violations() {
        errors.push(ConfigError::InvalidField {
            field: field.into(),
            value,
            reason: reason.into(),
        });
    }

    // ── Providers ────────────────────────────────────────────────────
    if config.providers.is_empty() {
        errors.push(ConfigError::Validation(
            "at least one provider must be configured".into(),
        ));
    }

    let mut seen = HashSet::new();
    for (i, provider) in config.providers.iter().enumerate() {
        if provider.name.trim().is_empty() {
            errors.push(ConfigError::InvalidField {
                field: format!("providers[{i}].name"),
                value: format!("{:?}", provider.name),
                reason: "must not be empty".into(),
            });
        } else if !seen.insert(provider.name.as_str()) {
            errors.push(ConfigError::InvalidField {
                field: format!("providers[{i}].name"),
                value: provider.name.clone(),
                reason: "duplicate provider name".into(),
            });
        }
    }

    // ── Routing ──────────────────────────────────────────────────────
    for message in routing_config::validate(&config.routing) {
        errors.push(ConfigError::Validation(message));
    }

    for name in config.routing.referenced_providers() {
        if !name.trim().is_empty() && !seen.contains(name) {
            errors.push(ConfigError::InvalidField {
                field: format!("routing.{}", config.routing.kind()),
                value: name.to_string(),
                reason: "names a provider that is not configured".into(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

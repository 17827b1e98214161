//! Configuration file loading.
//!
//! ## Responsibility
//! Read a TOML file from disk, parse it into an [`AppConfig`], and run
//! validation before returning. This is the primary entry point for loading
//! configuration at startup.
//!
//! ## Guarantees
//! - A successfully loaded config is always validated
//! - I/O errors and parse errors are distinguished in the error type
//! - File path is included in every error message
//!
//! ## NOT Responsible For
//! - Defining the config schema (that belongs to `mod.rs`)

use std::path::Path;

use super::validation::{self, ConfigError};
use super::AppConfig;

/// Load an [`AppConfig`] from a TOML file.
///
/// # Returns
///
/// - `Ok(AppConfig)` if the file is readable, well-formed, and valid.
/// - `Err(ConfigError::Io)` if the file cannot be read.
/// - `Err(ConfigError::Parse)` if the TOML is malformed.
/// - `Err(ConfigError::Validation)` if semantic constraints are violated.
///
/// # Example
///
/// ```rust,ignore
/// use tokio_transcription_orchestrator::config::loader::load_from_file;
/// use std::path::Path;
///
/// let config = load_from_file(Path::new("orchestrator.toml"))?;
/// println!("strategy: {}", config.routing.kind());
/// ```
pub fn load_from_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        file: path.display().to_string(),
        source: e,
    })?;

    load_from_str(&content, &path.display().to_string())
}

/// Load an [`AppConfig`] from a TOML string.
///
/// `source_name` identifies the source in error messages.
///
/// # Returns
///
/// - `Ok(AppConfig)` if the TOML is well-formed and valid.
/// - `Err(ConfigError::Parse)` if the TOML is malformed.
/// - `Err(ConfigError::Validation)` with every violation, one per line.
pub fn load_from_str(content: &str, source_name: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        file: source_name.to_string(),
        source: e,
    })?;

    validation::validate(&config).map_err(|errors| {
        ConfigError::Validation(
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    })?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID_TOML: &str = r#"
[queue]
capacity = 4
concurrency = 2

[routing]
kind = "hybrid"
quality_provider = "quality"
draft_provider = "draft"
threshold_secs = 30.0

[[providers]]
name = "quality"
kind = "echo"
model = "large-v3"

[[providers]]
name = "draft"
kind = "echo"
model = "distil-small"
delay_ms = 1
"#;

    #[test]
    fn test_load_from_str_valid_toml_succeeds() {
        let config = load_from_str(VALID_TOML, "test").expect("test: valid config");
        assert_eq!(config.queue.capacity, 4);
        assert_eq!(config.routing.kind(), "hybrid");
        assert_eq!(config.providers.len(), 2);
    }

    #[test]
    fn test_load_from_str_invalid_toml_returns_parse_error() {
        let err = load_from_str("not valid toml [[[", "bad.toml").err();
        assert!(matches!(err, Some(ConfigError::Parse { ref file, .. }) if file == "bad.toml"));
    }

    #[test]
    fn test_load_from_str_semantic_error_returns_validation_error() {
        let src = VALID_TOML.replace("capacity = 4", "capacity = 0");
        let err = load_from_str(&src, "test").err();
        assert!(
            matches!(err, Some(ConfigError::Validation(ref msg)) if msg.contains("queue.capacity"))
        );
    }

    #[test]
    fn test_load_from_file_reads_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("test: temp file");
        file.write_all(VALID_TOML.as_bytes())
            .expect("test: write config");
        let config = load_from_file(file.path()).expect("test: load from file");
        assert_eq!(config.queue.concurrency, 2);
    }

    #[test]
    fn test_load_from_file_missing_returns_io_error() {
        let err = load_from_file(Path::new("/definitely/not/here.toml")).err();
        assert!(matches!(err, Some(ConfigError::Io { .. })));
    }
}

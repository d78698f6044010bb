//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::env;
use std::fs;
use std::path::Path;

use crate::{ConfigError, LogFormat, TrellisConfig};

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (or a preset)
/// 2. Configuration file or string (TOML or JSON)
/// 3. Environment variables
///
/// A file or string replaces the whole configuration; keys it omits take
/// their defaults, not the values of an earlier layer.
///
/// # Example
///
/// ```no_run
/// use trellis_config::ConfigLoader;
///
/// # fn main() -> Result<(), trellis_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("trellis.toml")?
///     .with_env_prefix("TRELLIS")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: TrellisConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Create a new configuration loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = TrellisConfig::development();
        self
    }

    /// Start with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = TrellisConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format is chosen by extension: `.toml` or `.json`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The extension is not supported
    /// - The file contains invalid TOML/JSON or unknown fields
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;

        self.config = parse(&content, &extension)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format ("toml" or "json").
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the format is unknown or parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use trellis_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [procedure]
    ///     max_payload_bytes = 4096
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.procedure.max_payload_bytes, Some(4096));
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = parse(content, &format.to_lowercase())?;
        Ok(self)
    }

    /// Set the environment variable prefix for overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`, for example
    /// `TRELLIS__PROCEDURE__EXPOSE_INTERNAL_ERRORS=true` or
    /// `TRELLIS__TELEMETRY__LOGGING__LEVEL=debug`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override does not parse or validation fails.
    pub fn load(self) -> Result<TrellisConfig, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides without validating.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override does not parse.
    pub fn load_unvalidated(mut self) -> Result<TrellisConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix, env::vars())?;
        }
        Ok(self.config)
    }

    fn apply_env_overrides(
        &mut self,
        prefix: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        let marker = format!("{prefix}__");
        for (key, value) in vars {
            if key.starts_with(&marker) {
                self.apply_env_var(&key, &value, &marker)?;
            }
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, marker: &str) -> Result<(), ConfigError> {
        let Some(path) = key.strip_prefix(marker) else {
            return Ok(());
        };
        let parts: Vec<&str> = path.split("__").collect();

        match parts.as_slice() {
            // Procedure section
            ["PROCEDURE", "EXPOSE_INTERNAL_ERRORS"] => {
                self.config.procedure.expose_internal_errors = parse_bool(key, value)?;
            }
            ["PROCEDURE", "INTERNAL_ERROR_MESSAGE"] => {
                self.config.procedure.internal_error_message = value.to_string();
            }
            ["PROCEDURE", "SLOW_INVOCATION_THRESHOLD_MS"] => {
                self.config.procedure.slow_invocation_threshold_ms = parse_optional(key, value)?;
            }
            ["PROCEDURE", "MAX_PAYLOAD_BYTES"] => {
                self.config.procedure.max_payload_bytes = parse_optional(key, value)?;
            }

            // Telemetry logging
            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                self.config.telemetry.logging.enabled = parse_bool(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                self.config.telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                self.config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["TELEMETRY", "LOGGING", "ANSI_ENABLED"] => {
                self.config.telemetry.logging.ansi_enabled = parse_bool(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "INCLUDE_LOCATION"] => {
                self.config.telemetry.logging.include_location = parse_bool(key, value)?;
            }

            _ => {}
        }

        Ok(())
    }
}

fn parse(content: &str, format: &str) -> Result<TrellisConfig, ConfigError> {
    match format {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env_parse_error(key, "expected boolean")),
    }
}

// An empty value or "none" clears the setting.
fn parse_optional<T: std::str::FromStr>(key: &str, value: &str) -> Result<Option<T>, ConfigError> {
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer or 'none'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(suffix: &str) -> NamedTempFile {
        tempfile::Builder::new().suffix(suffix).tempfile().unwrap()
    }

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_loader_defaults() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, TrellisConfig::default());
    }

    #[test]
    fn test_loader_presets() {
        let config = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(config.telemetry.logging.level, "debug");

        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.telemetry.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_toml_file() {
        let mut file = temp_file(".toml");
        writeln!(
            file,
            r#"
            [procedure]
            expose_internal_errors = true
            slow_invocation_threshold_ms = 500

            [telemetry.logging]
            format = "pretty"
            "#
        )
        .unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert!(config.procedure.expose_internal_errors);
        assert_eq!(config.procedure.slow_invocation_threshold_ms, Some(500));
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_json_file() {
        let mut file = temp_file(".json");
        write!(file, r#"{{"procedure": {{"max_payload_bytes": 2048}}}}"#).unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.procedure.max_payload_bytes, Some(2048));
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::new().with_file("/nonexistent/trellis.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_missing_optional_file_keeps_defaults() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/trellis.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config, TrellisConfig::default());
    }

    #[test]
    fn test_unsupported_extension() {
        let file = temp_file(".yaml");
        let result = ConfigLoader::new().with_file(file.path());
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_unknown_field_in_file() {
        let result = ConfigLoader::new().with_string("[procedure]\nretries = 3\n", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_string_format_is_case_insensitive() {
        let config = ConfigLoader::new()
            .with_string(r#"{"telemetry": {"logging": {"level": "warn"}}}"#, "JSON")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.telemetry.logging.level, "warn");
    }

    #[test]
    fn test_env_overrides() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_overrides(
                "APP",
                vars(&[
                    ("APP__PROCEDURE__EXPOSE_INTERNAL_ERRORS", "yes"),
                    ("APP__PROCEDURE__MAX_PAYLOAD_BYTES", "512"),
                    ("APP__TELEMETRY__LOGGING__FORMAT", "Pretty"),
                    ("APP__TELEMETRY__LOGGING__LEVEL", "trace"),
                    ("APP__UNKNOWN__KEY", "ignored"),
                    ("OTHER__PROCEDURE__MAX_PAYLOAD_BYTES", "1"),
                ]),
            )
            .unwrap();

        let config = loader.load_unvalidated().unwrap();
        assert!(config.procedure.expose_internal_errors);
        assert_eq!(config.procedure.max_payload_bytes, Some(512));
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
        assert_eq!(config.telemetry.logging.level, "trace");
    }

    #[test]
    fn test_env_override_clears_optional() {
        let mut loader = ConfigLoader::new().with_production();
        loader
            .apply_env_overrides(
                "APP",
                vars(&[("APP__PROCEDURE__SLOW_INVOCATION_THRESHOLD_MS", "none")]),
            )
            .unwrap();

        let config = loader.load_unvalidated().unwrap();
        assert_eq!(config.procedure.slow_invocation_threshold_ms, None);
    }

    #[test]
    fn test_env_override_bad_values() {
        let mut loader = ConfigLoader::new();
        let result = loader.apply_env_overrides(
            "APP",
            vars(&[("APP__PROCEDURE__EXPOSE_INTERNAL_ERRORS", "maybe")]),
        );
        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));

        let result = loader.apply_env_overrides(
            "APP",
            vars(&[("APP__TELEMETRY__LOGGING__FORMAT", "xml")]),
        );
        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));

        let result = loader.apply_env_overrides(
            "APP",
            vars(&[("APP__PROCEDURE__MAX_PAYLOAD_BYTES", "-1")]),
        );
        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));
    }

    #[test]
    fn test_load_validates() {
        let result = ConfigLoader::new()
            .with_string("[procedure]\nmax_payload_bytes = 0\n", "toml")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}

//! Pipeline tuning loaded from TOML.
//!
//! ```toml
//! geocode_timeout_ms = 10000
//! gis_timeout_ms = 20000
//! classify_timeout_ms = 30000
//! concurrent_classification = true
//! stale_after_days = 365
//! ```
//!
//! Every key is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML or has wrongly typed keys.
    #[error("Invalid pipeline configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid pipeline configuration: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
    },
}

/// Timeouts and policy knobs for [`crate::pipeline::ResolutionPipeline`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Geocoder deadline.
    pub geocode_timeout_ms: u64,
    /// GIS lookup deadline.
    pub gis_timeout_ms: u64,
    /// Use classifier deadline.
    pub classify_timeout_ms: u64,
    /// Run the classifier alongside the GIS lookup. When `false` the
    /// classifier runs after equivalency and receives the zoning code as a
    /// hint.
    pub concurrent_classification: bool,
    /// Age after which zoning data is flagged as stale.
    pub stale_after_days: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            geocode_timeout_ms: 10_000,
            gis_timeout_ms: 20_000,
            classify_timeout_ms: 30_000,
            concurrent_classification: true,
            stale_after_days: 365,
        }
    }
}

impl PipelineConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is invalid or a timeout is zero.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("geocode_timeout_ms", self.geocode_timeout_ms),
            ("gis_timeout_ms", self.gis_timeout_ms),
            ("classify_timeout_ms", self.classify_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    message: format!("{name} must be greater than zero"),
                });
            }
        }
        Ok(())
    }

    /// Geocoder deadline.
    #[must_use]
    pub const fn geocode_timeout(&self) -> Duration {
        Duration::from_millis(self.geocode_timeout_ms)
    }

    /// GIS lookup deadline.
    #[must_use]
    pub const fn gis_timeout(&self) -> Duration {
        Duration::from_millis(self.gis_timeout_ms)
    }

    /// Classifier deadline.
    #[must_use]
    pub const fn classify_timeout(&self) -> Duration {
        Duration::from_millis(self.classify_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        assert_eq!(
            PipelineConfig::from_toml_str("").unwrap(),
            PipelineConfig::default()
        );
    }

    #[test]
    fn partial_file_overrides_keys() {
        let config =
            PipelineConfig::from_toml_str("gis_timeout_ms = 5000\nconcurrent_classification = false")
                .unwrap();
        assert_eq!(config.gis_timeout(), Duration::from_secs(5));
        assert!(!config.concurrent_classification);
        assert_eq!(config.stale_after_days, 365);
    }

    #[test]
    fn rejects_unknown_keys_and_zero_timeouts() {
        assert!(matches!(
            PipelineConfig::from_toml_str("gis_timeout = 5"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            PipelineConfig::from_toml_str("geocode_timeout_ms = 0"),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = PipelineConfig::load(Path::new("/nonexistent/pyxten.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/pyxten.toml"));
    }
}

//! TOML configuration loading and validation.
//!
//! Calibration files are parsed strictly (`deny_unknown_fields`) and
//! validated before any control core sees them.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calib::{AbsCalibration, AssistMap};
use crate::error::EcuError;
use crate::hal::CalibrationStore;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),

    /// Unknown field in TOML (strict parsing with `deny_unknown_fields`).
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// Writing a file failed.
    #[error("failed to write configuration: {0}")]
    WriteError(String),
}

/// Trait for loading configuration from TOML files.
///
/// Blanket-implemented for every `DeserializeOwned` type.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| {
            let msg = e.to_string();
            if msg.contains("unknown field") {
                ConfigError::UnknownField(msg)
            } else {
                ConfigError::ParseError(msg)
            }
        })
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

/// Complete calibration set, loaded from `calibration.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationConfig {
    /// ABS per-wheel calibration.
    #[serde(default)]
    pub abs: AbsCalibration,
    /// EPS base-assist map.
    #[serde(default)]
    pub eps: AssistMap,
}

impl CalibrationConfig {
    /// Validate both tables.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.abs.validate()?;
        self.eps.validate()
    }

    /// Load and validate the calibration set from a TOML file.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Persist the calibration set to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text =
            toml::to_string_pretty(self).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteError(e.to_string()))
    }
}

/// Read-only calibration store backed by a validated TOML file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCalibrationStore {
    config: CalibrationConfig,
}

impl FileCalibrationStore {
    /// Load and validate `calibration.toml`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self {
            config: CalibrationConfig::load_validated(path)?,
        })
    }

    /// Store serving an already-validated calibration set.
    pub const fn from_config(config: CalibrationConfig) -> Self {
        Self { config }
    }

    /// Store serving the built-in default calibration.
    pub fn with_defaults() -> Self {
        Self {
            config: CalibrationConfig::default(),
        }
    }
}

impl CalibrationStore for FileCalibrationStore {
    fn abs_calibration(&self) -> Result<AbsCalibration, EcuError> {
        Ok(self.config.abs)
    }

    fn assist_map(&self) -> Result<AssistMap, EcuError> {
        Ok(self.config.eps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wheel::WheelPosition;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_calibration_validates() {
        assert!(CalibrationConfig::default().validate().is_ok());
    }

    #[test]
    fn load_missing_file_reports_not_found() {
        let result = CalibrationConfig::load(Path::new("/nonexistent/calibration.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn load_rejects_unknown_fields() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[abs]\nbogus_field = 1\n").unwrap();
        file.flush().unwrap();
        let result = CalibrationConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::UnknownField(_))));
    }

    #[test]
    fn empty_file_yields_defaults() {
        let file = NamedTempFile::new().unwrap();
        let config = CalibrationConfig::load(file.path()).unwrap();
        assert_eq!(config, CalibrationConfig::default());
    }

    #[test]
    fn save_load_roundtrip() {
        let mut config = CalibrationConfig::default();
        config.abs.wheels[WheelPosition::FrontRight].slip_threshold = 0.18;
        config.abs.min_activation_speed = 6.0;

        let file = NamedTempFile::new().unwrap();
        config.save(file.path()).unwrap();
        let reloaded = CalibrationConfig::load_validated(file.path()).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn load_validated_rejects_bad_calibration() {
        let mut config = CalibrationConfig::default();
        config.abs.wheels[WheelPosition::FrontLeft].slip_threshold = 2.0;

        let file = NamedTempFile::new().unwrap();
        config.save(file.path()).unwrap();
        assert!(matches!(
            CalibrationConfig::load_validated(file.path()),
            Err(ConfigError::ValidationError(_))
        ));
    }
}

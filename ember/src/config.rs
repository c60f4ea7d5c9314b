//! Engine configuration
//!
//! Read from an `ember.toml` file; every field has a default.

use crate::interp::number::DEFAULT_FLOAT_DIGITS;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File looked up next to a script when no `--config` is given
pub const CONFIG_FILE: &str = "ember.toml";

/// Interpreter settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Nested calls allowed before a Memory error
    pub max_call_depth: usize,
    /// Extra directories searched by `open`
    pub module_paths: Vec<PathBuf>,
    /// Extension of module files, without the dot
    pub module_extension: String,
    /// Fractional digits kept by `/`
    pub float_digits: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_call_depth: 10_000,
            module_paths: Vec::new(),
            module_extension: "ember".to_string(),
            float_digits: DEFAULT_FLOAT_DIGITS,
        }
    }
}

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; relative module paths resolve against its directory
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            for dir in &mut config.module_paths {
                if dir.is_relative() {
                    *dir = base.join(&*dir);
                }
            }
        }
        Ok(config)
    }

    /// Set the call depth limit
    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Add a module search directory
    pub fn module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_paths.push(path.into());
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_depth == 0 {
            return Err(ConfigError::Invalid("max_call_depth must be positive".into()));
        }
        if !(0..=1000).contains(&self.float_digits) {
            return Err(ConfigError::Invalid(format!(
                "float_digits must be between 0 and 1000, got {}",
                self.float_digits
            )));
        }
        if self.module_extension.is_empty() || self.module_extension.contains('.') {
            return Err(ConfigError::Invalid(format!(
                "module_extension must be a bare extension, got {:?}",
                self.module_extension
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_call_depth, 10_000);
        assert_eq!(config.float_digits, 16);
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_toml_str(
            "max_call_depth = 50\nmodule_paths = [\"lib\"]\n",
        )
        .unwrap();
        assert_eq!(config.max_call_depth, 50);
        assert_eq!(config.module_paths, vec![PathBuf::from("lib")]);
        assert_eq!(config.module_extension, "ember");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            EngineConfig::from_toml_str("max_call_depth = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("float_digits = \"x\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::load(Path::new("/nonexistent/ember.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

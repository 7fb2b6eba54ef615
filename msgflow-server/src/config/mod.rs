//! Configuration module for msgflow-server.
//!
//! Handles loading configuration from TOML files and CLI arguments, and
//! turning it into the core's [`PipelineConfig`].

pub mod file;

use crate::config::file::FileConfig;
use msgflow_core::config::PipelineConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(#[from] msgflow_core::config::ConfigError),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Build and validate the pipeline configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content)
    }

    fn load_str(&self, config_content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        let loaded = build_loaded_config(file_config);
        loaded.pipeline.validate()?;
        Ok(loaded)
    }
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    let section = file_config.pipeline;
    LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
        },
        pipeline: PipelineConfig {
            tax_rate: section.tax_rate,
            invalid_postcode: section.invalid_postcode,
            time_unit: Duration::from_millis(section.time_unit_ms),
            untaxed_period: section.untaxed_period,
            taxed_period: section.taxed_period,
            merge: section.merge,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgflow_core::config::{ConfigError as CoreConfigError, OverflowPolicy};

    const MINIMAL: &str = r#"
[pipeline.merge]
capacity = 32
overflow = "block"
"#;

    #[test]
    fn test_listen_override_wins() {
        let listen: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let loader = ConfigLoader::new("unused.toml", Some(listen));

        let loaded = loader.load_str(MINIMAL).unwrap();
        assert_eq!(loaded.server.listen, listen);
        assert_eq!(loaded.pipeline.merge.overflow, OverflowPolicy::Block);
        assert_eq!(loaded.pipeline.untaxed_interval(), Ok(Duration::from_secs(5)));
        assert_eq!(loaded.pipeline.taxed_interval(), Ok(Duration::from_secs(1)));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let loader = ConfigLoader::new("unused.toml", None);
        let toml_str = r#"
[pipeline]
tax_rate = "-0.5"

[pipeline.merge]
capacity = 32
overflow = "block"
"#;
        assert!(matches!(
            loader.load_str(toml_str),
            Err(ConfigError::ValidationError(_))
        ));

        let toml_str = r#"
[pipeline]
time_unit_ms = 0

[pipeline.merge]
capacity = 32
overflow = "block"
"#;
        assert!(matches!(
            loader.load_str(toml_str),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_unschedulable_values_fail_validation() {
        let loader = ConfigLoader::new("unused.toml", None);
        let toml_str = r#"
[pipeline]
time_unit_ms = 9223372036854775807
untaxed_period = 4294967295

[pipeline.merge]
capacity = 32
overflow = "block"
"#;
        assert!(matches!(
            loader.load_str(toml_str),
            Err(ConfigError::ValidationError(
                CoreConfigError::PeriodTooLarge(_)
            ))
        ));

        let toml_str = r#"
[pipeline.merge]
capacity = 1152921504606846975
overflow = "drop-oldest"
"#;
        assert!(matches!(
            loader.load_str(toml_str),
            Err(ConfigError::ValidationError(
                CoreConfigError::CapacityTooLarge { .. }
            ))
        ));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let loader = ConfigLoader::new("/nonexistent/msgflow-config.toml", None);
        assert!(matches!(loader.load(), Err(ConfigError::IoError(_))));
    }
}

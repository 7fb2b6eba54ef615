//! TOML file configuration structures.
//!
//! These structs directly map to the `msgflow-config.toml` file format.

use msgflow_core::config::{
    DEFAULT_INVALID_POSTCODE, DEFAULT_TAX_RATE, DEFAULT_TAXED_PERIOD, DEFAULT_TIME_UNIT,
    DEFAULT_UNTAXED_PERIOD, MergeConfig,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::net::SocketAddr;
use std::num::NonZeroU32;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub pipeline: PipelineSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Pipeline configuration section.
///
/// Everything except `merge` has a default; the merge queue's overflow
/// policy must always be spelled out.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    /// Multiplier applied to untaxed payments, e.g. `"1.2"`.
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,
    /// Postcode that marks an address invalid.
    #[serde(default = "default_invalid_postcode")]
    pub invalid_postcode: String,
    /// Length of one time unit in milliseconds.
    #[serde(default = "default_time_unit_ms")]
    pub time_unit_ms: u64,
    /// Untaxed source period, in time units.
    #[serde(default = "default_untaxed_period")]
    pub untaxed_period: NonZeroU32,
    /// Taxed source period, in time units.
    #[serde(default = "default_taxed_period")]
    pub taxed_period: NonZeroU32,
    pub merge: MergeConfig,
}

fn default_tax_rate() -> Decimal {
    DEFAULT_TAX_RATE
}

fn default_invalid_postcode() -> String {
    DEFAULT_INVALID_POSTCODE.to_string()
}

fn default_time_unit_ms() -> u64 {
    DEFAULT_TIME_UNIT.as_millis() as u64
}

fn default_untaxed_period() -> NonZeroU32 {
    DEFAULT_UNTAXED_PERIOD
}

fn default_taxed_period() -> NonZeroU32 {
    DEFAULT_TAXED_PERIOD
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgflow_core::config::OverflowPolicy;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[pipeline.merge]
capacity = 128
overflow = "drop-oldest"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.pipeline.tax_rate, dec!(1.2));
        assert_eq!(config.pipeline.invalid_postcode, "XXX");
        assert_eq!(config.pipeline.time_unit_ms, 1000);
        assert_eq!(config.pipeline.untaxed_period.get(), 5);
        assert_eq!(config.pipeline.taxed_period.get(), 1);
        assert_eq!(config.pipeline.merge.capacity.get(), 128);
        assert_eq!(config.pipeline.merge.overflow, OverflowPolicy::DropOldest);
    }

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[pipeline]
tax_rate = "1.15"
invalid_postcode = "NONE"
time_unit_ms = 250
untaxed_period = 10
taxed_period = 2

[pipeline.merge]
capacity = 16
overflow = "block"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, default_listen_addr());
        assert_eq!(config.pipeline.tax_rate, dec!(1.15));
        assert_eq!(config.pipeline.invalid_postcode, "NONE");
        assert_eq!(config.pipeline.time_unit_ms, 250);
        assert_eq!(config.pipeline.merge.overflow, OverflowPolicy::Block);
    }

    #[test]
    fn test_overflow_policy_is_required() {
        let toml_str = r#"
[pipeline.merge]
capacity = 16
"#;
        assert!(toml::from_str::<FileConfig>(toml_str).is_err());
    }

    #[test]
    fn test_zero_period_is_rejected() {
        let toml_str = r#"
[pipeline]
taxed_period = 0

[pipeline.merge]
capacity = 16
overflow = "block"
"#;
        assert!(toml::from_str::<FileConfig>(toml_str).is_err());
    }
}

//! Pipeline configuration.
//!
//! The core never reads configuration from the environment. The caller
//! builds a [`PipelineConfig`] (the server crate does so from its TOML file)
//! and passes it into [`Pipeline::builder`](crate::pipeline::Pipeline::builder).

use crate::stream::payments::{TAXED_SOURCE, UNTAXED_SOURCE};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::num::{NonZeroU32, NonZeroUsize};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Multiplier applied to untaxed payments (20% tax).
pub const DEFAULT_TAX_RATE: Decimal = dec!(1.2);

/// Postcode that marks an address as invalid.
pub const DEFAULT_INVALID_POSTCODE: &str = "XXX";

/// Length of one time unit used by the payment sources.
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(1);

/// Period of the untaxed ("Apple") payment source, in time units.
pub const DEFAULT_UNTAXED_PERIOD: NonZeroU32 = match NonZeroU32::new(5) {
    Some(period) => period,
    None => NonZeroU32::MIN,
};

/// Period of the taxed ("Orange") payment source, in time units.
pub const DEFAULT_TAXED_PERIOD: NonZeroU32 = NonZeroU32::MIN;

/// Largest accepted merge queue capacity.
///
/// Well below the limits of both backing channels; the `DropOldest` ring
/// allocates every slot up front.
pub const MAX_MERGE_CAPACITY: usize = 1 << 20;

/// Errors found while validating a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("tax rate must not be negative, got {0}")]
    NegativeTaxRate(Decimal),

    #[error("time unit must be greater than zero")]
    ZeroTimeUnit,

    #[error("source {0} has a zero period")]
    ZeroPeriod(String),

    #[error("source {0} has a period too large to schedule")]
    PeriodTooLarge(String),

    #[error("merge capacity {capacity} exceeds the maximum of {max}")]
    CapacityTooLarge { capacity: usize, max: usize },
}

/// What the merge queue does when it is full.
///
/// There is deliberately no default: every deployment has to pick one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// The source waits until the reader frees a slot.
    Block,
    /// The oldest queued element is discarded and counted as dropped.
    ///
    /// The ring is sized to the next power of two at or above `capacity`.
    DropOldest,
}

/// Bound and overflow behaviour of the payment merge queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    pub capacity: NonZeroUsize,
    pub overflow: OverflowPolicy,
}

impl MergeConfig {
    pub fn new(capacity: NonZeroUsize, overflow: OverflowPolicy) -> Self {
        Self { capacity, overflow }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity.get() > MAX_MERGE_CAPACITY {
            return Err(ConfigError::CapacityTooLarge {
                capacity: self.capacity.get(),
                max: MAX_MERGE_CAPACITY,
            });
        }
        Ok(())
    }
}

/// Runtime configuration for all three flows.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Multiplier for untaxed payments.
    pub tax_rate: Decimal,
    /// Exact, case-sensitive postcode that marks an address invalid.
    pub invalid_postcode: String,
    /// Wall-clock length of one time unit.
    pub time_unit: Duration,
    /// Untaxed source period, in time units.
    pub untaxed_period: NonZeroU32,
    /// Taxed source period, in time units.
    pub taxed_period: NonZeroU32,
    /// Merge queue settings.
    pub merge: MergeConfig,
}

impl PipelineConfig {
    /// Default business settings with the given merge queue settings.
    pub fn new(merge: MergeConfig) -> Self {
        Self {
            tax_rate: DEFAULT_TAX_RATE,
            invalid_postcode: DEFAULT_INVALID_POSTCODE.to_string(),
            time_unit: DEFAULT_TIME_UNIT,
            untaxed_period: DEFAULT_UNTAXED_PERIOD,
            taxed_period: DEFAULT_TAXED_PERIOD,
            merge,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tax_rate < Decimal::ZERO {
            return Err(ConfigError::NegativeTaxRate(self.tax_rate));
        }
        if self.time_unit.is_zero() {
            return Err(ConfigError::ZeroTimeUnit);
        }
        self.untaxed_interval()?;
        self.taxed_interval()?;
        self.merge.validate()
    }

    /// Wall-clock period of the untaxed source.
    pub fn untaxed_interval(&self) -> Result<Duration, ConfigError> {
        scaled_period(UNTAXED_SOURCE, self.time_unit, self.untaxed_period)
    }

    /// Wall-clock period of the taxed source.
    pub fn taxed_interval(&self) -> Result<Duration, ConfigError> {
        scaled_period(TAXED_SOURCE, self.time_unit, self.taxed_period)
    }
}

/// `unit * periods`, rejected if it overflows or cannot be scheduled from
/// now.
fn scaled_period(
    source: &str,
    unit: Duration,
    periods: NonZeroU32,
) -> Result<Duration, ConfigError> {
    unit.checked_mul(periods.get())
        .filter(|period| Instant::now().checked_add(*period).is_some())
        .ok_or_else(|| ConfigError::PeriodTooLarge(source.to_string()))
}

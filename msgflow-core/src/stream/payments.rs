//! The two built-in payment sources.

use super::source::StreamSource;
use crate::config::ConfigError;
use msgflow_sdk::PaymentMessage;
use rust_decimal_macros::dec;
use std::time::Duration;

pub const UNTAXED_SOURCE: &str = "apple-payments";
pub const TAXED_SOURCE: &str = "orange-payments";

/// An untaxed 100 from "Apple" every `period`.
pub fn untaxed_payment_source(period: Duration) -> Result<StreamSource<PaymentMessage>, ConfigError> {
    StreamSource::periodic(UNTAXED_SOURCE, period, |_| {
        PaymentMessage::untaxed(dec!(100), "Apple")
    })
}

/// An already taxed 200 (240 after tax) from "Orange" every `period`.
pub fn taxed_payment_source(period: Duration) -> Result<StreamSource<PaymentMessage>, ConfigError> {
    StreamSource::periodic(TAXED_SOURCE, period, |_| {
        PaymentMessage::taxed(dec!(200), dec!(240), "Orange")
    })
}

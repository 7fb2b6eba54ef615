//! Payment events.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A payment, either as produced or after taxation.
///
/// Amounts are decimals end to end. `taxed_amount` is zero until the
/// payment has been taxed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMessage {
    pub amount: Decimal,
    pub taxed: bool,
    #[serde(default)]
    pub taxed_amount: Decimal,
    pub vendor: String,
}

impl PaymentMessage {
    /// A payment that has not been taxed yet.
    pub fn untaxed(amount: Decimal, vendor: impl Into<String>) -> Self {
        Self {
            amount,
            taxed: false,
            taxed_amount: Decimal::ZERO,
            vendor: vendor.into(),
        }
    }

    /// A payment whose tax has already been applied upstream.
    pub fn taxed(amount: Decimal, taxed_amount: Decimal, vendor: impl Into<String>) -> Self {
        Self {
            amount,
            taxed: true,
            taxed_amount,
            vendor: vendor.into(),
        }
    }
}

//! Payment taxation stage.

use super::TransformStage;
use crate::config::DEFAULT_TAX_RATE;
use msgflow_sdk::PaymentMessage;
use rust_decimal::Decimal;
use tracing::debug;

/// Applies a fixed tax multiplier to untaxed payments.
///
/// Payments that arrive already taxed pass through untouched, so running a
/// payment through the stage twice never taxes it twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentTaxer {
    rate: Decimal,
}

impl PaymentTaxer {
    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    pub fn tax(&self, payment: PaymentMessage) -> PaymentMessage {
        debug!(
            vendor = %payment.vendor,
            amount = %payment.amount,
            taxed = payment.taxed,
            "Checking tax for payment"
        );
        if payment.taxed {
            return payment;
        }
        PaymentMessage {
            taxed: true,
            taxed_amount: payment.amount * self.rate,
            ..payment
        }
    }
}

impl Default for PaymentTaxer {
    fn default() -> Self {
        Self::new(DEFAULT_TAX_RATE)
    }
}

impl TransformStage<PaymentMessage> for PaymentTaxer {
    type Output = PaymentMessage;

    fn apply(&self, input: PaymentMessage) -> PaymentMessage {
        self.tax(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_untaxed_payment_is_taxed_exactly() {
        let taxer = PaymentTaxer::default();
        for (amount, expected) in [
            (dec!(100.0), dec!(120.0)),
            (dec!(0.10), dec!(0.12)),
            (dec!(19.99), dec!(23.988)),
            (dec!(0.01), dec!(0.012)),
            (dec!(0), dec!(0)),
        ] {
            let taxed = taxer.tax(PaymentMessage::untaxed(amount, "Apple"));
            assert!(taxed.taxed);
            assert_eq!(taxed.taxed_amount, expected);
            assert_eq!(taxed.amount, amount);
            assert_eq!(taxed.vendor, "Apple");
        }
    }

    #[test]
    fn test_taxed_payment_is_returned_unchanged() {
        let taxer = PaymentTaxer::default();
        let orange = PaymentMessage::taxed(dec!(200.0), dec!(240.0), "Orange");
        assert_eq!(taxer.tax(orange.clone()), orange);

        let odd = PaymentMessage::taxed(dec!(10), dec!(999), "Odd");
        assert_eq!(taxer.tax(odd.clone()), odd);
    }

    #[test]
    fn test_taxing_twice_is_idempotent() {
        let taxer = PaymentTaxer::default();
        let once = taxer.tax(PaymentMessage::untaxed(dec!(100.0), "Apple"));
        let twice = taxer.apply(once.clone());
        assert_eq!(once, twice);
        assert_eq!(twice.taxed_amount, dec!(120.0));
    }

    #[test]
    fn test_custom_rate() {
        let taxer = PaymentTaxer::new(dec!(1.05));
        assert_eq!(taxer.rate(), dec!(1.05));
        let taxed = taxer.tax(PaymentMessage::untaxed(dec!(40), "Pear"));
        assert_eq!(taxed.taxed_amount, dec!(42.00));
    }
}

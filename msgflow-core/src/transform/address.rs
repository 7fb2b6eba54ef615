//! Address validation stage.

use super::TransformStage;
use crate::config::DEFAULT_INVALID_POSTCODE;
use msgflow_sdk::{AddressMessage, ValidatedAddressMessage};
use tracing::debug;

/// Marks addresses whose postcode equals the sentinel as invalid.
///
/// Invalidity is data, not an error: every address comes out wrapped in a
/// `ValidatedAddressMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressValidator {
    invalid_postcode: String,
}

impl AddressValidator {
    pub fn new(invalid_postcode: impl Into<String>) -> Self {
        Self {
            invalid_postcode: invalid_postcode.into(),
        }
    }

    /// Exact, case-sensitive comparison against the sentinel.
    pub fn validate(&self, address: AddressMessage) -> ValidatedAddressMessage {
        let is_valid = address.postcode != self.invalid_postcode;
        debug!(postcode = %address.postcode, is_valid, "Validated address");
        ValidatedAddressMessage {
            is_valid,
            data: address,
        }
    }
}

impl Default for AddressValidator {
    fn default() -> Self {
        Self::new(DEFAULT_INVALID_POSTCODE)
    }
}

impl TransformStage<AddressMessage> for AddressValidator {
    type Output = ValidatedAddressMessage;

    fn apply(&self, input: AddressMessage) -> ValidatedAddressMessage {
        self.validate(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(postcode: &str) -> AddressMessage {
        AddressMessage::new("1 Sheffield Way", "City Center", "Sheffield", postcode)
    }

    #[test]
    fn test_only_the_exact_sentinel_is_invalid() {
        let validator = AddressValidator::default();

        assert!(!validator.validate(address("XXX")).is_valid);
        for postcode in ["xxx", "XX", "", "XXXX", " XXX", "S1 SHF", "Xxx"] {
            assert!(
                validator.validate(address(postcode)).is_valid,
                "postcode {postcode:?} should be valid"
            );
        }
    }

    #[test]
    fn test_input_is_carried_unchanged() {
        let validator = AddressValidator::default();
        for input in [
            address("S1 SHF"),
            AddressMessage::new("X", "X", "X", "XXX"),
            address("").with_user_id(12),
        ] {
            let validated = validator.validate(input.clone());
            assert_eq!(validated.data, input);
        }
    }

    #[test]
    fn test_custom_sentinel() {
        let validator = AddressValidator::new("N/A");
        assert!(!validator.apply(address("N/A")).is_valid);
        assert!(validator.apply(address("XXX")).is_valid);
    }
}

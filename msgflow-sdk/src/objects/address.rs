//! Postal address events.
//!
//! Producers only ever send [`AddressMessage`]. [`ValidatedAddressMessage`]
//! is derived by the validation stage and wraps the untouched input.

use serde::{Deserialize, Serialize};

/// A postal address as sent by a producer.
///
/// `user_id` links the address to a user. Some producers never send it,
/// so it is optional and omitted from the wire when absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i32>,
    pub address1: String,
    pub address2: String,
    pub city: String,
    pub postcode: String,
}

impl AddressMessage {
    /// Create an address without a user link.
    pub fn new(
        address1: impl Into<String>,
        address2: impl Into<String>,
        city: impl Into<String>,
        postcode: impl Into<String>,
    ) -> Self {
        Self {
            user_id: None,
            address1: address1.into(),
            address2: address2.into(),
            city: city.into(),
            postcode: postcode.into(),
        }
    }

    /// Link the address to a user.
    pub fn with_user_id(mut self, user_id: i32) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// Result of address validation.
///
/// `data` is always the address exactly as it was received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedAddressMessage {
    pub is_valid: bool,
    pub data: AddressMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_is_optional_on_the_wire() {
        let json = r#"{"address1":"1 Sheffield Way","address2":"City Center","city":"Sheffield","postcode":"S1 SHF"}"#;
        let address: AddressMessage = serde_json::from_str(json).unwrap();
        assert_eq!(address.user_id, None);
        assert_eq!(
            address,
            AddressMessage::new("1 Sheffield Way", "City Center", "Sheffield", "S1 SHF")
        );

        let serialized = serde_json::to_value(&address).unwrap();
        assert!(serialized.get("userId").is_none());
    }

    #[test]
    fn test_validated_address_field_names() {
        let validated = ValidatedAddressMessage {
            is_valid: false,
            data: AddressMessage::new("X", "X", "X", "XXX").with_user_id(7),
        };
        let json = serde_json::to_value(&validated).unwrap();
        assert_eq!(json["isValid"], false);
        assert_eq!(json["data"]["userId"], 7);
        assert_eq!(json["data"]["postcode"], "XXX");
    }
}

//! Well-known channel names.
//!
//! Producers and consumers agree on these names; the payload type of each
//! channel is fixed by the first registration in the channel registry.

/// Raw user registrations (`UserMessage`).
pub const USER_CHANNEL: &str = "users";

/// Raw addresses awaiting validation (`AddressMessage`).
pub const ADDRESS_VALIDATION_CHANNEL: &str = "address-validation";

/// Validated addresses (`ValidatedAddressMessage`).
pub const ADDRESS_CHANNEL: &str = "addresses";

/// Merged payment stream before taxation (`PaymentMessage`).
pub const PAYMENT_CHANNEL: &str = "payments";

/// Payments after taxation (`PaymentMessage`).
pub const TAXED_PAYMENT_CHANNEL: &str = "taxed-payments";

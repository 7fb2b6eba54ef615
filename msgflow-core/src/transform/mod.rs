//! Transform stages.
//!
//! A stage is a pure function from one channel's payload to another's. The
//! registry calls it once per message on the input channel and publishes
//! the result on the output channel, so a stage never sees the registry and
//! never mutates its input.
//!
//! - `AddressValidator`: `AddressMessage` -> `ValidatedAddressMessage`
//! - `PaymentTaxer`: `PaymentMessage` -> `PaymentMessage`

pub mod address;
pub mod payment;

pub use address::AddressValidator;
pub use payment::PaymentTaxer;

/// A pure, per-message transformation.
///
/// Implementations must not keep state across messages: the same input
/// always yields the same output, whatever came before it.
pub trait TransformStage<I>: Send + Sync + 'static {
    type Output;

    fn apply(&self, input: I) -> Self::Output;
}

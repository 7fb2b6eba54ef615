//! Message types and channel names shared by msgflow producers and consumers.

#![forbid(unsafe_code)]

pub mod channels;
pub mod objects;

pub use objects::{AddressMessage, PaymentMessage, UserMessage, ValidatedAddressMessage};

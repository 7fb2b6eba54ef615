pub mod address;
pub mod payment;
pub mod user;

pub use address::{AddressMessage, ValidatedAddressMessage};
pub use payment::PaymentMessage;
pub use user::UserMessage;

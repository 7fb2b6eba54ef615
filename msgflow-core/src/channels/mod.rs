//! Named, typed channels.
//!
//! Wiring happens once on a [`ChannelRegistryBuilder`]. [`build()`] freezes
//! the subscriber lists into an immutable [`ChannelRegistry`], so steady-state
//! delivery never takes a lock.
//!
//! # Delivery
//!
//! 1. `publish` looks the channel up by name and checks the payload type
//! 2. every consumer receives its own clone of the message (fan-out)
//! 3. a consumer that returns `Err` or panics is logged and counted; the
//!    publisher and the sibling consumers never see the failure
//! 4. a transform stage is just a consumer that republishes its output on
//!    another channel
//!
//! [`build()`]: ChannelRegistryBuilder::build

mod error;
mod publisher;
mod registry;

pub use error::ChannelError;
pub use publisher::Publisher;
pub use registry::{ChannelRegistry, ChannelRegistryBuilder, ChannelStats, Delivery};

/// Anything that can travel through a channel.
///
/// Messages are immutable values; each consumer gets its own clone.
pub trait Message: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Message for T {}

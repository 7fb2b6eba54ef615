use super::{ChannelError, ChannelRegistry, Delivery, Message};
use std::marker::PhantomData;
use std::sync::Arc;

/// A typed handle to one channel.
///
/// The channel name and payload type are checked once when the handle is
/// created, so producers resolve their channel at startup instead of on
/// every send.
pub struct Publisher<T> {
    registry: Arc<ChannelRegistry>,
    channel: Arc<str>,
    _payload: PhantomData<fn(T)>,
}

impl<T: Message> Publisher<T> {
    pub fn new(registry: Arc<ChannelRegistry>, channel: &str) -> Result<Self, ChannelError> {
        registry.check::<T>(channel)?;
        Ok(Self {
            registry,
            channel: Arc::from(channel),
            _payload: PhantomData,
        })
    }

    pub fn publish(&self, message: T) -> Result<Delivery, ChannelError> {
        self.registry.publish(&self.channel, message)
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            channel: Arc::clone(&self.channel),
            _payload: PhantomData,
        }
    }
}

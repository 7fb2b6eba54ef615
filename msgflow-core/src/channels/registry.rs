use super::{ChannelError, Message, Publisher};
use crate::transform::TransformStage;
use serde::Serialize;
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, warn};

type Handler<T> = Box<dyn Fn(&ChannelRegistry, T) -> anyhow::Result<()> + Send + Sync>;

struct Consumer<T> {
    label: String,
    handler: Handler<T>,
}

struct Channel<T> {
    consumers: Vec<Consumer<T>>,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Type-erased channel plus its wiring metadata.
struct Slot {
    payload: &'static str,
    channel: Box<dyn Any + Send + Sync>,
    consumers: usize,
    producers: usize,
    transform_output: Option<String>,
    counters: Counters,
}

impl Slot {
    fn new<T: Message>() -> Self {
        Self {
            payload: std::any::type_name::<T>(),
            channel: Box::new(Channel::<T> {
                consumers: Vec::new(),
            }),
            consumers: 0,
            producers: 0,
            transform_output: None,
            counters: Counters::default(),
        }
    }

    fn channel<T: Message>(&self) -> Option<&Channel<T>> {
        self.channel.downcast_ref::<Channel<T>>()
    }

    fn channel_mut<T: Message>(&mut self) -> Option<&mut Channel<T>> {
        self.channel.downcast_mut::<Channel<T>>()
    }
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Delivery {
    /// Consumers that handled the message.
    pub delivered: usize,
    /// Consumers that returned an error or panicked.
    pub failed: usize,
}

/// Counters for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub name: String,
    pub payload: &'static str,
    pub consumers: usize,
    pub published: u64,
    pub delivered: u64,
    pub failed: u64,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects channel wiring before the registry is frozen.
///
/// Channels are created on first use. The first registration fixes the
/// payload type; any later registration with a different type fails with
/// [`ChannelError::TypeMismatch`].
#[derive(Default)]
pub struct ChannelRegistryBuilder {
    slots: BTreeMap<String, Slot>,
}

impl ChannelRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce that something outside the registry publishes `T` on `name`.
    pub fn declare<T: Message>(&mut self, name: &str) -> Result<&mut Self, ChannelError> {
        self.slot::<T>(name)?.producers += 1;
        Ok(self)
    }

    /// Register a consumer for every future message on `name`.
    ///
    /// `label` only shows up in logs.
    pub fn subscribe<T, F>(
        &mut self,
        name: &str,
        label: impl Into<String>,
        sink: F,
    ) -> Result<&mut Self, ChannelError>
    where
        T: Message,
        F: Fn(T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler: Handler<T> =
            Box::new(move |_registry: &ChannelRegistry, message: T| sink(message));
        self.push_consumer(name, label.into(), handler)?;
        Ok(self)
    }

    /// Feed every message on `input` through `stage` and publish the result
    /// on `output`.
    ///
    /// A channel feeds at most one transform stage.
    pub fn transform<I, S>(
        &mut self,
        input: &str,
        output: &str,
        stage: S,
    ) -> Result<&mut Self, ChannelError>
    where
        I: Message,
        S: TransformStage<I>,
        S::Output: Message,
    {
        if input == output {
            return Err(ChannelError::TransformCycle {
                channel: input.to_string(),
            });
        }
        if self.slot::<I>(input)?.transform_output.is_some() {
            return Err(ChannelError::DuplicateTransform {
                channel: input.to_string(),
            });
        }
        self.slot::<S::Output>(output)?.producers += 1;

        let target = output.to_string();
        let handler: Handler<I> = Box::new(move |registry: &ChannelRegistry, message: I| {
            registry.publish(&target, stage.apply(message))?;
            Ok(())
        });
        self.push_consumer(input, format!("{input} -> {output}"), handler)?;
        self.slot::<I>(input)?.transform_output = Some(output.to_string());
        Ok(self)
    }

    /// Freeze the wiring.
    ///
    /// Fails if a channel has consumers but no producer, or if transform
    /// stages feed each other in a loop.
    pub fn build(self) -> Result<ChannelRegistry, ChannelError> {
        for (name, slot) in &self.slots {
            if slot.consumers > 0 && slot.producers == 0 {
                return Err(ChannelError::NoProducer {
                    channel: name.clone(),
                });
            }
        }

        for start in self.slots.keys() {
            let mut seen = HashSet::new();
            let mut current = start.as_str();
            while let Some(next) = self
                .slots
                .get(current)
                .and_then(|slot| slot.transform_output.as_deref())
            {
                if !seen.insert(current) {
                    return Err(ChannelError::TransformCycle {
                        channel: current.to_string(),
                    });
                }
                current = next;
            }
        }

        debug!(channels = self.slots.len(), "Channel registry built");
        Ok(ChannelRegistry { slots: self.slots })
    }

    fn slot<T: Message>(&mut self, name: &str) -> Result<&mut Slot, ChannelError> {
        if name.trim().is_empty() {
            return Err(ChannelError::InvalidName);
        }
        let slot = self
            .slots
            .entry(name.to_string())
            .or_insert_with(Slot::new::<T>);
        if !slot.channel.is::<Channel<T>>() {
            return Err(ChannelError::type_mismatch::<T>(name, slot.payload));
        }
        Ok(slot)
    }

    fn push_consumer<T: Message>(
        &mut self,
        name: &str,
        label: String,
        handler: Handler<T>,
    ) -> Result<(), ChannelError> {
        let slot = self.slot::<T>(name)?;
        let payload = slot.payload;
        slot.channel_mut::<T>()
            .ok_or_else(|| ChannelError::type_mismatch::<T>(name, payload))?
            .consumers
            .push(Consumer { label, handler });
        slot.consumers += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Frozen channel wiring.
///
/// Consumer lists never change after [`ChannelRegistryBuilder::build`], so
/// the registry is shared behind an `Arc` and read without locking.
pub struct ChannelRegistry {
    slots: BTreeMap<String, Slot>,
}

impl ChannelRegistry {
    pub fn builder() -> ChannelRegistryBuilder {
        ChannelRegistryBuilder::new()
    }

    /// Deliver `message` to every consumer of `name`.
    ///
    /// Consumers run one after another on the caller's task, in
    /// registration order. A failing consumer is logged and counted and the
    /// remaining consumers still run.
    pub fn publish<T: Message>(&self, name: &str, message: T) -> Result<Delivery, ChannelError> {
        let slot = self
            .slots
            .get(name)
            .ok_or_else(|| ChannelError::UnknownChannel(name.to_string()))?;
        let channel = slot
            .channel::<T>()
            .ok_or_else(|| ChannelError::type_mismatch::<T>(name, slot.payload))?;
        slot.counters.published.fetch_add(1, Ordering::Relaxed);

        let mut delivery = Delivery::default();
        for consumer in &channel.consumers {
            let outcome =
                catch_unwind(AssertUnwindSafe(|| (consumer.handler)(self, message.clone())));
            match outcome {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(e)) => {
                    delivery.failed += 1;
                    warn!(
                        channel = name,
                        consumer = %consumer.label,
                        error = %e,
                        "Consumer failed"
                    );
                }
                Err(payload) => {
                    delivery.failed += 1;
                    error!(
                        channel = name,
                        consumer = %consumer.label,
                        panic = panic_message(&*payload),
                        "Consumer panicked"
                    );
                }
            }
        }

        slot.counters
            .delivered
            .fetch_add(delivery.delivered as u64, Ordering::Relaxed);
        slot.counters
            .failed
            .fetch_add(delivery.failed as u64, Ordering::Relaxed);

        debug!(
            channel = name,
            delivered = delivery.delivered,
            failed = delivery.failed,
            "Published message"
        );
        Ok(delivery)
    }

    /// Resolve a typed handle to `name`.
    pub fn publisher<T: Message>(self: &Arc<Self>, name: &str) -> Result<Publisher<T>, ChannelError> {
        Publisher::new(Arc::clone(self), name)
    }

    /// Check that `name` exists and carries `T`.
    pub fn check<T: Message>(&self, name: &str) -> Result<(), ChannelError> {
        let slot = self
            .slots
            .get(name)
            .ok_or_else(|| ChannelError::UnknownChannel(name.to_string()))?;
        if slot.channel::<T>().is_none() {
            return Err(ChannelError::type_mismatch::<T>(name, slot.payload));
        }
        Ok(())
    }

    /// Number of consumers on `name`, or `None` if the channel is unknown.
    pub fn consumer_count(&self, name: &str) -> Option<usize> {
        self.slots.get(name).map(|slot| slot.consumers)
    }

    /// Snapshot of every channel's counters, ordered by name.
    pub fn stats(&self) -> Vec<ChannelStats> {
        self.slots
            .iter()
            .map(|(name, slot)| ChannelStats {
                name: name.clone(),
                payload: slot.payload,
                consumers: slot.consumers,
                published: slot.counters.published.load(Ordering::Relaxed),
                delivered: slot.counters.delivered.load(Ordering::Relaxed),
                failed: slot.counters.failed.load(Ordering::Relaxed),
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

//! The pipeline driver.
//!
//! Owns the three flows and their lifecycle:
//!
//! - users: `users` channel straight to the user sinks
//! - addresses: `address-validation` -> [`AddressValidator`] -> `addresses`
//!   -> validated address sinks
//! - payments: periodic sources -> merge queue -> `payments` ->
//!   [`PaymentTaxer`] -> `taxed-payments` -> payment sinks
//!
//! All wiring happens in [`PipelineBuilder::start`]. After that the
//! registry is frozen and the only way in is a [`PipelineHandle`].

mod health;
mod payment_flow;

pub use health::{FlowStatus, PipelineHealth, PipelineStats, SourceHealth};

use crate::channels::{ChannelError, ChannelRegistry, Delivery, Publisher};
use crate::config::{ConfigError, PipelineConfig};
use crate::stream::{
    MergeStats, SourceState, StreamMerger, StreamSource, taxed_payment_source,
    untaxed_payment_source,
};
use crate::transform::{AddressValidator, PaymentTaxer};
use msgflow_sdk::channels::{
    ADDRESS_CHANNEL, ADDRESS_VALIDATION_CHANNEL, PAYMENT_CHANNEL, TAXED_PAYMENT_CHANNEL,
    USER_CHANNEL,
};
use msgflow_sdk::{AddressMessage, PaymentMessage, UserMessage, ValidatedAddressMessage};
use payment_flow::PaymentSupervisor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("pipeline is stopped")]
    Stopped,
}

type Sink<T> = Box<dyn Fn(T) -> anyhow::Result<()> + Send + Sync>;

/// Entry point for wiring a pipeline.
pub struct Pipeline;

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            user_sinks: Vec::new(),
            address_sinks: Vec::new(),
            payment_sinks: Vec::new(),
            payment_sources: None,
        }
    }
}

/// Collects sinks and sources until [`start`](Self::start).
///
/// Every `on_*` method may be called more than once; each sink gets its own
/// copy of every message.
pub struct PipelineBuilder {
    config: PipelineConfig,
    user_sinks: Vec<(String, Sink<UserMessage>)>,
    address_sinks: Vec<(String, Sink<ValidatedAddressMessage>)>,
    payment_sinks: Vec<(String, Sink<PaymentMessage>)>,
    payment_sources: Option<Vec<StreamSource<PaymentMessage>>>,
}

impl PipelineBuilder {
    pub fn on_user<F>(mut self, label: impl Into<String>, sink: F) -> Self
    where
        F: Fn(UserMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.user_sinks.push((label.into(), Box::new(sink)));
        self
    }

    pub fn on_validated_address<F>(mut self, label: impl Into<String>, sink: F) -> Self
    where
        F: Fn(ValidatedAddressMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.address_sinks.push((label.into(), Box::new(sink)));
        self
    }

    /// Receives payments after taxation.
    pub fn on_taxed_payment<F>(mut self, label: impl Into<String>, sink: F) -> Self
    where
        F: Fn(PaymentMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.payment_sinks.push((label.into(), Box::new(sink)));
        self
    }

    /// Replace the built-in Apple and Orange sources.
    pub fn payment_sources(mut self, sources: Vec<StreamSource<PaymentMessage>>) -> Self {
        self.payment_sources = Some(sources);
        self
    }

    /// Wire every channel, freeze the registry and spawn the payment flow.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn start(self) -> Result<RunningPipeline, PipelineError> {
        let config = self.config;
        config.validate()?;

        let mut builder = ChannelRegistry::builder();
        builder
            .declare::<UserMessage>(USER_CHANNEL)?
            .declare::<AddressMessage>(ADDRESS_VALIDATION_CHANNEL)?
            .declare::<PaymentMessage>(PAYMENT_CHANNEL)?;
        builder.transform::<AddressMessage, _>(
            ADDRESS_VALIDATION_CHANNEL,
            ADDRESS_CHANNEL,
            AddressValidator::new(config.invalid_postcode.clone()),
        )?;
        builder.transform::<PaymentMessage, _>(
            PAYMENT_CHANNEL,
            TAXED_PAYMENT_CHANNEL,
            PaymentTaxer::new(config.tax_rate),
        )?;
        for (label, sink) in self.user_sinks {
            builder.subscribe::<UserMessage, _>(USER_CHANNEL, label, sink)?;
        }
        for (label, sink) in self.address_sinks {
            builder.subscribe::<ValidatedAddressMessage, _>(ADDRESS_CHANNEL, label, sink)?;
        }
        for (label, sink) in self.payment_sinks {
            builder.subscribe::<PaymentMessage, _>(TAXED_PAYMENT_CHANNEL, label, sink)?;
        }
        let registry = Arc::new(builder.build()?);

        let users = registry.publisher::<UserMessage>(USER_CHANNEL)?;
        let addresses = registry.publisher::<AddressMessage>(ADDRESS_VALIDATION_CHANNEL)?;
        let payments = registry.publisher::<PaymentMessage>(PAYMENT_CHANNEL)?;

        let sources = match self.payment_sources {
            Some(sources) => sources,
            None => vec![
                untaxed_payment_source(config.untaxed_interval()?)?,
                taxed_payment_source(config.taxed_interval()?)?,
            ],
        };
        let merger = sources
            .into_iter()
            .fold(StreamMerger::new(config.merge), StreamMerger::with_source);
        let source_count = merger.source_count();

        let shutdown_tx = Arc::new(watch::Sender::new(false));
        let merge = merger.spawn(payments, shutdown_tx.subscribe());
        let payment_status = Arc::new(watch::Sender::new(FlowStatus::Running));

        let shared = Arc::new(Shared {
            registry,
            users,
            addresses,
            gate: Gate::default(),
            payment_status: Arc::clone(&payment_status),
            sources: merge.states(),
            merge: merge.stats(),
        });

        let supervisor = tokio::spawn(
            PaymentSupervisor {
                merge,
                shutdown_tx: Arc::clone(&shutdown_tx),
                status: payment_status,
            }
            .run(),
        );

        info!(
            tax_rate = %config.tax_rate,
            invalid_postcode = %config.invalid_postcode,
            sources = source_count,
            overflow = ?config.merge.overflow,
            capacity = config.merge.capacity.get(),
            "Pipeline started"
        );

        Ok(RunningPipeline {
            shared,
            shutdown_tx,
            supervisor: Some(supervisor),
        })
    }
}

struct Shared {
    registry: Arc<ChannelRegistry>,
    users: Publisher<UserMessage>,
    addresses: Publisher<AddressMessage>,
    gate: Gate,
    payment_status: Arc<watch::Sender<FlowStatus>>,
    sources: Vec<(String, watch::Receiver<SourceState>)>,
    merge: Arc<MergeStats>,
}

/// Producer gate for the user and address flows.
///
/// Every publish holds a [`Pass`] for the length of its delivery. Closing
/// refuses new passes and then waits for the outstanding ones; it never
/// blocks a publisher, so a sink may publish again while a stop is pending
/// and simply gets [`PipelineError::Stopped`].
#[derive(Default)]
struct Gate {
    closed: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
}

impl Gate {
    fn enter(&self) -> Option<Pass<'_>> {
        // Count first so a concurrent `close` either sees us or we see it.
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let pass = Pass { gate: self };
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        Some(pass)
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Refuse new passes and wait until every outstanding one is dropped.
    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        loop {
            let idle = self.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }
}

/// One delivery in progress.
struct Pass<'a> {
    gate: &'a Gate,
}

impl Drop for Pass<'_> {
    fn drop(&mut self) {
        if self.gate.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.gate.idle.notify_waiters();
        }
    }
}

/// Cloneable producer and monitoring handle.
#[derive(Clone)]
pub struct PipelineHandle {
    shared: Arc<Shared>,
}

impl PipelineHandle {
    /// Publish a user to every user sink.
    pub fn publish_user(&self, user: UserMessage) -> Result<Delivery, PipelineError> {
        let _pass = self.shared.gate.enter().ok_or(PipelineError::Stopped)?;
        debug!(email = %user.email, "Publishing user");
        Ok(self.shared.users.publish(user)?)
    }

    /// Publish an address for validation.
    ///
    /// The returned report counts the validation stage, not the sinks behind
    /// it.
    pub fn publish_address(&self, address: AddressMessage) -> Result<Delivery, PipelineError> {
        let _pass = self.shared.gate.enter().ok_or(PipelineError::Stopped)?;
        debug!(city = %address.city, postcode = %address.postcode, "Publishing address");
        Ok(self.shared.addresses.publish(address)?)
    }

    pub fn health(&self) -> PipelineHealth {
        let synchronous = if self.shared.gate.is_open() {
            FlowStatus::Running
        } else {
            FlowStatus::Stopped
        };
        PipelineHealth {
            users: synchronous.clone(),
            addresses: synchronous,
            payments: self.shared.payment_status.borrow().clone(),
            sources: self
                .shared
                .sources
                .iter()
                .map(|(name, state)| SourceHealth {
                    name: name.clone(),
                    state: *state.borrow(),
                })
                .collect(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            channels: self.shared.registry.stats(),
            merge: self.shared.merge.snapshot(),
        }
    }
}

/// A started pipeline. Dropping it cancels the payment flow without
/// waiting for it.
pub struct RunningPipeline {
    shared: Arc<Shared>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    supervisor: Option<JoinHandle<()>>,
}

impl RunningPipeline {
    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Cancel the payment sources and forwarder, wait for them, then close
    /// the registry to producers.
    ///
    /// Deliveries already in progress complete before this returns, and no
    /// sink runs afterwards. A sink that publishes through a handle while
    /// the stop is pending gets [`PipelineError::Stopped`]. Calling it again
    /// does nothing.
    pub async fn stop(&mut self) {
        let Some(supervisor) = self.supervisor.take() else {
            return;
        };
        info!("Stopping pipeline");

        self.shutdown_tx.send_replace(true);
        if let Err(e) = supervisor.await {
            error!(error = %e, "Payment supervisor crashed");
        }

        self.shared.gate.close().await;
        self.shared.payment_status.send_if_modified(|status| {
            if status.is_running() {
                *status = FlowStatus::Stopped;
                true
            } else {
                false
            }
        });
        info!("Pipeline stopped");
    }
}

impl Drop for RunningPipeline {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MergeConfig, OverflowPolicy};
    use rust_decimal_macros::dec;
    use std::num::NonZeroUsize;
    use std::sync::{Mutex, OnceLock, mpsc};
    use std::time::Duration;

    fn config() -> PipelineConfig {
        PipelineConfig::new(MergeConfig::new(
            NonZeroUsize::new(64).unwrap(),
            OverflowPolicy::Block,
        ))
    }

    fn recorder<T: Send + 'static>() -> (
        Arc<Mutex<Vec<T>>>,
        impl Fn(T) -> anyhow::Result<()> + Send + Sync + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |message: T| {
            sink.lock().unwrap().push(message);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_user_reaches_sink_once() {
        let (users, sink) = recorder::<UserMessage>();
        let mut pipeline = Pipeline::builder(config())
            .on_user("save", sink)
            .payment_sources(Vec::new())
            .start()
            .unwrap();

        let user = UserMessage::new("test@test.com", "John", "Doe", 20);
        let delivery = pipeline.handle().publish_user(user.clone()).unwrap();

        assert_eq!(delivery.delivered, 1);
        assert_eq!(*users.lock().unwrap(), vec![user]);
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_addresses_are_validated_before_sinks() {
        let (addresses, sink) = recorder::<ValidatedAddressMessage>();
        let mut pipeline = Pipeline::builder(config())
            .on_validated_address("save", sink)
            .payment_sources(Vec::new())
            .start()
            .unwrap();
        let handle = pipeline.handle();

        let good = AddressMessage::new("1 Sheffield Way", "City Center", "Sheffield", "S1 SHF");
        let bad = AddressMessage::new("X", "X", "X", "XXX");
        handle.publish_address(good.clone()).unwrap();
        handle.publish_address(bad.clone()).unwrap();

        let seen = addresses.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].is_valid);
        assert_eq!(seen[0].data, good);
        assert!(!seen[1].is_valid);
        assert_eq!(seen[1].data, bad);
        pipeline.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_payments_are_merged_and_taxed() {
        let (payments, sink) = recorder::<PaymentMessage>();
        let mut pipeline = Pipeline::builder(config())
            .on_taxed_payment("save", sink)
            .start()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        pipeline.stop().await;

        let seen = payments.lock().unwrap().clone();
        let apple: Vec<_> = seen.iter().filter(|p| p.vendor == "Apple").collect();
        let orange: Vec<_> = seen.iter().filter(|p| p.vendor == "Orange").collect();

        assert_eq!(apple.len(), 2);
        assert!(apple.iter().all(|p| p.taxed && p.taxed_amount == dec!(120.0)));
        assert_eq!(orange.len(), 10);
        assert!(orange.iter().all(|p| p.taxed && p.taxed_amount == dec!(240.0)));

        let stats = pipeline.handle().stats();
        assert_eq!(stats.merge.forwarded, 12);
        assert_eq!(stats.merge.dropped, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sink_runs_after_stop() {
        let (users, user_sink) = recorder::<UserMessage>();
        let (payments, payment_sink) = recorder::<PaymentMessage>();
        let mut pipeline = Pipeline::builder(config())
            .on_user("save", user_sink)
            .on_taxed_payment("save", payment_sink)
            .start()
            .unwrap();
        let handle = pipeline.handle();

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        pipeline.stop().await;
        pipeline.stop().await;
        let delivered = payments.lock().unwrap().len();
        assert_eq!(delivered, 3);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(payments.lock().unwrap().len(), delivered);

        let user = UserMessage::new("late@test.com", "Late", "User", 30);
        assert!(matches!(handle.publish_user(user), Err(PipelineError::Stopped)));
        assert!(users.lock().unwrap().is_empty());

        let health = handle.health();
        assert_eq!(health.users, FlowStatus::Stopped);
        assert_eq!(health.payments, FlowStatus::Stopped);
        assert!(health.sources.iter().all(|s| s.state == SourceState::Cancelled));
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_affect_siblings() {
        let (users, sink) = recorder::<UserMessage>();
        let mut pipeline = Pipeline::builder(config())
            .on_user("broken", |_: UserMessage| -> anyhow::Result<()> {
                panic!("sink exploded")
            })
            .on_user("failing", |_: UserMessage| -> anyhow::Result<()> {
                anyhow::bail!("disk full")
            })
            .on_user("save", sink)
            .payment_sources(Vec::new())
            .start()
            .unwrap();

        let user = UserMessage::new("test@test.com", "John", "Doe", 20);
        let delivery = pipeline.handle().publish_user(user.clone()).unwrap();

        assert_eq!(delivery.delivered, 1);
        assert_eq!(delivery.failed, 2);
        assert_eq!(*users.lock().unwrap(), vec![user]);

        let stats = pipeline.handle().stats();
        let channel = stats
            .channels
            .iter()
            .find(|c| c.name == USER_CHANNEL)
            .unwrap();
        assert_eq!(channel.failed, 2);
        pipeline.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_failure_fails_only_the_payment_flow() {
        let (users, sink) = recorder::<UserMessage>();
        let finite = StreamSource::from_stream(
            "finite",
            tokio_stream::iter(vec![PaymentMessage::untaxed(dec!(10), "Pear")]),
        );
        let ticking = StreamSource::periodic("ticking", Duration::from_secs(1), |_| {
            PaymentMessage::untaxed(dec!(1), "Fig")
        })
        .unwrap();
        let mut pipeline = Pipeline::builder(config())
            .on_user("save", sink)
            .payment_sources(vec![finite, ticking])
            .start()
            .unwrap();
        let handle = pipeline.handle();

        let mut health = handle.health();
        for _ in 0..100 {
            if !health.payments.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            health = handle.health();
        }

        assert!(matches!(health.payments, FlowStatus::Failed { .. }));
        assert_eq!(health.sources[0].state, SourceState::Failed);
        assert!(health.users.is_running());

        let user = UserMessage::new("test@test.com", "John", "Doe", 20);
        assert_eq!(handle.publish_user(user).unwrap().delivered, 1);
        assert_eq!(users.lock().unwrap().len(), 1);

        pipeline.stop().await;
        assert!(matches!(handle.health().payments, FlowStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn test_invalid_config_aborts_start() {
        let mut config = config();
        config.tax_rate = dec!(-1);

        let result = Pipeline::builder(config).start();
        assert!(matches!(
            result,
            Err(PipelineError::Config(ConfigError::NegativeTaxRate(_)))
        ));
    }

    #[tokio::test]
    async fn test_oversized_config_aborts_start() {
        for overflow in [OverflowPolicy::Block, OverflowPolicy::DropOldest] {
            let mut config = config();
            config.merge = MergeConfig::new(NonZeroUsize::new(usize::MAX >> 2).unwrap(), overflow);

            let result = Pipeline::builder(config).start();
            assert!(matches!(
                result,
                Err(PipelineError::Config(ConfigError::CapacityTooLarge { .. }))
            ));
        }

        let mut config = config();
        config.time_unit = Duration::from_millis(u64::MAX);
        config.untaxed_period = std::num::NonZeroU32::MAX;
        let result = Pipeline::builder(config).start();
        assert!(matches!(
            result,
            Err(PipelineError::Config(ConfigError::PeriodTooLarge(_)))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_waits_for_sink_that_publishes_again() {
        let slot: Arc<OnceLock<PipelineHandle>> = Arc::new(OnceLock::new());
        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let (resume_tx, resume_rx) = mpsc::channel::<()>();
        let (nested_tx, nested_rx) = mpsc::channel::<bool>();
        let entered_tx = Mutex::new(entered_tx);
        let resume_rx = Mutex::new(resume_rx);
        let nested_tx = Mutex::new(nested_tx);

        let sink_slot = Arc::clone(&slot);
        let sink = move |user: UserMessage| -> anyhow::Result<()> {
            if user.age != 20 {
                return Ok(());
            }
            entered_tx.lock().unwrap().send(()).unwrap();
            resume_rx.lock().unwrap().recv().unwrap();
            let nested = sink_slot.get().unwrap().publish_user(UserMessage::new(
                "nested@test.com",
                "Nested",
                "User",
                21,
            ));
            let refused = matches!(nested, Err(PipelineError::Stopped));
            nested_tx.lock().unwrap().send(refused).unwrap();
            Ok(())
        };

        let mut pipeline = Pipeline::builder(config())
            .on_user("republish", sink)
            .payment_sources(Vec::new())
            .start()
            .unwrap();
        let handle = pipeline.handle();
        assert!(slot.set(handle.clone()).is_ok());

        let publisher = handle.clone();
        let outer = tokio::task::spawn_blocking(move || {
            publisher.publish_user(UserMessage::new("test@test.com", "John", "Doe", 20))
        });
        tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .unwrap()
            .unwrap();

        let stopper = tokio::spawn(async move { pipeline.stop().await });
        while handle.health().users.is_running() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(!stopper.is_finished());

        resume_tx.send(()).unwrap();
        let delivery = outer.await.unwrap().unwrap();
        assert_eq!(delivery.delivered, 1);

        tokio::time::timeout(Duration::from_secs(5), stopper)
            .await
            .unwrap()
            .unwrap();
        assert!(nested_rx.recv().unwrap());
    }
}

//! Periodic stream sources.
//!
//! A source is a lazy, infinite sequence. Its timer is only created once the
//! source starts running, the first element arrives one full period after
//! that, and the source never ends by itself: it stops when cancelled or
//! when its timer stream breaks.
//!
//! ```text
//! Idle --tick--> Emit --pushed--> Idle --> ... --> Cancelled | Failed
//! ```

use super::queue::MergeSender;
use crate::channels::Message;
use crate::config::ConfigError;
use serde::Serialize;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info};

type TickStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

type Factory<T> = Box<dyn FnMut(u64) -> T + Send>;

/// Observable state of a running source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    /// Waiting for the next tick.
    Idle,
    /// A tick fired and its element is being enqueued.
    Emit,
    /// Stopped by the shutdown signal. Terminal.
    Cancelled,
    /// Stopped for any other reason. Terminal.
    Failed,
}

impl SourceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SourceState::Cancelled | SourceState::Failed)
    }
}

/// Why a source task returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceExit {
    /// The shutdown signal fired.
    Cancelled,
    /// The tick stream ended, which a healthy timer never does.
    Exhausted,
    /// The merge queue's reader went away.
    QueueClosed,
}

enum Ticks<T> {
    Periodic { period: Duration, make: Factory<T> },
    Stream(TickStream<T>),
}

/// A named, non-restartable sequence of elements.
pub struct StreamSource<T> {
    name: String,
    ticks: Ticks<T>,
}

impl<T: Message> StreamSource<T> {
    /// Emit `make(n)` for the n-th tick, one tick every `period`.
    pub fn periodic<F>(name: impl Into<String>, period: Duration, make: F) -> Result<Self, ConfigError>
    where
        F: FnMut(u64) -> T + Send + 'static,
    {
        let name = name.into();
        if period.is_zero() {
            return Err(ConfigError::ZeroPeriod(name));
        }
        if std::time::Instant::now().checked_add(period).is_none() {
            return Err(ConfigError::PeriodTooLarge(name));
        }
        Ok(Self {
            name,
            ticks: Ticks::Periodic {
                period,
                make: Box::new(make),
            },
        })
    }

    /// Wrap an arbitrary tick stream.
    ///
    /// The stream is expected to be infinite; if it ends, the source reports
    /// [`SourceExit::Exhausted`].
    pub fn from_stream<S>(name: impl Into<String>, stream: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Self {
            name: name.into(),
            ticks: Ticks::Stream(Box::pin(stream)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start the timer and expose the source as a stream.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn into_stream(self) -> TickStream<T> {
        match self.ticks {
            Ticks::Periodic { period, mut make } => {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                let mut sequence = 0u64;
                Box::pin(IntervalStream::new(interval).map(move |_| {
                    let item = make(sequence);
                    sequence += 1;
                    item
                }))
            }
            Ticks::Stream(stream) => stream,
        }
    }

    /// Push every element into `queue` until cancelled.
    ///
    /// The shutdown flag is checked after every tick, before the element
    /// is enqueued, so nothing is emitted once cancellation is visible.
    pub async fn run(
        self,
        queue: MergeSender<T>,
        mut shutdown_rx: watch::Receiver<bool>,
        state_tx: &watch::Sender<SourceState>,
    ) -> SourceExit {
        let name = self.name.clone();
        let mut ticks = self.into_stream();
        info!(source = %name, "Stream source started");

        let exit = loop {
            if *shutdown_rx.borrow_and_update() {
                break SourceExit::Cancelled;
            }

            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break SourceExit::Cancelled;
                    }
                }

                next = ticks.next() => {
                    let Some(item) = next else {
                        break SourceExit::Exhausted;
                    };
                    if *shutdown_rx.borrow() {
                        break SourceExit::Cancelled;
                    }

                    state_tx.send_replace(SourceState::Emit);
                    tokio::select! {
                        biased;

                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break SourceExit::Cancelled;
                            }
                        }

                        pushed = queue.push(item) => {
                            if pushed.is_err() {
                                break SourceExit::QueueClosed;
                            }
                            debug!(source = %name, "Emitted element");
                        }
                    }
                    state_tx.send_replace(SourceState::Idle);
                }
            }
        };

        match exit {
            SourceExit::Cancelled => {
                state_tx.send_replace(SourceState::Cancelled);
                info!(source = %name, "Stream source cancelled");
            }
            SourceExit::Exhausted | SourceExit::QueueClosed => {
                state_tx.send_replace(SourceState::Failed);
                error!(source = %name, exit = ?exit, "Stream source stopped unexpectedly");
            }
        }
        exit
    }
}

//! Bounded merge queue.
//!
//! Many writers (one per source), one reader. The overflow policy picks the
//! backing primitive:
//!
//! - `Block`: `tokio::sync::mpsc`; a full queue makes the writer wait
//! - `DropOldest`: `tokio::sync::broadcast` used as a ring; a lagging reader
//!   loses the oldest elements and the loss is added to [`MergeStats`]

use crate::channels::Message;
use crate::config::{MergeConfig, OverflowPolicy};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

/// The reader side is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("merge queue closed")]
pub struct QueueClosed;

/// Counters shared by both ends of a merge queue.
#[derive(Debug, Default)]
pub struct MergeStats {
    dropped: AtomicU64,
    forwarded: AtomicU64,
}

/// Point-in-time copy of [`MergeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSnapshot {
    pub dropped: u64,
    pub forwarded: u64,
}

impl MergeStats {
    /// Elements discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Elements handed on by the forwarder.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MergeSnapshot {
        MergeSnapshot {
            dropped: self.dropped(),
            forwarded: self.forwarded(),
        }
    }

    pub(crate) fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dropped(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }
}

/// Writer half. Clone one per source.
#[derive(Debug)]
pub enum MergeSender<T> {
    Block(mpsc::Sender<T>),
    DropOldest(broadcast::Sender<T>),
}

impl<T> Clone for MergeSender<T> {
    fn clone(&self) -> Self {
        match self {
            MergeSender::Block(tx) => MergeSender::Block(tx.clone()),
            MergeSender::DropOldest(tx) => MergeSender::DropOldest(tx.clone()),
        }
    }
}

impl<T: Message> MergeSender<T> {
    /// Enqueue one element.
    ///
    /// Under `Block` this waits while the queue is full. Under `DropOldest`
    /// it never waits.
    pub async fn push(&self, item: T) -> Result<(), QueueClosed> {
        match self {
            MergeSender::Block(tx) => tx.send(item).await.map_err(|_| QueueClosed),
            MergeSender::DropOldest(tx) => tx.send(item).map(|_| ()).map_err(|_| QueueClosed),
        }
    }
}

enum Inner<T> {
    Block(mpsc::Receiver<T>),
    DropOldest(broadcast::Receiver<T>),
}

/// Reader half.
pub struct MergeReceiver<T> {
    inner: Inner<T>,
    stats: Arc<MergeStats>,
}

/// The merged sequence, in arrival order.
pub type MergedStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

impl<T: Message> MergeReceiver<T> {
    pub fn stats(&self) -> Arc<MergeStats> {
        Arc::clone(&self.stats)
    }

    /// Turn the reader into a stream that ends once every writer is gone.
    pub fn into_stream(self) -> MergedStream<T> {
        match self.inner {
            Inner::Block(rx) => Box::pin(ReceiverStream::new(rx)),
            Inner::DropOldest(rx) => {
                let stats = self.stats;
                Box::pin(BroadcastStream::new(rx).filter_map(move |item| match item {
                    Ok(item) => Some(item),
                    Err(BroadcastStreamRecvError::Lagged(count)) => {
                        stats.record_dropped(count);
                        warn!(dropped = count, "Merge queue full, dropped oldest elements");
                        None
                    }
                }))
            }
        }
    }
}

/// Create a merge queue with the configured bound and overflow policy.
pub fn merge_queue<T: Message>(config: MergeConfig) -> (MergeSender<T>, MergeReceiver<T>) {
    let stats = Arc::new(MergeStats::default());
    let capacity = config.capacity.get();
    match config.overflow {
        OverflowPolicy::Block => {
            let (tx, rx) = mpsc::channel(capacity);
            (
                MergeSender::Block(tx),
                MergeReceiver {
                    inner: Inner::Block(rx),
                    stats,
                },
            )
        }
        OverflowPolicy::DropOldest => {
            let (tx, rx) = broadcast::channel(capacity);
            (
                MergeSender::DropOldest(tx),
                MergeReceiver {
                    inner: Inner::DropOldest(rx),
                    stats,
                },
            )
        }
    }
}

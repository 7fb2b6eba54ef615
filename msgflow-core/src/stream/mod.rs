//! Unbounded periodic sources and the bounded merger that combines them.
//!
//! # Flow
//!
//! 1. Each [`StreamSource`] runs on its own task and pushes into one
//!    shared [`MergeSender`]
//! 2. The merge queue bounds memory according to its [`OverflowPolicy`]
//! 3. A single forwarder task drains the queue in arrival order and
//!    publishes every element on a channel
//!
//! One `watch` shutdown signal reaches every source and the forwarder, so a
//! merged flow is cancelled as a unit.
//!
//! [`OverflowPolicy`]: crate::config::OverflowPolicy

pub mod merger;
pub mod payments;
pub mod queue;
pub mod source;

pub use merger::{MergeHandle, SourceOutcome, StreamMerger};
pub use payments::{taxed_payment_source, untaxed_payment_source};
pub use queue::{
    MergeReceiver, MergeSender, MergeSnapshot, MergeStats, MergedStream, QueueClosed, merge_queue,
};
pub use source::{SourceExit, SourceState, StreamSource};

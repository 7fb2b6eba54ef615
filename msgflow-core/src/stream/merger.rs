use super::queue::{MergeStats, merge_queue};
use super::source::{SourceExit, SourceState, StreamSource};
use crate::channels::{Message, Publisher};
use crate::config::MergeConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{Id, JoinHandle, JoinSet};
use tokio_stream::StreamExt;
use tracing::{debug, error, info};

/// How one source task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutcome {
    pub source: String,
    /// `Err` carries the panic or cancellation message of the task.
    pub result: Result<SourceExit, String>,
}

impl SourceOutcome {
    /// Anything other than a cooperative cancellation.
    pub fn is_failure(&self) -> bool {
        !matches!(self.result, Ok(SourceExit::Cancelled))
    }

    pub fn reason(&self) -> String {
        match &self.result {
            Ok(exit) => format!("source {} stopped: {exit:?}", self.source),
            Err(e) => format!("source {} crashed: {e}", self.source),
        }
    }
}

/// Combines any number of sources into one channel.
pub struct StreamMerger<T> {
    config: MergeConfig,
    sources: Vec<StreamSource<T>>,
}

impl<T: Message> StreamMerger<T> {
    pub fn new(config: MergeConfig) -> Self {
        Self {
            config,
            sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: StreamSource<T>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Spawn one task per source plus the forwarder that publishes the
    /// merged sequence through `publisher`.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn spawn(self, publisher: Publisher<T>, shutdown_rx: watch::Receiver<bool>) -> MergeHandle {
        let (queue_tx, queue_rx) = merge_queue::<T>(self.config);
        let stats = queue_rx.stats();

        let mut tasks = JoinSet::new();
        let mut names = HashMap::new();
        let mut states = Vec::with_capacity(self.sources.len());

        for source in self.sources {
            let name = source.name().to_string();
            let state = Arc::new(watch::Sender::new(SourceState::Idle));
            states.push((name.clone(), Arc::clone(&state)));

            let queue = queue_tx.clone();
            let shutdown = shutdown_rx.clone();
            let task_name = name.clone();
            let abort = tasks.spawn(async move {
                let exit = source.run(queue, shutdown, &state).await;
                (task_name, exit)
            });
            names.insert(abort.id(), name);
        }
        // the forwarder's stream ends once every source has dropped its writer
        drop(queue_tx);

        let channel = publisher.channel().to_string();
        let forwarder_stats = Arc::clone(&stats);
        let mut merged = queue_rx.into_stream();
        let mut shutdown = shutdown_rx;
        let forwarder = tokio::spawn(async move {
            info!(channel = %channel, "Merge forwarder started");
            loop {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }

                    next = merged.next() => {
                        let Some(item) = next else {
                            debug!(channel = %channel, "Merged stream ended");
                            break;
                        };
                        if *shutdown.borrow() {
                            break;
                        }
                        match publisher.publish(item) {
                            Ok(_) => forwarder_stats.record_forwarded(),
                            Err(e) => {
                                error!(channel = %channel, error = %e, "Failed to forward merged element");
                            }
                        }
                    }
                }
            }
            info!(
                channel = %channel,
                forwarded = forwarder_stats.forwarded(),
                dropped = forwarder_stats.dropped(),
                "Merge forwarder stopped"
            );
        });

        MergeHandle {
            tasks,
            names,
            states,
            forwarder: Some(forwarder),
            stats,
        }
    }
}

/// Owns the tasks of a spawned [`StreamMerger`].
pub struct MergeHandle {
    tasks: JoinSet<(String, SourceExit)>,
    names: HashMap<Id, String>,
    states: Vec<(String, Arc<watch::Sender<SourceState>>)>,
    forwarder: Option<JoinHandle<()>>,
    stats: Arc<MergeStats>,
}

impl MergeHandle {
    pub fn stats(&self) -> Arc<MergeStats> {
        Arc::clone(&self.stats)
    }

    /// A receiver per source, in the order the sources were added.
    pub fn states(&self) -> Vec<(String, watch::Receiver<SourceState>)> {
        self.states
            .iter()
            .map(|(name, state)| (name.clone(), state.subscribe()))
            .collect()
    }

    /// Wait for the next source task to end.
    ///
    /// Returns `None` once every source has ended.
    pub async fn next_exit(&mut self) -> Option<SourceOutcome> {
        let joined = self.tasks.join_next().await?;
        let outcome = match joined {
            Ok((source, exit)) => SourceOutcome {
                source,
                result: Ok(exit),
            },
            Err(e) => {
                let source = self
                    .names
                    .get(&e.id())
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string());
                // a panicking task never reached its own terminal state
                if let Some((_, state)) = self.states.iter().find(|(name, _)| *name == source) {
                    state.send_replace(SourceState::Failed);
                }
                SourceOutcome {
                    source,
                    result: Err(e.to_string()),
                }
            }
        };
        Some(outcome)
    }

    /// Drain every remaining source and the forwarder.
    ///
    /// Call after signalling shutdown; otherwise this waits forever.
    pub async fn join(mut self) -> Vec<SourceOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.next_exit().await {
            outcomes.push(outcome);
        }
        if let Some(forwarder) = self.forwarder.take()
            && let Err(e) = forwarder.await
        {
            error!(error = %e, "Merge forwarder crashed");
        }
        outcomes
    }
}

//! Read-only views of a running pipeline.

use crate::channels::ChannelStats;
use crate::stream::{MergeSnapshot, SourceState};
use serde::Serialize;

/// Lifecycle of one flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlowStatus {
    Running,
    Stopped,
    Failed { reason: String },
}

impl FlowStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, FlowStatus::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceHealth {
    pub name: String,
    pub state: SourceState,
}

/// Status of the user, address and payment flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineHealth {
    pub users: FlowStatus,
    pub addresses: FlowStatus,
    pub payments: FlowStatus,
    pub sources: Vec<SourceHealth>,
}

impl PipelineHealth {
    /// True while every flow is running.
    pub fn is_healthy(&self) -> bool {
        self.users.is_running() && self.addresses.is_running() && self.payments.is_running()
    }
}

/// Delivery counters per channel plus the merge queue counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub channels: Vec<ChannelStats>,
    pub merge: MergeSnapshot,
}

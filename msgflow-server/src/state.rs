//! Application state shared across all request handlers.

use msgflow_core::pipeline::PipelineHandle;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Producer and monitoring handle of the running pipeline.
    pub pipeline: PipelineHandle,
}

impl AppState {
    pub fn new(pipeline: PipelineHandle) -> Self {
        Self { pipeline }
    }
}

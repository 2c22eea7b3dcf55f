use std::fmt;

/// Lifecycle of a [`PipelineController`](crate::pipeline::PipelineController).
///
/// Failures are not states: a failed start ends in `Stopped` with the error
/// kept on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Loading,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl PipelineState {
    /// States from which `start` may be called.
    pub fn can_start(self) -> bool {
        matches!(self, PipelineState::Idle | PipelineState::Stopped)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Loading => "loading",
            PipelineState::Starting => "starting",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

use crate::context::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("No input device available")]
    NoInputDevice,

    #[error("Input device '{0}' not found")]
    DeviceNotFound(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The host refused access to the microphone.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unsupported sample format '{0}'")]
    UnsupportedSampleFormat(String),

    #[error("Failed to get stream config: {0}")]
    StreamConfig(String),

    #[error("Failed to build input stream: {0}")]
    BuildStream(String),

    #[error("Failed to play input stream: {0}")]
    PlayStream(String),

    #[error("Failed to load worklet module '{module}': {reason}")]
    ModuleLoad {
        module: &'static str,
        reason: String,
    },

    #[error("No worklet processor registered as '{0}'")]
    UnknownProcessor(String),

    #[error("Worklet processor '{processor}' has no parameter '{parameter}'")]
    MissingParameter {
        processor: &'static str,
        parameter: &'static str,
    },

    #[error("Invalid buffer size {size}: must be one of {supported:?} and a multiple of {quantum}")]
    InvalidBufferSize {
        size: usize,
        supported: &'static [usize],
        quantum: usize,
    },

    #[error("Invalid channel count {0}")]
    InvalidChannelCount(u16),

    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    #[error("Node {from} is not connected to node {to}")]
    NotConnected { from: NodeId, to: NodeId },

    #[error("Failed to spawn thread: {0}")]
    Thread(String),

    #[error("Resampler error: {0}")]
    Resampler(String),
}

pub type TargetFormat = f32;

/// Frames per delivered recorder block.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Buffer sizes a recorder node accepts.
pub const SUPPORTED_BUFFER_SIZES: &[usize] = &[256, 512, 1024, 2048, 4096, 8192, 16384];

/// Frames the context renders per quantum.
pub const RENDER_QUANTUM_SIZE: usize = 128;

pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Channels requested from the microphone.
pub const CAPTURE_CHANNEL_COUNT: u16 = 1;

/// Polling interval (ms) for threads waiting on a stop signal.
pub const CLOCK_DELAY: u32 = 50;

pub const RECORDER_MODULE_NAME: &str = "recorder-module";
pub const RECORDER_PROCESSOR_NAME: &str = "recorder-worklet";
pub const IS_RECORDING_PARAM: &str = "isRecording";

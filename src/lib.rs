//! # Mic Capture Library
//!
//! The `mic-capture-rs` library captures microphone audio through a small
//! audio graph: a microphone source node feeds a recorder node, which hands
//! fixed-size blocks of channel 0 samples to a callback.
//!
//! Two recorder strategies are available. The worklet recorder runs its
//! processor on a dedicated scope thread and reports back over a message port.
//! The script processor recorder runs inline on the render path and is used as
//! a fallback.
//!
//! ## Usage
//!
//! Call [`start_capture`] with a data callback, or [`start_capture_stream`] to
//! receive blocks over a channel. Both return a [`StopHandle`]; calling
//! `stop` on it ends the capture, releases the microphone and disconnects the
//! graph. Stopping more than once is harmless.
//!
//! All captures share one [`AudioContext`], created on first use by
//! [`get_context`].

mod capture;
mod constants;
mod context;
mod errors;
mod media;
mod recorder;

pub use capture::{CaptureOptions, StopHandle, start_capture, start_capture_stream, start_capture_with};
pub use constants::*;
pub use context::{
    AudioContext, AudioContextOptions, AudioNode, AudioParam, AudioWorklet, AudioWorkletNode,
    MessagePort, NodeId, ParamDescriptor, ProcessScope, ProcessorConstructor, ProcessorDefinition,
    ProcessorOptions, SampleBlock, WorkletMessage, WorkletModule, WorkletNodeOptions,
    WorkletProcessor, get_context,
};
pub use errors::CaptureError;
pub use media::{
    CpalMediaDevices, MediaDevices, MediaStream, MediaStreamConstraints, MediaStreamSourceNode,
    MediaStreamTrack, StreamSettings, find_input_device, get_default_input_device,
    list_input_devices,
};
pub use recorder::{
    DataCallback, FinishCallback, RECORDER_MODULE, RecorderNode, RecorderNodeFactory,
    RecorderOptions, RecorderStrategy, ScriptProcessorRecorder, StopControl, WorkletRecorder,
};

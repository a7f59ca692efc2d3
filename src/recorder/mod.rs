//! Recorder nodes: graph elements that hand fixed-size sample blocks to a
//! callback.
//!
//! Two interchangeable strategies exist and they signal completion
//! differently:
//!
//! - [`WorkletRecorder`] runs on the worklet scope thread. `stop()` flips an
//!   automated parameter; the processor notices it on the next render quantum,
//!   posts a stop message, and `on_finish` runs when that message arrives.
//!   No data is posted once the processor has seen the stop.
//! - [`ScriptProcessorRecorder`] runs inline on the render path. `stop()` sets
//!   a flag that is checked after each delivered block, so one more block is
//!   delivered before `on_finish` runs.

mod script_processor;
mod worklet_recorder;

use std::{fmt, sync::Arc};

pub use script_processor::ScriptProcessorRecorder;
pub use worklet_recorder::{RECORDER_MODULE, WorkletRecorder};

use crate::{
    constants::SUPPORTED_BUFFER_SIZES,
    context::{AudioContext, NodeId, SampleBlock},
    errors::CaptureError,
};

pub type DataCallback = Box<dyn FnMut(SampleBlock) + Send>;
pub type FinishCallback = Arc<dyn Fn() + Send + Sync>;
pub type StopControl = Arc<dyn Fn() + Send + Sync>;

type ReleaseFn = Box<dyn Fn(&AudioContext) + Send + Sync>;

pub struct RecorderOptions {
    pub channel_count: u16,
    /// Frames per delivered block.
    pub buffer_size: usize,
    pub on_data: DataCallback,
    pub on_finish: FinishCallback,
}

/// A recorder node in the graph plus its stop control.
pub struct RecorderNode {
    id: NodeId,
    stop: StopControl,
    release: ReleaseFn,
}

impl RecorderNode {
    pub(crate) fn new(id: NodeId, stop: StopControl, release: ReleaseFn) -> Self {
        Self { id, stop, release }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Requests a stop. Completion is reported through `on_finish`.
    pub fn stop(&self) {
        (self.stop)();
    }

    pub fn stop_control(&self) -> StopControl {
        Arc::clone(&self.stop)
    }

    /// Removes the node from the graph and frees what backs it.
    pub fn release(&self, ctx: &AudioContext) {
        (self.release)(ctx);
    }
}

impl fmt::Debug for RecorderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecorderNode").field("id", &self.id).finish()
    }
}

pub trait RecorderNodeFactory: Send + Sync {
    fn create_recorder_node(
        &self,
        ctx: &Arc<AudioContext>,
        options: RecorderOptions,
    ) -> Result<RecorderNode, CaptureError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecorderStrategy {
    #[default]
    Worklet,
    ScriptProcessor,
}

impl RecorderStrategy {
    pub fn from_fallback(use_fallback: bool) -> Self {
        if use_fallback {
            Self::ScriptProcessor
        } else {
            Self::Worklet
        }
    }

    pub fn factory(self) -> &'static dyn RecorderNodeFactory {
        match self {
            Self::Worklet => &WorkletRecorder,
            Self::ScriptProcessor => &ScriptProcessorRecorder,
        }
    }
}

impl fmt::Display for RecorderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Worklet => write!(f, "worklet"),
            Self::ScriptProcessor => write!(f, "script processor"),
        }
    }
}

pub(crate) fn validate_options(
    ctx: &AudioContext,
    options: &RecorderOptions,
) -> Result<(), CaptureError> {
    if options.channel_count == 0 {
        return Err(CaptureError::InvalidChannelCount(options.channel_count));
    }

    let quantum = ctx.render_quantum_size();
    if !SUPPORTED_BUFFER_SIZES.contains(&options.buffer_size) || options.buffer_size % quantum != 0
    {
        return Err(CaptureError::InvalidBufferSize {
            size: options.buffer_size,
            supported: SUPPORTED_BUFFER_SIZES,
            quantum,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AudioContextOptions;

    fn options(channel_count: u16, buffer_size: usize) -> RecorderOptions {
        RecorderOptions {
            channel_count,
            buffer_size,
            on_data: Box::new(|_: SampleBlock| {}),
            on_finish: Arc::new(|| {}),
        }
    }

    #[test]
    fn fallback_flag_selects_the_strategy() {
        assert_eq!(
            RecorderStrategy::from_fallback(true),
            RecorderStrategy::ScriptProcessor
        );
        assert_eq!(RecorderStrategy::from_fallback(false), RecorderStrategy::Worklet);
        assert_eq!(RecorderStrategy::default(), RecorderStrategy::Worklet);
    }

    #[test]
    fn rejects_unsupported_buffer_sizes() {
        let ctx = AudioContext::new(AudioContextOptions::default());

        assert!(validate_options(&ctx, &options(1, 1024)).is_ok());
        assert!(matches!(
            validate_options(&ctx, &options(1, 1000)),
            Err(CaptureError::InvalidBufferSize { size: 1000, .. })
        ));
        assert!(matches!(
            validate_options(&ctx, &options(0, 1024)),
            Err(CaptureError::InvalidChannelCount(0))
        ));
    }

    #[test]
    fn buffer_size_must_be_a_multiple_of_the_quantum() {
        let ctx = AudioContext::new(AudioContextOptions {
            render_quantum_size: 384,
            ..AudioContextOptions::default()
        });

        assert!(validate_options(&ctx, &options(1, 1024)).is_err());
    }
}

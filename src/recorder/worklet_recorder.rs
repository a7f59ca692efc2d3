use std::{sync::Arc, thread};

use crossbeam_channel::Receiver;

use crate::{
    constants::{IS_RECORDING_PARAM, RECORDER_MODULE_NAME, RECORDER_PROCESSOR_NAME},
    context::{
        AudioContext, AudioParam, AudioWorkletNode, BlockAccumulator, ParamDescriptor,
        ProcessScope, ProcessorDefinition, ProcessorOptions, SampleBlock, WorkletMessage,
        WorkletModule, WorkletNodeOptions, WorkletProcessor,
    },
    errors::CaptureError,
};

use super::{
    DataCallback, FinishCallback, RecorderNode, RecorderNodeFactory, RecorderOptions,
    validate_options,
};

/// The module registering the recorder processor.
pub static RECORDER_MODULE: WorkletModule = WorkletModule {
    name: RECORDER_MODULE_NAME,
    processors: &[ProcessorDefinition {
        name: RECORDER_PROCESSOR_NAME,
        parameters: &[ParamDescriptor {
            name: IS_RECORDING_PARAM,
            default_value: 0.0,
        }],
        construct: RecorderProcessor::construct,
    }],
};

/// Runs on the worklet scope thread.
struct RecorderProcessor {
    is_recording: Arc<AudioParam>,
    accumulator: BlockAccumulator,
}

impl RecorderProcessor {
    fn construct(options: ProcessorOptions) -> Box<dyn WorkletProcessor> {
        let is_recording = options
            .parameters
            .get(IS_RECORDING_PARAM)
            .cloned()
            .unwrap_or_else(|| Arc::new(AudioParam::new(0.0)));

        Box::new(Self {
            is_recording,
            accumulator: BlockAccumulator::new(
                options.channel_count as usize,
                options.buffer_size,
            ),
        })
    }
}

impl WorkletProcessor for RecorderProcessor {
    fn process(&mut self, input: &SampleBlock, scope: &ProcessScope<'_>) -> bool {
        if self.is_recording.value_at(scope.current_time) <= 0.0 {
            scope.port.post_message(WorkletMessage::Stop);
            return false;
        }

        self.accumulator
            .push(input, |block| scope.port.post_message(WorkletMessage::Data(block)));
        true
    }
}

/// Recorder backed by the `recorder-worklet` processor.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkletRecorder;

impl RecorderNodeFactory for WorkletRecorder {
    fn create_recorder_node(
        &self,
        ctx: &Arc<AudioContext>,
        options: RecorderOptions,
    ) -> Result<RecorderNode, CaptureError> {
        validate_options(ctx, &options)?;

        ctx.audio_worklet().add_module(&RECORDER_MODULE)?;

        let (node, port) = AudioWorkletNode::new(
            ctx,
            RECORDER_PROCESSOR_NAME,
            WorkletNodeOptions {
                channel_count: options.channel_count,
                buffer_size: options.buffer_size,
            },
        )?;

        let Some(is_recording) = node.parameter(IS_RECORDING_PARAM) else {
            node.release(ctx);
            return Err(CaptureError::MissingParameter {
                processor: RECORDER_PROCESSOR_NAME,
                parameter: IS_RECORDING_PARAM,
            });
        };
        is_recording.set_value_at_time(1.0, ctx.current_time());

        let on_data = options.on_data;
        let on_finish = options.on_finish;
        let spawned = thread::Builder::new()
            .name("recorder-port".to_string())
            .spawn(move || listen(port, on_data, on_finish));

        if let Err(e) = spawned {
            node.release(ctx);
            return Err(CaptureError::Thread(e.to_string()));
        }

        let id = node.id();
        let stop_ctx = Arc::clone(ctx);
        let stop = Arc::new(move || {
            tracing::info!("Stopping the recorder worklet");
            is_recording.set_value_at_time(0.0, stop_ctx.current_time());
        });
        let release = Box::new(move |ctx: &AudioContext| node.release(ctx));

        Ok(RecorderNode::new(id, stop, release))
    }
}

/// Dispatches port messages until the processor reports its stop.
fn listen(port: Receiver<WorkletMessage>, mut on_data: DataCallback, on_finish: FinishCallback) {
    for message in port.iter() {
        match message {
            WorkletMessage::Data(block) => on_data(block),
            WorkletMessage::Stop => {
                tracing::debug!("Recorder worklet reported stop");
                on_finish();
                return;
            }
        }
    }

    tracing::debug!("Recorder port closed without a stop message");
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::context::{AudioContextOptions, MessagePort};

    fn scope_with_port() -> (MessagePort, Receiver<WorkletMessage>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (MessagePort::new(sender), receiver)
    }

    fn recorder(buffer_size: usize) -> (Box<dyn WorkletProcessor>, Arc<AudioParam>) {
        let param = Arc::new(AudioParam::new(0.0));
        let processor = RecorderProcessor::construct(ProcessorOptions {
            channel_count: 1,
            buffer_size,
            parameters: [(IS_RECORDING_PARAM, Arc::clone(&param))].into(),
        });
        (processor, param)
    }

    #[test]
    fn posts_full_blocks_while_recording() {
        let (mut processor, param) = recorder(256);
        param.set_value_at_time(1.0, 0.0);
        let (port, messages) = scope_with_port();
        let scope = ProcessScope {
            current_time: 1.0,
            port: &port,
        };

        for _ in 0..3 {
            assert!(processor.process(&SampleBlock::silent(1, 128), &scope));
        }

        let posted: Vec<_> = messages.try_iter().collect();
        assert_eq!(posted.len(), 1);
        assert!(matches!(&posted[0], WorkletMessage::Data(block) if block.frames() == 256));
    }

    #[test]
    fn posts_stop_once_the_param_goes_inactive() {
        let (mut processor, param) = recorder(256);
        param.set_value_at_time(1.0, 0.0);
        param.set_value_at_time(0.0, 2.0);
        let (port, messages) = scope_with_port();

        let before = ProcessScope {
            current_time: 1.0,
            port: &port,
        };
        assert!(processor.process(&SampleBlock::silent(1, 128), &before));

        let after = ProcessScope {
            current_time: 2.0,
            port: &port,
        };
        assert!(!processor.process(&SampleBlock::silent(1, 128), &after));

        let posted: Vec<_> = messages.try_iter().collect();
        assert_eq!(posted, vec![WorkletMessage::Stop]);
    }

    /// Claims the recorder module name without declaring `isRecording`.
    static BARE_MODULE: WorkletModule = WorkletModule {
        name: RECORDER_MODULE_NAME,
        processors: &[ProcessorDefinition {
            name: RECORDER_PROCESSOR_NAME,
            parameters: &[],
            construct: RecorderProcessor::construct,
        }],
    };

    #[test]
    fn missing_recording_param_leaves_no_node() {
        let ctx = Arc::new(AudioContext::new(AudioContextOptions::default()));
        ctx.audio_worklet().add_module(&BARE_MODULE).unwrap();

        let result = WorkletRecorder.create_recorder_node(
            &ctx,
            RecorderOptions {
                channel_count: 1,
                buffer_size: 1024,
                on_data: Box::new(|_: SampleBlock| {}),
                on_finish: Arc::new(|| {}),
            },
        );

        assert!(matches!(
            result,
            Err(CaptureError::MissingParameter {
                parameter: IS_RECORDING_PARAM,
                ..
            })
        ));
        assert_eq!(ctx.node_count(), 0);
        assert_eq!(ctx.audio_worklet().load_count(), 1);
    }

    #[test]
    fn listener_finishes_once_on_stop() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let blocks = Arc::new(Mutex::new(0));
        let finishes = Arc::new(Mutex::new(0));

        sender.send(WorkletMessage::Data(SampleBlock::silent(1, 4))).unwrap();
        sender.send(WorkletMessage::Stop).unwrap();
        sender.send(WorkletMessage::Stop).unwrap();
        drop(sender);

        let data_count = Arc::clone(&blocks);
        let finish_count = Arc::clone(&finishes);
        let handle = thread::spawn(move || {
            listen(
                receiver,
                Box::new(move |_: SampleBlock| *data_count.lock().unwrap() += 1),
                Arc::new(move || *finish_count.lock().unwrap() += 1),
            )
        });
        handle.join().unwrap();

        assert_eq!(*blocks.lock().unwrap(), 1);
        assert_eq!(*finishes.lock().unwrap(), 1);
    }
}

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    context::{AudioContext, AudioNode, BlockAccumulator, SampleBlock},
    errors::CaptureError,
};

use super::{
    DataCallback, FinishCallback, RecorderNode, RecorderNodeFactory, RecorderOptions,
    validate_options,
};

/// Inline recorder: assembles and delivers blocks on the render path.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptProcessorRecorder;

struct ScriptProcessor {
    accumulator: Mutex<BlockAccumulator>,
    on_data: Mutex<DataCallback>,
    on_finish: FinishCallback,
    stopped: Arc<AtomicBool>,
    finished: AtomicBool,
}

impl AudioNode for ScriptProcessor {
    fn process(&self, input: &SampleBlock, _current_time: f64) {
        let mut blocks = Vec::new();
        self.accumulator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(input, |block| blocks.push(block));

        for block in blocks {
            {
                let mut on_data = self.on_data.lock().unwrap_or_else(PoisonError::into_inner);
                on_data(block);
            }

            // checked after delivery, so the block in flight at stop() still arrives
            if self.stopped.load(Ordering::SeqCst) && !self.finished.swap(true, Ordering::SeqCst) {
                tracing::debug!("Script processor observed stop");
                (self.on_finish)();
            }
        }
    }
}

impl RecorderNodeFactory for ScriptProcessorRecorder {
    fn create_recorder_node(
        &self,
        ctx: &Arc<AudioContext>,
        options: RecorderOptions,
    ) -> Result<RecorderNode, CaptureError> {
        validate_options(ctx, &options)?;

        let stopped = Arc::new(AtomicBool::new(false));
        let processor = ScriptProcessor {
            accumulator: Mutex::new(BlockAccumulator::new(
                options.channel_count as usize,
                options.buffer_size,
            )),
            on_data: Mutex::new(options.on_data),
            on_finish: options.on_finish,
            stopped: Arc::clone(&stopped),
            finished: AtomicBool::new(false),
        };
        let id = ctx.add_node(Arc::new(processor));
        tracing::debug!(
            "Created script processor {} ({} frames, {} channels)",
            id,
            options.buffer_size,
            options.channel_count
        );

        let stop = Arc::new(move || {
            tracing::info!("Stopping the script processor");
            stopped.store(true, Ordering::SeqCst);
        });
        let release = Box::new(move |ctx: &AudioContext| ctx.remove_node(id));

        Ok(RecorderNode::new(id, stop, release))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::context::AudioContextOptions;

    struct Counters {
        blocks: Arc<AtomicUsize>,
        finishes: Arc<AtomicUsize>,
    }

    fn recorder(ctx: &Arc<AudioContext>, buffer_size: usize) -> (RecorderNode, Counters) {
        let blocks = Arc::new(AtomicUsize::new(0));
        let finishes = Arc::new(AtomicUsize::new(0));
        let data_count = Arc::clone(&blocks);
        let finish_count = Arc::clone(&finishes);

        let node = ScriptProcessorRecorder
            .create_recorder_node(
                ctx,
                RecorderOptions {
                    channel_count: 1,
                    buffer_size,
                    on_data: Box::new(move |block: SampleBlock| {
                        assert_eq!(block.frames(), buffer_size);
                        data_count.fetch_add(1, Ordering::SeqCst);
                    }),
                    on_finish: Arc::new(move || {
                        finish_count.fetch_add(1, Ordering::SeqCst);
                    }),
                },
            )
            .unwrap();

        (node, Counters { blocks, finishes })
    }

    fn wire(ctx: &AudioContext, node: &RecorderNode) -> crate::context::NodeId {
        let source = ctx.add_node(Arc::new(crate::context::tests::Passive));
        ctx.connect(source, node.id()).unwrap();
        ctx.connect(node.id(), ctx.destination()).unwrap();
        source
    }

    #[test]
    fn delivers_one_more_block_after_stop_then_finishes_once() {
        let ctx = Arc::new(AudioContext::new(AudioContextOptions::default()));
        let (node, counters) = recorder(&ctx, 256);
        let source = wire(&ctx, &node);
        let quantum = SampleBlock::silent(1, 128);

        ctx.render(source, &quantum);
        ctx.render(source, &quantum);
        assert_eq!(counters.blocks.load(Ordering::SeqCst), 1);

        node.stop();
        node.stop();
        ctx.render(source, &quantum);
        assert_eq!(counters.finishes.load(Ordering::SeqCst), 0);
        ctx.render(source, &quantum);
        assert_eq!(counters.blocks.load(Ordering::SeqCst), 2);
        assert_eq!(counters.finishes.load(Ordering::SeqCst), 1);

        // still wired, keeps delivering but never finishes again
        for _ in 0..4 {
            ctx.render(source, &quantum);
        }
        assert_eq!(counters.blocks.load(Ordering::SeqCst), 4);
        assert_eq!(counters.finishes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_removes_the_node() {
        let ctx = Arc::new(AudioContext::new(AudioContextOptions::default()));
        let (node, counters) = recorder(&ctx, 1024);
        let source = wire(&ctx, &node);

        node.release(&ctx);
        for _ in 0..16 {
            ctx.render(source, &SampleBlock::silent(1, 128));
        }

        assert_eq!(counters.blocks.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.node_count(), 1);
    }
}

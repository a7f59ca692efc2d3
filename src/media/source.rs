use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};
use rubato::{FftFixedIn, Resampler};

use crate::{
    constants::{CLOCK_DELAY, TargetFormat},
    context::{AudioContext, AudioNode, NodeId, SampleBlock},
    errors::CaptureError,
};

use super::MediaStream;

/// Frames per channel a framer can hold before dropping input.
const FRAMER_CAPACITY: usize = 1 << 16;

/// Input frames the resampler consumes per pass.
const RESAMPLER_CHUNK_SIZE: usize = 1024;

struct SourceEndpoint;

impl AudioNode for SourceEndpoint {}

/// Feeds a [`MediaStream`] into a context, one render quantum at a time.
#[derive(Debug)]
pub struct MediaStreamSourceNode {
    id: NodeId,
}

impl MediaStreamSourceNode {
    pub fn new(ctx: &Arc<AudioContext>, stream: &MediaStream) -> Result<Self, CaptureError> {
        let settings = stream.settings();
        if settings.channel_count == 0 {
            return Err(CaptureError::InvalidChannelCount(0));
        }

        let framer = Framer::new(
            settings.channel_count as usize,
            settings.sample_rate,
            ctx.sample_rate(),
            ctx.render_quantum_size(),
        )?;

        let id = ctx.add_node(Arc::new(SourceEndpoint));
        let live: Vec<Arc<AtomicBool>> = stream
            .tracks()
            .iter()
            .map(|track| track.live_signal())
            .collect();
        let samples = stream.samples();
        let pump_ctx = Arc::clone(ctx);

        let spawned = thread::Builder::new()
            .name("mic-capture-source".to_string())
            .spawn(move || pump(pump_ctx, id, samples, live, framer));

        if let Err(e) = spawned {
            ctx.remove_node(id);
            return Err(CaptureError::Thread(e.to_string()));
        }

        tracing::debug!("Created source node {} for {:?}", id, settings);
        Ok(Self { id })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn release(&self, ctx: &AudioContext) {
        ctx.remove_node(self.id);
    }
}

fn pump(
    ctx: Arc<AudioContext>,
    id: NodeId,
    samples: Receiver<Vec<TargetFormat>>,
    live: Vec<Arc<AtomicBool>>,
    mut framer: Framer,
) {
    tracing::debug!("Source pump for node {} started", id);

    while live.iter().any(|signal| signal.load(Ordering::SeqCst)) {
        match samples.recv_timeout(Duration::from_millis(CLOCK_DELAY as _)) {
            Ok(chunk) => {
                framer.push_interleaved(&chunk);
                while let Some(block) = framer.next_block() {
                    ctx.render(id, &block);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!("Stream for node {} closed", id);
                break;
            }
        }
    }

    tracing::debug!("Source pump for node {} stopped", id);
}

struct ChannelQueue {
    producer: HeapProd<TargetFormat>,
    consumer: HeapCons<TargetFormat>,
}

impl ChannelQueue {
    fn new() -> Self {
        let (producer, consumer) = HeapRb::<TargetFormat>::new(FRAMER_CAPACITY).split();
        Self { producer, consumer }
    }

    fn pop(&mut self, frames: usize) -> Vec<TargetFormat> {
        let mut buffer = vec![0.0; frames];
        self.consumer.pop_slice(&mut buffer);
        buffer
    }
}

/// Re-frames device chunks into render quanta at the context rate.
pub(crate) struct Framer {
    channel_count: usize,
    quantum: usize,
    /// Raw input waiting for the resampler.
    staged: Vec<ChannelQueue>,
    /// Frames at the context rate, ready to render.
    ready: Vec<ChannelQueue>,
    resampler: Option<FftFixedIn<TargetFormat>>,
}

impl Framer {
    pub(crate) fn new(
        channel_count: usize,
        input_rate: u32,
        output_rate: u32,
        quantum: usize,
    ) -> Result<Self, CaptureError> {
        let resampler = if input_rate == output_rate {
            None
        } else {
            tracing::info!("Resampling source from {} Hz to {} Hz", input_rate, output_rate);
            let resampler = FftFixedIn::<TargetFormat>::new(
                input_rate as usize,
                output_rate as usize,
                RESAMPLER_CHUNK_SIZE,
                2,
                channel_count,
            )
            .map_err(|e| CaptureError::Resampler(e.to_string()))?;
            Some(resampler)
        };

        let staged = match resampler {
            Some(_) => (0..channel_count).map(|_| ChannelQueue::new()).collect(),
            None => Vec::new(),
        };

        Ok(Self {
            channel_count,
            quantum,
            staged,
            ready: (0..channel_count).map(|_| ChannelQueue::new()).collect(),
            resampler,
        })
    }

    pub(crate) fn push_interleaved(&mut self, data: &[TargetFormat]) {
        let target = if self.resampler.is_some() {
            &mut self.staged
        } else {
            &mut self.ready
        };

        let mut dropped = 0;
        for frame in data.chunks_exact(self.channel_count) {
            for (queue, sample) in target.iter_mut().zip(frame) {
                if queue.producer.try_push(*sample).is_err() {
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            tracing::error!("source fell behind, dropped {} samples", dropped);
        }

        self.resample();
    }

    fn resample(&mut self) {
        let Self {
            staged,
            ready,
            resampler,
            ..
        } = self;
        let Some(resampler) = resampler else {
            return;
        };

        loop {
            let needed = resampler.input_frames_next();
            if staged[0].consumer.occupied_len() < needed {
                break;
            }

            let wave_in: Vec<Vec<TargetFormat>> =
                staged.iter_mut().map(|queue| queue.pop(needed)).collect();

            match resampler.process(&wave_in, None) {
                Ok(wave_out) => {
                    for (queue, data) in ready.iter_mut().zip(&wave_out) {
                        let pushed = queue.producer.push_slice(data);
                        if pushed < data.len() {
                            tracing::error!("resampled output fell behind");
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to resample: {}", e);
                }
            }
        }
    }

    pub(crate) fn next_block(&mut self) -> Option<SampleBlock> {
        if self.ready[0].consumer.occupied_len() < self.quantum {
            return None;
        }

        let quantum = self.quantum;
        let channels = self
            .ready
            .iter_mut()
            .map(|queue| queue.pop(quantum))
            .collect();

        Some(SampleBlock::new(channels))
    }
}

//! Capture sessions: microphone → recorder node → destination, with a
//! teardown that runs at most once however the session ends.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crossbeam_channel::Receiver;
use once_cell::sync::OnceCell;

use crate::{
    constants::{CAPTURE_CHANNEL_COUNT, DEFAULT_BUFFER_SIZE, TargetFormat},
    context::{AudioContext, SampleBlock, get_context},
    errors::CaptureError,
    media::{
        CpalMediaDevices, MediaDevices, MediaStreamConstraints, MediaStreamSourceNode,
        MediaStreamTrack,
    },
    recorder::{FinishCallback, RecorderNode, RecorderOptions, RecorderStrategy, StopControl},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    pub strategy: RecorderStrategy,
    /// Frames per delivered block.
    pub buffer_size: usize,
    /// Input device to open, `None` for the host default.
    pub device_name: Option<String>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            strategy: RecorderStrategy::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            device_name: None,
        }
    }
}

impl CaptureOptions {
    pub fn with_fallback(use_fallback: bool) -> Self {
        Self {
            strategy: RecorderStrategy::from_fallback(use_fallback),
            ..Self::default()
        }
    }
}

/// Everything a session has to undo, guarded by `finished`.
struct Teardown {
    finished: AtomicBool,
    ctx: Arc<AudioContext>,
    tracks: Vec<MediaStreamTrack>,
    source: MediaStreamSourceNode,
    recorder: OnceCell<RecorderNode>,
}

impl Teardown {
    fn run(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            tracing::debug!("Capture session already torn down");
            return;
        }

        tracing::info!("Tearing down capture session");
        for track in &self.tracks {
            track.stop();
        }

        if let Some(recorder) = self.recorder.get() {
            let destination = self.ctx.destination();
            if let Err(e) = self.ctx.disconnect(recorder.id(), destination) {
                tracing::warn!("Failed to disconnect recorder: {}", e);
            }
            if let Err(e) = self.ctx.disconnect(self.source.id(), recorder.id()) {
                tracing::warn!("Failed to disconnect source: {}", e);
            }
            recorder.release(&self.ctx);
        }

        self.source.release(&self.ctx);
        tracing::info!("Capture session finished");
    }
}

/// Returned by a started capture; stopping is idempotent.
#[derive(Clone)]
pub struct StopHandle {
    stop: StopControl,
    teardown: Arc<Teardown>,
}

impl StopHandle {
    /// Asks the recorder to stop. Teardown follows once the recorder reports
    /// completion.
    pub fn stop(&self) {
        if self.is_finished() {
            return;
        }
        (self.stop)();
    }

    /// `true` once teardown has run.
    pub fn is_finished(&self) -> bool {
        self.teardown.finished.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Starts capturing from the default microphone on the shared context.
/// `on_data` receives one channel-0 block of `DEFAULT_BUFFER_SIZE` samples at
/// a time.
#[tracing::instrument(skip(on_data))]
pub fn start_capture<F>(on_data: F, use_fallback: bool) -> Result<StopHandle, CaptureError>
where
    F: FnMut(Vec<TargetFormat>) + Send + 'static,
{
    start_capture_with(
        get_context(),
        &CpalMediaDevices,
        CaptureOptions::with_fallback(use_fallback),
        on_data,
    )
}

/// Like [`start_capture`], delivering blocks over a channel.
#[tracing::instrument]
pub fn start_capture_stream(
    use_fallback: bool,
) -> Result<(Receiver<Vec<TargetFormat>>, StopHandle), CaptureError> {
    let (sync_tx, sync_rx) = crossbeam_channel::unbounded();

    let handle = start_capture(
        move |samples| {
            if let Err(e) = sync_tx.send(samples) {
                tracing::debug!("Failed to send data: {}", e);
            }
        },
        use_fallback,
    )?;

    Ok((sync_rx, handle))
}

#[tracing::instrument(skip(ctx, devices, on_data))]
pub fn start_capture_with<F>(
    ctx: Arc<AudioContext>,
    devices: &dyn MediaDevices,
    options: CaptureOptions,
    mut on_data: F,
) -> Result<StopHandle, CaptureError>
where
    F: FnMut(Vec<TargetFormat>) + Send + 'static,
{
    tracing::info!("Starting capture");

    let constraints = MediaStreamConstraints {
        channel_count: CAPTURE_CHANNEL_COUNT,
        device_name: options.device_name.clone(),
    };
    let stream = devices.get_user_media(&constraints)?;
    tracing::debug!("Microphone stream acquired: {:?}", stream.settings());

    let source = match MediaStreamSourceNode::new(&ctx, &stream) {
        Ok(source) => source,
        Err(e) => {
            tracing::error!("Failed to create source node: {}", e);
            stream.tracks().iter().for_each(MediaStreamTrack::stop);
            return Err(e);
        }
    };

    let teardown = Arc::new(Teardown {
        finished: AtomicBool::new(false),
        ctx: Arc::clone(&ctx),
        tracks: stream.tracks().to_vec(),
        source,
        recorder: OnceCell::new(),
    });

    let on_finish: FinishCallback = {
        let teardown = Arc::clone(&teardown);
        Arc::new(move || teardown.run())
    };

    tracing::info!("Using the {} recorder", options.strategy);
    let recorder = options.strategy.factory().create_recorder_node(
        &ctx,
        RecorderOptions {
            channel_count: CAPTURE_CHANNEL_COUNT,
            buffer_size: options.buffer_size,
            on_data: Box::new(move |block: SampleBlock| {
                if let Some(samples) = block.into_channel(0) {
                    on_data(samples);
                }
            }),
            on_finish,
        },
    );

    let recorder = match recorder {
        Ok(recorder) => recorder,
        Err(e) => {
            tracing::error!("Failed to create recorder node: {}", e);
            teardown.run();
            return Err(e);
        }
    };

    let recorder_id = recorder.id();
    let stop = recorder.stop_control();
    if teardown.recorder.set(recorder).is_err() {
        tracing::warn!("Recorder node was already attached to the session");
    }

    let wired = ctx
        .connect(teardown.source.id(), recorder_id)
        .and_then(|()| ctx.connect(recorder_id, ctx.destination()));
    if let Err(e) = wired {
        tracing::error!("Failed to wire the capture graph: {}", e);
        teardown.run();
        return Err(e);
    }

    tracing::info!("Capture started");
    Ok(StopHandle { stop, teardown })
}

//! Microphone acquisition and the source node feeding captured audio into a
//! context.

mod cpal_devices;
mod get_default_device;
mod macros;
mod source;

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crossbeam_channel::Receiver;

pub use cpal_devices::CpalMediaDevices;
pub use get_default_device::{find_input_device, get_default_input_device, list_input_devices};
pub use source::MediaStreamSourceNode;

use crate::{
    constants::{CAPTURE_CHANNEL_COUNT, TargetFormat},
    errors::CaptureError,
};

/// What the caller asks of the microphone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStreamConstraints {
    pub channel_count: u16,
    /// Input device to open, `None` for the host default.
    pub device_name: Option<String>,
}

impl Default for MediaStreamConstraints {
    fn default() -> Self {
        Self {
            channel_count: CAPTURE_CHANNEL_COUNT,
            device_name: None,
        }
    }
}

/// The format a stream was actually opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub sample_rate: u32,
    pub channel_count: u16,
}

type StopHook = Arc<dyn Fn() + Send + Sync>;

/// One hardware input of a [`MediaStream`].
#[derive(Clone)]
pub struct MediaStreamTrack {
    label: String,
    live: Arc<AtomicBool>,
    on_stop: Option<StopHook>,
}

impl MediaStreamTrack {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            live: Arc::new(AtomicBool::new(true)),
            on_stop: None,
        }
    }

    /// A track that also runs `hook` on every `stop()` call.
    pub fn with_stop_hook(label: impl Into<String>, hook: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            on_stop: Some(Arc::new(hook)),
            ..Self::new(label)
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        tracing::debug!("Stopping track '{}'", self.label);
        self.live.store(false, Ordering::SeqCst);

        if let Some(hook) = &self.on_stop {
            hook();
        }
    }

    pub(crate) fn live_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.live)
    }
}

impl fmt::Debug for MediaStreamTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStreamTrack")
            .field("label", &self.label)
            .field("live", &self.is_live())
            .finish()
    }
}

/// A live microphone stream: its tracks plus the interleaved samples they
/// produce.
#[derive(Debug)]
pub struct MediaStream {
    tracks: Vec<MediaStreamTrack>,
    settings: StreamSettings,
    samples: Receiver<Vec<TargetFormat>>,
}

impl MediaStream {
    pub fn new(
        tracks: Vec<MediaStreamTrack>,
        settings: StreamSettings,
        samples: Receiver<Vec<TargetFormat>>,
    ) -> Self {
        Self {
            tracks,
            settings,
            samples,
        }
    }

    pub fn tracks(&self) -> &[MediaStreamTrack] {
        &self.tracks
    }

    pub fn settings(&self) -> StreamSettings {
        self.settings
    }

    /// `true` while at least one track is live.
    pub fn is_active(&self) -> bool {
        self.tracks.iter().any(MediaStreamTrack::is_live)
    }

    pub(crate) fn samples(&self) -> Receiver<Vec<TargetFormat>> {
        self.samples.clone()
    }
}

/// Grants access to microphones.
pub trait MediaDevices: Send + Sync {
    /// Opens a stream matching `constraints`. Blocks until the device is
    /// running or acquisition failed.
    fn get_user_media(
        &self,
        constraints: &MediaStreamConstraints,
    ) -> Result<MediaStream, CaptureError>;
}

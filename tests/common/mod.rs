#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::Sender;
use mic_capture_rs::{
    CaptureError, MediaDevices, MediaStream, MediaStreamConstraints, MediaStreamTrack,
    StreamSettings,
};

/// A microphone fed by the test instead of a device.
pub struct FakeMicrophone {
    settings: StreamSettings,
    denied: bool,
    sender: Mutex<Option<Sender<Vec<f32>>>>,
    stops: Arc<AtomicUsize>,
}

impl FakeMicrophone {
    pub fn new(sample_rate: u32, channel_count: u16) -> Self {
        Self {
            settings: StreamSettings {
                sample_rate,
                channel_count,
            },
            denied: false,
            sender: Mutex::new(None),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn mono() -> Self {
        Self::new(48_000, 1)
    }

    pub fn denied() -> Self {
        Self {
            denied: true,
            ..Self::mono()
        }
    }

    /// Sends `samples` as one device chunk. Chunks sent after the session
    /// has closed the stream are dropped.
    pub fn feed(&self, samples: &[f32]) {
        let sender = self.sender.lock().unwrap();
        let sender = sender.as_ref().expect("microphone was never opened");
        if sender.send(samples.to_vec()).is_err() {
            tracing::debug!("Fake microphone stream closed");
        }
    }

    pub fn feed_chunked(&self, samples: &[f32], chunk_size: usize) {
        for chunk in samples.chunks(chunk_size) {
            self.feed(chunk);
        }
    }

    /// Number of `stop()` calls across all tracks handed out.
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn stop_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.stops)
    }
}

impl MediaDevices for FakeMicrophone {
    fn get_user_media(
        &self,
        constraints: &MediaStreamConstraints,
    ) -> Result<MediaStream, CaptureError> {
        if self.denied {
            return Err(CaptureError::PermissionDenied(
                "microphone access was refused".to_string(),
            ));
        }
        tracing::debug!("Fake microphone opened with {:?}", constraints);

        let (sender, receiver) = crossbeam_channel::unbounded();
        *self.sender.lock().unwrap() = Some(sender);

        let stops = Arc::clone(&self.stops);
        let track = MediaStreamTrack::with_stop_hook("fake microphone", move || {
            stops.fetch_add(1, Ordering::SeqCst);
        });

        Ok(MediaStream::new(vec![track], self.settings, receiver))
    }
}

/// Polls `condition` until it holds, panicking after a few seconds.
pub fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

pub fn ramp(len: usize) -> Vec<f32> {
    (0..len).map(|i| i as f32 / len as f32).collect()
}

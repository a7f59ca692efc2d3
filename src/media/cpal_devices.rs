use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use cpal::{
    BackendSpecificError, BuildStreamError, PlayStreamError, StreamError, SupportedStreamConfig,
    traits::{DeviceTrait, StreamTrait},
};
use crossbeam_channel::Sender;
use dasp_sample::{Sample, ToSample};

use crate::{
    constants::{CLOCK_DELAY, TargetFormat},
    errors::CaptureError,
};

use super::{
    MediaDevices, MediaStream, MediaStreamConstraints, MediaStreamTrack, StreamSettings,
    get_default_device::{find_input_device, get_default_input_device},
    macros::build_input_stream_expansion,
};

/// Microphones of the default `cpal` host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalMediaDevices;

impl MediaDevices for CpalMediaDevices {
    #[tracing::instrument(skip(self))]
    fn get_user_media(
        &self,
        constraints: &MediaStreamConstraints,
    ) -> Result<MediaStream, CaptureError> {
        tracing::info!("Acquiring microphone");

        let device = match &constraints.device_name {
            Some(name) => find_input_device(name)?,
            None => get_default_input_device()?,
        };
        let label = device.name().unwrap_or(String::from("Unknown"));
        tracing::debug!("Using input device: {:?}", label);

        let config = negotiate_config(&device, constraints.channel_count)?;
        let settings = StreamSettings {
            sample_rate: config.sample_rate().0,
            channel_count: config.channels(),
        };
        tracing::debug!("Negotiated {:?} ({:?})", settings, config.sample_format());

        let track = MediaStreamTrack::new(label);
        let live = track.live_signal();

        tracing::debug!("Create channel for passing data");
        let (sample_tx, sample_rx) = crossbeam_channel::unbounded::<Vec<TargetFormat>>();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), CaptureError>>(1);

        thread::Builder::new()
            .name("mic-capture-device".to_string())
            .spawn(move || run_device_stream(device, config, sample_tx, ready_tx, live))
            .map_err(|e| CaptureError::Thread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(MediaStream::new(vec![track], settings, sample_rx)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::BuildStream(
                "device thread exited before the stream started".to_string(),
            )),
        }
    }
}

/// Prefers a config with the requested channel count at the device's default
/// rate, then any rate with that channel count, then the device default.
fn negotiate_config(
    device: &cpal::Device,
    channel_count: u16,
) -> Result<SupportedStreamConfig, CaptureError> {
    let default_config = match device.default_input_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to get default input config: {}", e);
            return Err(CaptureError::StreamConfig(e.to_string()));
        }
    };

    if default_config.channels() == channel_count {
        return Ok(default_config);
    }

    let ranges: Vec<_> = match device.supported_input_configs() {
        Ok(ranges) => ranges
            .filter(|range| range.channels() == channel_count)
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to list supported input configs: {}", e);
            return Ok(default_config);
        }
    };

    let default_rate = default_config.sample_rate();
    if let Some(range) = ranges.iter().find(|range| {
        range.min_sample_rate() <= default_rate && default_rate <= range.max_sample_rate()
    }) {
        return Ok(range.clone().with_sample_rate(default_rate));
    }

    match ranges.into_iter().next() {
        Some(range) => Ok(range.with_max_sample_rate()),
        None => {
            tracing::warn!(
                "Device has no {}-channel config, using {} channels",
                channel_count,
                default_config.channels()
            );
            Ok(default_config)
        }
    }
}

/// Owns the `cpal` stream for as long as the track is live.
fn run_device_stream(
    device: cpal::Device,
    config: SupportedStreamConfig,
    sample_tx: Sender<Vec<TargetFormat>>,
    ready_tx: Sender<Result<(), CaptureError>>,
    live: Arc<AtomicBool>,
) {
    let sample_format = config.sample_format();
    let stream_config: cpal::StreamConfig = config.into();

    let stream =
        match build_input_stream_expansion!(sample_format, &device, &stream_config, sample_tx) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Failed to build input stream: {}", e);
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

    if let Err(e) = stream.play() {
        tracing::error!("Failed to play stream: {}", e);
        let _ = ready_tx.send(Err(map_play_error(e)));
        return;
    }

    tracing::info!("Stream started");
    let _ = ready_tx.send(Ok(()));

    while live.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(CLOCK_DELAY as _));
    }

    tracing::debug!("Dropping stream");
    drop(stream);

    tracing::info!("Recording stopped");
}

pub(crate) fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sender: Sender<Vec<TargetFormat>>,
) -> Result<cpal::Stream, CaptureError>
where
    T: cpal::SizedSample + ToSample<TargetFormat> + Send + 'static,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let parsed_data: Vec<TargetFormat> = data
                    .iter()
                    .map(|sample| sample.to_sample::<TargetFormat>())
                    .collect();

                if sender.send(parsed_data).is_err() {
                    tracing::trace!("Stream receiver dropped, discarding samples");
                }
            },
            err_fn,
            None,
        )
        .map_err(map_build_error)
}

fn err_fn(err: StreamError) {
    tracing::error!("an error occurred on stream: {}", err);
}

fn map_build_error(err: BuildStreamError) -> CaptureError {
    match err {
        BuildStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable(err.to_string())
        }
        BuildStreamError::StreamConfigNotSupported | BuildStreamError::InvalidArgument => {
            CaptureError::StreamConfig(err.to_string())
        }
        BuildStreamError::BackendSpecific { err } if is_permission_error(&err) => {
            CaptureError::PermissionDenied(err.description)
        }
        other => CaptureError::BuildStream(other.to_string()),
    }
}

fn map_play_error(err: PlayStreamError) -> CaptureError {
    match err {
        PlayStreamError::DeviceNotAvailable => CaptureError::DeviceUnavailable(err.to_string()),
        PlayStreamError::BackendSpecific { err } if is_permission_error(&err) => {
            CaptureError::PermissionDenied(err.description)
        }
        other => CaptureError::PlayStream(other.to_string()),
    }
}

/// Hosts only report refused microphone access as backend text
/// (`EACCES` from ALSA, `E_ACCESSDENIED` from WASAPI).
fn is_permission_error(err: &BackendSpecificError) -> bool {
    let description = err.description.to_lowercase();
    ["permission denied", "access denied", "accessdenied", "not permitted"]
        .iter()
        .any(|needle| description.contains(needle))
}

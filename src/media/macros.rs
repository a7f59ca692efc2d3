/// Expands to the correct `build_input_stream::<T>(…)` call for the device's
/// sample format.
///
/// Usage:
/// `build_input_stream_expansion!(sample_format, device, config, sender)`
macro_rules! build_input_stream_expansion {
    ($sample_format:expr, $device:expr, $config:expr, $sender:expr) => {{
        use $crate::media::cpal_devices::build_input_stream;

        match $sample_format {
            cpal::SampleFormat::I8 => build_input_stream::<i8>($device, $config, $sender),
            cpal::SampleFormat::I16 => build_input_stream::<i16>($device, $config, $sender),
            cpal::SampleFormat::I32 => build_input_stream::<i32>($device, $config, $sender),
            cpal::SampleFormat::I64 => build_input_stream::<i64>($device, $config, $sender),
            cpal::SampleFormat::U8 => build_input_stream::<u8>($device, $config, $sender),
            cpal::SampleFormat::U16 => build_input_stream::<u16>($device, $config, $sender),
            cpal::SampleFormat::U32 => build_input_stream::<u32>($device, $config, $sender),
            cpal::SampleFormat::U64 => build_input_stream::<u64>($device, $config, $sender),
            cpal::SampleFormat::F32 => build_input_stream::<f32>($device, $config, $sender),
            cpal::SampleFormat::F64 => build_input_stream::<f64>($device, $config, $sender),
            sf => Err($crate::errors::CaptureError::UnsupportedSampleFormat(format!(
                "{sf:?}"
            ))),
        }
    }};
}

pub(crate) use build_input_stream_expansion;

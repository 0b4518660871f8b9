//! cpal input stream backend.
//!
//! Negotiates a stream that matches the request exactly (channel count,
//! sample rate) and re-blocks whatever buffer sizes the host delivers into
//! whole periods with a `PeriodAssembler`, so the pipeline always sees
//! `frames_per_period` frames per callback. Integer device formats are
//! normalized to f32 on the audio thread.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    BufferSize, SampleFormat, SampleRate, SizedSample, StreamConfig, StreamError, SupportedBufferSize,
    SupportedStreamConfigRange,
};
use thiserror::Error;

use multichannel_capture_core::models::audio_models::{
    CallbackStatus, DeviceInfo, StreamParameters, StreamRequest,
};
use multichannel_capture_core::models::error::CaptureError;
use multichannel_capture_core::processing::period_assembler::{convert, PeriodAssembler};
use multichannel_capture_core::session::error_signal::{ErrorSignal, FatalKind};
use multichannel_capture_core::traits::capture_device::{CaptureDevice, PeriodCallback};

use crate::device_enumerator::DeviceEnumerator;

#[derive(Debug, Error)]
enum NegotiationError {
    #[error("device does not report its input configurations: {0}")]
    Query(#[from] cpal::SupportedStreamConfigsError),

    #[error("no input configuration offers {channels} channels at {sample_rate} Hz")]
    NoMatchingConfig { channels: u16, sample_rate: u32 },
}

impl From<NegotiationError> for CaptureError {
    fn from(err: NegotiationError) -> Self {
        match err {
            NegotiationError::Query(_) => CaptureError::Device(err.to_string()),
            NegotiationError::NoMatchingConfig { .. } => CaptureError::UnsupportedParameters(err.to_string()),
        }
    }
}

/// Stream settings chosen by `negotiate`.
#[derive(Debug, Clone)]
struct Negotiated {
    config: StreamConfig,
    sample_format: SampleFormat,
}

/// Formats the assembler can normalize, most preferred first.
const FORMAT_PREFERENCE: [SampleFormat; 4] = [
    SampleFormat::F32,
    SampleFormat::I32,
    SampleFormat::I16,
    SampleFormat::U16,
];

fn format_rank(format: SampleFormat) -> Option<usize> {
    FORMAT_PREFERENCE.iter().position(|f| *f == format)
}

/// Choose a configuration that delivers exactly the requested channel count
/// and rate. The host buffer size is pinned to the period when the device
/// allows it; otherwise the host default is used and re-blocked.
fn negotiate(
    ranges: impl IntoIterator<Item = SupportedStreamConfigRange>,
    request: &StreamRequest,
) -> Result<Negotiated, NegotiationError> {
    let rate = SampleRate(request.sample_rate);
    let best = ranges
        .into_iter()
        .filter(|range| range.channels() == request.channels)
        .filter(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
        .filter_map(|range| format_rank(range.sample_format()).map(|rank| (rank, range)))
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, range)| range)
        .ok_or(NegotiationError::NoMatchingConfig {
            channels: request.channels,
            sample_rate: request.sample_rate,
        })?;

    let buffer_size = match best.buffer_size() {
        SupportedBufferSize::Range { min, max }
            if (*min..=*max).contains(&request.frames_per_period) =>
        {
            BufferSize::Fixed(request.frames_per_period)
        }
        _ => BufferSize::Default,
    };

    Ok(Negotiated {
        config: StreamConfig {
            channels: request.channels,
            sample_rate: rate,
            buffer_size,
        },
        sample_format: best.sample_format(),
    })
}

/// Input device backed by a cpal stream.
///
/// The stream handle is not `Send` on every host, so this device lives on
/// the thread that drives the controller.
pub struct CpalInputDevice {
    enumerator: DeviceEnumerator,
    device: Option<cpal::Device>,
    info: Option<DeviceInfo>,
    negotiated: Option<Negotiated>,
    frames_per_period: u32,
    stream: Option<cpal::Stream>,
}

impl CpalInputDevice {
    pub fn new(enumerator: DeviceEnumerator) -> Self {
        Self {
            enumerator,
            device: None,
            info: None,
            negotiated: None,
            frames_per_period: 0,
            stream: None,
        }
    }

    fn build_stream<T>(
        &self,
        device: &cpal::Device,
        config: &StreamConfig,
        mut callback: PeriodCallback,
        errors: Arc<ErrorSignal>,
        to_f32: fn(T) -> f32,
    ) -> Result<cpal::Stream, cpal::BuildStreamError>
    where
        T: SizedSample + Send + 'static,
    {
        let mut assembler = PeriodAssembler::new(config.channels, self.frames_per_period);
        let mut stopped = false;

        device.build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if stopped {
                    return;
                }
                let status = assembler.push(data, to_f32, |period| callback(period));
                if status == CallbackStatus::Stop {
                    stopped = true;
                }
            },
            move |err| {
                log::error!("Input stream error: {}", err);
                match err {
                    StreamError::DeviceNotAvailable => {
                        errors.raise_with_detail(FatalKind::DeviceDisconnected, err.to_string())
                    }
                    other => errors.raise_with_detail(FatalKind::DeviceFault, other.to_string()),
                }
            },
            None,
        )
    }

    fn release_stream(&mut self) -> Result<(), CaptureError> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        let paused = stream
            .pause()
            .map_err(|e| CaptureError::Device(format!("failed to pause stream: {}", e)));
        // Dropping the stream joins the host's audio thread.
        drop(stream);
        paused
    }
}

impl CaptureDevice for CpalInputDevice {
    fn device_info(&self) -> Option<DeviceInfo> {
        self.info.clone()
    }

    fn open(&mut self, request: &StreamRequest) -> Result<StreamParameters, CaptureError> {
        let (device, info) = self.enumerator.resolve(&request.device)?;
        let ranges = device
            .supported_input_configs()
            .map_err(NegotiationError::from)?;
        let negotiated = negotiate(ranges, request)?;

        log::info!(
            "Negotiated {:?} on '{}': {} ch @ {} Hz, host buffer {:?}",
            negotiated.sample_format,
            info.name,
            negotiated.config.channels,
            negotiated.config.sample_rate.0,
            negotiated.config.buffer_size
        );

        let parameters = StreamParameters {
            sample_rate: negotiated.config.sample_rate.0,
            channels: negotiated.config.channels,
            frames_per_period: request.frames_per_period,
            device: info.clone(),
        };
        self.device = Some(device);
        self.info = Some(info);
        self.negotiated = Some(negotiated);
        self.frames_per_period = request.frames_per_period;
        Ok(parameters)
    }

    fn start(&mut self, callback: PeriodCallback, errors: Arc<ErrorSignal>) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Err(CaptureError::InvalidState("stream is already running".into()));
        }
        let (Some(device), Some(negotiated)) = (self.device.as_ref(), self.negotiated.as_ref()) else {
            return Err(CaptureError::InvalidState("device is not open".into()));
        };

        let config = &negotiated.config;
        let built = match negotiated.sample_format {
            SampleFormat::F32 => self.build_stream(device, config, callback, errors, convert::from_f32),
            SampleFormat::I32 => self.build_stream(device, config, callback, errors, convert::from_i32),
            SampleFormat::I16 => self.build_stream(device, config, callback, errors, convert::from_i16),
            SampleFormat::U16 => self.build_stream(device, config, callback, errors, convert::from_u16),
            other => {
                return Err(CaptureError::UnsupportedParameters(format!(
                    "sample format {:?} is not supported",
                    other
                )))
            }
        };
        let stream = built.map_err(|e| CaptureError::Device(format!("failed to build input stream: {}", e)))?;
        stream
            .play()
            .map_err(|e| CaptureError::Device(format!("failed to start input stream: {}", e)))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.release_stream()
    }

    fn close(&mut self) -> Result<(), CaptureError> {
        let result = self.release_stream();
        self.negotiated = None;
        self.device = None;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multichannel_capture_core::models::config::DeviceSelector;

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat, buffer: SupportedBufferSize) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(channels, SampleRate(min), SampleRate(max), buffer, format)
    }

    fn request(channels: u16, rate: u32, frames: u32) -> StreamRequest {
        StreamRequest {
            sample_rate: rate,
            channels,
            frames_per_period: frames,
            device: DeviceSelector::Default,
        }
    }

    #[test]
    fn prefers_f32_over_integer_formats() {
        let ranges = vec![
            range(4, 8_000, 96_000, SampleFormat::I16, SupportedBufferSize::Unknown),
            range(4, 8_000, 96_000, SampleFormat::F32, SupportedBufferSize::Unknown),
        ];
        let negotiated = negotiate(ranges, &request(4, 44_100, 256)).unwrap();
        assert_eq!(negotiated.sample_format, SampleFormat::F32);
        assert_eq!(negotiated.config.sample_rate, SampleRate(44_100));
        assert_eq!(negotiated.config.buffer_size, BufferSize::Default);
    }

    #[test]
    fn pins_buffer_size_when_in_range() {
        let ranges = vec![range(
            2,
            44_100,
            48_000,
            SampleFormat::I16,
            SupportedBufferSize::Range { min: 64, max: 4096 },
        )];
        let negotiated = negotiate(ranges, &request(2, 48_000, 256)).unwrap();
        assert_eq!(negotiated.config.buffer_size, BufferSize::Fixed(256));
        assert_eq!(negotiated.sample_format, SampleFormat::I16);
    }

    #[test]
    fn out_of_range_buffer_falls_back_to_default() {
        let ranges = vec![range(
            1,
            44_100,
            44_100,
            SampleFormat::F32,
            SupportedBufferSize::Range { min: 512, max: 4096 },
        )];
        let negotiated = negotiate(ranges, &request(1, 44_100, 256)).unwrap();
        assert_eq!(negotiated.config.buffer_size, BufferSize::Default);
    }

    #[test]
    fn channel_count_must_match_exactly() {
        let ranges = vec![range(8, 8_000, 96_000, SampleFormat::F32, SupportedBufferSize::Unknown)];
        let err = negotiate(ranges, &request(4, 44_100, 256)).unwrap_err();
        assert!(matches!(CaptureError::from(err), CaptureError::UnsupportedParameters(_)));
    }

    #[test]
    fn unsupported_formats_are_skipped() {
        let ranges = vec![
            range(2, 8_000, 96_000, SampleFormat::U8, SupportedBufferSize::Unknown),
            range(2, 8_000, 96_000, SampleFormat::F64, SupportedBufferSize::Unknown),
        ];
        assert!(negotiate(ranges, &request(2, 44_100, 256)).is_err());
    }

    #[test]
    fn rate_outside_every_range_is_rejected() {
        let ranges = vec![range(2, 8_000, 22_050, SampleFormat::F32, SupportedBufferSize::Unknown)];
        assert!(matches!(
            negotiate(ranges, &request(2, 44_100, 256)),
            Err(NegotiationError::NoMatchingConfig { channels: 2, sample_rate: 44_100 })
        ));
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn captures_from_default_device() {
        use std::sync::atomic::{AtomicU64, Ordering};
        use std::time::Duration;

        let mut device = CpalInputDevice::new(DeviceEnumerator::new());
        let parameters = device.open(&request(1, 44_100, 256)).unwrap();
        let periods = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&periods);
        let expected = parameters.samples_per_period();
        device
            .start(
                Box::new(move |block: &[f32]| {
                    assert_eq!(block.len(), expected);
                    counter.fetch_add(1, Ordering::Relaxed);
                    CallbackStatus::Continue
                }),
                Arc::new(ErrorSignal::new()),
            )
            .unwrap();
        std::thread::sleep(Duration::from_millis(500));
        device.close().unwrap();
        assert!(periods.load(Ordering::Relaxed) > 0);
    }
}

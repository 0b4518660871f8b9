use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::models::audio_models::{CallbackStatus, DeviceInfo, StreamParameters, StreamRequest};
use crate::models::config::DeviceSelector;
use crate::models::error::CaptureError;
use crate::session::error_signal::{ErrorSignal, FatalKind};
use crate::traits::capture_device::{CaptureDevice, PeriodCallback};

/// Deterministic sample for `frame` on `channel`.
///
/// The integer part is the channel index and the fraction encodes the frame
/// position, so every value is exact in f32 and identifies its origin.
pub fn sample_value(frame: u64, channel: u16) -> f32 {
    (frame % 65_536) as f32 / 65_536.0 + channel as f32
}

/// Shared view of a running mock stream.
#[derive(Debug, Clone, Default)]
pub struct MockProgress {
    delivered: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
}

impl MockProgress {
    /// Periods handed to the callback so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    /// True once the stream thread has exited on its own or been stopped.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Block until the stream thread exits or `timeout` passes.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while !self.is_finished() {
            if std::time::Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

/// Hardware-free input device.
///
/// Drives the period callback from its own thread with `sample_value`
/// samples. Without a pace it delivers periods back to back.
pub struct MockDevice {
    info: DeviceInfo,
    sample_rates: Vec<u32>,
    period_limit: Option<u64>,
    pace: Option<Duration>,
    open_error: Option<CaptureError>,
    disconnect_after: Option<u64>,
    frames_override: Option<u32>,
    parameters: Option<StreamParameters>,
    running: Arc<AtomicBool>,
    progress: MockProgress,
    worker: Option<thread::JoinHandle<()>>,
}

impl MockDevice {
    pub fn new(max_channels: u16) -> Self {
        Self {
            info: DeviceInfo {
                id: "mock-0".into(),
                name: "Mock Input".into(),
                is_default: true,
                max_input_channels: Some(max_channels),
            },
            sample_rates: Vec::new(),
            period_limit: None,
            pace: None,
            open_error: None,
            disconnect_after: None,
            frames_override: None,
            parameters: None,
            running: Arc::new(AtomicBool::new(false)),
            progress: MockProgress::default(),
            worker: None,
        }
    }

    /// Stop delivering after `periods` callbacks.
    pub fn with_periods(mut self, periods: u64) -> Self {
        self.period_limit = Some(periods);
        self
    }

    /// Sleep between callbacks.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    /// Only these rates are accepted by `open`. Empty accepts any rate.
    pub fn with_sample_rates(mut self, rates: &[u32]) -> Self {
        self.sample_rates = rates.to_vec();
        self
    }

    pub fn failing_open(mut self, error: CaptureError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// Raise a disconnection instead of delivering period `period`.
    pub fn disconnect_after(mut self, period: u64) -> Self {
        self.disconnect_after = Some(period);
        self
    }

    /// Negotiate this period size regardless of the request.
    pub fn with_frames_per_period(mut self, frames: u32) -> Self {
        self.frames_override = Some(frames);
        self
    }

    pub fn progress(&self) -> MockProgress {
        self.progress.clone()
    }

    fn halt(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Mock device stream thread panicked");
            }
        }
    }
}

impl CaptureDevice for MockDevice {
    fn device_info(&self) -> Option<DeviceInfo> {
        Some(self.info.clone())
    }

    fn open(&mut self, request: &StreamRequest) -> Result<StreamParameters, CaptureError> {
        if let Some(ref err) = self.open_error {
            return Err(err.clone());
        }
        match &request.device {
            DeviceSelector::Default | DeviceSelector::Index(0) => {}
            DeviceSelector::Name(name) if *name == self.info.name => {}
            _ => return Err(CaptureError::DeviceNotAvailable),
        }

        let max_channels = self.info.max_input_channels.unwrap_or(0);
        if request.channels > max_channels {
            return Err(CaptureError::UnsupportedParameters(format!(
                "{} channels requested, device has {}",
                request.channels, max_channels
            )));
        }
        if !self.sample_rates.is_empty() && !self.sample_rates.contains(&request.sample_rate) {
            return Err(CaptureError::UnsupportedParameters(format!(
                "{} Hz not supported",
                request.sample_rate
            )));
        }

        let parameters = StreamParameters {
            sample_rate: request.sample_rate,
            channels: request.channels,
            frames_per_period: self.frames_override.unwrap_or(request.frames_per_period),
            device: self.info.clone(),
        };
        self.parameters = Some(parameters.clone());
        Ok(parameters)
    }

    fn start(&mut self, mut callback: PeriodCallback, errors: Arc<ErrorSignal>) -> Result<(), CaptureError> {
        let Some(parameters) = self.parameters.clone() else {
            return Err(CaptureError::InvalidState("mock device is not open".into()));
        };
        if self.worker.is_some() {
            return Err(CaptureError::InvalidState("mock device is already streaming".into()));
        }

        let channels = parameters.channels;
        let frames = parameters.frames_per_period as usize;
        let period_limit = self.period_limit;
        let disconnect_after = self.disconnect_after;
        let pace = self.pace;
        let running = Arc::clone(&self.running);
        let progress = self.progress.clone();

        running.store(true, Ordering::Release);
        progress.finished.store(false, Ordering::Release);

        let worker = thread::Builder::new()
            .name("mock-device".into())
            .spawn(move || {
                let mut block = vec![0.0f32; frames * channels as usize];
                let mut sequence = 0u64;
                while running.load(Ordering::Acquire) {
                    if period_limit.is_some_and(|limit| sequence >= limit) {
                        break;
                    }
                    if disconnect_after == Some(sequence) {
                        errors.raise_with_detail(FatalKind::DeviceDisconnected, "mock device unplugged");
                        break;
                    }

                    let first_frame = sequence * frames as u64;
                    for (f, frame) in block.chunks_exact_mut(channels as usize).enumerate() {
                        for (c, sample) in frame.iter_mut().enumerate() {
                            *sample = sample_value(first_frame + f as u64, c as u16);
                        }
                    }

                    let status = callback(&block[..]);
                    progress.delivered.fetch_add(1, Ordering::AcqRel);
                    sequence += 1;
                    if status == CallbackStatus::Stop {
                        break;
                    }
                    if let Some(pace) = pace {
                        thread::sleep(pace);
                    }
                }
                progress.finished.store(true, Ordering::Release);
            })
            .map_err(|e| CaptureError::Device(format!("failed to spawn mock stream thread: {}", e)))?;

        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.halt();
        Ok(())
    }

    fn close(&mut self) -> Result<(), CaptureError> {
        self.halt();
        self.parameters = None;
        Ok(())
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.halt();
    }
}

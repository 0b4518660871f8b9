use std::sync::Arc;

use crate::models::audio_models::{CallbackStatus, DeviceInfo, StreamParameters, StreamRequest};
use crate::models::error::CaptureError;
use crate::session::error_signal::ErrorSignal;

/// Real-time period callback.
///
/// Receives exactly one period of interleaved f32 samples per invocation,
/// `frames_per_period × channels` long. Runs on the audio thread: it must not
/// block, allocate, or log.
pub type PeriodCallback = Box<dyn FnMut(&[f32]) -> CallbackStatus + Send + 'static>;

/// Interface for an input device that can stream interleaved periods.
///
/// Implemented by:
/// - `MockDevice` (this crate, for tests)
/// - `CpalInputDevice` (multichannel-capture-cpal)
///
/// Calls arrive in `open → start → stop → close` order from the controller
/// thread. Implementations need not be `Send`; host stream handles often
/// are not.
pub trait CaptureDevice {
    /// The device behind this handle, once known.
    fn device_info(&self) -> Option<DeviceInfo>;

    /// Negotiate stream parameters. Returns what the device will actually
    /// deliver, which the caller compares against `request`.
    fn open(&mut self, request: &StreamRequest) -> Result<StreamParameters, CaptureError>;

    /// Begin invoking `callback` once per period.
    ///
    /// Asynchronous failures (disconnection, host faults) are raised on
    /// `errors` rather than returned.
    fn start(&mut self, callback: PeriodCallback, errors: Arc<ErrorSignal>) -> Result<(), CaptureError>;

    /// Halt the stream. Once this returns the callback is never invoked again.
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Release the device.
    fn close(&mut self) -> Result<(), CaptureError>;
}

use crate::models::error::CaptureError;
use crate::models::recording_result::CaptureReport;
use crate::models::state::CaptureState;

/// Event delegate for capture lifecycle notifications.
///
/// All methods are called from the thread driving the `CaptureController`,
/// never from the real-time callback or the writer threads.
pub trait CaptureDelegate: Send + Sync {
    /// Called after every state transition.
    fn on_state_changed(&self, state: &CaptureState);

    /// Called when a device, sink, or stream error is observed.
    fn on_error(&self, error: &CaptureError);

    /// Called once the channel files are closed and the report is built.
    fn on_capture_finished(&self, report: &CaptureReport);
}

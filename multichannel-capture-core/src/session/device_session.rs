use std::sync::Arc;

use crate::models::audio_models::{
    CallbackStatus, FrameBlock, StreamParameters, StreamRequest,
};
use crate::models::error::CaptureError;
use crate::models::state::CaptureState;
use crate::processing::demux;
use crate::processing::transfer_queue::QueueProducer;
use crate::session::error_signal::{ErrorSignal, FatalKind};
use crate::traits::capture_device::CaptureDevice;

/// Everything the real-time callback touches, moved into it at start.
///
/// Staging buffers are swapped into the transfer queue's pool on each push,
/// so a period costs one demultiplex pass and no allocation.
pub struct CaptureContext {
    channels: usize,
    frames_per_period: usize,
    staging: Vec<Box<[f32]>>,
    next_sequence: u64,
    producer: QueueProducer,
    signal: Arc<ErrorSignal>,
}

impl CaptureContext {
    pub fn new(parameters: &StreamParameters, producer: QueueProducer, signal: Arc<ErrorSignal>) -> Self {
        let channels = parameters.channels as usize;
        let frames_per_period = parameters.frames_per_period as usize;
        Self {
            channels,
            frames_per_period,
            staging: (0..channels)
                .map(|_| vec![0.0f32; frames_per_period].into_boxed_slice())
                .collect(),
            next_sequence: 0,
            producer,
            signal,
        }
    }

    /// Handle one period of interleaved samples.
    pub fn on_period(&mut self, interleaved: &[f32]) -> CallbackStatus {
        if self.signal.is_fatal() {
            return CallbackStatus::Stop;
        }

        let block = FrameBlock::new(self.next_sequence, self.channels, interleaved);
        if !block.is_whole() || block.frames() != self.frames_per_period {
            self.signal.raise(FatalKind::MalformedBlock);
            return CallbackStatus::Stop;
        }

        demux::demultiplex(block.samples, block.channels, &mut self.staging);
        self.producer
            .push_period(block.sequence, block.frames(), &mut self.staging);
        self.next_sequence += 1;
        CallbackStatus::Continue
    }

    /// Periods accepted so far.
    pub fn periods(&self) -> u64 {
        self.next_sequence
    }
}

/// Owns the device handle and the capture state machine.
///
/// Every state change goes through `transition` or `fail`, which refuse
/// moves the state machine does not allow.
pub struct DeviceSession<D: CaptureDevice> {
    device: D,
    state: CaptureState,
    parameters: Option<StreamParameters>,
    signal: Arc<ErrorSignal>,
}

impl<D: CaptureDevice> DeviceSession<D> {
    pub fn new(device: D, signal: Arc<ErrorSignal>) -> Self {
        Self {
            device,
            state: CaptureState::Uninitialized,
            parameters: None,
            signal,
        }
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    /// Negotiated parameters, once opened.
    pub fn parameters(&self) -> Option<&StreamParameters> {
        self.parameters.as_ref()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn transition(&mut self, next: CaptureState) -> Result<(), CaptureError> {
        if !self.state.can_transition_to(&next) {
            return Err(CaptureError::InvalidState(format!(
                "cannot move from {} to {}",
                self.state.name(),
                next.name()
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Enter `Failed(error)` unless already terminal.
    pub fn fail(&mut self, error: CaptureError) {
        if !self.state.is_terminal() {
            self.state = CaptureState::Failed(error);
        }
    }

    /// Open the device and check it agreed to exactly what was asked.
    pub fn open(&mut self, request: &StreamRequest) -> Result<StreamParameters, CaptureError> {
        if self.state != CaptureState::Uninitialized {
            return Err(CaptureError::InvalidState(format!(
                "open requires uninitialized, session is {}",
                self.state.name()
            )));
        }

        let parameters = match self.device.open(request) {
            Ok(parameters) => parameters,
            Err(err) => {
                self.fail(err.clone());
                return Err(err);
            }
        };

        if let Some(mismatch) = parameters.mismatch(request) {
            let err = CaptureError::UnsupportedParameters(mismatch);
            let _ = self.device.close();
            self.fail(err.clone());
            return Err(err);
        }

        self.parameters = Some(parameters.clone());
        self.transition(CaptureState::Opened)?;
        Ok(parameters)
    }

    /// Hand the device a callback that demultiplexes into `producer`.
    pub fn start(&mut self, producer: QueueProducer) -> Result<(), CaptureError> {
        if self.state != CaptureState::Opened {
            return Err(CaptureError::InvalidState(format!(
                "start requires opened, session is {}",
                self.state.name()
            )));
        }
        let Some(parameters) = self.parameters.as_ref() else {
            return Err(CaptureError::InvalidState("no negotiated parameters".into()));
        };

        let mut context = CaptureContext::new(parameters, producer, Arc::clone(&self.signal));
        let callback = Box::new(move |interleaved: &[f32]| context.on_period(interleaved));

        if let Err(err) = self.device.start(callback, Arc::clone(&self.signal)) {
            let _ = self.device.close();
            self.fail(err.clone());
            return Err(err);
        }
        self.transition(CaptureState::Running)
    }

    /// Enter `Stopping` and halt the device. No pushes happen after this
    /// returns, even if the device reports an error while stopping.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        self.transition(CaptureState::Stopping)?;
        self.device.stop()
    }

    /// Release the device. Moves `Drained → Closed`; a failed session stays
    /// failed.
    pub fn close(&mut self) -> Result<(), CaptureError> {
        let result = self.device.close();
        if self.state == CaptureState::Drained {
            self.transition(CaptureState::Closed)?;
        }
        result
    }
}

//! # multichannel-capture-core
//!
//! Platform-agnostic multichannel capture pipeline.
//!
//! Splits one interleaved input stream into per-channel raw files without
//! ever blocking the real-time callback. Device backends (cpal, the mock
//! device) implement the `CaptureDevice` trait and plug into the generic
//! `CaptureController`.
//!
//! ## Architecture
//!
//! ```text
//! multichannel-capture-core (this crate)
//! ├── traits/       ← CaptureDevice, CaptureDelegate
//! ├── models/       ← CaptureError, CaptureState, CaptureConfiguration, frames, report
//! ├── processing/   ← demultiplexer, transfer queue, period assembler, raw format
//! ├── session/      ← CaptureController, DeviceSession, ErrorSignal, DrainLatch
//! ├── storage/      ← ChannelWriter, report sidecar
//! └── devices/      ← MockDevice
//! ```

pub mod devices;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use devices::mock::MockDevice;
pub use models::audio_models::{CallbackStatus, ChannelSlice, DeviceInfo, FrameBlock, StreamParameters, StreamRequest};
pub use models::config::{CaptureConfiguration, DeviceSelector};
pub use models::error::CaptureError;
pub use models::recording_result::{CaptureReport, ChannelReport};
pub use models::state::CaptureState;
pub use processing::demux::{demultiplex, interleave};
pub use processing::period_assembler::PeriodAssembler;
pub use processing::transfer_queue::{create_transfer_queue, PushStatus};
pub use session::controller::{CaptureController, StopSignal};
pub use session::device_session::{CaptureContext, DeviceSession};
pub use session::error_signal::{ErrorSignal, FatalKind};
pub use storage::channel_writer::ChannelWriter;
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::capture_device::{CaptureDevice, PeriodCallback};

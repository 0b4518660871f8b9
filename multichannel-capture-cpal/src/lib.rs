//! # multichannel-capture-cpal
//!
//! cpal input backend for multichannel-capture.
//!
//! Provides:
//! - `CpalInputDevice`: `CaptureDevice` over a cpal input stream
//! - `DeviceEnumerator`: input device listing and selection on the default host
//! - `record-multichannel`: command-line recorder binary
//!
//! ## Usage
//! ```ignore
//! use multichannel_capture_core::{CaptureConfiguration, CaptureController, StopSignal};
//! use multichannel_capture_cpal::{CpalInputDevice, DeviceEnumerator};
//!
//! let device = CpalInputDevice::new(DeviceEnumerator::new());
//! let mut controller = CaptureController::new(device, CaptureConfiguration::default());
//! controller.open()?;
//! controller.start()?;
//! let report = controller.run_until_stopped(&StopSignal::new())?;
//! ```

pub mod cpal_input;
pub mod device_enumerator;

pub use cpal_input::CpalInputDevice;
pub use device_enumerator::DeviceEnumerator;

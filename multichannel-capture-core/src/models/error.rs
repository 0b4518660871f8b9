use thiserror::Error;

/// Errors that can occur while opening, running, or closing a capture.
///
/// Overflow is deliberately absent: a full transfer queue is counted per
/// channel and reported as a warning, never raised.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("no suitable input device available")]
    DeviceNotAvailable,

    #[error("device error: {0}")]
    Device(String),

    #[error("unsupported stream parameters: {0}")]
    UnsupportedParameters(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("sink error on channel {channel}: {reason}")]
    Sink { channel: u16, reason: String },

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("stream fatal: {0}")]
    StreamFatal(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl CaptureError {
    pub fn sink(channel: u16, reason: impl Into<String>) -> Self {
        Self::Sink {
            channel,
            reason: reason.into(),
        }
    }

    /// True for failures at the device boundary.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotAvailable | Self::Device(_) | Self::UnsupportedParameters(_)
        )
    }

    pub fn is_sink_error(&self) -> bool {
        matches!(self, Self::Sink { .. })
    }

    /// Process exit code for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DeviceNotAvailable | Self::Device(_) | Self::UnsupportedParameters(_) => 2,
            Self::ConfigurationFailed(_) => 3,
            Self::Sink { .. } | Self::StorageError(_) => 4,
            Self::StreamFatal(_) => 5,
            Self::InvalidState(_) => 70,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_error_display_names_channel() {
        let err = CaptureError::sink(3, "disk full");
        assert_eq!(err.to_string(), "sink error on channel 3: disk full");
        assert!(err.is_sink_error());
        assert!(!err.is_device_error());
    }

    #[test]
    fn device_errors_are_classified() {
        assert!(CaptureError::DeviceNotAvailable.is_device_error());
        assert!(CaptureError::UnsupportedParameters("8 channels".into()).is_device_error());
        assert!(!CaptureError::StreamFatal("gone".into()).is_device_error());
    }

    #[test]
    fn exit_codes_are_nonzero() {
        let errors = [
            CaptureError::DeviceNotAvailable,
            CaptureError::ConfigurationFailed("x".into()),
            CaptureError::sink(0, "x"),
            CaptureError::StorageError("x".into()),
            CaptureError::StreamFatal("x".into()),
            CaptureError::InvalidState("x".into()),
        ];
        assert!(errors.iter().all(|e| e.exit_code() != 0));
    }
}

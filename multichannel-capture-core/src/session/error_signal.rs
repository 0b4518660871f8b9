use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::models::error::CaptureError;

/// Why a running stream can no longer continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FatalKind {
    DeviceDisconnected = 1,
    DeviceFault = 2,
    MalformedBlock = 3,
}

impl FatalKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::DeviceDisconnected),
            2 => Some(Self::DeviceFault),
            3 => Some(Self::MalformedBlock),
            _ => None,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::DeviceDisconnected => "input device disconnected",
            Self::DeviceFault => "input device reported a fatal error",
            Self::MalformedBlock => "device delivered a malformed frame block",
        }
    }
}

/// Error cell shared by the real-time callback, device error callbacks,
/// writers, and the lifecycle controller.
///
/// `raise` and `note_sink_failure` touch atomics only and are safe on the
/// real-time thread. The first fatal kind raised wins.
#[derive(Debug, Default)]
pub struct ErrorSignal {
    fatal: AtomicU8,
    sink_failures: AtomicU32,
    detail: Mutex<Option<String>>,
}

impl ErrorSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self, kind: FatalKind) {
        let _ = self
            .fatal
            .compare_exchange(0, kind as u8, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Raise with a human-readable reason. Never blocks; the reason is
    /// dropped if the detail cell is busy or already set.
    pub fn raise_with_detail(&self, kind: FatalKind, detail: impl Into<String>) {
        self.raise(kind);
        if let Some(mut slot) = self.detail.try_lock() {
            if slot.is_none() {
                *slot = Some(detail.into());
            }
        }
    }

    pub fn fatal(&self) -> Option<FatalKind> {
        FatalKind::from_u8(self.fatal.load(Ordering::Acquire))
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::Acquire) != 0
    }

    pub fn note_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::AcqRel);
    }

    pub fn sink_failures(&self) -> u32 {
        self.sink_failures.load(Ordering::Acquire)
    }

    /// The raised condition as a `StreamFatal` error, if any.
    pub fn to_error(&self) -> Option<CaptureError> {
        let kind = self.fatal()?;
        let message = match self.detail.lock().as_deref() {
            Some(detail) => format!("{}: {}", kind.describe(), detail),
            None => kind.describe().to_string(),
        };
        Some(CaptureError::StreamFatal(message))
    }
}

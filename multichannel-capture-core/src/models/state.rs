use super::error::CaptureError;

/// Capture lifecycle state machine.
///
/// State transitions:
/// ```text
/// uninitialized → opened → running → stopping → drained → closed
///        └──────────┴─────────┴──────────┴─────────┴──→ failed
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Uninitialized,
    Opened,
    Running,
    Stopping,
    Drained,
    Closed,
    Failed(CaptureError),
}

impl CaptureState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: &CaptureState) -> bool {
        use CaptureState::*;
        match (self, next) {
            (Closed | Failed(_), _) => false,
            (_, Failed(_)) => true,
            (Uninitialized, Opened)
            | (Opened, Running)
            | (Running, Stopping)
            | (Stopping, Drained)
            | (Drained, Closed) => true,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Opened => "opened",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Drained => "drained",
            Self::Closed => "closed",
            Self::Failed(_) => "failed",
        }
    }
}

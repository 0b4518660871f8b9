use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::audio_models::StreamParameters;

/// Outcome of one channel's writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelReport {
    pub channel: u16,
    pub file_path: PathBuf,
    pub bytes_written: u64,
    pub slices_written: u64,
    /// Slices discarded at push time because the channel's queue was full.
    pub slices_dropped: u64,
    /// Slices queued but never written because the writer halted.
    pub slices_discarded: u64,
    /// Forward jumps in sequence number seen by the writer.
    pub gap_events: u64,
    /// Sequence numbers skipped across all gaps.
    pub missing_slices: u64,
    /// Entries refused because their sequence was not after the last written.
    pub rejected_slices: u64,
    pub last_sequence: Option<u64>,
    /// SHA-256 of the closed file, hex encoded.
    pub checksum: Option<String>,
    pub error: Option<String>,
}

impl ChannelReport {
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary written when a capture run closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureReport {
    pub id: String,
    pub created_at: String,
    pub parameters: StreamParameters,
    /// Periods the callback handed to the queue (pushed or dropped).
    pub periods_captured: u64,
    pub duration_secs: f64,
    pub stream_error: Option<String>,
    pub channels: Vec<ChannelReport>,
}

impl CaptureReport {
    pub fn new(
        parameters: StreamParameters,
        periods_captured: u64,
        stream_error: Option<String>,
        channels: Vec<ChannelReport>,
    ) -> Self {
        let duration_secs = periods_captured as f64 * parameters.frames_per_period as f64
            / parameters.sample_rate as f64;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            parameters,
            periods_captured,
            duration_secs,
            stream_error,
            channels,
        }
    }

    pub fn total_dropped(&self) -> u64 {
        self.channels.iter().map(|c| c.slices_dropped).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.channels.iter().map(|c| c.bytes_written).sum()
    }

    /// No stream failure and every channel closed without error.
    pub fn is_clean(&self) -> bool {
        self.stream_error.is_none() && self.channels.iter().all(ChannelReport::is_clean)
    }

    /// Process exit code for the run: 0 only when clean.
    ///
    /// Dropped slices alone do not fail a run.
    pub fn exit_code(&self) -> i32 {
        if self.stream_error.is_some() {
            5
        } else if !self.channels.iter().all(ChannelReport::is_clean) {
            4
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_models::DeviceInfo;
    use approx::assert_relative_eq;

    fn parameters() -> StreamParameters {
        StreamParameters {
            sample_rate: 44_100,
            channels: 2,
            frames_per_period: 256,
            device: DeviceInfo {
                id: "mock".into(),
                name: "Mock".into(),
                is_default: true,
                max_input_channels: Some(2),
            },
        }
    }

    fn channel(index: u16, dropped: u64, error: Option<&str>) -> ChannelReport {
        ChannelReport {
            channel: index,
            file_path: PathBuf::from(format!("channel_{}.raw", index)),
            bytes_written: 1024,
            slices_written: 1,
            slices_dropped: dropped,
            slices_discarded: 0,
            gap_events: 0,
            missing_slices: 0,
            rejected_slices: 0,
            last_sequence: Some(0),
            checksum: None,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn duration_follows_periods() {
        let report = CaptureReport::new(parameters(), 100, None, vec![]);
        assert_relative_eq!(report.duration_secs, 25_600.0 / 44_100.0, epsilon = 1e-9);
    }

    #[test]
    fn drops_do_not_fail_the_run() {
        let report = CaptureReport::new(
            parameters(),
            10,
            None,
            vec![channel(0, 3, None), channel(1, 2, None)],
        );
        assert_eq!(report.total_dropped(), 5);
        assert!(report.is_clean());
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn channel_error_fails_the_run() {
        let report = CaptureReport::new(
            parameters(),
            10,
            None,
            vec![channel(0, 0, None), channel(1, 0, Some("disk full"))],
        );
        assert!(!report.is_clean());
        assert_eq!(report.exit_code(), 4);
    }

    #[test]
    fn stream_error_takes_precedence() {
        let report = CaptureReport::new(
            parameters(),
            10,
            Some("device disconnected".into()),
            vec![channel(0, 0, Some("disk full"))],
        );
        assert_eq!(report.exit_code(), 5);
    }

    #[test]
    fn serializes_to_json() {
        let report = CaptureReport::new(parameters(), 1, None, vec![channel(0, 0, None)]);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"periods_captured\":1"));
        let back: CaptureReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}

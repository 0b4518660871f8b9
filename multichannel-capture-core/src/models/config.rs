use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::processing::raw_format;

/// Upper bound on the channel fan-out accepted by `validate`.
pub const MAX_CHANNELS: u16 = 256;

/// Which input device to capture from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceSelector {
    /// The host's default input device.
    #[default]
    Default,
    /// Exact device name as reported by the host.
    Name(String),
    /// Zero-based position in the host's input device list.
    Index(usize),
}

impl FromStr for DeviceSelector {
    type Err = std::convert::Infallible;

    /// `"default"` or empty selects the default device, a bare integer an
    /// index, anything else a device name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("default") {
            return Ok(Self::Default);
        }
        match trimmed.parse::<usize>() {
            Ok(index) => Ok(Self::Index(index)),
            Err(_) => Ok(Self::Name(trimmed.to_string())),
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default input device"),
            Self::Name(name) => write!(f, "device '{}'", name),
            Self::Index(index) => write!(f, "device #{}", index),
        }
    }
}

/// Configuration for a capture run.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfiguration {
    /// Sample rate in Hz (default: 44100).
    pub sample_rate: u32,

    /// Number of interleaved input channels; one sink per channel (default: 4).
    pub channels: u16,

    /// Frames delivered per real-time callback (default: 256).
    pub frames_per_period: u32,

    /// Input device to open (default: system default input).
    pub device: DeviceSelector,

    /// Directory where channel files are written.
    pub output_directory: PathBuf,

    /// Channel file name prefix, followed by the zero-based channel index.
    pub file_prefix: String,

    /// Channel file extension, without the dot.
    pub file_extension: String,

    /// Slices each channel may have in flight before new ones are dropped.
    pub queue_capacity_periods: usize,

    /// Periods buffered by a channel writer before hitting the sink.
    pub write_batch_periods: usize,

    /// Maximum time to wait for writers to drain on stop (None = no limit).
    pub drain_timeout: Option<Duration>,

    /// Write a JSON report beside the channel files on close.
    pub write_report: bool,

    /// Replace channel files left by an earlier run instead of refusing to
    /// open (default: false).
    pub overwrite_existing: bool,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(format!(
                "channel count must be between 1 and {}, got {}",
                MAX_CHANNELS, self.channels
            ));
        }
        if self.frames_per_period == 0 {
            return Err("frames per period must be at least 1".into());
        }
        if self.queue_capacity_periods == 0 {
            return Err("queue capacity must be at least one period".into());
        }
        if self.write_batch_periods == 0 {
            return Err("write batch must be at least one period".into());
        }
        for part in [&self.file_prefix, &self.file_extension] {
            if part.contains(['/', '\\']) || part.contains("..") {
                return Err(format!(
                    "file prefix and extension must not contain path separators or '..', got '{}'",
                    part
                ));
            }
        }
        Ok(())
    }

    /// Sink path for `channel`.
    pub fn channel_path(&self, channel: u16) -> PathBuf {
        self.output_directory.join(raw_format::channel_file_name(
            &self.file_prefix,
            channel,
            &self.file_extension,
        ))
    }

    /// Sink paths for every channel, in channel order.
    pub fn channel_paths(&self) -> Vec<PathBuf> {
        (0..self.channels).map(|c| self.channel_path(c)).collect()
    }

    /// Location of the JSON report sidecar.
    pub fn report_path(&self) -> PathBuf {
        self.output_directory
            .join(format!("{}report.json", self.file_prefix))
    }

    /// Wall-clock length of one period.
    pub fn period_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames_per_period as f64 / self.sample_rate as f64)
    }

    /// Bytes one channel slice occupies on disk.
    pub fn slice_bytes(&self) -> usize {
        self.frames_per_period as usize * raw_format::BYTES_PER_SAMPLE
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 4,
            frames_per_period: 256,
            device: DeviceSelector::Default,
            output_directory: PathBuf::from("."),
            file_prefix: "channel_".into(),
            file_extension: "raw".into(),
            queue_capacity_periods: 256,
            write_batch_periods: 16,
            drain_timeout: Some(Duration::from_secs(30)),
            write_report: true,
            overwrite_existing: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_recorder() {
        let config = CaptureConfiguration::default();
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.channels, 4);
        assert_eq!(config.frames_per_period, 256);
        assert_eq!(config.device, DeviceSelector::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn channel_paths_are_indexed_from_zero() {
        let config = CaptureConfiguration {
            output_directory: PathBuf::from("/tmp/run"),
            channels: 2,
            ..Default::default()
        };
        assert_eq!(
            config.channel_paths(),
            vec![
                PathBuf::from("/tmp/run/channel_0.raw"),
                PathBuf::from("/tmp/run/channel_1.raw"),
            ]
        );
        assert_eq!(config.report_path(), PathBuf::from("/tmp/run/channel_report.json"));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let zero_channels = CaptureConfiguration {
            channels: 0,
            ..Default::default()
        };
        assert!(zero_channels.validate().is_err());

        let zero_frames = CaptureConfiguration {
            frames_per_period: 0,
            ..Default::default()
        };
        assert!(zero_frames.validate().is_err());

        let zero_queue = CaptureConfiguration {
            queue_capacity_periods: 0,
            ..Default::default()
        };
        assert!(zero_queue.validate().is_err());

        let bad_prefix = CaptureConfiguration {
            file_prefix: "../escape/".into(),
            ..Default::default()
        };
        assert!(bad_prefix.validate().is_err());

        let backslash = CaptureConfiguration {
            file_prefix: "take\\ch".into(),
            ..Default::default()
        };
        assert!(backslash.validate().is_err());

        let dotted_extension = CaptureConfiguration {
            file_extension: "..".into(),
            ..Default::default()
        };
        assert!(dotted_extension.validate().is_err());

        let plain_dot = CaptureConfiguration {
            file_prefix: "take.1_ch".into(),
            ..Default::default()
        };
        assert!(plain_dot.validate().is_ok());
    }

    #[test]
    fn device_selector_parses_index_name_and_default() {
        assert_eq!("default".parse::<DeviceSelector>().unwrap(), DeviceSelector::Default);
        assert_eq!("".parse::<DeviceSelector>().unwrap(), DeviceSelector::Default);
        assert_eq!("2".parse::<DeviceSelector>().unwrap(), DeviceSelector::Index(2));
        assert_eq!(
            "Scarlett 4i4".parse::<DeviceSelector>().unwrap(),
            DeviceSelector::Name("Scarlett 4i4".into())
        );
    }

    #[test]
    fn period_math() {
        let config = CaptureConfiguration::default();
        assert_eq!(config.slice_bytes(), 1024);
        let period = config.period_duration();
        assert!(period > Duration::from_millis(5) && period < Duration::from_millis(6));
    }
}

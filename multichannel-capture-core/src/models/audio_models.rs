use serde::{Deserialize, Serialize};

use super::config::{CaptureConfiguration, DeviceSelector};

/// An input device available for capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    /// Largest input channel count the device advertises, if known.
    pub max_input_channels: Option<u16>,
}

/// Stream parameters the pipeline asks a device for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames_per_period: u32,
    pub device: DeviceSelector,
}

impl From<&CaptureConfiguration> for StreamRequest {
    fn from(config: &CaptureConfiguration) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            frames_per_period: config.frames_per_period,
            device: config.device.clone(),
        }
    }
}

/// Stream parameters a device agreed to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamParameters {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames_per_period: u32,
    pub device: DeviceInfo,
}

impl StreamParameters {
    /// Interleaved samples in one full period.
    pub fn samples_per_period(&self) -> usize {
        self.frames_per_period as usize * self.channels as usize
    }

    /// Describes the first field that differs from `request`, if any.
    pub fn mismatch(&self, request: &StreamRequest) -> Option<String> {
        if self.sample_rate != request.sample_rate {
            return Some(format!(
                "device runs at {} Hz, {} Hz requested",
                self.sample_rate, request.sample_rate
            ));
        }
        if self.channels != request.channels {
            return Some(format!(
                "device delivers {} channels, {} requested",
                self.channels, request.channels
            ));
        }
        if self.frames_per_period != request.frames_per_period {
            return Some(format!(
                "device periods are {} frames, {} requested",
                self.frames_per_period, request.frames_per_period
            ));
        }
        None
    }
}

/// What the real-time callback tells the device after each period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    Continue,
    Stop,
}

/// One period of interleaved samples as delivered to the callback.
#[derive(Debug, Clone, Copy)]
pub struct FrameBlock<'a> {
    pub sequence: u64,
    pub channels: usize,
    pub samples: &'a [f32],
}

impl<'a> FrameBlock<'a> {
    pub fn new(sequence: u64, channels: usize, samples: &'a [f32]) -> Self {
        Self {
            sequence,
            channels,
            samples,
        }
    }

    /// Whole frames in the block.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    /// True when the sample count is a whole number of frames.
    pub fn is_whole(&self) -> bool {
        self.channels > 0 && self.samples.len() % self.channels == 0
    }
}

/// One channel's samples for one period, moved from the callback to a writer.
///
/// `samples` is pooled storage sized to a full period; only the first
/// `frames` values are meaningful.
#[derive(Debug)]
pub struct ChannelSlice {
    pub sequence: u64,
    pub channel: u16,
    pub frames: usize,
    pub samples: Box<[f32]>,
}

impl ChannelSlice {
    pub fn samples(&self) -> &[f32] {
        &self.samples[..self.frames]
    }

    /// Give back the pooled storage.
    pub fn into_storage(self) -> Box<[f32]> {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> StreamParameters {
        StreamParameters {
            sample_rate: 48_000,
            channels: 2,
            frames_per_period: 128,
            device: DeviceInfo {
                id: "mock-0".into(),
                name: "Mock".into(),
                is_default: true,
                max_input_channels: Some(8),
            },
        }
    }

    #[test]
    fn mismatch_reports_first_difference() {
        let mut request = StreamRequest {
            sample_rate: 48_000,
            channels: 2,
            frames_per_period: 128,
            device: DeviceSelector::Default,
        };
        assert_eq!(params().mismatch(&request), None);

        request.channels = 4;
        let reason = params().mismatch(&request).unwrap();
        assert!(reason.contains("2 channels"));
    }

    #[test]
    fn frame_block_counts_whole_frames() {
        let samples = [0.0f32; 12];
        let block = FrameBlock::new(7, 4, &samples);
        assert_eq!(block.frames(), 3);
        assert!(block.is_whole());

        let ragged = FrameBlock::new(7, 5, &samples);
        assert!(!ragged.is_whole());
    }

    #[test]
    fn slice_exposes_only_filled_frames() {
        let slice = ChannelSlice {
            sequence: 1,
            channel: 0,
            frames: 2,
            samples: vec![1.0, 2.0, 0.0, 0.0].into_boxed_slice(),
        };
        assert_eq!(slice.samples(), &[1.0, 2.0]);
        assert_eq!(slice.into_storage().len(), 4);
    }

    #[test]
    fn samples_per_period() {
        assert_eq!(params().samples_per_period(), 256);
    }
}

use crate::models::audio_models::CallbackStatus;

/// Re-blocks variable-sized host callbacks into whole periods.
///
/// Hosts are free to deliver more or fewer frames than requested per
/// callback. The assembler converts incoming samples to f32 into a
/// preallocated period buffer and emits it each time it fills, so the
/// capture callback always sees exactly `frames_per_period` frames.
/// Nothing here allocates after construction.
pub struct PeriodAssembler {
    channels: usize,
    block: Box<[f32]>,
    filled: usize,
}

impl PeriodAssembler {
    pub fn new(channels: u16, frames_per_period: u32) -> Self {
        let len = channels.max(1) as usize * frames_per_period.max(1) as usize;
        Self {
            channels: channels.max(1) as usize,
            block: vec![0.0; len].into_boxed_slice(),
            filled: 0,
        }
    }

    /// Feed interleaved host samples, emitting every completed period.
    ///
    /// Stops at the first `Stop` returned by `emit`; samples after that point
    /// are discarded.
    pub fn push<T, F, E>(&mut self, data: &[T], mut convert: F, mut emit: E) -> CallbackStatus
    where
        T: Copy,
        F: FnMut(T) -> f32,
        E: FnMut(&[f32]) -> CallbackStatus,
    {
        let mut rest = data;
        while !rest.is_empty() {
            let room = self.block.len() - self.filled;
            let take = room.min(rest.len());
            for (dst, &src) in self.block[self.filled..self.filled + take]
                .iter_mut()
                .zip(&rest[..take])
            {
                *dst = convert(src);
            }
            self.filled += take;
            rest = &rest[take..];

            if self.filled == self.block.len() {
                self.filled = 0;
                if emit(&self.block) == CallbackStatus::Stop {
                    return CallbackStatus::Stop;
                }
            }
        }
        CallbackStatus::Continue
    }

    /// Frames held back waiting for the period to fill.
    pub fn pending_frames(&self) -> usize {
        self.filled / self.channels
    }
}

/// Host sample conversions to normalized f32.
pub mod convert {
    pub fn from_f32(sample: f32) -> f32 {
        sample
    }

    pub fn from_i16(sample: i16) -> f32 {
        sample as f32 / 32_768.0
    }

    pub fn from_u16(sample: u16) -> f32 {
        (sample as f32 - 32_768.0) / 32_768.0
    }

    pub fn from_i32(sample: i32) -> f32 {
        (sample as f64 / 2_147_483_648.0) as f32
    }
}

//! Interleaved ⇄ per-channel sample layout conversion.
//!
//! Both directions write into caller-owned storage and never allocate, so
//! `demultiplex` is safe to call from the real-time callback.
//!
//! Layout for 3 channels, frames f0..fn:
//! ```text
//! interleaved: [f0c0 f0c1 f0c2 | f1c0 f1c1 f1c2 | ...]
//! outputs[c]:  [f0c  f1c  f2c  ...]
//! ```

/// Split `interleaved` into one sequence per channel.
///
/// `outputs[c][f] = interleaved[f * channel_count + c]` for every whole frame
/// `f`. Each output must hold at least `interleaved.len() / channel_count`
/// samples; trailing storage beyond that is left untouched. Channels past
/// `outputs.len()` are skipped.
pub fn demultiplex<S: AsMut<[f32]>>(interleaved: &[f32], channel_count: usize, outputs: &mut [S]) {
    if channel_count == 0 {
        return;
    }
    let frames = interleaved.len() / channel_count;
    for (channel, output) in outputs.iter_mut().enumerate().take(channel_count) {
        let output = &mut output.as_mut()[..frames];
        for (frame, sample) in output.iter_mut().enumerate() {
            *sample = interleaved[frame * channel_count + channel];
        }
    }
}

/// Re-interleave per-channel sequences into `out`.
///
/// The frame count is the length of the shortest channel; `out` must hold
/// `frames * channels.len()` samples.
pub fn interleave<S: AsRef<[f32]>>(channels: &[S], out: &mut [f32]) {
    let channel_count = channels.len();
    if channel_count == 0 {
        return;
    }
    let frames = channels
        .iter()
        .map(|c| c.as_ref().len())
        .min()
        .unwrap_or(0);
    for (channel, samples) in channels.iter().enumerate() {
        for (frame, &sample) in samples.as_ref()[..frames].iter().enumerate() {
            out[frame * channel_count + channel] = sample;
        }
    }
}

//! Per-block sample processing: level metering and PCM16 encoding.

/// Peak magnitude above which a block counts as active speech input.
pub const ACTIVE_PEAK_THRESHOLD: f32 = 0.01;

/// Input level measurement over one capture block, for UI metering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelReading {
    pub samples: usize,
    /// Mean absolute magnitude over the block.
    pub average: f32,
    /// Largest absolute magnitude over the block.
    pub peak: f32,
    pub active: bool,
}

/// Measure average and peak magnitude over one block of float samples.
#[must_use]
pub fn block_levels(samples: &[f32]) -> LevelReading {
    let mut sum = 0.0f32;
    let mut peak = 0.0f32;
    for &sample in samples {
        let magnitude = sample.abs();
        sum += magnitude;
        peak = peak.max(magnitude);
    }
    let average = if samples.is_empty() {
        0.0
    } else {
        sum / samples.len() as f32
    };
    LevelReading {
        samples: samples.len(),
        average,
        peak,
        active: peak > ACTIVE_PEAK_THRESHOLD,
    }
}

/// Convert float samples to little-endian signed 16-bit PCM bytes.
///
/// Samples are clamped to `[-1.0, 1.0]` first; negative values scale by
/// 32768 and positive values by 32767 so both endpoints map onto the full
/// i16 range.
#[must_use]
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let scaled = if clamped < 0.0 {
            clamped * 32768.0
        } else {
            clamped * 32767.0
        };
        out.extend_from_slice(&(scaled as i16).to_le_bytes());
    }
    out
}

/// The wire protocol requires even-length binary payloads; pad an odd
/// buffer with a single zero byte.
pub fn pad_to_even(buf: &mut Vec<u8>) {
    if buf.len() % 2 != 0 {
        buf.push(0);
    }
}

/// Average interleaved frames down to one channel.
#[must_use]
pub fn fold_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

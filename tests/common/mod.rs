//! Builds a minimal synthetic WAV container in memory, so the decoder pipeline can be exercised
//! end to end without a network stream or a real audio device.

/// Encodes `samples` (interleaved, per channel) as 16-bit PCM WAV bytes.
pub fn pcm16_wav(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let block_align = channels * (bits_per_sample / 8);
    let byte_rate = sample_rate * u32::from(block_align);
    let data_len = u32::try_from(samples.len() * 2).expect("test fixture too large");
    let riff_len = 36 + data_len;

    let mut out = Vec::with_capacity(44 + samples.len() * 2);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&riff_len.to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16_u32.to_le_bytes()); // fmt chunk size
    out.extend_from_slice(&1_u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }

    out
}

/// A sine wave at `freq` Hz, `duration_secs` long, interleaved across `channels`.
pub fn sine_wave(sample_rate: u32, channels: u16, duration_secs: f32, freq: f32) -> Vec<i16> {
    let n_frames = (sample_rate as f32 * duration_secs) as u32;
    let mut samples = Vec::with_capacity((n_frames * u32::from(channels)) as usize);
    for frame in 0..n_frames {
        let t = frame as f32 / sample_rate as f32;
        let value = (t * freq * std::f32::consts::TAU).sin();
        let pcm = (value * f32::from(i16::MAX) * 0.5) as i16;
        for _ in 0..channels {
            samples.push(pcm);
        }
    }
    samples
}

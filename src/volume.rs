//! Lock-free volume control for the post-decode sample chain.
//!
//! A `volume` filter needs to be updatable from a control thread while the Play Loop
//! concurrently pulls samples through it. There is no `abuffer`/`volume` filter graph crate in
//! this stack, so the chain is built from `rodio::Source` adapters instead, and the "atomic
//! send-command" discipline becomes a single `AtomicU32` holding the current gain ratio's bit
//! pattern: the control thread stores, the worker loads once per sample. No lock is taken on
//! either side.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use std::time::Duration;

use rodio::Source;

/// Shared handle to a gain value, updatable from any thread.
///
/// Holds an `f32` ratio (not dB) as raw bits so reads and writes are a single atomic operation.
#[derive(Clone)]
pub struct Gain(Arc<AtomicU32>);

impl Gain {
    /// Creates a new gain handle at unity (0 dB).
    #[must_use]
    pub fn unity() -> Self {
        Self(Arc::new(AtomicU32::new(1.0_f32.to_bits())))
    }

    /// Sets the gain from a combined decibel value.
    ///
    /// `db` is `base_volume_dB + gain_dB * gain_mul`. Converts to a linear ratio
    /// before storing, since the per-sample multiply needs a ratio, not a dB value.
    pub fn set_db(&self, db: f32) {
        let ratio = db_to_ratio(db);
        self.0.store(ratio.to_bits(), Ordering::Relaxed);
    }

    /// Reads the current gain as a linear ratio.
    #[must_use]
    pub fn ratio(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Converts a decibel value to a linear amplitude ratio: `10^(db/20)`.
#[must_use]
pub fn db_to_ratio(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Converts a linear amplitude ratio to decibels: `20 * log10(ratio)`.
#[must_use]
pub fn ratio_to_db(ratio: f32) -> f32 {
    20.0 * ratio.max(f32::MIN_POSITIVE).log10()
}

/// A `Source` adapter that multiplies every sample by a shared, concurrently-updatable gain.
pub struct GainControlled<I> {
    input: I,
    gain: Gain,
}

/// Wraps `input` so its samples are scaled by `gain`, read fresh on every sample.
pub fn gain_controlled<I>(input: I, gain: Gain) -> GainControlled<I>
where
    I: Source<Item = f32>,
{
    GainControlled { input, gain }
}

impl<I> Iterator for GainControlled<I>
where
    I: Source<Item = f32>,
{
    type Item = f32;

    #[inline]
    fn next(&mut self) -> Option<f32> {
        self.input.next().map(|sample| sample * self.gain.ratio())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.input.size_hint()
    }
}

impl<I> Source for GainControlled<I>
where
    I: Source<Item = f32>,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.input.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.input.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.input.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.input.total_duration()
    }

    fn try_seek(&mut self, pos: Duration) -> Result<(), rodio::source::SeekError> {
        self.input.try_seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unity_gain_is_one() {
        assert!((Gain::unity().ratio() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn zero_db_is_unity_ratio() {
        let gain = Gain::unity();
        gain.set_db(0.0);
        assert!((gain.ratio() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn db_ratio_round_trip() {
        for db in [-20.0, -6.0, 0.0, 3.0, 12.0] {
            let ratio = db_to_ratio(db);
            assert!((ratio_to_db(ratio) - db).abs() < 1e-3);
        }
    }

    #[test]
    fn updates_are_visible_across_clones() {
        let gain = Gain::unity();
        let other = gain.clone();
        other.set_db(-6.0);
        assert!((gain.ratio() - db_to_ratio(-6.0)).abs() < 1e-6);
    }
}

//! Adaptive white balance (improved White Patch method).
//!
//! Instead of taking the single brightest pixel, the estimator draws `M`
//! random samples of `N` interior pixels, keeps the per-channel maximum of
//! each sample and sums those maxima. Gains then equalise the three sums
//! around their quadratic mean.
//!
//! See N. Banić, S. Lončarić: "Improving the White Patch method by
//! subsampling".

use super::frame::{FrameBuffer, UNITY_GAIN};

/// Default number of pixels per sample.
pub const DEFAULT_SAMPLE_PIXELS: u32 = 50;
/// Default number of samples.
pub const DEFAULT_SAMPLE_ROUNDS: u32 = 10;

/// Largest value [`Lcg::next`] returns.
pub const LCG_MAX: u32 = 32767;

/// The classic `rand_r` linear congruential generator.
///
/// Deterministic for a given seed, which keeps white balance repeatable
/// across runs on the same frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lcg {
    seed: u32,
}

impl Lcg {
    /// Starts the generator at `seed`.
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }

    /// Returns the next value in `[0, LCG_MAX]`.
    pub fn next(&mut self) -> u32 {
        self.seed = self.seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (self.seed / 65_536) % (LCG_MAX + 1)
    }

    /// Returns a coordinate in `[1, dimension - 2]`, or `None` without
    /// advancing the generator if `dimension` has no interior.
    pub fn interior(&mut self, dimension: u32) -> Option<u32> {
        let span = dimension.checked_sub(2).filter(|&span| span > 0)?;
        Some(1 + self.next() % span)
    }

    /// Current state, to resume the sequence later.
    pub fn seed(&self) -> u32 {
        self.seed
    }
}

impl FrameBuffer {
    /// Estimates and applies white-balance gains.
    ///
    /// `pixels` is the number of pixels per sample (N) and `rounds` the
    /// number of samples (M). Gains are reset to unity first; they stay at
    /// unity if the frame has no interior or any channel never rises above
    /// zero.
    pub fn white_balance(&mut self, pixels: u32, rounds: u32) {
        self.gains = [UNITY_GAIN; 3];

        let width = self.width();
        let height = self.height();
        if width < 3 || height < 3 {
            tracing::debug!(width, height, "Frame has no interior, white balance skipped");
            return;
        }

        let mut rng = Lcg::new(self.seed);
        let mut totals = [0u64; 3];

        for _ in 0..rounds {
            let mut maxima = [0u16; 3];
            for _ in 0..pixels {
                let (Some(x), Some(y)) = (rng.interior(width), rng.interior(height)) else {
                    return;
                };
                let channels = self.pixel(x, y).channels();
                for (max, value) in maxima.iter_mut().zip(channels) {
                    *max = (*max).max(value);
                }
            }
            for (total, max) in totals.iter_mut().zip(maxima) {
                *total += u64::from(max);
            }
        }

        self.seed = rng.seed();

        if totals.contains(&0) {
            tracing::debug!(?totals, "Zero channel total, keeping unity gains");
            return;
        }

        let mean_square = totals.iter().map(|&t| (t as f64) * (t as f64)).sum::<f64>() / 3.0;
        let target = mean_square.sqrt();

        for (gain, &total) in self.gains.iter_mut().zip(&totals) {
            *gain = (f64::from(UNITY_GAIN) * target / total as f64).round() as u32;
        }

        tracing::debug!(?totals, gains = ?self.gains, "White balance applied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::decode::tests::flat_frame;
    use crate::format::FormatCode;

    #[test]
    fn test_lcg_sequence() {
        let mut rng = Lcg::new(1);
        // rand_r with seed 1
        assert_eq!(rng.next(), 16838);
        assert_eq!(rng.next(), 5758);
        assert_eq!(rng.next(), 10113);
    }

    #[test]
    fn test_interior_range() {
        let mut rng = Lcg::new(42);
        for _ in 0..10_000 {
            let v = rng.interior(5).unwrap();
            assert!((1..=3).contains(&v));
        }
    }

    #[test]
    fn test_interior_of_narrow_dimension() {
        let mut rng = Lcg::new(7);
        for dimension in 0..3 {
            assert_eq!(rng.interior(dimension), None);
        }
        assert_eq!(rng.seed(), 7);
        assert_eq!(rng.interior(3), Some(1));
    }

    #[test]
    fn test_uniform_white_is_unity() {
        let mut frame = flat_frame(64, 48, FormatCode::SRGGB10, [1023, 1023, 1023]);
        frame.white_balance(DEFAULT_SAMPLE_PIXELS, DEFAULT_SAMPLE_ROUNDS);
        assert_eq!(frame.gains(), [UNITY_GAIN; 3]);
    }

    #[test]
    fn test_grey_gains_equalise_channels() {
        let mut frame = flat_frame(64, 48, FormatCode::SBGGR8, [100, 200, 50]);
        frame.white_balance(20, 5);

        let [r, g, b] = frame.gains();
        assert!(r > g && b > r);

        // Balanced channels land on the same output level.
        let rgb = frame.pixel_rgb888(10, 10);
        let (ro, go, bo) = ((rgb >> 16) & 0xFF, (rgb >> 8) & 0xFF, rgb & 0xFF);
        assert!(ro.abs_diff(go) <= 1 && go.abs_diff(bo) <= 1, "{ro} {go} {bo}");
    }

    #[test]
    fn test_black_channel_keeps_unity() {
        let mut frame = flat_frame(32, 32, FormatCode::SRGGB8, [120, 80, 0]);
        frame.set_gains([3 << 16, 2 << 16, 1 << 16]);
        frame.white_balance(10, 3);
        assert_eq!(frame.gains(), [UNITY_GAIN; 3]);
    }

    #[test]
    fn test_seed_advances_between_calls() {
        let mut frame = flat_frame(32, 32, FormatCode::SRGGB8, [10, 10, 10]);
        let before = frame.seed;
        frame.white_balance(4, 2);
        assert_ne!(frame.seed, before);
    }

    #[test]
    fn test_zero_rounds_keeps_unity() {
        let mut frame = flat_frame(32, 32, FormatCode::SRGGB8, [10, 20, 30]);
        frame.white_balance(50, 0);
        assert_eq!(frame.gains(), [UNITY_GAIN; 3]);
    }
}

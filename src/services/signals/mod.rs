//! Market structure detectors.
//!
//! Pure scans over a bar window: candlestick patterns, support/resistance
//! levels, the volume distribution, and the power-signal override pass.

pub mod levels;
pub mod patterns;
pub mod power;
pub mod volume_profile;

pub use levels::LevelDetector;
pub use patterns::PatternDetector;
pub use power::PowerSignals;
pub use volume_profile::VolumeDistributionAnalyzer;

use crate::types::Bar;

/// Trait for pure scans over a bar window.
pub trait Detector: Send + Sync {
    type Output;

    /// Unique identifier for this detector (used in cache keys).
    fn id(&self) -> &str;

    /// Minimum number of bars for a meaningful result.
    fn min_bars(&self) -> usize;

    /// Scan the window. Short or degenerate input yields an empty result.
    fn detect(&self, bars: &[Bar]) -> Self::Output;
}

/// Percentage distance of `value` from `reference` (0 when reference is 0).
pub fn pct_diff(value: f64, reference: f64) -> f64 {
    if reference == 0.0 || !reference.is_finite() || !value.is_finite() {
        return 0.0;
    }
    (value - reference) / reference * 100.0
}

/// Clamp a signed score to +/- `bound`; non-finite input becomes 0.
pub fn clamp_score(value: f64, bound: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-bound, bound)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pct_diff() {
        assert_eq!(pct_diff(101.0, 100.0), 1.0);
        assert_eq!(pct_diff(99.0, 100.0), -1.0);
        assert_eq!(pct_diff(5.0, 0.0), 0.0);
    }

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(80.0, 50.0), 50.0);
        assert_eq!(clamp_score(-80.0, 50.0), -50.0);
        assert_eq!(clamp_score(f64::INFINITY, 50.0), 0.0);
    }
}

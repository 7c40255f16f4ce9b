//! VWAP and volume-by-price distribution.

use crate::config::VolumeConfig;
use crate::services::signals::{clamp_score, pct_diff, Detector};
use crate::types::{Action, Bar, VolumeAnalysis, VolumeBucket, VolumeProfile, VolumeSignal};

/// Volume distribution analyzer.
///
/// VWAP = Cumulative(TP * Volume) / Cumulative(Volume) over the whole window.
/// The profile splits the trailing window's price range into equal buckets
/// and apportions each bar's volume by range overlap.
///
/// Signals (positive = bullish):
/// - Upward VWAP cross, or a close just under VWAP = buy
/// - Price stretched above VWAP = sell
/// - Price under the value area = mean-reversion buy
/// - Price over the value area = sell
#[derive(Debug, Clone, Default)]
pub struct VolumeDistributionAnalyzer {
    config: VolumeConfig,
}

impl VolumeDistributionAnalyzer {
    pub fn new(config: VolumeConfig) -> Self {
        Self { config }
    }

    /// Volume-weighted typical price; None when total volume is zero.
    pub fn vwap(bars: &[Bar]) -> Option<f64> {
        let (mut cum_tp_vol, mut cum_vol) = (0.0, 0.0);
        for bar in bars {
            if !bar.volume.is_finite() || bar.volume <= 0.0 {
                continue;
            }
            cum_tp_vol += bar.typical_price() * bar.volume;
            cum_vol += bar.volume;
        }
        let vwap = cum_tp_vol / cum_vol;
        (cum_vol > 0.0 && vwap.is_finite()).then_some(vwap)
    }

    /// Volume profile over the trailing `profile_periods` bars.
    pub fn profile(&self, bars: &[Bar]) -> Option<VolumeProfile> {
        let periods = self.config.profile_periods;
        if periods == 0 || bars.len() < periods {
            return None;
        }
        let recent = &bars[bars.len() - periods..];

        let price_min = recent.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let price_max = recent.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        if !price_min.is_finite() || !price_max.is_finite() || price_max < price_min {
            return None;
        }

        let bucket_count = self.config.bucket_edges.saturating_sub(1).max(1);
        let width = (price_max - price_min) / bucket_count as f64;
        let mut buckets: Vec<VolumeBucket> = if width > 0.0 {
            (0..bucket_count)
                .map(|i| VolumeBucket {
                    low: price_min + width * i as f64,
                    high: if i + 1 == bucket_count {
                        price_max
                    } else {
                        price_min + width * (i + 1) as f64
                    },
                    volume: 0.0,
                })
                .collect()
        } else {
            vec![VolumeBucket {
                low: price_min,
                high: price_max,
                volume: 0.0,
            }]
        };

        for bar in recent {
            let volume = if bar.volume.is_finite() { bar.volume.max(0.0) } else { 0.0 };
            if volume == 0.0 {
                continue;
            }
            let range = bar.range();
            if range <= 0.0 || width <= 0.0 {
                let index = if width > 0.0 {
                    (((bar.close - price_min) / width).floor() as usize).min(buckets.len() - 1)
                } else {
                    0
                };
                buckets[index].volume += volume;
                continue;
            }
            for bucket in buckets.iter_mut() {
                if bucket.high < bar.low || bucket.low > bar.high {
                    continue;
                }
                let overlap = bucket.high.min(bar.high) - bucket.low.max(bar.low);
                if overlap > 0.0 {
                    bucket.volume += volume * overlap / range;
                }
            }
        }

        let poc = buckets
            .iter()
            .max_by(|a, b| a.volume.total_cmp(&b.volume))
            .map(|b| b.mid())?;

        let total: f64 = buckets.iter().map(|b| b.volume).sum();
        let target = total * self.config.value_area_share;
        let mut ranked: Vec<&VolumeBucket> = buckets.iter().collect();
        ranked.sort_by(|a, b| b.volume.total_cmp(&a.volume));
        let mut cumulative = 0.0;
        let (mut va_low, mut va_high) = (f64::INFINITY, f64::NEG_INFINITY);
        for bucket in ranked {
            cumulative += bucket.volume;
            va_low = va_low.min(bucket.mid());
            va_high = va_high.max(bucket.mid());
            if cumulative >= target {
                break;
            }
        }

        Some(VolumeProfile {
            buckets,
            point_of_control: poc,
            value_area_low: va_low,
            value_area_high: va_high,
            vwap: Self::vwap(bars),
        })
    }

    /// Signal from price relative to VWAP.
    pub fn vwap_signal(&self, vwap: Option<f64>, price: f64, prev_price: f64) -> VolumeSignal {
        let Some(vwap) = vwap else {
            return VolumeSignal::default();
        };
        let deviation = pct_diff(price, vwap);
        let mut signal = VolumeSignal::default();

        if prev_price < vwap && price >= vwap {
            signal.action = Action::Buy;
            signal.score = 25.0;
            signal.reasons.push(format!("Price crossed above VWAP ({:.2})", vwap));
        } else if price < vwap && deviation.abs() <= self.config.vwap_bounce_pct {
            signal.action = Action::Buy;
            signal.score = 20.0;
            signal.reasons.push(format!("Price holding just under VWAP ({:.2}%)", deviation));
        } else if deviation > self.config.vwap_extended_pct {
            signal.action = Action::Sell;
            signal.score = -15.0;
            signal.reasons.push(format!("Price stretched above VWAP (+{:.2}%)", deviation));
        }

        signal
    }

    /// Signal from price relative to the point of control and value area.
    pub fn profile_signal(&self, profile: Option<&VolumeProfile>, price: f64) -> VolumeSignal {
        let Some(profile) = profile else {
            return VolumeSignal::default();
        };
        let mut signal = VolumeSignal::default();

        if pct_diff(price, profile.point_of_control).abs() < self.config.poc_proximity_pct {
            signal.score = 20.0;
            signal
                .reasons
                .push(format!("Near point of control ({:.2})", profile.point_of_control));
        }

        if profile.in_value_area(price) {
            signal.score += 15.0;
            signal.reasons.push("Inside value area".to_string());
        } else if price < profile.value_area_low {
            signal.action = Action::Buy;
            signal.score = 25.0;
            signal
                .reasons
                .push(format!("Below value area ({:.2})", profile.value_area_low));
        } else if price > profile.value_area_high {
            signal.action = Action::Sell;
            signal.score = -20.0;
            signal
                .reasons
                .push(format!("Above value area ({:.2})", profile.value_area_high));
        }

        signal
    }

    /// Full VWAP + profile analysis for the latest price.
    pub fn analyze(&self, bars: &[Bar], price: f64, prev_price: f64) -> VolumeAnalysis {
        self.analyze_with_profile(bars, self.profile(bars), price, prev_price)
    }

    /// Same as [`analyze`](Self::analyze) with a precomputed profile.
    pub fn analyze_with_profile(
        &self,
        bars: &[Bar],
        profile: Option<VolumeProfile>,
        price: f64,
        prev_price: f64,
    ) -> VolumeAnalysis {
        let vwap = profile.as_ref().and_then(|p| p.vwap).or_else(|| Self::vwap(bars));
        let vwap_signal = self.vwap_signal(vwap, price, prev_price);
        let profile_signal = self.profile_signal(profile.as_ref(), price);
        let score = clamp_score(vwap_signal.score + profile_signal.score, 50.0);

        VolumeAnalysis {
            action: Action::from_score(score),
            score,
            vwap,
            profile,
            vwap_signal,
            profile_signal,
        }
    }
}

impl Detector for VolumeDistributionAnalyzer {
    type Output = Option<VolumeProfile>;

    fn id(&self) -> &str {
        "volume_profile"
    }

    fn min_bars(&self) -> usize {
        self.config.profile_periods
    }

    fn detect(&self, bars: &[Bar]) -> Option<VolumeProfile> {
        self.profile(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_uptrend_bars(count: usize) -> Vec<Bar> {
        (0..count)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.5;
                Bar::new(
                    1_000_000 + i as i64 * 60_000,
                    base,
                    base + 1.0,
                    base - 0.5,
                    base + 0.5,
                    1000.0 + (i % 5) as f64 * 100.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_vwap_zero_volume_is_none() {
        let bars: Vec<Bar> = (0..10)
            .map(|i| Bar::new(i, 100.0, 101.0, 99.0, 100.0, 0.0))
            .collect();
        assert!(VolumeDistributionAnalyzer::vwap(&bars).is_none());
    }

    #[test]
    fn test_vwap_weights_by_volume() {
        let bars = vec![
            Bar::new(0, 10.0, 10.0, 10.0, 10.0, 1.0),
            Bar::new(1, 20.0, 20.0, 20.0, 20.0, 3.0),
        ];
        assert_eq!(VolumeDistributionAnalyzer::vwap(&bars), Some(17.5));
    }

    #[test]
    fn test_profile_needs_full_window() {
        let analyzer = VolumeDistributionAnalyzer::default();
        assert!(analyzer.profile(&create_uptrend_bars(99)).is_none());
        assert!(analyzer.profile(&create_uptrend_bars(100)).is_some());
    }

    #[test]
    fn test_profile_conserves_volume() {
        let analyzer = VolumeDistributionAnalyzer::default();
        let mut bars = create_uptrend_bars(120);
        // Zero-range bar in the middle of the range keeps its whole volume.
        bars[110] = Bar::new(0, 140.0, 140.0, 140.0, 140.0, 5000.0);
        let profile = analyzer.profile(&bars).expect("profile");

        let expected: f64 = bars[20..].iter().map(|b| b.volume).sum();
        assert_eq!(profile.buckets.len(), 49);
        assert!(
            (profile.total_volume() - expected).abs() < 1e-6 * expected,
            "bucket volume {} != bar volume {}",
            profile.total_volume(),
            expected
        );
    }

    #[test]
    fn test_value_area_contains_poc() {
        let analyzer = VolumeDistributionAnalyzer::default();
        let profile = analyzer.profile(&create_uptrend_bars(150)).expect("profile");
        assert!(profile.value_area_low <= profile.point_of_control);
        assert!(profile.point_of_control <= profile.value_area_high);
    }

    #[test]
    fn test_vwap_signals_are_signed() {
        let analyzer = VolumeDistributionAnalyzer::default();

        let cross = analyzer.vwap_signal(Some(100.0), 100.2, 99.8);
        assert_eq!(cross.action, Action::Buy);
        assert_eq!(cross.score, 25.0);

        let bounce = analyzer.vwap_signal(Some(100.0), 99.7, 99.6);
        assert_eq!(bounce.score, 20.0);

        let stretched = analyzer.vwap_signal(Some(100.0), 101.5, 101.4);
        assert_eq!(stretched.action, Action::Sell);
        assert_eq!(stretched.score, -15.0);

        assert_eq!(analyzer.vwap_signal(None, 100.0, 99.0).score, 0.0);
    }

    fn profile(poc: f64, low: f64, high: f64) -> VolumeProfile {
        VolumeProfile {
            buckets: vec![],
            point_of_control: poc,
            value_area_low: low,
            value_area_high: high,
            vwap: None,
        }
    }

    #[test]
    fn test_profile_signals() {
        let analyzer = VolumeDistributionAnalyzer::default();
        let p = profile(100.0, 95.0, 105.0);

        assert_eq!(analyzer.profile_signal(Some(&p), 100.2).score, 35.0);
        assert_eq!(analyzer.profile_signal(Some(&p), 103.0).score, 15.0);

        let below = analyzer.profile_signal(Some(&p), 90.0);
        assert_eq!(below.action, Action::Buy);
        assert_eq!(below.score, 25.0);

        let above = analyzer.profile_signal(Some(&p), 110.0);
        assert_eq!(above.action, Action::Sell);
        assert_eq!(above.score, -20.0);
    }

    #[test]
    fn test_combined_score_is_bounded() {
        let analyzer = VolumeDistributionAnalyzer::default();
        let bars = create_uptrend_bars(150);
        let last = bars[bars.len() - 1].close;
        let analysis = analyzer.analyze(&bars, last, last - 0.5);
        assert!(analysis.score.abs() <= 50.0);
        assert!(analysis.vwap.is_some());
        assert!(analysis.profile.is_some());
    }
}

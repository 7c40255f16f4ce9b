//! Fixed-order feature vector handed to an external classifier.

use crate::services::signals::VolumeDistributionAnalyzer;
use crate::types::{Bar, FeatureVector, LevelSet, MarketWindow};

/// Bars needed before features are extracted.
pub const MIN_FEATURE_BARS: usize = 20;

/// Feature names in the order the classifier expects them.
pub const FEATURE_NAMES: [&str; 28] = [
    "price_change_1",
    "price_change_5",
    "price_change_15",
    "high_low_ratio",
    "price_vs_ema_fast",
    "price_vs_ema_medium",
    "price_vs_ema_slow",
    "price_vs_ema_trend",
    "rsi",
    "rsi_trend",
    "macd",
    "macd_signal",
    "macd_diff",
    "stoch_k",
    "atr_normalized",
    "bb_position",
    "bb_width",
    "volume_ratio",
    "volume_trend",
    "obv_trend",
    "distance_to_support",
    "distance_to_resistance",
    "support_strength",
    "resistance_strength",
    "supertrend_signal",
    "vwap_deviation",
    "momentum_short",
    "momentum_long",
];

const VOLUME_AVERAGE_BARS: usize = 20;
const OBV_LOOKBACK: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the feature vector for the latest bar.
    ///
    /// Returns None for windows under [`MIN_FEATURE_BARS`]. Missing
    /// indicators fall back to neutral values and any non-finite result
    /// becomes 0.
    pub fn extract(&self, window: &MarketWindow, levels: &LevelSet) -> Option<FeatureVector> {
        if window.len() < MIN_FEATURE_BARS {
            return None;
        }
        let bars = window.bars();
        let rows = window.indicators();
        let last = bars.len() - 1;
        let bar = &bars[last];
        let ind = &rows[last];
        let prev_5 = &rows[last.saturating_sub(5)];
        let price = bar.close;

        let rsi = ind.rsi_or_neutral();
        let (macd, macd_signal) = ind.macd_pair().unwrap_or((0.0, 0.0));

        let avg_volume = mean(bars[bars.len().saturating_sub(VOLUME_AVERAGE_BARS)..].iter().map(|b| b.volume));
        let volume_ratio = if avg_volume > 0.0 { bar.volume / avg_volume } else { 1.0 };

        let support = levels.nearest_support(price).map(|l| l.price);
        let resistance = levels.nearest_resistance(price).map(|l| l.price);

        let vwap = VolumeDistributionAnalyzer::vwap(bars).unwrap_or(price);

        let values = vec![
            pct_change(bars, last, 1),
            pct_change(bars, last, 5),
            pct_change(bars, last, 15),
            ratio(bar.high - bar.low, price),
            relative_diff(price, ind.ema_fast),
            relative_diff(price, ind.ema_medium),
            relative_diff(price, ind.ema_slow),
            relative_diff(price, ind.ema_trend),
            rsi,
            rsi - prev_5.rsi_or_neutral(),
            macd,
            macd_signal,
            macd - macd_signal,
            ind.stoch_k_or_neutral(),
            ratio(ind.atr().unwrap_or(0.0), price),
            ind.bollinger_position(price).unwrap_or(0.5),
            ind.bollinger_width(price).unwrap_or(0.0),
            volume_ratio,
            bar.volume - bars[last.saturating_sub(5)].volume,
            obv(bars, last) - obv(bars, last.saturating_sub(OBV_LOOKBACK)),
            support.map_or(0.0, |s| ratio(price - s, price)),
            resistance.map_or(0.0, |r| ratio(r - price, price)),
            support.map_or(0.0, |s| level_strength(price, s)),
            resistance.map_or(0.0, |r| level_strength(price, r)),
            ind.supertrend_direction() as f64,
            ratio(price - vwap, price),
            momentum(bars, last, 5),
            momentum(bars, last, 15),
        ];

        Some(FeatureVector {
            names: FEATURE_NAMES.to_vec(),
            values: values
                .into_iter()
                .map(|v| if v.is_finite() { v } else { 0.0 })
                .collect(),
        })
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

fn pct_change(bars: &[Bar], idx: usize, periods: usize) -> f64 {
    if idx < periods {
        return 0.0;
    }
    let prev = bars[idx - periods].close;
    if prev == 0.0 {
        return 0.0;
    }
    (bars[idx].close - prev) / prev
}

fn relative_diff(price: f64, reference: Option<f64>) -> f64 {
    match reference.filter(|r| r.is_finite()) {
        Some(r) if price != 0.0 => (price - r) / price,
        _ => 0.0,
    }
}

/// On-balance volume accumulated up to and including `idx`.
fn obv(bars: &[Bar], idx: usize) -> f64 {
    bars.windows(2)
        .take(idx)
        .map(|pair| {
            if pair[1].close > pair[0].close {
                pair[1].volume
            } else if pair[1].close < pair[0].close {
                -pair[1].volume
            } else {
                0.0
            }
        })
        .sum()
}

/// 1.0 at the level, decaying quickly with distance.
fn level_strength(price: f64, level: f64) -> f64 {
    if level == 0.0 || price <= 0.0 {
        return 0.0;
    }
    let distance = (price - level).abs() / price;
    f64::min((-distance * 200.0).exp(), 1.0)
}

fn momentum(bars: &[Bar], idx: usize, periods: usize) -> f64 {
    if idx < periods {
        return 0.0;
    }
    bars[idx].close - bars[idx - periods].close
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Level, LevelKind};

    fn rising_window(n: usize) -> MarketWindow {
        let bars = (0..n)
            .map(|i| {
                let p = 100.0 + i as f64;
                Bar::new(i as i64, p, p + 1.5, p - 0.5, p + 1.0, 1000.0 + i as f64 * 10.0)
            })
            .collect();
        MarketWindow::from_bars(bars)
    }

    #[test]
    fn test_needs_twenty_bars() {
        let extractor = FeatureExtractor::new();
        assert!(extractor.extract(&rising_window(19), &LevelSet::default()).is_none());
        assert!(extractor.extract(&rising_window(20), &LevelSet::default()).is_some());
    }

    #[test]
    fn test_feature_order_and_count() {
        let features = FeatureExtractor
            .extract(&rising_window(30), &LevelSet::default())
            .unwrap();
        assert_eq!(features.len(), 28);
        assert_eq!(features.names[0], "price_change_1");
        assert_eq!(features.names[27], "momentum_long");
    }

    #[test]
    fn test_neutral_defaults_without_indicators() {
        let features = FeatureExtractor
            .extract(&rising_window(30), &LevelSet::default())
            .unwrap();
        assert_eq!(features.get("rsi"), Some(50.0));
        assert_eq!(features.get("stoch_k"), Some(50.0));
        assert_eq!(features.get("bb_position"), Some(0.5));
        assert_eq!(features.get("supertrend_signal"), Some(0.0));
        assert_eq!(features.get("distance_to_support"), Some(0.0));
    }

    #[test]
    fn test_price_features() {
        let features = FeatureExtractor
            .extract(&rising_window(30), &LevelSet::default())
            .unwrap();
        assert_eq!(features.get("momentum_short"), Some(5.0));
        assert_eq!(features.get("momentum_long"), Some(15.0));
        // Every close is higher, so OBV gains the last ten volumes.
        assert!(features.get("obv_trend").unwrap() > 0.0);
    }

    #[test]
    fn test_level_features() {
        let levels = LevelSet {
            supports: vec![Level {
                price: 128.0,
                kind: LevelKind::Support,
                touch_count: 2,
                strength: 20.0,
            }],
            resistances: vec![],
            key_levels: vec![],
        };
        let features = FeatureExtractor.extract(&rising_window(30), &levels).unwrap();
        let distance = features.get("distance_to_support").unwrap();
        assert!((distance - 2.0 / 130.0).abs() < 1e-9);
        assert!(features.get("support_strength").unwrap() < 1.0);
    }

    #[test]
    fn test_non_finite_values_become_zero() {
        let mut bars: Vec<Bar> = (0..25)
            .map(|i| Bar::new(i, 100.0, 101.0, 99.0, 100.0, 1000.0))
            .collect();
        bars[24].high = f64::INFINITY;
        let window = MarketWindow::from_bars(bars);
        let features = FeatureExtractor.extract(&window, &LevelSet::default()).unwrap();
        assert!(features.values.iter().all(|v| v.is_finite()));
        assert_eq!(features.get("high_low_ratio"), Some(0.0));
    }
}

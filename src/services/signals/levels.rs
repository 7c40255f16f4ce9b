//! Support and resistance detection by pivot clustering.

use crate::config::LevelConfig;
use crate::services::signals::Detector;
use crate::types::{Action, Bar, Level, LevelKind, LevelSet, LevelSignal};

/// Support/resistance detector.
///
/// Pivot highs and lows must strictly dominate every bar within
/// `pivot_window` on each side. Nearby pivots are merged greedily into
/// clusters whose value is the member mean.
#[derive(Debug, Clone, Default)]
pub struct LevelDetector {
    config: LevelConfig,
}

impl LevelDetector {
    pub fn new(config: LevelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    /// Detect levels over the trailing `lookback` bars, keeping at most `k`
    /// clusters per side. A window shorter than `lookback` yields an empty set.
    pub fn detect_levels(&self, bars: &[Bar], lookback: usize, k: usize) -> LevelSet {
        if lookback == 0 || bars.len() < lookback {
            return LevelSet::default();
        }
        let recent = &bars[bars.len() - lookback..];
        let Some(current) = recent.last().map(|b| b.close) else {
            return LevelSet::default();
        };

        let w = self.config.pivot_window;
        let highs = pivots(recent, w, LevelKind::Resistance);
        let lows = pivots(recent, w, LevelKind::Support);

        let gap = self.config.cluster_gap_pct / 100.0;
        let resistances: Vec<Level> = cluster(&highs, gap, k, current)
            .into_iter()
            .map(|price| touch_level(recent, price, LevelKind::Resistance))
            .collect();
        let supports: Vec<Level> = cluster(&lows, gap, k, current)
            .into_iter()
            .map(|price| touch_level(recent, price, LevelKind::Support))
            .collect();

        let mut key_levels: Vec<Level> = supports
            .iter()
            .chain(resistances.iter())
            .filter(|l| l.touch_count >= self.config.key_min_touches)
            .copied()
            .collect();
        key_levels.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        key_levels.truncate(self.config.max_key_levels);

        LevelSet {
            supports,
            resistances,
            key_levels,
        }
    }

    /// Signal from the position of `price` relative to the detected levels.
    ///
    /// Checked in order: support bounce, resistance breakout between bars,
    /// resistance rejection, support breakdown. A key level within the
    /// proximity band adds a bonus in the direction of the signal.
    pub fn trading_signal(&self, levels: &LevelSet, price: f64, prev_price: f64) -> LevelSignal {
        let tolerance = self.config.proximity_pct / 100.0;
        let support = levels.nearest_support(price).map(|l| l.price);
        let resistance = levels.nearest_resistance(price).map(|l| l.price);

        let mut signal = LevelSignal {
            nearest_support: support,
            nearest_resistance: resistance,
            ..Default::default()
        };

        let near = |level: f64| level > 0.0 && ((price - level) / level).abs() <= tolerance;
        let broken_resistance = levels
            .resistances
            .iter()
            .filter(|l| prev_price < l.price && price >= l.price)
            .map(|l| l.price)
            .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))));
        let broken_support = levels
            .supports
            .iter()
            .filter(|l| prev_price > l.price && price <= l.price)
            .map(|l| l.price)
            .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.min(p))));

        if let Some(s) = support.filter(|s| near(*s)) {
            signal.action = Action::Buy;
            signal.score = 30.0;
            signal.reasons.push(format!("Support bounce ({:.2})", s));
        } else if let Some(r) = broken_resistance {
            signal.action = Action::Buy;
            signal.score = 35.0;
            signal.reasons.push(format!("Resistance breakout ({:.2})", r));
        } else if let Some(r) = resistance.filter(|r| near(*r)) {
            signal.action = Action::Sell;
            signal.score = -25.0;
            signal.reasons.push(format!("Resistance rejection ({:.2})", r));
        } else if let Some(s) = broken_support {
            signal.action = Action::Sell;
            signal.score = -30.0;
            signal.reasons.push(format!("Support breakdown ({:.2})", s));
        }

        if signal.action != Action::Hold {
            if let Some(key) = levels
                .key_levels
                .iter()
                .find(|l| price > 0.0 && ((price - l.price) / price).abs() < tolerance)
            {
                signal.score += 10.0 * signal.score.signum();
                signal
                    .reasons
                    .push(format!("Key level ({} touches)", key.touch_count));
            }
        }

        signal
    }

    /// Whether no opposing level sits strictly between `price` and `target`.
    pub fn has_clear_path(levels: &LevelSet, price: f64, target: f64) -> (bool, String) {
        if target > price {
            if let Some(r) = levels
                .resistances
                .iter()
                .find(|l| price < l.price && l.price < target)
            {
                return (false, format!("Resistance at {:.2}", r.price));
            }
        } else if let Some(s) = levels
            .supports
            .iter()
            .find(|l| target < l.price && l.price < price)
        {
            return (false, format!("Support at {:.2}", s.price));
        }
        (true, "Clear path".to_string())
    }
}

impl Detector for LevelDetector {
    type Output = LevelSet;

    fn id(&self) -> &str {
        "levels"
    }

    fn min_bars(&self) -> usize {
        self.config.lookback
    }

    fn detect(&self, bars: &[Bar]) -> LevelSet {
        self.detect_levels(bars, self.config.lookback, self.config.max_clusters)
    }
}

/// Highs (resistance) or lows (support) that strictly dominate their `w`
/// neighbours on each side.
fn pivots(bars: &[Bar], w: usize, kind: LevelKind) -> Vec<f64> {
    if w == 0 || bars.len() <= 2 * w {
        return Vec::new();
    }
    let value = |b: &Bar| match kind {
        LevelKind::Resistance => b.high,
        LevelKind::Support => b.low,
    };

    (w..bars.len() - w)
        .filter_map(|i| {
            let v = value(&bars[i]);
            if !v.is_finite() {
                return None;
            }
            let dominates = (i - w..=i + w).filter(|&j| j != i).all(|j| {
                let other = value(&bars[j]);
                match kind {
                    LevelKind::Resistance => v > other,
                    LevelKind::Support => v < other,
                }
            });
            dominates.then_some(v)
        })
        .collect()
}

/// Greedy clustering over sorted values; keeps the `k` largest clusters
/// (ties broken by proximity to `current`), returned ascending by price.
fn cluster(values: &[f64], gap: f64, k: usize, current: f64) -> Vec<f64> {
    if values.is_empty() || k == 0 {
        return Vec::new();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut clusters: Vec<Vec<f64>> = Vec::new();
    let mut current_cluster = vec![sorted[0]];
    for &v in &sorted[1..] {
        let last = current_cluster[current_cluster.len() - 1];
        if last != 0.0 && ((v - last) / last).abs() < gap {
            current_cluster.push(v);
        } else {
            clusters.push(std::mem::replace(&mut current_cluster, vec![v]));
        }
    }
    clusters.push(current_cluster);

    let mut ranked: Vec<(usize, f64)> = clusters
        .iter()
        .map(|c| (c.len(), c.iter().sum::<f64>() / c.len() as f64))
        .collect();
    ranked.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| (a.1 - current).abs().total_cmp(&(b.1 - current).abs()))
    });
    ranked.truncate(k);

    let mut prices: Vec<f64> = ranked.into_iter().map(|(_, p)| p).collect();
    prices.sort_by(f64::total_cmp);
    prices
}

fn touch_level(bars: &[Bar], price: f64, kind: LevelKind) -> Level {
    let touch_count = bars.iter().filter(|b| b.touches(price)).count() as u32;
    Level {
        price,
        kind,
        touch_count,
        strength: f64::min(touch_count as f64 / 10.0 * 100.0, 100.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Oscillating series with swing highs near 110 and swing lows near 90.
    fn create_ranging_bars(count: usize) -> Vec<Bar> {
        (0..count)
            .map(|i| {
                let phase = (i % 20) as f64;
                let mid = if phase < 10.0 {
                    90.0 + phase * 2.0
                } else {
                    110.0 - (phase - 10.0) * 2.0
                };
                Bar::new(i as i64 * 60_000, mid - 0.5, mid + 1.0, mid - 1.0, mid + 0.5, 1000.0)
            })
            .collect()
    }

    #[test]
    fn test_short_window_is_empty() {
        let detector = LevelDetector::default();
        let levels = detector.detect_levels(&create_ranging_bars(50), 100, 5);
        assert!(levels.is_empty());
        assert!(levels.key_levels.is_empty());
    }

    #[test]
    fn test_detects_swing_levels() {
        let detector = LevelDetector::default();
        let levels = detector.detect(&create_ranging_bars(120));
        assert!(!levels.resistances.is_empty(), "expected resistances");
        assert!(!levels.supports.is_empty(), "expected supports");
        assert!(levels.resistances.iter().all(|l| l.price > 105.0));
        assert!(levels.supports.iter().all(|l| l.price < 95.0));
        assert!(levels.supports.len() <= 5 && levels.resistances.len() <= 5);
    }

    #[test]
    fn test_cluster_merges_within_one_percent() {
        let merged = cluster(&[100.0, 100.5, 100.9], 0.01, 5, 100.0);
        assert_eq!(merged.len(), 1);
        assert!((merged[0] - 100.466_666).abs() < 1e-3);

        let split = cluster(&[100.0, 101.5], 0.01, 5, 100.0);
        assert_eq!(split.len(), 2);
    }

    #[test]
    fn test_cluster_keeps_most_populated() {
        let values = [90.0, 95.0, 100.0, 100.2, 100.4, 105.0];
        let kept = cluster(&values, 0.01, 2, 104.0);
        assert_eq!(kept.len(), 2);
        assert!((kept[0] - 100.2).abs() < 1e-9);
        assert_eq!(kept[1], 105.0);
    }

    #[test]
    fn test_pivots_are_strict() {
        let mut bars: Vec<Bar> = (0..11)
            .map(|i| Bar::new(i, 100.0, 101.0, 99.0, 100.0, 1.0))
            .collect();
        // A flat top has no strict maximum.
        assert!(pivots(&bars, 5, LevelKind::Resistance).is_empty());
        bars[5].high = 105.0;
        assert_eq!(pivots(&bars, 5, LevelKind::Resistance), vec![105.0]);
        bars[5].low = 95.0;
        assert_eq!(pivots(&bars, 5, LevelKind::Support), vec![95.0]);
    }

    fn level(price: f64, kind: LevelKind, touches: u32) -> Level {
        Level {
            price,
            kind,
            touch_count: touches,
            strength: f64::min(touches as f64 * 10.0, 100.0),
        }
    }

    fn sample_levels() -> LevelSet {
        LevelSet {
            supports: vec![level(95.0, LevelKind::Support, 2)],
            resistances: vec![level(105.0, LevelKind::Resistance, 2)],
            key_levels: vec![],
        }
    }

    #[test]
    fn test_support_bounce() {
        let detector = LevelDetector::default();
        let signal = detector.trading_signal(&sample_levels(), 95.3, 95.1);
        assert_eq!(signal.action, Action::Buy);
        assert_eq!(signal.score, 30.0);
        assert_eq!(signal.nearest_support, Some(95.0));
    }

    #[test]
    fn test_resistance_breakout() {
        let detector = LevelDetector::default();
        let signal = detector.trading_signal(&sample_levels(), 106.0, 104.0);
        assert_eq!(signal.action, Action::Buy);
        assert_eq!(signal.score, 35.0);
    }

    #[test]
    fn test_resistance_rejection_is_negative() {
        let detector = LevelDetector::default();
        let signal = detector.trading_signal(&sample_levels(), 104.8, 104.5);
        assert_eq!(signal.action, Action::Sell);
        assert_eq!(signal.score, -25.0);
    }

    #[test]
    fn test_support_breakdown() {
        let detector = LevelDetector::default();
        let signal = detector.trading_signal(&sample_levels(), 93.0, 96.0);
        assert_eq!(signal.action, Action::Sell);
        assert_eq!(signal.score, -30.0);
    }

    #[test]
    fn test_key_level_bonus_follows_direction() {
        let detector = LevelDetector::default();
        let mut levels = sample_levels();
        levels.key_levels = vec![level(105.0, LevelKind::Resistance, 4)];
        let signal = detector.trading_signal(&levels, 104.8, 104.5);
        assert_eq!(signal.score, -35.0);
    }

    #[test]
    fn test_no_levels_is_neutral() {
        let detector = LevelDetector::default();
        let signal = detector.trading_signal(&LevelSet::default(), 100.0, 99.0);
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.score, 0.0);
        assert!(signal.nearest_support.is_none());
    }

    #[test]
    fn test_clear_path() {
        let levels = sample_levels();
        assert!(!LevelDetector::has_clear_path(&levels, 100.0, 106.0).0);
        assert!(LevelDetector::has_clear_path(&levels, 100.0, 104.0).0);
        assert!(!LevelDetector::has_clear_path(&levels, 100.0, 94.0).0);
    }
}

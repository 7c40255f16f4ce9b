/**
 * Property Tests
 *
 * Seeded random windows checked against the engine's bounds:
 * - Fused score, raw score and power boost stay in range
 * - Detectors are pure
 * - Micro score never falls as volume rises
 * - Level clustering and volume profile conservation
 */

use apex::config::{LevelConfig, VolumeConfig};
use apex::services::layers::{LayerContext, LayerScorer, MicroLayer};
use apex::services::signals::Detector;
use apex::services::{LevelDetector, PatternDetector, VolumeDistributionAnalyzer};
use apex::{Bar, EngineConfig, IndicatorSnapshot, LevelSet, MarketWindow, SignalEngine};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

mod common {
    use super::*;

    /// Optional indicator value: missing, non-finite, or drawn from `lo..hi`.
    fn maybe(rng: &mut StdRng, lo: f64, hi: f64) -> Option<f64> {
        match rng.gen_range(0..10) {
            0 => None,
            1 => Some(f64::NAN),
            _ => Some(rng.gen_range(lo..hi)),
        }
    }

    pub fn random_snapshot(rng: &mut StdRng, price: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            ema_fast: maybe(rng, price * 0.8, price * 1.2),
            ema_medium: maybe(rng, price * 0.8, price * 1.2),
            ema_slow: maybe(rng, price * 0.8, price * 1.2),
            ema_trend: maybe(rng, price * 0.8, price * 1.2),
            rsi: maybe(rng, 0.0, 100.0),
            macd: maybe(rng, -5.0, 5.0),
            macd_signal: maybe(rng, -5.0, 5.0),
            atr: maybe(rng, 0.0, price * 0.1),
            stoch_k: maybe(rng, 0.0, 100.0),
            stoch_d: maybe(rng, 0.0, 100.0),
            supertrend: maybe(rng, -1.0, 1.0).map(f64::signum),
            volume_sma: maybe(rng, 0.0, 5000.0),
            ..Default::default()
        }
    }

    /// Random walk with wide wicks and occasional zero-volume or gap bars.
    pub fn random_window(rng: &mut StdRng, n: usize) -> MarketWindow {
        let mut price: f64 = rng.gen_range(1.0..50_000.0);
        let mut bars = Vec::with_capacity(n);
        let mut indicators = Vec::with_capacity(n);
        for i in 0..n {
            let open = price;
            let step = if rng.gen_bool(0.05) { 0.2 } else { 0.02 };
            let close = (open * (1.0 + rng.gen_range(-step..step))).max(0.01);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.03));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.03));
            let volume = if rng.gen_bool(0.05) { 0.0 } else { rng.gen_range(0.0..10_000.0) };
            bars.push(Bar::new(i as i64 * 60_000, open, high, low, close, volume));
            indicators.push(random_snapshot(rng, close));
            price = close;
        }
        MarketWindow::new(bars, indicators).expect("aligned series")
    }

    /// Flat bars whose highs stay at 100 except for the given spikes.
    pub fn bars_with_spikes(n: usize, spikes: &[(usize, f64)]) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let high = spikes
                    .iter()
                    .find(|(at, _)| *at == i)
                    .map(|(_, h)| *h)
                    .unwrap_or(100.0);
                Bar::new(i as i64 * 60_000, 99.5, high, 99.0, 99.5, 1000.0)
            })
            .collect()
    }
}

use common::*;

const SEED: u64 = 0x5eed_a9e1;

// ============================================================================
// Score bounds
// ============================================================================

#[test]
fn test_scores_stay_bounded_on_random_windows() {
    let mut rng = StdRng::seed_from_u64(SEED);
    let engine = SignalEngine::new(EngineConfig::default()).unwrap();

    for round in 0..60 {
        let n = rng.gen_range(100..180);
        let window = random_window(&mut rng, n);
        let analysis = engine.analyze(&window).expect("window long enough");
        let score = analysis.score;

        assert!(
            (0.0..=100.0).contains(&score.total),
            "round {}: total {}",
            round,
            score.total
        );
        assert!(
            (-100.0..=100.0).contains(&score.raw),
            "round {}: raw {}",
            round,
            score.raw
        );
        assert!(
            (0.0..=50.0).contains(&analysis.power.total_boost),
            "round {}: boost {}",
            round,
            analysis.power.total_boost
        );
        assert!(analysis.macro_layer.score.value.abs() <= 30.0);
        assert!(analysis.meso.score.value.abs() <= 40.0);
        assert!(analysis.micro.score.value.abs() <= 30.0);
        assert!((0.0..=1.0).contains(&analysis.decision.strength.as_f64()));
    }
}

// ============================================================================
// Detector purity
// ============================================================================

#[test]
fn test_detectors_are_idempotent() {
    let mut rng = StdRng::seed_from_u64(SEED ^ 1);
    let patterns = PatternDetector::new();
    let levels = LevelDetector::new(LevelConfig::default());
    let volume = VolumeDistributionAnalyzer::new(VolumeConfig::default());

    for _ in 0..20 {
        let window = random_window(&mut rng, 120);
        let bars = window.bars();
        assert_eq!(patterns.detect(bars), patterns.detect(bars));
        assert_eq!(levels.detect(bars), levels.detect(bars));
        assert_eq!(volume.detect(bars), volume.detect(bars));
    }
}

#[test]
fn test_engine_is_deterministic() {
    let mut rng = StdRng::seed_from_u64(SEED ^ 2);
    let engine = SignalEngine::new(EngineConfig::default()).unwrap();
    let window = random_window(&mut rng, 150);
    // Compared through JSON so that NaN indicator echoes compare equal.
    let first = serde_json::to_string(&engine.analyze(&window)).unwrap();
    let second = serde_json::to_string(&engine.analyze(&window)).unwrap();
    assert_eq!(first, second);
}

// ============================================================================
// Micro layer
// ============================================================================

#[test]
fn test_micro_score_non_decreasing_in_volume() {
    let mut rng = StdRng::seed_from_u64(SEED ^ 3);
    let micro = MicroLayer::new();
    let levels = LevelSet::default();

    for _ in 0..20 {
        let snapshot = IndicatorSnapshot {
            volume_sma: Some(1000.0),
            ..random_snapshot(&mut rng, 100.0)
        };
        let mut previous = f64::NEG_INFINITY;
        for volume in [0.0, 500.0, 1000.0, 1400.0, 1600.0, 3000.0, 50_000.0] {
            let bars = vec![
                Bar::new(0, 100.0, 100.6, 99.8, 100.5, 1000.0),
                Bar::new(60_000, 100.5, 101.2, 100.3, 101.0, volume),
            ];
            let window = MarketWindow::new(bars, vec![snapshot.clone(), snapshot.clone()])
                .expect("aligned");
            let ctx = LayerContext::new(&window, &[], &levels, None).expect("two bars");
            let value = micro.score(&ctx).score.value;
            assert!(
                value >= previous,
                "volume {} lowered micro score from {} to {}",
                volume,
                previous,
                value
            );
            previous = value;
        }
    }
}

// ============================================================================
// Levels and volume profile
// ============================================================================

#[test]
fn test_pivots_within_one_percent_merge() {
    let detector = LevelDetector::new(LevelConfig::default());

    // 110.0 and 110.5 are 0.45% apart; 120.0 is well clear of both.
    let bars = bars_with_spikes(100, &[(20, 110.0), (40, 110.5), (60, 120.0)]);
    let levels = detector.detect(&bars);

    assert!(levels.supports.is_empty());
    assert_eq!(levels.resistances.len(), 2, "{:?}", levels.resistances);
    assert!((levels.resistances[0].price - 110.25).abs() < 1e-9);
    assert_eq!(levels.resistances[1].price, 120.0);
}

#[test]
fn test_pivots_beyond_one_percent_stay_apart() {
    let detector = LevelDetector::new(LevelConfig::default());
    let bars = bars_with_spikes(100, &[(20, 110.0), (40, 111.5)]);
    let levels = detector.detect(&bars);
    assert_eq!(levels.resistances.len(), 2);
}

#[test]
fn test_gap_of_exactly_one_percent_starts_new_cluster() {
    let detector = LevelDetector::new(LevelConfig::default());
    let bars: Vec<Bar> = (0..100)
        .map(|i| {
            let high = match i {
                20 => 100.0,
                40 => 101.0,
                _ => 99.5,
            };
            Bar::new(i as i64 * 60_000, 99.2, high, 99.0, 99.2, 1000.0)
        })
        .collect();
    let levels = detector.detect(&bars);

    // (101 - 100) / 100 equals the gap, which does not merge.
    assert_eq!(levels.resistances.len(), 2, "{:?}", levels.resistances);
    assert_eq!(levels.resistances[0].price, 100.0);
    assert_eq!(levels.resistances[1].price, 101.0);
}

#[test]
fn test_profile_conserves_volume() {
    let mut rng = StdRng::seed_from_u64(SEED ^ 4);
    let analyzer = VolumeDistributionAnalyzer::new(VolumeConfig::default());

    for _ in 0..30 {
        let window = random_window(&mut rng, 100);
        let bars = window.bars();
        let profile = analyzer.profile(bars).expect("full window");
        let expected: f64 = bars.iter().map(|b| b.volume).sum();
        let total = profile.total_volume();
        assert!(
            (total - expected).abs() <= expected * 1e-9 + 1e-6,
            "profile {} vs bars {}",
            total,
            expected
        );
        assert!(profile.value_area_low <= profile.point_of_control);
        assert!(profile.point_of_control <= profile.value_area_high);
    }
}

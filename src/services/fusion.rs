//! Signal fusion: layer scores, prediction and boosts into one 0-100 score.
//!
//! Pipeline for one cycle:
//! 1. Detectors (patterns, levels, volume profile) run once on the window.
//! 2. The macro, meso and micro layers score the shared context.
//! 3. Layer scores are normalized to [-100, 100] and weighted, with the
//!    prediction taking its own share when available.
//! 4. The raw score maps to [0, 100], then volume, volatility, power and
//!    accuracy adjustments apply in that order, each clamped.
//! 5. The decision compares the total against the buy/sell thresholds.

use std::time::Duration;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::services::accuracy::{AccuracyStore, AccuracyTracker};
use crate::services::cache::{fingerprint, DetectorCache};
use crate::services::layers::{
    LayerContext, LayerScorer, MacroLayer, MesoLayer, MicroLayer, MACRO_BOUND, MESO_BOUND,
    MICRO_BOUND,
};
use crate::services::prediction::{PredictionAdapter, Predictor};
use crate::services::signals::power::PowerInputs;
use crate::services::signals::{
    Detector, LevelDetector, PatternDetector, PowerSignals, VolumeDistributionAnalyzer,
};
use crate::types::{
    Action, Analysis, CompositeScore, Decision, LayerContributions, LevelSet, MarketWindow,
    PatternMatch, PowerSignalSet, PredictionInput, SignalStrength, VolumeProfile,
    MIN_ANALYSIS_BARS,
};

/// Tracker name for fused-signal outcomes.
pub const SIGNAL_TRACKER: &str = "signals";
/// Tracker name for external prediction outcomes.
pub const PREDICTION_TRACKER: &str = "prediction";

/// Everything the fusion step reads.
#[derive(Debug, Clone, Copy)]
pub struct FusionInputs<'a> {
    /// Bounded macro, meso and micro layer scores.
    pub layers: [f64; 3],
    pub prediction: &'a PredictionInput,
    pub volume_ratio: f64,
    pub volatility_adjustment: f64,
    pub power: &'a PowerSignalSet,
}

/// Buy at or above `min_score`, sell at or below `100 - min_score`.
pub fn decide(total: f64, min_score: f64) -> Decision {
    let sell_below = 100.0 - min_score;
    if total >= min_score {
        Decision {
            action: Action::Buy,
            strength: SignalStrength::from_margin(total - min_score),
        }
    } else if total <= sell_below {
        Decision {
            action: Action::Sell,
            strength: SignalStrength::from_margin(sell_below - total),
        }
    } else {
        Decision::default()
    }
}

pub struct SignalEngine {
    config: EngineConfig,
    patterns: PatternDetector,
    levels: LevelDetector,
    volume: VolumeDistributionAnalyzer,
    macro_layer: MacroLayer,
    meso: MesoLayer,
    micro: MicroLayer,
    power: PowerSignals,
    predictor: Option<PredictionAdapter>,
    cache: Option<DetectorCache>,
    signal_accuracy: AccuracyTracker,
    prediction_accuracy: AccuracyTracker,
}

impl SignalEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let levels = LevelDetector::new(config.levels.clone());
        let volume = VolumeDistributionAnalyzer::new(config.volume.clone());
        let cache = (config.cache_ttl_secs > 0)
            .then(|| DetectorCache::new(Duration::from_secs(config.cache_ttl_secs)));

        info!(
            min_score = config.fusion.min_score,
            prediction = config.prediction.enabled,
            cache = cache.is_some(),
            "Signal engine initialized"
        );

        Ok(Self {
            patterns: PatternDetector::new(),
            meso: MesoLayer::new(volume.clone(), levels.clone()),
            levels,
            volume,
            macro_layer: MacroLayer::new(config.regime.clone()),
            micro: MicroLayer::new(),
            power: PowerSignals::new(config.power.clone()),
            predictor: None,
            cache,
            signal_accuracy: AccuracyTracker::new(config.prediction.clone()),
            prediction_accuracy: AccuracyTracker::new(config.prediction.clone()),
            config,
        })
    }

    /// Attach an external classifier. It is only consulted when
    /// `prediction.enabled` is set.
    pub fn with_predictor(mut self, predictor: Box<dyn Predictor>) -> Self {
        self.predictor = Some(PredictionAdapter::new(predictor));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&DetectorCache> {
        self.cache.as_ref()
    }

    pub fn signal_accuracy(&self) -> &AccuracyTracker {
        &self.signal_accuracy
    }

    pub fn prediction_accuracy(&self) -> &AccuracyTracker {
        &self.prediction_accuracy
    }

    /// Analyze the latest bar, consulting the predictor if one is enabled.
    /// Returns None for windows shorter than [`MIN_ANALYSIS_BARS`].
    pub fn analyze(&self, window: &MarketWindow) -> Option<Analysis> {
        self.run(window, None)
    }

    /// Analyze with a prediction supplied by the caller.
    pub fn analyze_with_prediction(
        &self,
        window: &MarketWindow,
        prediction: PredictionInput,
    ) -> Option<Analysis> {
        self.run(window, Some(prediction))
    }

    fn run(&self, window: &MarketWindow, supplied: Option<PredictionInput>) -> Option<Analysis> {
        if window.len() < MIN_ANALYSIS_BARS {
            debug!(
                bars = window.len(),
                required = MIN_ANALYSIS_BARS,
                "Skipping cycle: insufficient data"
            );
            return None;
        }

        let (patterns, levels, profile) = self.detect(window);
        let ctx = LayerContext::new(window, &patterns, &levels, profile.as_ref())?;

        let macro_layer = self.macro_layer.score(&ctx);
        let ctx = ctx.with_regime(macro_layer.regime);
        let meso = self.meso.score(&ctx);
        let micro = self.micro.score(&ctx);

        let prediction = match supplied {
            Some(prediction) => prediction,
            None => self.resolve_prediction(window, &levels),
        };

        let power = self.power.evaluate(&PowerInputs {
            bar: ctx.bar,
            prev_close: ctx.prev_price,
            indicators: ctx.indicators,
            patterns: &patterns,
            volume_ratio: ctx.volume_ratio(),
        });

        let score = self.fuse(&FusionInputs {
            layers: [
                macro_layer.score.value,
                meso.score.value,
                micro.score.value,
            ],
            prediction: &prediction,
            volume_ratio: ctx.volume_ratio(),
            volatility_adjustment: macro_layer.volatility.adjustment,
            power: &power,
        });
        let decision = self.decide(score.total);

        if decision.action == Action::Hold {
            debug!(score = score.total, regime = macro_layer.regime.name(), "Hold");
        } else {
            info!(
                action = decision.action.label(),
                strength = decision.strength.label(),
                score = score.total,
                regime = macro_layer.regime.name(),
                price = ctx.price,
                "Signal decision"
            );
        }

        Some(Analysis {
            timestamp: ctx.bar.timestamp,
            price: ctx.price,
            macro_layer,
            meso,
            micro,
            prediction,
            power,
            score,
            decision,
        })
    }

    fn detect(&self, window: &MarketWindow) -> (Vec<PatternMatch>, LevelSet, Option<VolumeProfile>) {
        let bars = window.bars();
        match &self.cache {
            Some(cache) => {
                let fp = fingerprint(bars);
                (
                    cache.patterns(&self.patterns, bars, &fp),
                    cache.levels(&self.levels, bars, &fp),
                    cache.profile(&self.volume, bars, &fp),
                )
            }
            None => (
                self.patterns.detect(bars),
                self.levels.detect(bars),
                self.volume.detect(bars),
            ),
        }
    }

    fn resolve_prediction(&self, window: &MarketWindow, levels: &LevelSet) -> PredictionInput {
        match &self.predictor {
            Some(adapter) if self.config.prediction.enabled => {
                adapter.resolve(window, levels, &self.prediction_accuracy)
            }
            _ => PredictionInput::Disabled,
        }
    }

    /// Combine layer scores, prediction and adjustments into a [`CompositeScore`].
    pub fn fuse(&self, inputs: &FusionInputs<'_>) -> CompositeScore {
        let fusion = &self.config.fusion;
        let normalized = [
            normalize(inputs.layers[0], MACRO_BOUND),
            normalize(inputs.layers[1], MESO_BOUND),
            normalize(inputs.layers[2], MICRO_BOUND),
        ];

        let (weights, prediction) = match inputs.prediction.result() {
            Some(result) => {
                let w = finite_or_zero(result.weight).clamp(0.0, 1.0);
                let split = fusion.layer_weights_with_prediction;
                let sum: f64 = split.iter().sum();
                let weights = split.map(|s| (1.0 - w) * s / sum);
                (weights, finite_or_zero(result.score).clamp(-100.0, 100.0) * w)
            }
            None => (fusion.layer_weights, 0.0),
        };

        let contributions = LayerContributions {
            macro_layer: normalized[0] * weights[0],
            meso: normalized[1] * weights[1],
            micro: normalized[2] * weights[2],
            prediction,
        };
        let raw = (contributions.macro_layer
            + contributions.meso
            + contributions.micro
            + contributions.prediction)
            .clamp(-100.0, 100.0);
        let mut total = (raw + 100.0) / 2.0;

        let volume_boost = if inputs.volume_ratio > fusion.volume_boost_ratio {
            f64::min((inputs.volume_ratio - 1.0) * 10.0, fusion.volume_boost_cap)
        } else {
            0.0
        };
        total = clamp_total(total + volume_boost);

        let volatility_adjustment = finite_or_zero(inputs.volatility_adjustment);
        total = clamp_total(total + volatility_adjustment);

        let power_boost = if inputs.power.active {
            finite_or_zero(inputs.power.total_boost)
        } else {
            0.0
        };
        total = clamp_total(total + power_boost);

        let confidence_factor = self.signal_accuracy.confidence_factor();
        total = clamp_total(50.0 + (total - 50.0) * confidence_factor);

        CompositeScore {
            total,
            raw,
            contributions,
            volume_boost,
            volatility_adjustment,
            power_boost,
            confidence_factor,
        }
    }

    pub fn decide(&self, total: f64) -> Decision {
        decide(total, self.config.fusion.min_score)
    }

    /// Record whether a fused signal turned out right. Idempotent by trade id.
    pub fn record_outcome(&mut self, trade_id: &str, correct: bool) -> bool {
        self.signal_accuracy.record(trade_id, correct)
    }

    /// Record whether the external prediction turned out right.
    pub fn record_prediction_outcome(&mut self, trade_id: &str, correct: bool) -> bool {
        self.prediction_accuracy.record(trade_id, correct)
    }

    /// Archive a fused-signal outcome in `store`, then record it.
    pub fn archive_outcome(
        &mut self,
        store: &dyn AccuracyStore,
        trade_id: &str,
        correct: bool,
    ) -> Result<bool> {
        store.archive(SIGNAL_TRACKER, trade_id, correct)?;
        Ok(self.record_outcome(trade_id, correct))
    }

    /// Archive a prediction outcome in `store`, then record it.
    pub fn archive_prediction_outcome(
        &mut self,
        store: &dyn AccuracyStore,
        trade_id: &str,
        correct: bool,
    ) -> Result<bool> {
        store.archive(PREDICTION_TRACKER, trade_id, correct)?;
        Ok(self.record_prediction_outcome(trade_id, correct))
    }

    /// Restore both trackers from a store; missing snapshots keep defaults.
    pub fn load_accuracy(&mut self, store: &dyn AccuracyStore) -> Result<()> {
        if let Some(snapshot) = store.load(SIGNAL_TRACKER)? {
            self.signal_accuracy.restore(snapshot);
        }
        if let Some(snapshot) = store.load(PREDICTION_TRACKER)? {
            self.prediction_accuracy.restore(snapshot);
        }
        Ok(())
    }

    pub fn save_accuracy(&self, store: &dyn AccuracyStore) -> Result<()> {
        store.save(SIGNAL_TRACKER, &self.signal_accuracy.snapshot())?;
        store.save(PREDICTION_TRACKER, &self.prediction_accuracy.snapshot())?;
        info!(
            signal_hit_rate = self.signal_accuracy.hit_rate(),
            prediction_weight = self.prediction_accuracy.weight(),
            "Accuracy state saved"
        );
        Ok(())
    }
}

fn normalize(value: f64, bound: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value / bound * 100.0).clamp(-100.0, 100.0)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn clamp_total(value: f64) -> f64 {
    if value.is_nan() {
        50.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sqlite_store::SqliteStore;
    use crate::types::{Bar, PowerSignal, PowerSignalKind, PredictionResult};

    fn engine() -> SignalEngine {
        SignalEngine::new(EngineConfig::default()).unwrap()
    }

    fn inputs<'a>(
        layers: [f64; 3],
        prediction: &'a PredictionInput,
        power: &'a PowerSignalSet,
    ) -> FusionInputs<'a> {
        FusionInputs {
            layers,
            prediction,
            volume_ratio: 1.0,
            volatility_adjustment: 0.0,
            power,
        }
    }

    #[test]
    fn test_neutral_layers_give_fifty() {
        let power = PowerSignalSet::default();
        let score = engine().fuse(&inputs([0.0; 3], &PredictionInput::Disabled, &power));
        assert_eq!(score.raw, 0.0);
        assert_eq!(score.total, 50.0);
        assert_eq!(score.confidence_factor, 0.75);
    }

    #[test]
    fn test_maxed_layers() {
        let power = PowerSignalSet::default();
        let score = engine().fuse(&inputs([30.0, 40.0, 30.0], &PredictionInput::Disabled, &power));
        assert!((score.raw - 100.0).abs() < 1e-9);
        // 50 + 50 * 0.75
        assert!((score.total - 87.5).abs() < 1e-9);
    }

    #[test]
    fn test_prediction_takes_its_weight() {
        let prediction = PredictionInput::Available(PredictionResult {
            label: 0,
            probability: 0.0,
            confidence: 1.0,
            score: -100.0,
            weight: 0.2,
        });
        let power = PowerSignalSet::default();
        let score = engine().fuse(&inputs([30.0, 40.0, 30.0], &prediction, &power));
        assert!((score.contributions.prediction + 20.0).abs() < 1e-9);
        // Layers share the remaining 80%.
        assert!((score.raw - 60.0).abs() < 1e-9, "raw {}", score.raw);
    }

    #[test]
    fn test_volume_boost_is_capped() {
        let power = PowerSignalSet::default();
        let mut fusion = inputs([0.0; 3], &PredictionInput::Disabled, &power);
        fusion.volume_ratio = 1.4;
        assert_eq!(engine().fuse(&fusion).volume_boost, 0.0);
        fusion.volume_ratio = 1.8;
        assert!((engine().fuse(&fusion).volume_boost - 8.0).abs() < 1e-9);
        fusion.volume_ratio = 5.0;
        assert_eq!(engine().fuse(&fusion).volume_boost, 10.0);
    }

    #[test]
    fn test_inactive_power_adds_nothing() {
        let power = PowerSignalSet {
            matches: vec![PowerSignal {
                kind: PowerSignalKind::VolumeExplosion,
                boost: 15.0,
                description: "spike".to_string(),
            }],
            total_boost: 15.0,
            active: false,
        };
        let score = engine().fuse(&inputs([0.0; 3], &PredictionInput::Disabled, &power));
        assert_eq!(score.power_boost, 0.0);

        let active = PowerSignalSet { active: true, ..power };
        let score = engine().fuse(&inputs([0.0; 3], &PredictionInput::Disabled, &active));
        assert_eq!(score.power_boost, 15.0);
        assert!((score.total - (50.0 + 15.0 * 0.75)).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_layers_are_neutral() {
        let power = PowerSignalSet::default();
        let score = engine().fuse(&inputs(
            [f64::NAN, f64::INFINITY, 0.0],
            &PredictionInput::Disabled,
            &power,
        ));
        assert_eq!(score.total, 50.0);
    }

    #[test]
    fn test_decision_thresholds() {
        assert_eq!(decide(60.0, 60.0).action, Action::Buy);
        assert_eq!(decide(60.0, 60.0).strength, SignalStrength::VeryWeak);
        assert_eq!(decide(59.9, 60.0).action, Action::Hold);
        assert_eq!(decide(40.0, 60.0).action, Action::Sell);
        assert_eq!(decide(10.0, 60.0).strength, SignalStrength::VeryStrong);
        assert_eq!(decide(50.0, 60.0), Decision::default());
    }

    #[test]
    fn test_short_window_is_skipped() {
        let bars = (0..99)
            .map(|i| Bar::new(i, 100.0, 101.0, 99.0, 100.0, 1000.0))
            .collect();
        assert!(engine().analyze(&MarketWindow::from_bars(bars)).is_none());
    }

    #[test]
    fn test_accuracy_changes_conviction() {
        let mut engine = engine();
        for i in 0..10 {
            engine.record_outcome(&format!("t{}", i), true);
        }
        let power = PowerSignalSet::default();
        let score = engine.fuse(&inputs([30.0, 40.0, 30.0], &PredictionInput::Disabled, &power));
        assert_eq!(score.total, 100.0);
    }

    #[test]
    fn test_accuracy_persistence() {
        let store = SqliteStore::new_in_memory().unwrap();
        let mut engine = engine();
        engine.record_outcome("a", true);
        engine.record_prediction_outcome("a", false);
        engine.save_accuracy(&store).unwrap();

        let mut restored = SignalEngine::new(EngineConfig::default()).unwrap();
        restored.load_accuracy(&store).unwrap();
        assert_eq!(restored.signal_accuracy().hit_rate(), 1.0);
        assert_eq!(restored.prediction_accuracy().hit_rate(), 0.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.fusion.min_score = 40.0;
        assert!(SignalEngine::new(config).is_err());
    }
}

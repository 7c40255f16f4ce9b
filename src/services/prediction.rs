//! Boundary to an external classifier.

use tracing::{debug, warn};

use crate::error::Result;
use crate::services::accuracy::AccuracyTracker;
use crate::services::features::FeatureExtractor;
use crate::types::{FeatureVector, LevelSet, MarketWindow, PredictionInput, PredictionResult, RawPrediction};

/// An external up/down classifier.
pub trait Predictor: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, features: &FeatureVector) -> Result<RawPrediction>;
}

/// Turns classifier output into a fusion input.
///
/// Any failure (short window, predictor error, malformed output) resolves
/// to [`PredictionInput::Disabled`] and fusion continues without it.
pub struct PredictionAdapter {
    predictor: Box<dyn Predictor>,
    extractor: FeatureExtractor,
}

impl PredictionAdapter {
    pub fn new(predictor: Box<dyn Predictor>) -> Self {
        Self {
            predictor,
            extractor: FeatureExtractor::new(),
        }
    }

    pub fn predictor_name(&self) -> &str {
        self.predictor.name()
    }

    pub fn resolve(&self, window: &MarketWindow, levels: &LevelSet, tracker: &AccuracyTracker) -> PredictionInput {
        let Some(features) = self.extractor.extract(window, levels) else {
            debug!("Window too short for prediction features");
            return PredictionInput::Disabled;
        };

        match self.predictor.predict(&features) {
            Ok(raw) => Self::enrich(raw, tracker),
            Err(e) => {
                warn!("Predictor {} failed: {}", self.predictor.name(), e);
                PredictionInput::Disabled
            }
        }
    }

    /// Attach confidence, score and weight to a raw prediction.
    pub fn enrich(raw: RawPrediction, tracker: &AccuracyTracker) -> PredictionInput {
        if raw.label > 1 || !(0.0..=1.0).contains(&raw.probability) {
            warn!(
                label = raw.label,
                probability = raw.probability,
                "Discarding malformed prediction"
            );
            return PredictionInput::Disabled;
        }

        PredictionInput::Available(PredictionResult {
            label: raw.label,
            probability: raw.probability,
            confidence: tracker.adjust_confidence(raw.probability),
            score: (raw.probability - 0.5) * 200.0,
            weight: tracker.weight(),
        })
    }
}

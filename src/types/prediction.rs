use serde::{Deserialize, Serialize};

/// Label/probability pair returned by an external classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    /// 1 = price expected up, 0 = down.
    pub label: u8,
    /// Probability that price moves up, in [0, 1].
    pub probability: f64,
}

/// A prediction enriched with confidence, signed score and fusion weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: u8,
    pub probability: f64,
    /// Accuracy-adjusted confidence in [0, 1].
    pub confidence: f64,
    /// Signed score in [-100, 100]; positive = bullish.
    pub score: f64,
    /// Share of the fused score given to the prediction, in [0, 1].
    pub weight: f64,
}

impl PredictionResult {
    pub fn is_bullish(&self) -> bool {
        self.label == 1
    }
}

/// Prediction as seen by the fusion stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictionInput {
    /// No predictor configured, or the predictor failed this cycle.
    #[default]
    Disabled,
    Available(PredictionResult),
}

impl PredictionInput {
    pub fn result(&self) -> Option<&PredictionResult> {
        match self {
            PredictionInput::Available(result) => Some(result),
            PredictionInput::Disabled => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, PredictionInput::Available(_))
    }
}

/// Fixed-order feature vector handed to the classifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub names: Vec<&'static str>,
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a named feature.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| *n == name)
            .and_then(|i| self.values.get(i).copied())
    }
}

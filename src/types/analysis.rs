use serde::{Deserialize, Serialize};

use super::prediction::PredictionInput;
use super::signals::{
    Action, LayerScore, LevelSignal, MomentumScore, PatternMatch, PatternScore, Regime,
    TrendAnalysis, VolatilityAnalysis, VolumeAnalysis,
};

/// Signal strength levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignalStrength {
    /// Very weak signal
    #[default]
    VeryWeak,
    /// Weak signal
    Weak,
    /// Moderate signal
    Moderate,
    /// Strong signal
    Strong,
    /// Very strong signal
    VeryStrong,
}

impl SignalStrength {
    /// Convert to a numeric value (0.0 - 1.0)
    pub fn as_f64(&self) -> f64 {
        match self {
            SignalStrength::VeryWeak => 0.2,
            SignalStrength::Weak => 0.4,
            SignalStrength::Moderate => 0.6,
            SignalStrength::Strong => 0.8,
            SignalStrength::VeryStrong => 1.0,
        }
    }

    /// Band for the distance (in score points) past the crossed boundary.
    pub fn from_margin(margin: f64) -> Self {
        if margin < 5.0 {
            SignalStrength::VeryWeak
        } else if margin < 10.0 {
            SignalStrength::Weak
        } else if margin < 15.0 {
            SignalStrength::Moderate
        } else if margin < 25.0 {
            SignalStrength::Strong
        } else {
            SignalStrength::VeryStrong
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SignalStrength::VeryWeak => "very weak",
            SignalStrength::Weak => "weak",
            SignalStrength::Moderate => "moderate",
            SignalStrength::Strong => "strong",
            SignalStrength::VeryStrong => "very strong",
        }
    }
}

/// Final action and how far the score sits past the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Decision {
    pub action: Action,
    pub strength: SignalStrength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSignalKind {
    RsiExtremeOversold,
    RsiExtremeOverbought,
    VolumeExplosion,
    MultiplePatterns,
    IndicatorConvergence,
    SupertrendMomentum,
    BollingerSqueeze,
}

/// One matched override rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSignal {
    pub kind: PowerSignalKind,
    /// Signed boost contributed by this rule.
    pub boost: f64,
    pub description: String,
}

/// Result of the override pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerSignalSet {
    pub matches: Vec<PowerSignal>,
    /// Clamped to [0, 50].
    pub total_boost: f64,
    /// True iff at least two rules matched.
    pub active: bool,
}

/// Per-layer weighted contributions to the raw score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerContributions {
    pub macro_layer: f64,
    pub meso: f64,
    pub micro: f64,
    pub prediction: f64,
}

/// Fused 0-100 score with every additive step recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    /// Final score in [0, 100].
    pub total: f64,
    /// Weighted sum in [-100, 100] before mapping.
    pub raw: f64,
    pub contributions: LayerContributions,
    pub volume_boost: f64,
    pub volatility_adjustment: f64,
    pub power_boost: f64,
    pub confidence_factor: f64,
}

/// Macro layer detail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroAnalysis {
    pub score: LayerScore,
    pub regime: Regime,
    pub trend: TrendAnalysis,
    pub volatility: VolatilityAnalysis,
}

/// Meso layer detail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MesoAnalysis {
    pub score: LayerScore,
    pub volume: VolumeAnalysis,
    pub levels: LevelSignal,
    pub path_clear: bool,
}

/// Micro layer detail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MicroAnalysis {
    pub score: LayerScore,
    pub patterns: Vec<PatternMatch>,
    pub pattern_score: PatternScore,
    pub momentum: MomentumScore,
    pub volume_ratio: f64,
}

/// Everything produced by one analysis cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub timestamp: i64,
    pub price: f64,
    pub macro_layer: MacroAnalysis,
    pub meso: MesoAnalysis,
    pub micro: MicroAnalysis,
    pub prediction: PredictionInput,
    pub power: PowerSignalSet,
    pub score: CompositeScore,
    pub decision: Decision,
}

impl Analysis {
    /// All layer reasons in macro, meso, micro order.
    pub fn reasons(&self) -> impl Iterator<Item = &str> {
        self.macro_layer
            .score
            .reasons
            .iter()
            .chain(self.meso.score.reasons.iter())
            .chain(self.micro.score.reasons.iter())
            .chain(self.power.matches.iter().map(|m| &m.description))
            .map(String::as_str)
    }
}

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Lowest accepted buy threshold.
pub const MIN_BUY_SCORE: f64 = 60.0;

/// Fusion weights and decision threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Buy at or above this score, sell at or below `100 - min_score`.
    pub min_score: f64,
    /// Macro/meso/micro split of the non-prediction share when a prediction is available.
    pub layer_weights_with_prediction: [f64; 3],
    /// Macro/meso/micro weights without a prediction.
    pub layer_weights: [f64; 3],
    /// Volume ratio above which the volume boost applies.
    pub volume_boost_ratio: f64,
    /// Cap of the volume boost.
    pub volume_boost_cap: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            min_score: 60.0,
            layer_weights_with_prediction: [0.15, 0.30, 0.40],
            layer_weights: [0.15, 0.35, 0.50],
            volume_boost_ratio: 1.5,
            volume_boost_cap: 10.0,
        }
    }
}

/// Regime classification over the macro lookback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    pub lookback: usize,
    /// ATR as a percentage of mean close above which the market is volatile.
    pub volatile_atr_pct: f64,
    /// Absolute percentage change above which the market is trending.
    pub trend_change_pct: f64,
    /// Absolute percentage change below which the market is ranging.
    pub ranging_change_pct: f64,
    /// Bars averaged for the volatility ratio.
    pub atr_mean_period: usize,
    /// Weight of EMA trend strength in the macro layer.
    pub trend_weight: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            lookback: 50,
            volatile_atr_pct: 3.0,
            trend_change_pct: 2.0,
            ranging_change_pct: 0.5,
            atr_mean_period: 20,
            trend_weight: 0.3,
        }
    }
}

/// Support/resistance detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelConfig {
    pub lookback: usize,
    /// Bars on each side a pivot must dominate.
    pub pivot_window: usize,
    /// Clusters kept per side.
    pub max_clusters: usize,
    /// Relative gap (percent) that starts a new cluster.
    pub cluster_gap_pct: f64,
    /// Proximity (percent) used by the level signals.
    pub proximity_pct: f64,
    pub key_min_touches: u32,
    pub max_key_levels: usize,
    /// Target distance (percent) used for the clear-path check.
    pub clear_path_pct: f64,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            lookback: 100,
            pivot_window: 5,
            max_clusters: 5,
            cluster_gap_pct: 1.0,
            proximity_pct: 0.5,
            key_min_touches: 3,
            max_key_levels: 5,
            clear_path_pct: 2.5,
        }
    }
}

/// VWAP and volume profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Trailing bars used for the profile.
    pub profile_periods: usize,
    /// Price edges; the profile has `bucket_edges - 1` buckets.
    pub bucket_edges: usize,
    /// Share of volume that defines the value area.
    pub value_area_share: f64,
    pub poc_proximity_pct: f64,
    pub vwap_bounce_pct: f64,
    pub vwap_extended_pct: f64,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            profile_periods: 100,
            bucket_edges: 50,
            value_area_share: 0.70,
            poc_proximity_pct: 0.5,
            vwap_bounce_pct: 0.5,
            vwap_extended_pct: 1.0,
        }
    }
}

/// Power signal override pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerConfig {
    /// Matches needed for the set to be active.
    pub min_matches: usize,
    pub max_boost: f64,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            min_matches: 2,
            max_boost: 50.0,
        }
    }
}

/// Early-exit evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitConfig {
    pub min_hold_bars: usize,
    /// During grace, scores at or above this keep the position.
    pub grace_min_score: f64,
    /// Scores below this override grace with a full exit.
    pub emergency_score: f64,
    pub critical_score: f64,
    pub stagnant_score: f64,
    pub stoch_overbought: f64,
    /// Consecutive overbought bars that count as deterioration.
    pub stoch_streak: usize,
    pub score_drop_high: f64,
    pub score_drop_critical: f64,
    /// Take-profit tiers in percent (first, second, third).
    pub take_profit_tiers: [f64; 3],
    /// Require two momentum flags (or one plus deterioration) before a momentum exit.
    pub momentum_convergence: bool,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            min_hold_bars: 5,
            grace_min_score: 40.0,
            emergency_score: 25.0,
            critical_score: 35.0,
            stagnant_score: 45.0,
            stoch_overbought: 90.0,
            stoch_streak: 2,
            score_drop_high: 20.0,
            score_drop_critical: 35.0,
            take_profit_tiers: [1.5, 2.5, 4.0],
            momentum_convergence: true,
        }
    }
}

/// External prediction weighting and accuracy tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    pub enabled: bool,
    pub base_weight: f64,
    pub min_weight: f64,
    pub max_weight: f64,
    /// Outcomes kept in the rolling accuracy window.
    pub window: usize,
    /// Recompute the weight every this many outcomes.
    pub reweight_every: usize,
    pub high_accuracy: f64,
    pub low_accuracy: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_weight: 0.15,
            min_weight: 0.05,
            max_weight: 0.30,
            window: 50,
            reweight_every: 10,
            high_accuracy: 0.65,
            low_accuracy: 0.50,
        }
    }
}

/// Stop/target planning for new entries and the target ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Minimum stop distance in percent.
    pub stop_pct: f64,
    pub target_pct: f64,
    pub atr_multiplier: f64,
    pub min_risk_reward: f64,
    /// Trailing distance (percent) after the second target.
    pub trailing_pct: f64,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            stop_pct: 0.8,
            target_pct: 2.5,
            atr_multiplier: 1.5,
            min_risk_reward: 2.0,
            trailing_pct: 0.8,
        }
    }
}

/// Named presets for threshold, stop and target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    UltraAggressive,
    Aggressive,
    Balanced,
    Conservative,
}

impl RiskProfile {
    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ultra_aggressive" | "ultra" => Some(Self::UltraAggressive),
            "aggressive" => Some(Self::Aggressive),
            "balanced" => Some(Self::Balanced),
            "conservative" => Some(Self::Conservative),
            _ => None,
        }
    }

    /// (min_score, stop_pct, target_pct)
    pub fn parameters(&self) -> (f64, f64, f64) {
        match self {
            Self::UltraAggressive => (60.0, 0.6, 2.0),
            Self::Aggressive => (62.0, 0.8, 2.5),
            Self::Balanced => (64.0, 1.0, 3.0),
            Self::Conservative => (68.0, 1.2, 3.5),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub fusion: FusionConfig,
    pub regime: RegimeConfig,
    pub levels: LevelConfig,
    pub volume: VolumeConfig,
    pub power: PowerConfig,
    pub exit: ExitConfig,
    pub prediction: PredictionConfig,
    pub entry: EntryConfig,
    /// TTL of cached detector scans, in seconds (0 disables the cache).
    pub cache_ttl_secs: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// Load configuration from `APEX_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(profile) = env::var("APEX_PROFILE")
            .ok()
            .and_then(|p| RiskProfile::from_str(&p))
        {
            config.apply_profile(profile);
        }

        config.fusion.min_score = env_or("APEX_MIN_SCORE", config.fusion.min_score);
        config.prediction.enabled = env_or("APEX_PREDICTION_ENABLED", config.prediction.enabled);
        config.prediction.base_weight =
            env_or("APEX_PREDICTION_WEIGHT", config.prediction.base_weight);
        config.prediction.window = env_or("APEX_ACCURACY_WINDOW", config.prediction.window);
        config.exit.min_hold_bars = env_or("APEX_MIN_HOLD_BARS", config.exit.min_hold_bars);
        config.exit.momentum_convergence =
            env_or("APEX_MOMENTUM_CONVERGENCE", config.exit.momentum_convergence);
        config.entry.stop_pct = env_or("APEX_STOP_PCT", config.entry.stop_pct);
        config.entry.target_pct = env_or("APEX_TARGET_PCT", config.entry.target_pct);
        config.cache_ttl_secs = env_or("APEX_CACHE_TTL_SECS", config.cache_ttl_secs);

        config
    }

    /// Apply a named preset on top of the current values.
    pub fn apply_profile(&mut self, profile: RiskProfile) {
        let (min_score, stop_pct, target_pct) = profile.parameters();
        self.fusion.min_score = min_score;
        self.entry.stop_pct = stop_pct;
        self.entry.target_pct = target_pct;
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let fusion = &self.fusion;
        if !(MIN_BUY_SCORE..=100.0).contains(&fusion.min_score) {
            return Err(EngineError::InvalidConfig(format!(
                "min_score must be in [60, 100], got {}",
                fusion.min_score
            )));
        }
        for weights in [fusion.layer_weights, fusion.layer_weights_with_prediction] {
            if weights.iter().any(|w| *w < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
                return Err(EngineError::InvalidConfig(
                    "layer weights must be non-negative with a positive sum".to_string(),
                ));
            }
        }

        let p = &self.prediction;
        if !(0.0 <= p.min_weight && p.min_weight <= p.base_weight && p.base_weight <= p.max_weight && p.max_weight <= 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "prediction weights must satisfy 0 <= min ({}) <= base ({}) <= max ({}) <= 1",
                p.min_weight, p.base_weight, p.max_weight
            )));
        }
        if p.window == 0 || p.reweight_every == 0 {
            return Err(EngineError::InvalidConfig(
                "accuracy window and reweight interval must be positive".to_string(),
            ));
        }

        let e = &self.exit;
        if !(e.emergency_score < e.critical_score && e.critical_score < e.stagnant_score) {
            return Err(EngineError::InvalidConfig(
                "exit thresholds must satisfy emergency < critical < stagnant".to_string(),
            ));
        }
        let tiers = e.take_profit_tiers;
        if !(0.0 < tiers[0] && tiers[0] < tiers[1] && tiers[1] < tiers[2]) {
            return Err(EngineError::InvalidConfig(
                "take-profit tiers must be positive and ascending".to_string(),
            ));
        }

        if self.entry.stop_pct <= 0.0 || self.entry.target_pct <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "stop and target percentages must be positive".to_string(),
            ));
        }
        if self.volume.bucket_edges < 2 || self.levels.pivot_window == 0 {
            return Err(EngineError::InvalidConfig(
                "profile needs at least two edges and pivots a non-zero window".to_string(),
            ));
        }

        Ok(())
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::signals::Regime;

/// Take-profit tier of the target ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    First,
    Second,
    Third,
}

impl Target {
    pub const ALL: [Target; 3] = [Target::First, Target::Second, Target::Third];

    pub fn label(&self) -> &'static str {
        match self {
            Target::First => "TP1",
            Target::Second => "TP2",
            Target::Third => "TP3",
        }
    }
}

/// An open long position, owned by the position manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub entry_price: f64,
    /// Unix timestamp (milliseconds).
    pub entry_time: i64,
    pub entry_score: f64,
    #[serde(default)]
    pub entry_regime: Option<Regime>,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    #[serde(default)]
    pub targets_hit: Vec<Target>,
}

impl Position {
    /// Open a position with a fresh id.
    pub fn open(
        entry_price: f64,
        entry_time: i64,
        entry_score: f64,
        quantity: f64,
        stop_loss: f64,
        take_profit: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entry_price,
            entry_time,
            entry_score,
            entry_regime: None,
            quantity,
            stop_loss,
            take_profit,
            targets_hit: Vec::new(),
        }
    }

    pub fn with_regime(mut self, regime: Regime) -> Self {
        self.entry_regime = Some(regime);
        self
    }

    /// Percentage gain at `price` relative to entry.
    pub fn pnl_pct(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price * 100.0
    }

    pub fn has_hit(&self, target: Target) -> bool {
        self.targets_hit.contains(&target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    /// Bucket for an accumulated urgency score.
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 60 => Urgency::Critical,
            s if s >= 40 => Urgency::High,
            s if s >= 20 => Urgency::Medium,
            _ => Urgency::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExitType {
    #[default]
    None,
    Partial,
    Full,
}

/// Outcome of one exit evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitRecommendation {
    pub should_exit: bool,
    /// Share of the position to close, in [0, 1].
    pub exit_fraction: f64,
    pub exit_type: ExitType,
    pub urgency: Urgency,
    pub urgency_score: u32,
    pub reasons: Vec<String>,
}

impl ExitRecommendation {
    /// No exit, with an explanatory reason.
    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            reasons: vec![reason.into()],
            ..Default::default()
        }
    }
}

/// Stop/target proposal for a new entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryPlan {
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub stop_pct: f64,
    pub target_pct: f64,
    pub risk_reward: f64,
    /// False when the risk/reward falls below the configured minimum.
    pub accepted: bool,
}

/// Next step on the target ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetAction {
    pub target: Target,
    /// Share of the current remaining quantity to close.
    pub close_fraction: f64,
    /// New stop level the position manager should apply, if any.
    pub new_stop: Option<f64>,
    /// Trailing distance (percent) to apply from here on, if any.
    pub trailing_pct: Option<f64>,
    pub reason: String,
}

use serde::{Deserialize, Serialize};

/// Directional bias of a pattern or sub-signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Bullish,
    Bearish,
    Neutral,
}

impl Polarity {
    /// Sign of the polarity (+1, -1 or 0).
    pub fn sign(&self) -> f64 {
        match self {
            Polarity::Bullish => 1.0,
            Polarity::Bearish => -1.0,
            Polarity::Neutral => 0.0,
        }
    }

    pub fn from_value(value: f64) -> Self {
        if value > 0.0 {
            Polarity::Bullish
        } else if value < 0.0 {
            Polarity::Bearish
        } else {
            Polarity::Neutral
        }
    }
}

/// Discrete action suggested by a sub-signal or by the final decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
    #[default]
    Hold,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }

    /// Action implied by the sign of a signed score.
    pub fn from_score(score: f64) -> Self {
        if score > 0.0 {
            Action::Buy
        } else if score < 0.0 {
            Action::Sell
        } else {
            Action::Hold
        }
    }
}

/// Named candlestick geometries recognised by the pattern detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Hammer,
    InvertedHammer,
    BullishEngulfing,
    PiercingLine,
    MorningStar,
    ThreeWhiteSoldiers,
    BullishHarami,
    DragonflyDoji,
    ShootingStar,
    HangingMan,
    BearishEngulfing,
    DarkCloudCover,
    EveningStar,
    ThreeBlackCrows,
    BearishHarami,
    GravestoneDoji,
    Doji,
    SpinningTop,
}

impl PatternKind {
    pub const ALL: [PatternKind; 18] = [
        PatternKind::Hammer,
        PatternKind::InvertedHammer,
        PatternKind::BullishEngulfing,
        PatternKind::PiercingLine,
        PatternKind::MorningStar,
        PatternKind::ThreeWhiteSoldiers,
        PatternKind::BullishHarami,
        PatternKind::DragonflyDoji,
        PatternKind::ShootingStar,
        PatternKind::HangingMan,
        PatternKind::BearishEngulfing,
        PatternKind::DarkCloudCover,
        PatternKind::EveningStar,
        PatternKind::ThreeBlackCrows,
        PatternKind::BearishHarami,
        PatternKind::GravestoneDoji,
        PatternKind::Doji,
        PatternKind::SpinningTop,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PatternKind::Hammer => "hammer",
            PatternKind::InvertedHammer => "inverted_hammer",
            PatternKind::BullishEngulfing => "bullish_engulfing",
            PatternKind::PiercingLine => "piercing_line",
            PatternKind::MorningStar => "morning_star",
            PatternKind::ThreeWhiteSoldiers => "three_white_soldiers",
            PatternKind::BullishHarami => "bullish_harami",
            PatternKind::DragonflyDoji => "dragonfly_doji",
            PatternKind::ShootingStar => "shooting_star",
            PatternKind::HangingMan => "hanging_man",
            PatternKind::BearishEngulfing => "bearish_engulfing",
            PatternKind::DarkCloudCover => "dark_cloud_cover",
            PatternKind::EveningStar => "evening_star",
            PatternKind::ThreeBlackCrows => "three_black_crows",
            PatternKind::BearishHarami => "bearish_harami",
            PatternKind::GravestoneDoji => "gravestone_doji",
            PatternKind::Doji => "doji",
            PatternKind::SpinningTop => "spinning_top",
        }
    }

    pub fn polarity(&self) -> Polarity {
        match self {
            PatternKind::Hammer
            | PatternKind::InvertedHammer
            | PatternKind::BullishEngulfing
            | PatternKind::PiercingLine
            | PatternKind::MorningStar
            | PatternKind::ThreeWhiteSoldiers
            | PatternKind::BullishHarami
            | PatternKind::DragonflyDoji => Polarity::Bullish,
            PatternKind::ShootingStar
            | PatternKind::HangingMan
            | PatternKind::BearishEngulfing
            | PatternKind::DarkCloudCover
            | PatternKind::EveningStar
            | PatternKind::ThreeBlackCrows
            | PatternKind::BearishHarami
            | PatternKind::GravestoneDoji => Polarity::Bearish,
            PatternKind::Doji | PatternKind::SpinningTop => Polarity::Neutral,
        }
    }

    /// Historical reliability on a 0-100 scale.
    pub fn reliability(&self) -> u8 {
        match self {
            PatternKind::MorningStar | PatternKind::EveningStar => 90,
            PatternKind::BullishEngulfing
            | PatternKind::BearishEngulfing
            | PatternKind::ThreeWhiteSoldiers
            | PatternKind::ThreeBlackCrows => 85,
            PatternKind::Hammer | PatternKind::ShootingStar => 80,
            PatternKind::InvertedHammer
            | PatternKind::PiercingLine
            | PatternKind::HangingMan
            | PatternKind::DarkCloudCover => 75,
            PatternKind::BullishHarami | PatternKind::BearishHarami => 70,
            PatternKind::DragonflyDoji | PatternKind::GravestoneDoji => 65,
            PatternKind::Doji => 60,
            PatternKind::SpinningTop => 50,
        }
    }

    /// Number of bars the geometry spans.
    pub fn span(&self) -> usize {
        match self {
            PatternKind::BullishEngulfing
            | PatternKind::BearishEngulfing
            | PatternKind::PiercingLine
            | PatternKind::DarkCloudCover
            | PatternKind::BullishHarami
            | PatternKind::BearishHarami => 2,
            PatternKind::MorningStar
            | PatternKind::EveningStar
            | PatternKind::ThreeWhiteSoldiers
            | PatternKind::ThreeBlackCrows => 3,
            _ => 1,
        }
    }
}

/// A detected candlestick pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub kind: PatternKind,
    pub polarity: Polarity,
    pub reliability: u8,
    /// Index of the bar the pattern completes on.
    pub bar_index: usize,
}

impl PatternMatch {
    pub fn new(kind: PatternKind, bar_index: usize) -> Self {
        Self {
            kind,
            polarity: kind.polarity(),
            reliability: kind.reliability(),
            bar_index,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// Aggregated buy/sell weight of a set of pattern matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternScore {
    pub buy_score: f64,
    pub sell_score: f64,
}

impl PatternScore {
    /// Signed differential: buy - sell when buy dominates, otherwise -sell.
    pub fn differential(&self) -> f64 {
        if self.buy_score > self.sell_score {
            self.buy_score - self.sell_score
        } else {
            -self.sell_score
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    Support,
    Resistance,
}

/// A support or resistance price level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub kind: LevelKind,
    /// Bars in the window whose range contains the price.
    pub touch_count: u32,
    /// 0-100, proportional to touches.
    pub strength: f64,
}

/// Output of a level scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelSet {
    /// Ascending by price.
    pub supports: Vec<Level>,
    /// Ascending by price.
    pub resistances: Vec<Level>,
    /// Strongest levels with enough touches, descending by strength.
    pub key_levels: Vec<Level>,
}

impl LevelSet {
    pub fn is_empty(&self) -> bool {
        self.supports.is_empty() && self.resistances.is_empty()
    }

    /// Highest support at or below `price`.
    pub fn nearest_support(&self, price: f64) -> Option<&Level> {
        self.supports
            .iter()
            .filter(|l| l.price <= price)
            .max_by(|a, b| a.price.total_cmp(&b.price))
    }

    /// Lowest resistance at or above `price`.
    pub fn nearest_resistance(&self, price: f64) -> Option<&Level> {
        self.resistances
            .iter()
            .filter(|l| l.price >= price)
            .min_by(|a, b| a.price.total_cmp(&b.price))
    }
}

/// Trading signal derived from support/resistance proximity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelSignal {
    pub action: Action,
    /// Signed score: positive = bullish.
    pub score: f64,
    pub reasons: Vec<String>,
    pub nearest_support: Option<f64>,
    pub nearest_resistance: Option<f64>,
}

/// A volume-by-price bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeBucket {
    pub low: f64,
    pub high: f64,
    pub volume: f64,
}

impl VolumeBucket {
    pub fn mid(&self) -> f64 {
        (self.low + self.high) / 2.0
    }
}

/// Volume distribution across price.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeProfile {
    pub buckets: Vec<VolumeBucket>,
    pub point_of_control: f64,
    pub value_area_low: f64,
    pub value_area_high: f64,
    /// VWAP over the whole window (None when total volume is zero).
    pub vwap: Option<f64>,
}

impl VolumeProfile {
    pub fn total_volume(&self) -> f64 {
        self.buckets.iter().map(|b| b.volume).sum()
    }

    pub fn in_value_area(&self, price: f64) -> bool {
        self.value_area_low <= price && price <= self.value_area_high
    }
}

/// One signed volume sub-signal (VWAP or profile).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeSignal {
    pub action: Action,
    pub score: f64,
    pub reasons: Vec<String>,
}

/// Combined VWAP + profile analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeAnalysis {
    pub action: Action,
    /// Signed, clamped to +/-50.
    pub score: f64,
    pub vwap: Option<f64>,
    pub profile: Option<VolumeProfile>,
    pub vwap_signal: VolumeSignal,
    pub profile_signal: VolumeSignal,
}

/// A bounded layer score and its reasons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerScore {
    pub value: f64,
    pub reasons: Vec<String>,
}

impl LayerScore {
    /// Build a score clamped to +/-`bound`.
    pub fn clamped(value: f64, bound: f64, reasons: Vec<String>) -> Self {
        let value = if value.is_finite() {
            value.clamp(-bound, bound)
        } else {
            0.0
        };
        Self { value, reasons }
    }

    /// Score scaled to +/-100 by its bound.
    pub fn normalized(&self, bound: f64) -> f64 {
        if bound <= 0.0 {
            return 0.0;
        }
        (self.value / bound * 100.0).clamp(-100.0, 100.0)
    }
}

/// Market regime over the macro lookback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    TrendingUp,
    TrendingDown,
    Ranging,
    Volatile,
    #[default]
    Neutral,
}

impl Regime {
    pub fn name(&self) -> &'static str {
        match self {
            Regime::TrendingUp => "trending_up",
            Regime::TrendingDown => "trending_down",
            Regime::Ranging => "ranging",
            Regime::Volatile => "volatile",
            Regime::Neutral => "neutral",
        }
    }

    /// Contribution of the regime to the macro layer.
    pub fn score_delta(&self) -> f64 {
        match self {
            Regime::TrendingUp => 30.0,
            Regime::TrendingDown => -20.0,
            Regime::Ranging => 10.0,
            Regime::Volatile => -15.0,
            Regime::Neutral => 0.0,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trending_up" | "up" => Some(Self::TrendingUp),
            "trending_down" | "down" => Some(Self::TrendingDown),
            "ranging" | "range" => Some(Self::Ranging),
            "volatile" => Some(Self::Volatile),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }
}

/// Current volatility relative to its recent mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityLevel {
    VeryHigh,
    High,
    #[default]
    Normal,
    Low,
    VeryLow,
}

impl VolatilityLevel {
    /// Level for a current/mean ATR ratio.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > 1.5 {
            VolatilityLevel::VeryHigh
        } else if ratio > 1.2 {
            VolatilityLevel::High
        } else if ratio < 0.7 {
            VolatilityLevel::VeryLow
        } else if ratio < 0.9 {
            VolatilityLevel::Low
        } else {
            VolatilityLevel::Normal
        }
    }

    /// Additive score adjustment for this level.
    pub fn adjustment(&self) -> f64 {
        match self {
            VolatilityLevel::VeryHigh => 5.0,
            VolatilityLevel::High => 3.0,
            VolatilityLevel::Normal => 0.0,
            VolatilityLevel::Low => -5.0,
            VolatilityLevel::VeryLow => -10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VolatilityAnalysis {
    pub level: VolatilityLevel,
    /// Current ATR over mean ATR (1.0 when unavailable).
    pub ratio: f64,
    pub adjustment: f64,
}

impl VolatilityAnalysis {
    pub fn from_ratio(ratio: f64) -> Self {
        let level = VolatilityLevel::from_ratio(ratio);
        Self {
            level,
            ratio,
            adjustment: level.adjustment(),
        }
    }
}

/// Trend strength from EMA ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    /// -100 (fully bearish stack) to +100 (fully bullish stack).
    pub strength: f64,
    pub direction: Option<Polarity>,
    /// How many of the three EMA pairs are in bullish order.
    pub bullish_pairs: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MomentumStrength {
    VeryStrong,
    Strong,
    Moderate,
    #[default]
    Weak,
}

impl MomentumStrength {
    pub fn from_score(score: f64) -> Self {
        let magnitude = score.abs();
        if magnitude > 70.0 {
            MomentumStrength::VeryStrong
        } else if magnitude > 50.0 {
            MomentumStrength::Strong
        } else if magnitude > 30.0 {
            MomentumStrength::Moderate
        } else {
            MomentumStrength::Weak
        }
    }
}

/// Composite momentum read from RSI, MACD, stochastic and SuperTrend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MomentumScore {
    pub score: f64,
    pub strength: MomentumStrength,
    pub direction: Option<Polarity>,
    pub reasons: Vec<String>,
}

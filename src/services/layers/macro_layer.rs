//! Macro layer: regime, EMA trend strength and volatility.

use tracing::debug;

use crate::config::RegimeConfig;
use crate::services::layers::{LayerContext, LayerScorer, MACRO_BOUND};
use crate::types::{
    IndicatorSnapshot, LayerScore, MacroAnalysis, MarketWindow, Polarity, Regime, TrendAnalysis,
    VolatilityAnalysis,
};

#[derive(Debug, Clone, Default)]
pub struct MacroLayer {
    config: RegimeConfig,
}

impl MacroLayer {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    /// Classify the trailing `lookback` bars.
    ///
    /// Volatile when latest ATR exceeds `volatile_atr_pct` of the mean
    /// close; otherwise trending when the net change exceeds
    /// `trend_change_pct`, ranging under `ranging_change_pct`, neutral
    /// in between. Shorter windows are neutral.
    pub fn regime(&self, window: &MarketWindow) -> Regime {
        let lookback = self.config.lookback;
        if lookback < 2 || window.len() < lookback {
            return Regime::Neutral;
        }
        let bars = &window.bars()[window.len() - lookback..];
        let first = bars[0].close;
        let last = bars[bars.len() - 1].close;
        if first <= 0.0 || !first.is_finite() || !last.is_finite() {
            return Regime::Neutral;
        }
        let change_pct = (last - first) / first * 100.0;
        let avg_close = bars.iter().map(|b| b.close).sum::<f64>() / bars.len() as f64;
        let atr_pct = window
            .last_indicators()
            .and_then(IndicatorSnapshot::atr)
            .filter(|_| avg_close > 0.0)
            .map(|atr| atr / avg_close * 100.0)
            .unwrap_or(0.0);

        if atr_pct > self.config.volatile_atr_pct {
            Regime::Volatile
        } else if change_pct.abs() > self.config.trend_change_pct {
            if change_pct > 0.0 {
                Regime::TrendingUp
            } else {
                Regime::TrendingDown
            }
        } else if change_pct.abs() < self.config.ranging_change_pct {
            Regime::Ranging
        } else {
            Regime::Neutral
        }
    }

    /// Trend strength from how many EMA pairs are in bullish order.
    pub fn trend(indicators: &IndicatorSnapshot) -> TrendAnalysis {
        let Some([fast, medium, slow, trend]) = indicators.ema_stack() else {
            return TrendAnalysis::default();
        };
        let bullish_pairs = [fast > medium, medium > slow, slow > trend]
            .iter()
            .filter(|ordered| **ordered)
            .count() as u8;
        let (strength, direction) = match bullish_pairs {
            3 => (100.0, Polarity::Bullish),
            0 => (-100.0, Polarity::Bearish),
            n => ((n as f64 - 1.5) * 50.0, Polarity::Neutral),
        };
        TrendAnalysis {
            strength,
            direction: Some(direction),
            bullish_pairs,
        }
    }

    /// Latest ATR relative to its mean over `atr_mean_period` bars.
    pub fn volatility(&self, window: &MarketWindow) -> VolatilityAnalysis {
        let period = self.config.atr_mean_period.max(1);
        let rows = window.indicators();
        let recent = &rows[rows.len().saturating_sub(period)..];
        let current = recent.last().and_then(IndicatorSnapshot::atr);
        let values: Vec<f64> = recent.iter().filter_map(IndicatorSnapshot::atr).collect();

        let ratio = match current {
            Some(current) if !values.is_empty() => {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                if mean > 0.0 {
                    current / mean
                } else {
                    1.0
                }
            }
            _ => 1.0,
        };
        VolatilityAnalysis::from_ratio(ratio)
    }
}

impl LayerScorer for MacroLayer {
    type Analysis = MacroAnalysis;

    fn bound(&self) -> f64 {
        MACRO_BOUND
    }

    fn score(&self, ctx: &LayerContext<'_>) -> MacroAnalysis {
        let regime = self.regime(ctx.window);
        let trend = Self::trend(ctx.indicators);
        let volatility = self.volatility(ctx.window);
        debug!(regime = regime.name(), trend = trend.strength, "Regime classified");

        let mut reasons = Vec::new();
        match regime {
            Regime::TrendingUp => reasons.push("Confirmed uptrend".to_string()),
            Regime::TrendingDown => reasons.push("Confirmed downtrend".to_string()),
            Regime::Ranging => reasons.push("Ranging market".to_string()),
            Regime::Volatile => reasons.push("Highly volatile market".to_string()),
            Regime::Neutral => {}
        }
        if volatility.adjustment != 0.0 {
            reasons.push(format!("Volatility {:.2}x of mean", volatility.ratio));
        }

        let raw = regime.score_delta()
            + trend.strength * self.config.trend_weight
            + volatility.adjustment;

        MacroAnalysis {
            score: LayerScore::clamped(raw, MACRO_BOUND, reasons),
            regime,
            trend,
            volatility,
        }
    }
}

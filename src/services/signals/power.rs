//! Power signals: an independent rule pass that boosts the fused score
//! when several strong conditions line up.

use tracing::debug;

use crate::config::PowerConfig;
use crate::types::{
    Bar, IndicatorSnapshot, PatternMatch, Polarity, PowerSignal, PowerSignalKind, PowerSignalSet,
};

/// Inputs the power rules read for the latest bar.
#[derive(Debug, Clone, Copy)]
pub struct PowerInputs<'a> {
    pub bar: &'a Bar,
    pub prev_close: f64,
    pub indicators: &'a IndicatorSnapshot,
    pub patterns: &'a [PatternMatch],
    pub volume_ratio: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PowerSignals {
    config: PowerConfig,
}

impl PowerSignals {
    pub fn new(config: PowerConfig) -> Self {
        Self { config }
    }

    /// Evaluate every rule. Rules whose indicator is missing do not match.
    pub fn evaluate(&self, inputs: &PowerInputs<'_>) -> PowerSignalSet {
        let mut matches = Vec::new();
        let ind = inputs.indicators;
        let price = inputs.bar.close;

        if let Some(rsi) = ind.rsi() {
            if rsi < 25.0 {
                matches.push(signal(
                    PowerSignalKind::RsiExtremeOversold,
                    25.0,
                    format!("RSI extreme oversold ({:.1})", rsi),
                ));
            } else if rsi > 75.0 {
                matches.push(signal(
                    PowerSignalKind::RsiExtremeOverbought,
                    -15.0,
                    format!("RSI extreme overbought ({:.1})", rsi),
                ));
            }
        }

        if inputs.volume_ratio > 2.0 {
            matches.push(signal(
                PowerSignalKind::VolumeExplosion,
                15.0,
                format!("Volume spike ({:.1}x)", inputs.volume_ratio),
            ));
        }

        let strong_bullish = inputs
            .patterns
            .iter()
            .filter(|p| p.polarity == Polarity::Bullish && p.reliability >= 70)
            .count();
        if strong_bullish >= 2 {
            matches.push(signal(
                PowerSignalKind::MultiplePatterns,
                20.0,
                format!("{} strong bullish patterns", strong_bullish),
            ));
        }

        let converging = [
            ind.rsi().is_some_and(|rsi| rsi < 35.0),
            ind.macd_pair().is_some_and(|(macd, sig)| macd > sig),
            ind.stoch_k().is_some_and(|k| k < 30.0),
        ]
        .iter()
        .filter(|hit| **hit)
        .count();
        if converging >= 2 {
            matches.push(signal(
                PowerSignalKind::IndicatorConvergence,
                18.0,
                format!("Momentum convergence ({}/3)", converging),
            ));
        }

        if ind.supertrend_direction() > 0 && price > inputs.prev_close {
            matches.push(signal(
                PowerSignalKind::SupertrendMomentum,
                12.0,
                "SuperTrend buy with rising price".to_string(),
            ));
        }

        if let Some(position) = ind.bollinger_position(price) {
            if position < 0.1 {
                matches.push(signal(
                    PowerSignalKind::BollingerSqueeze,
                    15.0,
                    "Price at lower Bollinger band".to_string(),
                ));
            }
        }

        let raw: f64 = matches.iter().map(|m| m.boost).sum();
        let total_boost = raw.clamp(0.0, self.config.max_boost);
        let active = matches.len() >= self.config.min_matches;
        if active {
            debug!(
                count = matches.len(),
                total_boost,
                "Power signals active"
            );
        }

        PowerSignalSet {
            matches,
            total_boost,
            active,
        }
    }
}

fn signal(kind: PowerSignalKind, boost: f64, description: String) -> PowerSignal {
    PowerSignal {
        kind,
        boost,
        description,
    }
}

//! Micro layer: candlestick patterns, momentum and volume spikes.

use crate::services::layers::{LayerContext, LayerScorer, MICRO_BOUND};
use crate::services::signals::PatternDetector;
use crate::types::{
    IndicatorSnapshot, LayerScore, MicroAnalysis, MomentumScore, MomentumStrength, Polarity,
};

/// Volume ratio above which the micro layer counts a spike.
const VOLUME_SPIKE_RATIO: f64 = 1.5;

#[derive(Debug, Clone, Copy, Default)]
pub struct MicroLayer;

impl MicroLayer {
    pub fn new() -> Self {
        Self
    }

    /// Momentum composite from RSI, MACD crossover, stochastic and SuperTrend.
    ///
    /// Missing values contribute nothing; a MACD cross needs both rows.
    pub fn momentum(last: &IndicatorSnapshot, prev: Option<&IndicatorSnapshot>) -> MomentumScore {
        let mut score = 0.0;
        let mut reasons = Vec::new();

        let rsi = last.rsi_or_neutral();
        if rsi < 25.0 {
            score += 30.0;
            reasons.push(format!("RSI oversold ({:.1})", rsi));
        } else if rsi > 75.0 {
            score -= 30.0;
            reasons.push(format!("RSI overbought ({:.1})", rsi));
        }

        if let (Some((macd, signal)), Some((prev_macd, prev_signal))) =
            (last.macd_pair(), prev.and_then(IndicatorSnapshot::macd_pair))
        {
            if prev_macd <= prev_signal && macd > signal {
                score += 25.0;
                reasons.push("MACD bullish cross".to_string());
            } else if prev_macd >= prev_signal && macd < signal {
                score -= 25.0;
                reasons.push("MACD bearish cross".to_string());
            }
        }

        let stoch = last.stoch_k_or_neutral();
        if stoch < 20.0 {
            score += 15.0;
            reasons.push("Stochastic oversold".to_string());
        } else if stoch > 80.0 {
            score -= 15.0;
            reasons.push("Stochastic overbought".to_string());
        }

        match last.supertrend_direction() {
            1 => {
                score += 20.0;
                reasons.push("SuperTrend bullish".to_string());
            }
            -1 => {
                score -= 20.0;
                reasons.push("SuperTrend bearish".to_string());
            }
            _ => {}
        }

        MomentumScore {
            score,
            strength: MomentumStrength::from_score(score),
            direction: Some(Polarity::from_value(score)),
            reasons,
        }
    }
}

impl LayerScorer for MicroLayer {
    type Analysis = MicroAnalysis;

    fn bound(&self) -> f64 {
        MICRO_BOUND
    }

    fn score(&self, ctx: &LayerContext<'_>) -> MicroAnalysis {
        let pattern_score = PatternDetector::combined_score(ctx.patterns);
        let momentum = Self::momentum(ctx.indicators, ctx.prev_indicators);
        let volume_ratio = ctx.volume_ratio();

        let mut reasons = Vec::new();
        let differential = pattern_score.differential();
        if differential != 0.0 {
            let polarity = Polarity::from_value(differential);
            let count = ctx.patterns.iter().filter(|p| p.polarity == polarity).count();
            let side = if differential > 0.0 { "bullish" } else { "bearish" };
            reasons.push(format!("{} {} patterns", count, side));
        }
        reasons.extend(momentum.reasons.iter().take(2).cloned());

        let mut raw = differential * 0.3 + momentum.score * 0.3;
        if volume_ratio > VOLUME_SPIKE_RATIO {
            raw += 20.0;
            reasons.push(format!("Volume spike ({:.1}x)", volume_ratio));
        }

        MicroAnalysis {
            score: LayerScore::clamped(raw, MICRO_BOUND, reasons),
            patterns: ctx.patterns.to_vec(),
            pattern_score,
            momentum,
            volume_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bar, LevelSet, MarketWindow, PatternKind, PatternMatch};

    fn window_with(volume: f64, snapshot: IndicatorSnapshot) -> MarketWindow {
        let bars = vec![
            Bar::new(0, 100.0, 100.6, 99.8, 100.5, 1000.0),
            Bar::new(1, 100.5, 101.2, 100.3, 101.0, volume),
        ];
        MarketWindow::new(bars, vec![snapshot.clone(), snapshot]).expect("aligned")
    }

    #[test]
    fn test_momentum_components() {
        let prev = IndicatorSnapshot {
            macd: Some(-0.1),
            macd_signal: Some(0.0),
            ..Default::default()
        };
        let last = IndicatorSnapshot {
            rsi: Some(20.0),
            macd: Some(0.2),
            macd_signal: Some(0.0),
            stoch_k: Some(10.0),
            supertrend: Some(1.0),
            ..Default::default()
        };
        let momentum = MicroLayer::momentum(&last, Some(&prev));
        assert_eq!(momentum.score, 90.0);
        assert_eq!(momentum.strength, MomentumStrength::VeryStrong);
        assert_eq!(momentum.direction, Some(Polarity::Bullish));
    }

    #[test]
    fn test_momentum_neutral_without_indicators() {
        let momentum = MicroLayer::momentum(&IndicatorSnapshot::default(), None);
        assert_eq!(momentum.score, 0.0);
        assert_eq!(momentum.strength, MomentumStrength::Weak);
    }

    #[test]
    fn test_volume_spike_adds_twenty() {
        let snapshot = IndicatorSnapshot {
            volume_sma: Some(1000.0),
            ..Default::default()
        };
        let levels = LevelSet::default();

        let calm = window_with(1000.0, snapshot.clone());
        let ctx = LayerContext::new(&calm, &[], &levels, None).expect("context");
        let calm_score = MicroLayer.score(&ctx).score.value;

        let spike = window_with(2000.0, snapshot);
        let ctx = LayerContext::new(&spike, &[], &levels, None).expect("context");
        let spike_score = MicroLayer.score(&ctx).score.value;

        assert_eq!(spike_score - calm_score, 20.0);
    }

    #[test]
    fn test_bearish_patterns_push_negative() {
        let window = window_with(1000.0, IndicatorSnapshot::default());
        let levels = LevelSet::default();
        let patterns = [PatternMatch::new(PatternKind::EveningStar, 1)];
        let ctx = LayerContext::new(&window, &patterns, &levels, None).expect("context");
        let analysis = MicroLayer.score(&ctx);
        assert_eq!(analysis.score.value, -13.5);
    }
}

//! Early-exit evaluation for an open long position.

use tracing::{debug, info};

use crate::config::ExitConfig;
use crate::services::signals::{Detector, PatternDetector};
use crate::types::{
    ExitRecommendation, ExitType, MarketWindow, Polarity, Position, Regime, Target, Urgency,
};

/// Reliability from which a bearish pattern counts as deterioration.
const STRONG_PATTERN_RELIABILITY: u8 = 70;
const MAX_URGENCY: u32 = 100;

/// Accumulates reasons, urgency points and the largest exit fraction.
#[derive(Debug, Default)]
struct ExitBuilder {
    fraction: f64,
    urgency: u32,
    reasons: Vec<String>,
}

impl ExitBuilder {
    fn raise(&mut self, fraction: f64, urgency: u32, reason: String) {
        self.fraction = f64::max(self.fraction, fraction);
        self.urgency = (self.urgency + urgency).min(MAX_URGENCY);
        self.reasons.push(reason);
    }

    fn note(&mut self, urgency: u32, reason: String) {
        self.raise(0.0, urgency, reason);
    }

    fn finish(self) -> ExitRecommendation {
        let fraction = self.fraction.clamp(0.0, 1.0);
        let exit_type = if fraction >= 0.9 {
            ExitType::Full
        } else if fraction > 0.0 {
            ExitType::Partial
        } else {
            ExitType::None
        };
        ExitRecommendation {
            should_exit: !self.reasons.is_empty() && fraction > 0.0,
            exit_fraction: fraction,
            exit_type,
            urgency: Urgency::from_score(self.urgency),
            urgency_score: self.urgency,
            reasons: self.reasons,
        }
    }
}

/// Decides whether an open position should be reduced or closed.
///
/// Stateless: every call reads the window, the position and a freshly
/// fused score. Checks run in a fixed order (grace, deterioration,
/// momentum, score drop, take-profit, stop) and the exit fraction is
/// only ever raised.
#[derive(Debug, Clone, Default)]
pub struct ExitEvaluator {
    config: ExitConfig,
    patterns: PatternDetector,
}

impl ExitEvaluator {
    pub fn new(config: ExitConfig) -> Self {
        Self {
            config,
            patterns: PatternDetector::new(),
        }
    }

    pub fn evaluate(
        &self,
        window: &MarketWindow,
        position: &Position,
        current_score: f64,
        regime: Option<Regime>,
    ) -> ExitRecommendation {
        let Some(bar) = window.last_bar() else {
            return ExitRecommendation::hold("No market data");
        };
        let c = &self.config;
        let price = bar.close;
        let pnl = position.pnl_pct(price);
        let profitable = pnl > 0.0;
        let score = if current_score.is_finite() { current_score } else { 50.0 };

        let elapsed = window
            .bars()
            .iter()
            .filter(|b| b.timestamp > position.entry_time)
            .count();

        if elapsed < c.min_hold_bars {
            if score < c.emergency_score {
                let mut exit = ExitBuilder::default();
                exit.raise(
                    1.0,
                    MAX_URGENCY,
                    format!("Emergency: score {:.1} during grace period", score),
                );
                return self.finish(position, exit);
            }
            if score >= c.grace_min_score {
                debug!(position = %position.id, elapsed, "Grace period");
                return ExitRecommendation::hold(format!(
                    "Grace period ({}/{} bars, score {:.1})",
                    elapsed, c.min_hold_bars, score
                ));
            }
        }

        let mut exit = ExitBuilder::default();

        // Deterioration
        let mut deterioration = Vec::new();
        let streak = self.stoch_streak(window);
        if streak >= c.stoch_streak {
            deterioration.push(format!("Stochastic above {:.0} for {} bars", c.stoch_overbought, streak));
        }
        if score < c.critical_score {
            let fraction = if profitable { 0.7 } else { 1.0 };
            exit.raise(fraction, 45, format!("Score critical ({:.1})", score));
            deterioration.push("critical score".to_string());
        } else if score < c.stagnant_score && profitable {
            exit.raise(0.3, 10, format!("Score stagnant ({:.1}) while in profit", score));
            deterioration.push("stagnant score".to_string());
        }
        let bearish = self
            .patterns
            .detect(window.bars())
            .into_iter()
            .filter(|p| p.polarity == Polarity::Bearish && p.reliability >= STRONG_PATTERN_RELIABILITY)
            .map(|p| p.name())
            .collect::<Vec<_>>();
        if !bearish.is_empty() {
            deterioration.push(format!("bearish pattern ({})", bearish.join(", ")));
        }
        if deterioration.len() >= 2 {
            let fraction = match (profitable, deterioration.len()) {
                (false, _) => 1.0,
                (true, n) if n >= 3 => 0.5,
                (true, _) => 0.3,
            };
            exit.raise(
                fraction,
                15,
                format!("{} deterioration signals: {}", deterioration.len(), deterioration.join("; ")),
            );
        } else if let Some(signal) = deterioration.first() {
            exit.note(10, format!("Deterioration: {}", signal));
        }

        // Momentum
        let indicators = window.last_indicators();
        let setup_valid = bar.is_green()
            || indicators
                .and_then(|i| i.rsi())
                .is_some_and(|rsi| rsi < 30.0);
        if !setup_valid {
            let mut flags = Vec::new();
            if let Some(ema) = indicators.and_then(|i| i.ema_fast()) {
                if price < ema {
                    flags.push("close below fast EMA");
                }
            }
            if let Some((macd, signal)) = indicators.and_then(|i| i.macd_pair()) {
                if macd < signal {
                    flags.push("MACD below signal");
                }
            }
            let triggered = if c.momentum_convergence {
                flags.len() >= 2 || (flags.len() == 1 && !deterioration.is_empty())
            } else {
                !flags.is_empty()
            };
            if triggered {
                let fraction = if profitable { 0.5 } else { 0.7 };
                exit.raise(fraction, 25, format!("Momentum lost: {}", flags.join(", ")));
            }
        }

        // Score drop since entry
        let drop = score - position.entry_score;
        if drop <= -c.score_drop_critical {
            exit.raise(1.0, 65, format!("Score collapsed {:.1} points since entry", drop));
        } else if drop <= -c.score_drop_high {
            let fraction = if profitable { 0.8 } else { 1.0 };
            exit.raise(fraction, 40, format!("Score dropped {:.1} points since entry", drop));
        }
        if position.entry_regime == Some(Regime::TrendingUp) {
            if let Some(current) = regime.filter(|r| *r != Regime::TrendingUp) {
                exit.raise(0.5, 20, format!("Regime changed to {}", current.name()));
            }
        }

        // Progressive take-profit
        let [first, second, third] = c.take_profit_tiers;
        if pnl >= third && !position.has_hit(Target::Third) {
            exit.raise(0.5, 20, format!("Take profit {} (+{:.2}%)", Target::Third.label(), pnl));
        } else if pnl >= second && !position.has_hit(Target::Second) {
            exit.raise(0.3, 15, format!("Take profit {} (+{:.2}%)", Target::Second.label(), pnl));
        } else if pnl >= first && !position.has_hit(Target::First) && !deterioration.is_empty() {
            exit.raise(
                0.25,
                10,
                format!("Take profit {} with deterioration (+{:.2}%)", Target::First.label(), pnl),
            );
        }

        if position.stop_loss > 0.0 && price <= position.stop_loss {
            exit.raise(1.0, MAX_URGENCY, format!("Stop loss hit at {:.4}", position.stop_loss));
        }

        self.finish(position, exit)
    }

    /// Consecutive most-recent bars with %K above the overbought level.
    fn stoch_streak(&self, window: &MarketWindow) -> usize {
        window
            .indicators()
            .iter()
            .rev()
            .take_while(|i| i.stoch_k().is_some_and(|k| k > self.config.stoch_overbought))
            .count()
    }

    fn finish(&self, position: &Position, exit: ExitBuilder) -> ExitRecommendation {
        let recommendation = exit.finish();
        if recommendation.should_exit {
            info!(
                position = %position.id,
                fraction = recommendation.exit_fraction,
                urgency = ?recommendation.urgency,
                reasons = ?recommendation.reasons,
                "Exit recommended"
            );
        } else {
            debug!(position = %position.id, "No exit");
        }
        recommendation
    }
}

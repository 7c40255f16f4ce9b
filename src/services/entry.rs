//! Stop/target planning for new entries and the partial-exit target ladder.

use tracing::debug;

use crate::config::{EntryConfig, ExitConfig};
use crate::types::{EntryPlan, MarketWindow, Position, Target, TargetAction};

/// Share of the runner trailing distance relative to the second-target trail.
const RUNNER_TRAIL_FACTOR: f64 = 0.7;

/// Proposes stop and target levels sized to current volatility.
#[derive(Debug, Clone, Default)]
pub struct EntryPlanner {
    config: EntryConfig,
}

impl EntryPlanner {
    pub fn new(config: EntryConfig) -> Self {
        Self { config }
    }

    /// Stop distance is the larger of the configured minimum and
    /// `atr_multiplier` ATRs; the plan is accepted when target/stop
    /// reaches `min_risk_reward`.
    pub fn plan(&self, entry_price: f64, atr: Option<f64>) -> EntryPlan {
        let c = &self.config;
        let atr_pct = match atr {
            Some(atr) if atr.is_finite() && atr > 0.0 && entry_price > 0.0 => {
                atr / entry_price * 100.0 * c.atr_multiplier
            }
            _ => 0.0,
        };
        let stop_pct = f64::max(c.stop_pct, atr_pct);
        let target_pct = c.target_pct;
        let risk_reward = target_pct / stop_pct;
        let accepted = risk_reward >= c.min_risk_reward;

        debug!(entry_price, stop_pct, target_pct, risk_reward, accepted, "Entry planned");

        EntryPlan {
            entry_price,
            stop_loss: entry_price * (1.0 - stop_pct / 100.0),
            take_profit: entry_price * (1.0 + target_pct / 100.0),
            stop_pct,
            target_pct,
            risk_reward,
            accepted,
        }
    }

    /// Plan at the latest close using the latest ATR.
    pub fn plan_for(&self, window: &MarketWindow) -> Option<EntryPlan> {
        let bar = window.last_bar()?;
        let atr = window.last_indicators().and_then(|i| i.atr());
        Some(self.plan(bar.close, atr))
    }
}

/// Three-step take-profit ladder.
///
/// | Target | Gain | Action |
/// |--------|------|--------|
/// | TP1 | first tier | close 50%, stop to breakeven |
/// | TP2 | second tier | close 60% of the rest, trail |
/// | TP3 | third tier | keep the runner, tighter trail |
///
/// Read-only over `targets_hit`: the position manager applies the action
/// and records the target.
#[derive(Debug, Clone)]
pub struct TargetLadder {
    tiers: [f64; 3],
    trailing_pct: f64,
}

impl Default for TargetLadder {
    fn default() -> Self {
        Self::new(&ExitConfig::default(), &EntryConfig::default())
    }
}

impl TargetLadder {
    pub fn new(exit: &ExitConfig, entry: &EntryConfig) -> Self {
        Self {
            tiers: exit.take_profit_tiers,
            trailing_pct: entry.trailing_pct,
        }
    }

    /// The first target not yet hit, if `price` has reached it.
    pub fn next_action(&self, position: &Position, price: f64) -> Option<TargetAction> {
        let pnl = position.pnl_pct(price);
        let (target, tier) = Target::ALL
            .into_iter()
            .zip(self.tiers)
            .find(|(target, _)| !position.has_hit(*target))?;
        if pnl < tier {
            return None;
        }

        let action = match target {
            Target::First => TargetAction {
                target,
                close_fraction: 0.5,
                new_stop: Some(position.entry_price),
                trailing_pct: None,
                reason: format!("{} reached (+{:.2}%): close half, stop to breakeven", target.label(), pnl),
            },
            Target::Second => TargetAction {
                target,
                close_fraction: 0.6,
                new_stop: Some(trail_stop(position, price, self.trailing_pct)),
                trailing_pct: Some(self.trailing_pct),
                reason: format!("{} reached (+{:.2}%): close 60%, trail {:.2}%", target.label(), pnl, self.trailing_pct),
            },
            Target::Third => {
                let trail = self.trailing_pct * RUNNER_TRAIL_FACTOR;
                TargetAction {
                    target,
                    close_fraction: 0.0,
                    new_stop: Some(trail_stop(position, price, trail)),
                    trailing_pct: Some(trail),
                    reason: format!("{} reached (+{:.2}%): let the runner go, trail {:.2}%", target.label(), pnl, trail),
                }
            }
        };
        debug!(position = %position.id, target = target.label(), "Target reached");
        Some(action)
    }
}

/// Trailing stop below `price`, never under breakeven.
fn trail_stop(position: &Position, price: f64, trail_pct: f64) -> f64 {
    f64::max(position.entry_price, price * (1.0 - trail_pct / 100.0))
}

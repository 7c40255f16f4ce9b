//! Meso layer: volume distribution and support/resistance.

use crate::services::layers::{LayerContext, LayerScorer, MESO_BOUND};
use crate::services::signals::{LevelDetector, VolumeDistributionAnalyzer};
use crate::types::{LayerScore, MesoAnalysis, Regime};

#[derive(Debug, Clone, Default)]
pub struct MesoLayer {
    volume: VolumeDistributionAnalyzer,
    levels: LevelDetector,
}

impl MesoLayer {
    pub fn new(volume: VolumeDistributionAnalyzer, levels: LevelDetector) -> Self {
        Self { volume, levels }
    }
}

impl LayerScorer for MesoLayer {
    type Analysis = MesoAnalysis;

    fn bound(&self) -> f64 {
        MESO_BOUND
    }

    /// Half the volume score plus half the level score, then +15 for a
    /// clear path to the target distance or -10 when a level blocks it.
    ///
    /// In a confirmed uptrend with a clear path, a negative volume score
    /// (price stretched above VWAP or the value area) counts as zero.
    fn score(&self, ctx: &LayerContext<'_>) -> MesoAnalysis {
        let volume = self.volume.analyze_with_profile(
            ctx.window.bars(),
            ctx.profile.cloned(),
            ctx.price,
            ctx.prev_price,
        );
        let levels = self
            .levels
            .trading_signal(ctx.levels, ctx.price, ctx.prev_price);

        let mut reasons: Vec<String> = volume
            .vwap_signal
            .reasons
            .iter()
            .chain(volume.profile_signal.reasons.iter())
            .chain(levels.reasons.iter())
            .cloned()
            .collect();

        let target = ctx.price * (1.0 + self.levels.config().clear_path_pct / 100.0);
        let (path_clear, path_reason) = LevelDetector::has_clear_path(ctx.levels, ctx.price, target);
        let path_score = if path_clear { 15.0 } else { -10.0 };
        reasons.push(path_reason);

        let continuation = path_clear && ctx.regime == Some(Regime::TrendingUp);
        let volume_score = if continuation && volume.score < 0.0 {
            reasons.push("Extension above VWAP tolerated in uptrend".to_string());
            0.0
        } else {
            volume.score
        };

        let raw = volume_score * 0.5 + levels.score * 0.5 + path_score;

        MesoAnalysis {
            score: LayerScore::clamped(raw, MESO_BOUND, reasons),
            volume,
            levels,
            path_clear,
        }
    }
}

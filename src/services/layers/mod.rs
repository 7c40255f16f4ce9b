//! Macro, meso and micro layer scorers.
//!
//! Each layer reads the shared [`LayerContext`] and returns a bounded
//! score with its reasons. Detector output is computed once per cycle and
//! passed in through the context.

pub mod macro_layer;
pub mod meso;
pub mod micro;

pub use macro_layer::MacroLayer;
pub use meso::MesoLayer;
pub use micro::MicroLayer;

use crate::types::{
    Bar, IndicatorSnapshot, LevelSet, MarketWindow, PatternMatch, Regime, VolumeProfile,
};

pub const MACRO_BOUND: f64 = 30.0;
pub const MESO_BOUND: f64 = 40.0;
pub const MICRO_BOUND: f64 = 30.0;

/// Per-cycle inputs shared by the layers.
#[derive(Debug, Clone, Copy)]
pub struct LayerContext<'a> {
    pub window: &'a MarketWindow,
    pub bar: &'a Bar,
    pub indicators: &'a IndicatorSnapshot,
    pub prev_indicators: Option<&'a IndicatorSnapshot>,
    pub price: f64,
    pub prev_price: f64,
    pub patterns: &'a [PatternMatch],
    pub levels: &'a LevelSet,
    pub profile: Option<&'a VolumeProfile>,
    /// Regime from the macro layer, once it has run.
    pub regime: Option<Regime>,
}

impl<'a> LayerContext<'a> {
    /// Context for the latest bar of `window`; None when it has fewer than two bars.
    pub fn new(
        window: &'a MarketWindow,
        patterns: &'a [PatternMatch],
        levels: &'a LevelSet,
        profile: Option<&'a VolumeProfile>,
    ) -> Option<Self> {
        let bar = window.last_bar()?;
        let prev = window.prev_bar()?;
        Some(Self {
            window,
            bar,
            indicators: window.last_indicators()?,
            prev_indicators: window.prev_indicators(),
            price: bar.close,
            prev_price: prev.close,
            patterns,
            levels,
            profile,
            regime: None,
        })
    }

    pub fn with_regime(self, regime: Regime) -> Self {
        Self {
            regime: Some(regime),
            ..self
        }
    }

    /// Latest volume relative to its moving average (1.0 when unknown).
    pub fn volume_ratio(&self) -> f64 {
        self.indicators.volume_ratio(self.bar.volume)
    }
}

/// A bounded scoring layer.
pub trait LayerScorer {
    type Analysis;

    /// Absolute bound of the layer score.
    fn bound(&self) -> f64;

    fn score(&self, ctx: &LayerContext<'_>) -> Self::Analysis;
}

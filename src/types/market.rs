use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Minimum number of bars for a full analysis cycle.
pub const MIN_ANALYSIS_BARS: usize = 100;

/// One OHLCV sample for a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Unix timestamp (milliseconds) of the bar open.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Absolute body size.
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Signed body: positive for a green bar, negative for a red one.
    pub fn signed_body(&self) -> f64 {
        self.close - self.open
    }

    /// Total high-low range.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_shadow(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn is_green(&self) -> bool {
        self.close > self.open
    }

    pub fn is_red(&self) -> bool {
        self.close < self.open
    }

    /// Typical price: (H + L + C) / 3.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Whether the bar's range touches a price (low <= price <= high).
    pub fn touches(&self, price: f64) -> bool {
        self.low <= price && price <= self.high
    }
}

/// Per-bar indicator values supplied by the indicator collaborator.
///
/// Every field is optional. Accessors with a neutral default exist for the
/// fields the scoring layers read, so a missing value only neutralizes the
/// sub-score that depends on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorSnapshot {
    /// EMA 9.
    pub ema_fast: Option<f64>,
    /// EMA 20.
    pub ema_medium: Option<f64>,
    /// EMA 50.
    pub ema_slow: Option<f64>,
    /// EMA 200.
    pub ema_trend: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub atr: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
    /// SuperTrend direction: positive = buy, negative = sell.
    pub supertrend: Option<f64>,
    /// Simple moving average of volume.
    pub volume_sma: Option<f64>,
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

impl IndicatorSnapshot {
    pub fn rsi(&self) -> Option<f64> {
        finite(self.rsi)
    }

    /// RSI, or 50 when absent.
    pub fn rsi_or_neutral(&self) -> f64 {
        self.rsi().unwrap_or(50.0)
    }

    pub fn stoch_k(&self) -> Option<f64> {
        finite(self.stoch_k)
    }

    /// Stochastic %K, or 50 when absent.
    pub fn stoch_k_or_neutral(&self) -> f64 {
        self.stoch_k().unwrap_or(50.0)
    }

    /// MACD line and signal, only when both are present.
    pub fn macd_pair(&self) -> Option<(f64, f64)> {
        Some((finite(self.macd)?, finite(self.macd_signal)?))
    }

    pub fn atr(&self) -> Option<f64> {
        finite(self.atr)
    }

    pub fn ema_fast(&self) -> Option<f64> {
        finite(self.ema_fast)
    }

    /// All four EMAs (fast, medium, slow, trend), only when all are present.
    pub fn ema_stack(&self) -> Option<[f64; 4]> {
        Some([
            finite(self.ema_fast)?,
            finite(self.ema_medium)?,
            finite(self.ema_slow)?,
            finite(self.ema_trend)?,
        ])
    }

    /// SuperTrend direction as -1, 0 or +1 (0 when absent).
    pub fn supertrend_direction(&self) -> i8 {
        match finite(self.supertrend) {
            Some(v) if v > 0.0 => 1,
            Some(v) if v < 0.0 => -1,
            _ => 0,
        }
    }

    /// Bar volume relative to its moving average, or 1.0 when unavailable.
    pub fn volume_ratio(&self, volume: f64) -> f64 {
        match finite(self.volume_sma) {
            Some(sma) if sma > 0.0 && volume.is_finite() => volume / sma,
            _ => 1.0,
        }
    }

    /// Position of a price inside the Bollinger bands (0 = lower, 1 = upper).
    pub fn bollinger_position(&self, price: f64) -> Option<f64> {
        let lower = finite(self.bb_lower)?;
        let upper = finite(self.bb_upper)?;
        let width = upper - lower;
        if width <= 0.0 {
            return None;
        }
        Some((price - lower) / width)
    }

    /// Bollinger band width relative to price.
    pub fn bollinger_width(&self, price: f64) -> Option<f64> {
        let lower = finite(self.bb_lower)?;
        let upper = finite(self.bb_upper)?;
        if price <= 0.0 {
            return None;
        }
        Some((upper - lower) / price)
    }
}

/// Rolling window of bars with their aligned indicator rows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MarketWindow {
    bars: Vec<Bar>,
    indicators: Vec<IndicatorSnapshot>,
}

impl MarketWindow {
    /// Build a window; bars and indicator rows must line up one to one.
    pub fn new(bars: Vec<Bar>, indicators: Vec<IndicatorSnapshot>) -> Result<Self> {
        if bars.len() != indicators.len() {
            return Err(EngineError::MismatchedSeries {
                bars: bars.len(),
                indicators: indicators.len(),
            });
        }
        Ok(Self { bars, indicators })
    }

    /// Build a window with no indicator values at all.
    pub fn from_bars(bars: Vec<Bar>) -> Self {
        let indicators = vec![IndicatorSnapshot::default(); bars.len()];
        Self { bars, indicators }
    }

    /// Append a bar, dropping the oldest ones beyond `capacity`.
    pub fn push(&mut self, bar: Bar, snapshot: IndicatorSnapshot, capacity: usize) {
        self.bars.push(bar);
        self.indicators.push(snapshot);
        if capacity > 0 && self.bars.len() > capacity {
            let excess = self.bars.len() - capacity;
            self.bars.drain(..excess);
            self.indicators.drain(..excess);
        }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn indicators(&self) -> &[IndicatorSnapshot] {
        &self.indicators
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_bar(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn prev_bar(&self) -> Option<&Bar> {
        self.bars.len().checked_sub(2).map(|i| &self.bars[i])
    }

    pub fn last_indicators(&self) -> Option<&IndicatorSnapshot> {
        self.indicators.last()
    }

    pub fn prev_indicators(&self) -> Option<&IndicatorSnapshot> {
        self.indicators.len().checked_sub(2).map(|i| &self.indicators[i])
    }

    /// Latest close and the close before it.
    pub fn last_two_closes(&self) -> Option<(f64, f64)> {
        Some((self.last_bar()?.close, self.prev_bar()?.close))
    }

    /// Fail with `InsufficientData` below `required` bars.
    pub fn ensure_len(&self, required: usize) -> Result<()> {
        if self.len() < required {
            return Err(EngineError::InsufficientData {
                required,
                actual: self.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(close: f64) -> Bar {
        Bar::new(0, close - 1.0, close + 1.0, close - 2.0, close, 100.0)
    }

    #[test]
    fn test_bar_geometry() {
        let b = Bar::new(0, 10.0, 15.0, 8.0, 12.0, 1.0);
        assert_eq!(b.body(), 2.0);
        assert_eq!(b.range(), 7.0);
        assert_eq!(b.upper_shadow(), 3.0);
        assert_eq!(b.lower_shadow(), 2.0);
        assert!(b.is_green());
        assert!((b.typical_price() - 35.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_window_rejects_mismatch() {
        let err = MarketWindow::new(vec![bar(1.0), bar(2.0)], vec![IndicatorSnapshot::default()]);
        assert!(matches!(
            err,
            Err(EngineError::MismatchedSeries {
                bars: 2,
                indicators: 1
            })
        ));
    }

    #[test]
    fn test_window_push_rolls() {
        let mut window = MarketWindow::from_bars(vec![bar(1.0), bar(2.0)]);
        window.push(bar(3.0), IndicatorSnapshot::default(), 2);
        assert_eq!(window.len(), 2);
        assert_eq!(window.bars()[0].close, 2.0);
        assert_eq!(window.last_two_closes(), Some((3.0, 2.0)));
    }

    #[test]
    fn test_snapshot_neutral_defaults() {
        let snapshot = IndicatorSnapshot {
            rsi: Some(f64::NAN),
            ..Default::default()
        };
        assert_eq!(snapshot.rsi_or_neutral(), 50.0);
        assert_eq!(snapshot.stoch_k_or_neutral(), 50.0);
        assert_eq!(snapshot.supertrend_direction(), 0);
        assert_eq!(snapshot.volume_ratio(500.0), 1.0);
        assert!(snapshot.macd_pair().is_none());
    }

    #[test]
    fn test_bollinger_position() {
        let snapshot = IndicatorSnapshot {
            bb_lower: Some(90.0),
            bb_upper: Some(110.0),
            ..Default::default()
        };
        assert_eq!(snapshot.bollinger_position(92.0), Some(0.1));
        assert!(IndicatorSnapshot::default().bollinger_position(92.0).is_none());
    }
}

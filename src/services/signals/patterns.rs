//! Candlestick pattern detection.

use crate::services::signals::Detector;
use crate::types::{Bar, PatternKind, PatternMatch, PatternScore, Polarity};

/// Scans the last one to three bars for the 18 catalogued geometries.
///
/// Single-candle rules compare body and shadows to the bar's range; a
/// zero-range bar produces no single-candle match. Two- and three-candle
/// rules compare consecutive bodies and closes and only run when enough
/// bars are present.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternDetector;

impl PatternDetector {
    pub fn new() -> Self {
        Self
    }

    /// Buy/sell weight of a set of matches: half the reliability of each,
    /// summed per side and capped at 100.
    pub fn combined_score(matches: &[PatternMatch]) -> PatternScore {
        let (mut buy, mut sell) = (0.0, 0.0);
        for m in matches {
            let weight = m.reliability as f64 * 0.5;
            match m.polarity {
                Polarity::Bullish => buy += weight,
                Polarity::Bearish => sell += weight,
                Polarity::Neutral => {}
            }
        }
        PatternScore {
            buy_score: f64::min(buy, 100.0),
            sell_score: f64::min(sell, 100.0),
        }
    }

    fn single_candle(bar: &Bar, prev: Option<&Bar>, index: usize, out: &mut Vec<PatternMatch>) {
        let range = bar.range();
        if range <= 0.0 || !range.is_finite() {
            return;
        }
        let body = bar.body();
        let upper = bar.upper_shadow();
        let lower = bar.lower_shadow();
        let body_ratio = body / range;

        let hammer_shape = lower > body * 2.0 && upper < body * 0.3 && body_ratio < 0.3;
        let inverted_shape = upper > body * 2.0 && lower < body * 0.3 && body_ratio < 0.3;

        if hammer_shape && bar.is_green() {
            out.push(PatternMatch::new(PatternKind::Hammer, index));
        }
        if hammer_shape && prev.is_some_and(|p| bar.close > p.close) {
            out.push(PatternMatch::new(PatternKind::HangingMan, index));
        }
        if inverted_shape {
            out.push(PatternMatch::new(PatternKind::InvertedHammer, index));
        }
        if inverted_shape && bar.is_red() {
            out.push(PatternMatch::new(PatternKind::ShootingStar, index));
        }

        if body_ratio < 0.1 {
            out.push(PatternMatch::new(PatternKind::Doji, index));
            if lower > range * 0.6 && upper < range * 0.1 {
                out.push(PatternMatch::new(PatternKind::DragonflyDoji, index));
            }
            if upper > range * 0.6 && lower < range * 0.1 {
                out.push(PatternMatch::new(PatternKind::GravestoneDoji, index));
            }
        }

        let upper_ratio = upper / range;
        let lower_ratio = lower / range;
        if body_ratio < 0.3
            && lower_ratio > 0.3
            && lower_ratio < 0.5
            && upper_ratio > 0.3
            && upper_ratio < 0.5
        {
            out.push(PatternMatch::new(PatternKind::SpinningTop, index));
        }
    }

    fn two_candle(prev: &Bar, curr: &Bar, index: usize, out: &mut Vec<PatternMatch>) {
        let prev_body = prev.signed_body();
        let curr_body = curr.signed_body();

        if prev_body < 0.0
            && curr_body > 0.0
            && curr.close > prev.open
            && curr.open < prev.close
            && curr_body.abs() > prev_body.abs() * 1.2
        {
            out.push(PatternMatch::new(PatternKind::BullishEngulfing, index));
        } else if prev_body > 0.0
            && curr_body < 0.0
            && curr.close < prev.open
            && curr.open > prev.close
            && curr_body.abs() > prev_body.abs() * 1.2
        {
            out.push(PatternMatch::new(PatternKind::BearishEngulfing, index));
        }

        // Opens beyond the previous close, closes past its midpoint but inside its body.
        let prev_mid = (prev.open + prev.close) / 2.0;
        if prev_body < 0.0
            && curr_body > 0.0
            && curr.open < prev.close
            && curr.close > prev_mid
            && curr.close < prev.open
        {
            out.push(PatternMatch::new(PatternKind::PiercingLine, index));
        }
        if prev_body > 0.0
            && curr_body < 0.0
            && curr.open > prev.close
            && curr.close < prev_mid
            && curr.close > prev.open
        {
            out.push(PatternMatch::new(PatternKind::DarkCloudCover, index));
        }

        if curr_body.abs() < prev_body.abs() * 0.5 {
            if prev_body < 0.0 && curr_body > 0.0 {
                out.push(PatternMatch::new(PatternKind::BullishHarami, index));
            } else if prev_body > 0.0 && curr_body < 0.0 {
                out.push(PatternMatch::new(PatternKind::BearishHarami, index));
            }
        }
    }

    fn three_candle(first: &Bar, second: &Bar, third: &Bar, index: usize, out: &mut Vec<PatternMatch>) {
        let first_body = first.signed_body();
        let second_body = second.body();
        let third_body = third.signed_body();
        let first_mid = (first.open + first.close) / 2.0;

        if first_body < 0.0
            && second_body < first_body.abs() * 0.3
            && third_body > 0.0
            && third.close > first_mid
        {
            out.push(PatternMatch::new(PatternKind::MorningStar, index));
        }
        if first_body > 0.0
            && second_body < first_body * 0.3
            && third_body < 0.0
            && third.close < first_mid
        {
            out.push(PatternMatch::new(PatternKind::EveningStar, index));
        }

        let bars = [first, second, third];
        if bars.iter().all(|b| b.is_green()) && first.close < second.close && second.close < third.close {
            out.push(PatternMatch::new(PatternKind::ThreeWhiteSoldiers, index));
        }
        if bars.iter().all(|b| b.is_red()) && first.close > second.close && second.close > third.close {
            out.push(PatternMatch::new(PatternKind::ThreeBlackCrows, index));
        }
    }
}

impl Detector for PatternDetector {
    type Output = Vec<PatternMatch>;

    fn id(&self) -> &str {
        "patterns"
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect(&self, bars: &[Bar]) -> Vec<PatternMatch> {
        let mut matches = Vec::new();
        let Some(last) = bars.last() else {
            return matches;
        };
        let index = bars.len() - 1;
        let prev = index.checked_sub(1).map(|i| &bars[i]);

        Self::single_candle(last, prev, index, &mut matches);
        if let Some(prev) = prev {
            Self::two_candle(prev, last, index, &mut matches);
        }
        if bars.len() >= 3 {
            Self::three_candle(&bars[index - 2], &bars[index - 1], last, index, &mut matches);
        }

        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(0, open, high, low, close, 1000.0)
    }

    fn names(matches: &[PatternMatch]) -> Vec<&'static str> {
        matches.iter().map(|m| m.name()).collect()
    }

    #[test]
    fn test_empty_window() {
        assert!(PatternDetector.detect(&[]).is_empty());
    }

    #[test]
    fn test_hammer() {
        // Long lower shadow, tiny upper shadow, green body.
        let bars = [candle(100.0, 101.05, 96.0, 101.0)];
        let matches = PatternDetector.detect(&bars);
        assert!(names(&matches).contains(&"hammer"), "got {:?}", names(&matches));
        assert_eq!(matches[0].bar_index, 0);
    }

    #[test]
    fn test_hanging_man_needs_prior_bar() {
        let single = [candle(100.0, 101.05, 96.0, 101.0)];
        assert!(!names(&PatternDetector.detect(&single)).contains(&"hanging_man"));

        let pair = [candle(98.0, 99.5, 97.5, 99.0), candle(100.0, 101.05, 96.0, 101.0)];
        assert!(names(&PatternDetector.detect(&pair)).contains(&"hanging_man"));
    }

    #[test]
    fn test_shooting_star() {
        let bars = [candle(101.0, 105.0, 99.95, 100.0)];
        let found = names(&PatternDetector.detect(&bars));
        assert!(found.contains(&"shooting_star"), "got {:?}", found);
        assert!(found.contains(&"inverted_hammer"));
    }

    #[test]
    fn test_zero_range_bar_has_no_single_candle_match() {
        let bars = [candle(100.0, 100.0, 100.0, 100.0)];
        assert!(PatternDetector.detect(&bars).is_empty());
    }

    #[test]
    fn test_doji_family() {
        let dragonfly = [candle(100.0, 100.05, 95.0, 100.02)];
        let found = names(&PatternDetector.detect(&dragonfly));
        assert!(found.contains(&"doji"));
        assert!(found.contains(&"dragonfly_doji"));

        let gravestone = [candle(100.0, 105.0, 99.97, 100.02)];
        let found = names(&PatternDetector.detect(&gravestone));
        assert!(found.contains(&"gravestone_doji"), "got {:?}", found);
    }

    #[test]
    fn test_spinning_top() {
        let bars = [candle(100.0, 102.1, 98.0, 100.8)];
        let found = names(&PatternDetector.detect(&bars));
        assert!(found.contains(&"spinning_top"), "got {:?}", found);
    }

    #[test]
    fn test_bullish_engulfing() {
        let bars = [candle(102.0, 102.5, 99.5, 100.0), candle(99.8, 103.5, 99.5, 103.0)];
        let found = names(&PatternDetector.detect(&bars));
        assert!(found.contains(&"bullish_engulfing"), "got {:?}", found);
    }

    #[test]
    fn test_bearish_engulfing() {
        let bars = [candle(100.0, 102.5, 99.5, 102.0), candle(102.2, 102.5, 98.5, 99.0)];
        let found = names(&PatternDetector.detect(&bars));
        assert!(found.contains(&"bearish_engulfing"), "got {:?}", found);
    }

    #[test]
    fn test_piercing_line() {
        let bars = [candle(104.0, 104.2, 99.8, 100.0), candle(99.5, 103.2, 99.3, 103.0)];
        let found = names(&PatternDetector.detect(&bars));
        assert!(found.contains(&"piercing_line"), "got {:?}", found);
        assert!(!found.contains(&"bullish_engulfing"));
    }

    #[test]
    fn test_harami() {
        let bars = [candle(104.0, 104.2, 99.8, 100.0), candle(101.0, 102.2, 100.8, 102.0)];
        let found = names(&PatternDetector.detect(&bars));
        assert!(found.contains(&"bullish_harami"), "got {:?}", found);
    }

    #[test]
    fn test_morning_star() {
        let bars = [
            candle(105.0, 105.2, 99.8, 100.0),
            candle(99.5, 99.9, 99.0, 99.6),
            candle(100.0, 104.2, 99.8, 104.0),
        ];
        let found = names(&PatternDetector.detect(&bars));
        assert!(found.contains(&"morning_star"), "got {:?}", found);
        assert_eq!(PatternDetector.detect(&bars).last().map(|m| m.bar_index), Some(2));
    }

    #[test]
    fn test_three_black_crows() {
        let bars = [
            candle(110.0, 110.5, 107.5, 108.0),
            candle(108.0, 108.5, 105.5, 106.0),
            candle(106.0, 106.5, 103.5, 104.0),
        ];
        let found = names(&PatternDetector.detect(&bars));
        assert!(found.contains(&"three_black_crows"), "got {:?}", found);
    }

    #[test]
    fn test_detect_is_idempotent() {
        let bars = [
            candle(105.0, 105.2, 99.8, 100.0),
            candle(99.5, 99.9, 99.0, 99.6),
            candle(100.0, 104.2, 99.8, 104.0),
        ];
        assert_eq!(PatternDetector.detect(&bars), PatternDetector.detect(&bars));
    }

    #[test]
    fn test_combined_score_caps_at_100() {
        let matches = vec![
            PatternMatch::new(PatternKind::MorningStar, 2),
            PatternMatch::new(PatternKind::BullishEngulfing, 2),
            PatternMatch::new(PatternKind::Hammer, 2),
            PatternMatch::new(PatternKind::ShootingStar, 2),
            PatternMatch::new(PatternKind::Doji, 2),
        ];
        let score = PatternDetector::combined_score(&matches);
        assert_eq!(score.buy_score, 100.0);
        assert_eq!(score.sell_score, 40.0);
    }
}

//! Detected pattern with optional breakout and simulated trade result

use serde::{Deserialize, Serialize};

use crate::breakout::PatternBreakout;
use crate::categorizer::{ValueCategorizer, ValueCategory};
use crate::context::DetectionContext;
use crate::formations::{BuiltinFormation, Formation, PatternPart, PatternType, TradeResult};
use crate::function::FunctionContainer;
use crate::tick::TickSeries;
use crate::trading::PatternRecord;
use crate::Direction;

/// Boundary contacts of the main part's extrema
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchPoints {
    pub upper_touch: usize,
    pub upper_in: usize,
    pub lower_touch: usize,
    pub lower_in: usize,
}

impl TouchPoints {
    fn from_categorizer(categorizer: &ValueCategorizer) -> Self {
        Self {
            upper_touch: categorizer.count(ValueCategory::UpperTouch, None),
            upper_in: categorizer.count(ValueCategory::UpperIn, None),
            lower_touch: categorizer.count(ValueCategory::LowerTouch, None),
            lower_in: categorizer.count(ValueCategory::LowerIn, None),
        }
    }
}

/// A formation over a tick span
///
/// Created by the factory functions in [`crate::formations`] once the
/// formation is established. A breakout is attached at most once; the
/// trade result is simulated at that moment and never edited afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    id: String,
    ticker: String,
    formation: BuiltinFormation,
    functions: FunctionContainer,
    part_main: PatternPart,
    part_trade: Option<PatternPart>,
    breakout: Option<PatternBreakout>,
    trade_result: TradeResult,
    range_position_first: usize,
    range_position_last: usize,
    range_elements: usize,
    touch_points: TouchPoints,
}

impl Pattern {
    pub fn new(
        ticker: &str,
        formation: BuiltinFormation,
        functions: FunctionContainer,
        part_main: PatternPart,
        range_elements: usize,
        categorizer: &ValueCategorizer,
    ) -> Self {
        let range_position_first = part_main.tick_first().position;
        let range_position_last = part_main.tick_last().position;
        let id = format!(
            "{ticker}_{}_{range_position_first}_{range_position_last}",
            formation.pattern_type()
        );
        let trade_result = TradeResult::with_expected_win(formation.expected_win(&part_main));
        Self {
            id,
            ticker: ticker.to_string(),
            formation,
            functions,
            part_main,
            part_trade: None,
            breakout: None,
            trade_result,
            range_position_first,
            range_position_last,
            range_elements,
            touch_points: TouchPoints::from_categorizer(categorizer),
        }
    }

    /// Extend the main part up to the breakout, take the following ticks
    /// (as many as the main part spans) as trade part and simulate the
    /// trade. A second breakout is ignored.
    pub fn attach_breakout(
        &mut self,
        breakout: PatternBreakout,
        series: &TickSeries,
        ctx: &DetectionContext,
    ) {
        if self.breakout.is_some() {
            log::debug!("{}: breakout already attached", self.id);
            return;
        }
        let position = breakout.tick_breakout().position;
        let pattern_type = self.pattern_type();
        let main_ticks = series.range(self.range_position_first, position.saturating_sub(1));
        let tick_breakout = Some(breakout.tick_breakout());
        let part = PatternPart::new(pattern_type, main_ticks, &self.functions, tick_breakout);
        if let Some(part) = part {
            self.part_main = part;
        }

        let expected_win = self.formation.expected_win(&self.part_main);
        let trade_ticks = series.range(position + 1, position + self.part_main.length());
        self.part_trade = PatternPart::new(pattern_type, trade_ticks, &self.functions, None);
        self.trade_result = TradeResult::simulate(expected_win, &breakout, trade_ticks, ctx);
        log::debug!(
            "{}: breakout {} - expected win {:.2}, actual {:.2}",
            self.id,
            breakout.summary(),
            expected_win,
            self.trade_result.actual_win
        );
        self.breakout = Some(breakout);
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    #[inline]
    pub fn pattern_type(&self) -> PatternType {
        self.formation.pattern_type()
    }

    pub fn formation(&self) -> &BuiltinFormation {
        &self.formation
    }

    pub fn functions(&self) -> &FunctionContainer {
        &self.functions
    }

    pub fn part_main(&self) -> &PatternPart {
        &self.part_main
    }

    pub fn part_trade(&self) -> Option<&PatternPart> {
        self.part_trade.as_ref()
    }

    pub fn breakout(&self) -> Option<&PatternBreakout> {
        self.breakout.as_ref()
    }

    pub fn trade_result(&self) -> &TradeResult {
        &self.trade_result
    }

    pub fn expected_win(&self) -> f64 {
        self.trade_result.expected_win
    }

    /// Direction of the attached breakout
    pub fn breakout_direction(&self) -> Option<Direction> {
        self.breakout.as_ref().map(PatternBreakout::direction)
    }

    #[inline]
    pub fn was_breakout_done(&self) -> bool {
        self.breakout.is_some()
    }

    /// Breakout attached and confirmed by the vote
    pub fn is_buy_signal(&self) -> bool {
        self.breakout.as_ref().is_some_and(PatternBreakout::is_signal)
    }

    pub fn range_position_first(&self) -> usize {
        self.range_position_first
    }

    pub fn range_position_last(&self) -> usize {
        self.range_position_last
    }

    pub fn range_elements(&self) -> usize {
        self.range_elements
    }

    /// Range spans share at least one position.
    pub fn overlaps(&self, other: &Pattern) -> bool {
        self.range_position_first <= other.range_position_last
            && other.range_position_first <= self.range_position_last
    }

    /// Seconds covered by the main part
    pub fn duration_secs(&self) -> i64 {
        self.part_main.tick_last().timestamp - self.part_main.tick_first().timestamp
    }

    /// End of the trading window: the main part's duration again after
    /// the breakout (or after the main part without one)
    pub fn time_stamp_end(&self) -> i64 {
        let anchor = self
            .breakout
            .as_ref()
            .map_or(self.part_main.tick_last().timestamp, |b| b.tick_breakout().timestamp);
        anchor + self.duration_secs()
    }

    pub fn touch_points(&self) -> TouchPoints {
        self.touch_points
    }

    /// Expected win relative to the last close of the main part
    pub fn is_expected_win_sufficient(&self, min_expected_win_pct: f64) -> bool {
        let close = self.part_main.tick_last().close;
        if close == 0.0 {
            return false;
        }
        (self.expected_win() / close).abs() >= min_expected_win_pct
    }

    pub fn summary(&self) -> String {
        let breakout = self
            .breakout
            .as_ref()
            .map_or_else(|| "no breakout".to_string(), PatternBreakout::summary);
        format!(
            "{}: {} | Breakout: {breakout} | Expected win: {:.2} | Touches: U={}, L={}",
            self.id,
            self.part_main.summary(),
            self.expected_win(),
            self.touch_points.upper_touch,
            self.touch_points.lower_touch
        )
    }

    /// Flat copy for the persistence collaborator
    pub fn record(&self) -> PatternRecord {
        PatternRecord {
            id: self.id.clone(),
            ticker: self.ticker.clone(),
            pattern_type: self.pattern_type(),
            ts_first: self.part_main.tick_first().timestamp,
            ts_last: self.part_main.tick_last().timestamp,
            range_elements: self.range_elements,
            height: self.part_main.height(),
            breakout_direction: self.breakout_direction(),
            breakout_signal: self.is_buy_signal(),
            touch_points: self.touch_points,
            trade_result: self.trade_result.clone(),
        }
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formations::ChannelFormation;
    use crate::function::{BoundaryFunction, FunctionKind};
    use crate::tick::Tick;

    fn series() -> TickSeries {
        let mut ticks: Vec<Tick> = (0..12)
            .map(|i| Tick::new(i, i as i64 * 60, 15.0, 19.0, 11.0, 15.5, 1000.0))
            .collect();
        ticks[8] = Tick::new(8, 480, 19.8, 22.5, 19.7, 22.3, 1300.0);
        for (i, close) in [(9, 23.0), (10, 24.0), (11, 25.0)] {
            ticks[i] =
                Tick::new(i, i as i64 * 60, close - 0.5, close + 0.2, close - 0.7, close, 1000.0);
        }
        let ticks = ticks.into_iter().map(|t| t.with_f_var(t.position as f64)).collect();
        TickSeries::new(ticks).unwrap()
    }

    fn pattern(series: &TickSeries) -> Pattern {
        let functions = FunctionContainer::new(
            BoundaryFunction::constant(20.0, FunctionKind::Upper),
            BoundaryFunction::constant(10.0, FunctionKind::Lower),
        );
        let ctx = DetectionContext::default();
        let part =
            PatternPart::new(PatternType::Channel, series.range(1, 6), &functions, None).unwrap();
        let categorizer = ValueCategorizer::new(series.range(1, 6), &functions, &ctx);
        Pattern::new(
            "ABC",
            ChannelFormation::new(PatternType::Channel).into(),
            functions,
            part,
            4,
            &categorizer,
        )
    }

    #[test]
    fn test_new_pattern_has_empty_result() {
        let series = series();
        let pattern = pattern(&series);
        assert_eq!(pattern.id(), "ABC_channel_1_6");
        assert!(!pattern.was_breakout_done());
        assert!(!pattern.trade_result().is_populated());
        assert!((pattern.expected_win() - 10.0).abs() < 1e-9);
        assert_eq!(pattern.duration_secs(), 300);
        assert_eq!(pattern.time_stamp_end(), 360 + 300);
    }

    #[test]
    fn test_attach_breakout_extends_main_part() {
        let series = series();
        let ctx = DetectionContext::default();
        let mut pattern = pattern(&series);
        let breakout = PatternBreakout::new(
            series.get(7).unwrap(),
            series.get(8).unwrap(),
            pattern.functions(),
            &ctx,
        );
        assert!(breakout.is_signal());
        pattern.attach_breakout(breakout, &series, &ctx);

        assert_eq!(pattern.part_main().tick_last().position, 7);
        assert_eq!(pattern.range_position_last(), 6);
        assert_eq!(pattern.part_trade().unwrap().ticks().len(), 3);
        assert_eq!(pattern.breakout_direction(), Some(Direction::Ascending));
        assert!(pattern.is_buy_signal());
        let result = pattern.trade_result();
        assert!(result.is_populated());
        assert_eq!(result.bought_at, 22.3);
        assert_eq!(result.sold_at, 25.0);
        assert!(pattern.summary().contains("Breakout: 480 - ASC"));
    }

    #[test]
    fn test_overlaps() {
        let series = series();
        let a = pattern(&series);
        let mut b = a.clone();
        b.range_position_first = 6;
        b.range_position_last = 9;
        assert!(a.overlaps(&b));
        b.range_position_first = 7;
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn test_expected_win_sufficient() {
        let series = series();
        let pattern = pattern(&series);
        // 10 / 15.5
        assert!(pattern.is_expected_win_sufficient(0.5));
        assert!(!pattern.is_expected_win_sufficient(0.7));
    }

    #[test]
    fn test_record_copies_result() {
        let series = series();
        let record = pattern(&series).record();
        assert_eq!(record.pattern_type, PatternType::Channel);
        assert_eq!(record.ts_first, 60);
        assert!(!record.breakout_signal);
    }
}

//! Back-test of detected patterns against a tick sequence
//!
//! The runner feeds one tick per cycle into a fresh simulated
//! [`PatternTradeHandler`]. The detection set is handed over in the first
//! cycle only. A wrong breakout stops the run; the remaining open trades
//! are sold at the last tick once the ticks are exhausted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::context::{DetectionContext, TradeConfig};
use crate::formations::Pattern;
use crate::tick::Tick;
use crate::trading::{CycleInput, CycleReport, Forecast, PatternTradeHandler};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStatus {
    Replay,
    Stop,
}

#[derive(Debug)]
pub struct ReplayRunner {
    ticker: String,
    patterns: Vec<Pattern>,
    ticks: Vec<Tick>,
    ctx: DetectionContext,
    config: TradeConfig,
    forecasts: HashMap<String, Forecast>,
    handler: PatternTradeHandler,
    index: usize,
    status: ReplayStatus,
}

impl ReplayRunner {
    /// Orders are always simulated, whatever `config.simulation` says.
    pub fn new(
        ticker: &str,
        patterns: Vec<Pattern>,
        ticks: Vec<Tick>,
        ctx: DetectionContext,
        config: TradeConfig,
    ) -> Result<Self> {
        let config = TradeConfig {
            simulation: true,
            ..config
        };
        let handler = PatternTradeHandler::new(ctx.clone(), config.clone())?;
        Ok(Self {
            ticker: ticker.to_string(),
            patterns,
            ticks,
            ctx,
            config,
            forecasts: HashMap::new(),
            handler,
            index: 0,
            status: ReplayStatus::Replay,
        })
    }

    pub fn with_forecast(mut self, pattern_id: &str, forecast: Forecast) -> Self {
        self.forecasts.insert(pattern_id.to_string(), forecast);
        self
    }

    pub fn status(&self) -> ReplayStatus {
        self.status
    }

    /// Ticks consumed so far
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.status == ReplayStatus::Stop || self.index >= self.ticks.len()
    }

    pub fn handler(&self) -> &PatternTradeHandler {
        &self.handler
    }

    /// Run one cycle with the next tick. `None` once finished.
    pub fn step(&mut self) -> Option<CycleReport> {
        if self.is_finished() {
            return None;
        }
        let tick = self.ticks[self.index];
        let mut input = CycleInput::new(tick.timestamp).with_tick(&self.ticker, tick);
        if self.index == 0 {
            input = input.with_detection(self.patterns.clone());
            input.forecasts = self.forecasts.clone();
        }
        self.index += 1;

        let report = self.handler.run_cycle(input);
        if report.has_wrong_breakout() {
            log::info!("{}: replay stopped on wrong breakout at {}", self.ticker, tick.timestamp);
            self.status = ReplayStatus::Stop;
        }
        Some(report)
    }

    /// Step until finished. When the ticks run out, open trades are sold
    /// at the last tick and that sell is the final report.
    pub fn run_to_end(&mut self) -> Vec<CycleReport> {
        let mut reports = Vec::with_capacity(self.ticks.len().saturating_sub(self.index) + 1);
        while let Some(report) = self.step() {
            reports.push(report);
        }
        if self.status == ReplayStatus::Replay {
            if let Some(last) = self.ticks.last() {
                reports.push(self.handler.enforce_sell_at_end(last));
            }
        }
        reports
    }

    /// Start over with a fresh handler.
    pub fn restart(&mut self) -> Result<()> {
        self.handler = PatternTradeHandler::new(self.ctx.clone(), self.config.clone())?;
        self.index = 0;
        self.status = ReplayStatus::Replay;
        Ok(())
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorizer::ValueCategorizer;
    use crate::formations::{ChannelFormation, PatternPart, PatternType};
    use crate::function::{BoundaryFunction, FunctionContainer, FunctionKind};
    use crate::trading::{RemovalReason, SellTrigger};

    fn pattern() -> Pattern {
        let ticks: Vec<Tick> = (0..8)
            .map(|i| {
                Tick::new(i, i as i64 * 60, 15.0, 19.0, 11.0, 15.5, 1000.0).with_f_var(i as f64)
            })
            .collect();
        let functions = FunctionContainer::new(
            BoundaryFunction::constant(20.0, FunctionKind::Upper),
            BoundaryFunction::constant(10.0, FunctionKind::Lower),
        );
        let ctx = DetectionContext::default();
        let part = PatternPart::new(PatternType::Channel, &ticks, &functions, None).unwrap();
        let categorizer = ValueCategorizer::new(&ticks, &functions, &ctx);
        Pattern::new(
            "XYZ",
            ChannelFormation::new(PatternType::Channel).into(),
            functions,
            part,
            4,
            &categorizer,
        )
    }

    fn tick(position: usize, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Tick {
        Tick::new(position, position as i64 * 60, open, high, low, close, volume)
    }

    fn runner(ticks: Vec<Tick>) -> ReplayRunner {
        ReplayRunner::new(
            "XYZ",
            vec![pattern()],
            ticks,
            DetectionContext::default(),
            TradeConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_replay_sells_at_end() {
        let mut runner = runner(vec![
            tick(8, 19.6, 22.2, 19.5, 22.0, 1300.0),
            tick(9, 22.0, 23.5, 21.8, 23.0, 1000.0),
        ]);
        let reports = runner.run_to_end();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].bought.len(), 1);
        assert_eq!(reports[2].sold[0].1, SellTrigger::PatternEnd);
        assert_eq!(runner.status(), ReplayStatus::Replay);
        assert!(runner.is_finished());
        assert!(runner.handler().is_empty());
        assert!(runner.step().is_none());
    }

    #[test]
    fn test_wrong_breakout_stops_replay() {
        let mut runner = runner(vec![
            tick(8, 11.0, 11.5, 8.5, 9.0, 1000.0),
            tick(9, 19.6, 22.2, 19.5, 22.0, 1300.0),
        ]);
        let reports = runner.run_to_end();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].removed[0].1, RemovalReason::WrongBreakout);
        assert_eq!(runner.status(), ReplayStatus::Stop);
        assert_eq!(runner.index(), 1);
    }

    #[test]
    fn test_restart_replays_from_scratch() {
        let mut runner = runner(vec![tick(8, 19.6, 22.2, 19.5, 22.0, 1300.0)]);
        runner.run_to_end();
        assert!(runner.is_finished());
        runner.restart().unwrap();
        assert_eq!(runner.index(), 0);
        assert!(!runner.is_finished());
        let report = runner.step().unwrap();
        assert_eq!(report.bought.len(), 1);
        assert_eq!(runner.handler().simulator().orders().len(), 1);
    }
}

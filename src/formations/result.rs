//! Post-breakout trade simulation

use serde::{Deserialize, Serialize};

use crate::breakout::PatternBreakout;
use crate::context::DetectionContext;
use crate::tick::Tick;
use crate::Direction;

/// Outcome of walking the trade window after a breakout
///
/// Created empty with the pattern and filled once by [`TradeResult::simulate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub expected_win: f64,
    pub bought_at: f64,
    pub bought_on: Option<i64>,
    pub sold_at: f64,
    pub sold_on: Option<i64>,
    pub actual_win: f64,
    pub stop_loss_at: f64,
    pub limit: f64,
    pub stop_loss_reached: bool,
    pub limit_extended_counter: u32,
    /// The price reached the projected limit at least once
    pub formation_consistent: bool,
    pub max_ticks: usize,
    pub actual_ticks: usize,
}

impl TradeResult {
    /// Empty result carrying only the expected win
    pub fn with_expected_win(expected_win: f64) -> Self {
        Self {
            expected_win,
            ..Self::default()
        }
    }

    /// Buy at the breakout close, then walk `trade_ticks` until the stop
    /// or an unextended limit closes the position. Without a trigger the
    /// last tick's close is the exit.
    pub fn simulate(
        expected_win: f64,
        breakout: &PatternBreakout,
        trade_ticks: &[Tick],
        ctx: &DetectionContext,
    ) -> Self {
        let direction = breakout.direction();
        let bought = breakout.tick_breakout();
        let (stop_loss_at, limit) = match direction {
            Direction::Ascending => (breakout.bound_lower(), breakout.bound_upper() + expected_win),
            Direction::Descending => {
                (breakout.bound_upper(), breakout.bound_lower() - expected_win)
            },
        };

        let mut result = Self {
            expected_win,
            bought_at: bought.close,
            bought_on: Some(bought.timestamp),
            stop_loss_at,
            limit,
            max_ticks: trade_ticks.len(),
            ..Self::default()
        };

        for tick in trade_ticks {
            result.actual_ticks += 1;
            if !result.step(tick, direction, ctx.extension_wick_pct.get()) {
                break;
            }
        }
        result
    }

    /// Apply one tick; `false` once the position is closed.
    fn step(&mut self, tick: &Tick, direction: Direction, wick_pct: f64) -> bool {
        let sign = direction.sign();
        self.sold_at = tick.close;
        self.sold_on = Some(tick.timestamp);
        self.actual_win = sign * (tick.close - self.bought_at);

        let stop_hit = match direction {
            Direction::Ascending => tick.low < self.stop_loss_at,
            Direction::Descending => tick.high > self.stop_loss_at,
        };
        if stop_hit {
            self.stop_loss_reached = true;
            self.sold_at = match direction {
                Direction::Ascending => tick.open.min(self.stop_loss_at),
                Direction::Descending => tick.open.max(self.stop_loss_at),
            };
            self.actual_win = sign * (self.sold_at - self.bought_at);
            return false;
        }

        let limit_hit = match direction {
            Direction::Ascending => tick.high > self.limit,
            Direction::Descending => tick.low < self.limit,
        };
        if limit_hit {
            self.formation_consistent = true;
            if self.is_extension_trigger(tick, direction, wick_pct) {
                self.stop_loss_at += sign * self.expected_win;
                self.limit += sign * self.expected_win;
                self.limit_extended_counter += 1;
            } else {
                return false;
            }
        }
        true
    }

    /// Close beyond the limit with only a small adverse wick
    fn is_extension_trigger(&self, tick: &Tick, direction: Direction, wick_pct: f64) -> bool {
        if tick.close == 0.0 {
            return false;
        }
        match direction {
            Direction::Ascending => {
                tick.close > self.limit && (tick.high - tick.close) / tick.close < wick_pct
            },
            Direction::Descending => {
                tick.close < self.limit && (tick.close - tick.low) / tick.close < wick_pct
            },
        }
    }

    #[inline]
    pub fn is_populated(&self) -> bool {
        self.bought_on.is_some()
    }

    #[inline]
    pub fn is_winner(&self) -> bool {
        self.actual_win > 0.0
    }
}

// ============================================================
// TESTS
// ============================================================

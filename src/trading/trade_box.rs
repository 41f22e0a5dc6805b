//! Per-trade stop-loss and limit levels

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::trading::Forecast;

/// How the stop loss follows the price of an executed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStrategy {
    /// Fixed limit with a trailing stop
    Limit,
    #[default]
    TrailingStop,
    /// Stop moves in whole steps of half the bottom distance
    TrailingSteppedStop,
    /// Stop follows the simple moving average
    Sma,
}

impl TradeStrategy {
    pub const ALL: [TradeStrategy; 4] = [
        TradeStrategy::Limit,
        TradeStrategy::TrailingStop,
        TradeStrategy::TrailingSteppedStop,
        TradeStrategy::Sma,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TradeStrategy::Limit => "limit",
            TradeStrategy::TrailingStop => "trailing_stop",
            TradeStrategy::TrailingSteppedStop => "trailing_stepped_stop",
            TradeStrategy::Sma => "sma",
        }
    }
}

impl std::fmt::Display for TradeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================
// MOVING AVERAGE
// ============================================================

/// Simple moving average over the last `period` prices
#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverageTracker {
    period: usize,
    prices: VecDeque<f64>,
    sum: f64,
}

impl MovingAverageTracker {
    /// `seed` prices are pushed in order; a zero period is treated as 1.
    pub fn new(period: usize, seed: &[f64]) -> Self {
        let mut tracker = Self {
            period: period.max(1),
            prices: VecDeque::with_capacity(period.max(1) + 1),
            sum: 0.0,
        };
        for price in seed {
            tracker.push(*price);
        }
        tracker
    }

    /// Add a price and return the new average.
    pub fn push(&mut self, price: f64) -> f64 {
        self.prices.push_back(price);
        self.sum += price;
        if self.prices.len() > self.period {
            if let Some(oldest) = self.prices.pop_front() {
                self.sum -= oldest;
            }
        }
        self.value()
    }

    /// Current average, 0 without prices
    pub fn value(&self) -> f64 {
        if self.prices.is_empty() {
            return 0.0;
        }
        self.sum / self.prices.len() as f64
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

// ============================================================
// TRADING BOX
// ============================================================

/// Window of the moving average behind the SMA strategy
pub const DEFAULT_SMA_PERIOD: usize = 10;

/// Dynamic stop-loss/limit container of one long trade
///
/// The stop loss only ever rises. The limit is fixed for
/// [`TradeStrategy::Limit`] and infinite for every other strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct TradingBox {
    strategy: TradeStrategy,
    offset: f64,
    height: f64,
    distance_top: f64,
    distance_bottom: f64,
    stop_loss_orig: f64,
    stop_loss: f64,
    limit_orig: f64,
    limit: f64,
    max_price: f64,
    sma: MovingAverageTracker,
}

impl TradingBox {
    fn build(
        strategy: TradeStrategy,
        offset: f64,
        height: f64,
        distance_top: f64,
        distance_bottom: f64,
        sma: MovingAverageTracker,
    ) -> Self {
        let stop_loss = offset - distance_bottom;
        let limit = match strategy {
            TradeStrategy::Limit => offset + distance_top,
            _ => f64::INFINITY,
        };
        Self {
            strategy,
            offset,
            height,
            distance_top,
            distance_bottom,
            stop_loss_orig: stop_loss,
            stop_loss,
            limit_orig: limit,
            limit,
            max_price: offset,
            sma,
        }
    }

    /// Box around a breakout: both distances are the expected win scaled
    /// by the forecast multipliers.
    pub fn expected_win(
        strategy: TradeStrategy,
        offset: f64,
        expected_win: f64,
        forecast: Option<&Forecast>,
        sma: MovingAverageTracker,
    ) -> Self {
        let (positive, negative) =
            forecast.map_or((1.0, 1.0), |f| (f.multiplier_positive(), f.multiplier_negative()));
        let height = expected_win.abs();
        Self::build(strategy, offset, height, height * positive, height * negative, sma)
    }

    /// Box for a touch-point entry: the stop sits `distance_bottom` below
    /// the touched boundary, the limit at the opposite boundary.
    pub fn touch_point(
        strategy: TradeStrategy,
        offset: f64,
        height: f64,
        distance_bottom: f64,
        sma: MovingAverageTracker,
    ) -> Self {
        Self::build(strategy, offset, height, height - distance_bottom, distance_bottom, sma)
    }

    /// Start the price high at the larger of offset and buy price.
    pub fn with_buy_price(mut self, price: f64) -> Self {
        self.max_price = self.offset.max(price);
        self
    }

    /// Feed the next last price; `true` when the stop loss moved.
    pub fn adjust_to_next_ticker_last_price(&mut self, price: f64) -> bool {
        self.max_price = self.max_price.max(price);
        let sma = self.sma.push(price);
        let candidate = match self.strategy {
            TradeStrategy::Limit | TradeStrategy::TrailingStop => price - self.distance_bottom,
            TradeStrategy::TrailingSteppedStop => {
                let step = self.distance_stepping();
                if step <= 0.0 || self.stop_loss >= price - 2.0 * step {
                    return false;
                }
                let steps = ((price - self.stop_loss) / step).floor() - 1.0;
                self.stop_loss + steps * step
            },
            TradeStrategy::Sma => sma,
        };
        if candidate > self.stop_loss {
            self.stop_loss = candidate;
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn strategy(&self) -> TradeStrategy {
        self.strategy
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn distance_top(&self) -> f64 {
        self.distance_top
    }

    pub fn distance_bottom(&self) -> f64 {
        self.distance_bottom
    }

    pub fn distance_stepping(&self) -> f64 {
        self.distance_bottom / 2.0
    }

    /// Distance a trailing stop order would use
    pub fn distance_trailing_stop(&self) -> f64 {
        self.distance_bottom
    }

    pub fn stop_loss_orig(&self) -> f64 {
        self.stop_loss_orig
    }

    pub fn stop_loss(&self) -> f64 {
        self.stop_loss
    }

    pub fn limit_orig(&self) -> f64 {
        self.limit_orig
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn max_price(&self) -> f64 {
        self.max_price
    }

    pub fn sma_value(&self) -> f64 {
        self.sma.value()
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: offset={:.2}, stop_loss={:.2}, limit={:.2}, dist_top={:.2}, dist_bottom={:.2}, \
             dist_stepping={:.2}",
            self.strategy,
            self.offset,
            self.stop_loss,
            self.limit,
            self.distance_top,
            self.distance_bottom,
            self.distance_stepping()
        )
    }
}

// ============================================================
// TESTS
// ============================================================

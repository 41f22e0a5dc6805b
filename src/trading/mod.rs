//! Trade-candidate lifecycle
//!
//! Detected patterns enter the [`PatternTradeHandler`] as NEW trades. One
//! orchestration cycle per input tick moves them through buying, stop
//! adjustment and selling. Order submission and persistence are
//! collaborators behind the [`TradeClient`] and [`TradeRecorder`] traits.

pub mod blacklist;
pub mod client;
pub mod handler;
pub mod replay;
pub mod retry;
pub mod trade;
pub mod trade_box;

use serde::{Deserialize, Serialize};

pub use blacklist::Blacklist;
pub use client::{
    NoopRecorder, OrderSide, OrderStatus, OrderType, SimulatedTradeClient, TradeClient,
    TradeRecorder,
};
pub use handler::{CycleInput, CycleReport, PatternTradeHandler};
pub use replay::{ReplayRunner, ReplayStatus};
pub use retry::RetryQueue;
pub use trade::{BuyTrigger, PatternTrade, RemovalReason, SellTrigger, TradeStatus};
pub use trade_box::{MovingAverageTracker, TradeStrategy, TradingBox};

use crate::formations::{PatternType, TouchPoints, TradeResult};
use crate::Direction;

// ============================================================
// FORECAST
// ============================================================

/// Externally predicted outcome percentages for a pattern
///
/// Values are percentages (120.0 = 120%). They scale the trading box
/// distances and gate the buy decision; nothing here computes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub half_positive_pct: f64,
    pub full_positive_pct: f64,
    pub half_negative_pct: f64,
    pub full_negative_pct: f64,
}

impl Forecast {
    /// Scale for the distance to the limit, never below 1
    pub fn multiplier_positive(&self) -> f64 {
        100f64.max(self.half_positive_pct).max(self.full_positive_pct) / 100.0
    }

    /// Scale for the distance to the stop loss, never below 1
    pub fn multiplier_negative(&self) -> f64 {
        100f64.max(self.half_negative_pct).max(self.full_negative_pct) / 100.0
    }

    /// Larger of the two positive forecasts as a ratio (0.6 = 60%)
    pub fn positive_ratio(&self) -> f64 {
        self.half_positive_pct.max(self.full_positive_pct) / 100.0
    }

    pub fn is_sufficient(&self, min_positive: f64) -> bool {
        self.positive_ratio() >= min_positive
    }

    pub fn summary(&self) -> String {
        format!(
            "Forecast: positive {:.0}%/{:.0}%, negative {:.0}%/{:.0}%",
            self.half_positive_pct,
            self.full_positive_pct,
            self.half_negative_pct,
            self.full_negative_pct
        )
    }
}

// ============================================================
// RECORDS
// ============================================================

/// Finalized pattern as handed to the persistence collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub id: String,
    pub ticker: String,
    pub pattern_type: PatternType,
    pub ts_first: i64,
    pub ts_last: i64,
    pub range_elements: usize,
    pub height: f64,
    pub breakout_direction: Option<Direction>,
    pub breakout_signal: bool,
    pub touch_points: TouchPoints,
    pub trade_result: TradeResult,
}

/// Trade state at buy or sell time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub pattern_id: String,
    pub ticker: String,
    pub pattern_type: PatternType,
    pub buy_trigger: BuyTrigger,
    pub strategy: TradeStrategy,
    pub is_simulation: bool,
    pub status: TradeStatus,
    pub buy_price: Option<f64>,
    pub buy_amount: Option<f64>,
    pub bought_on: Option<i64>,
    pub sell_price: Option<f64>,
    pub sold_on: Option<i64>,
    pub sell_trigger: Option<SellTrigger>,
    pub stop_loss_orig: f64,
    /// `None` for strategies without a limit
    pub limit_orig: Option<f64>,
    pub stop_loss: f64,
    /// Sell minus buy value; `None` until sold
    pub result: Option<f64>,
}

/// Read-only copy of an active trade for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSnapshot {
    pub id: String,
    pub pattern_id: String,
    pub ticker: String,
    pub pattern_type: PatternType,
    pub status: TradeStatus,
    pub strategy: TradeStrategy,
    pub is_simulation: bool,
    pub last_price: Option<f64>,
    pub stop_loss: f64,
    pub limit: Option<f64>,
    pub buy_price: Option<f64>,
    pub time_stamp_end: i64,
    pub is_entry_signal: bool,
}

#[inline]
pub(crate) fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

// ============================================================
// TESTS
// ============================================================

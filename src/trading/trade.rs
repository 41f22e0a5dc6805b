//! One tradeable instance of a detected pattern

use serde::{Deserialize, Serialize};

use crate::breakout::PatternBreakout;
use crate::context::DetectionContext;
use crate::formations::Pattern;
use crate::function::FunctionContainer;
use crate::tick::Tick;
use crate::trading::trade_box::DEFAULT_SMA_PERIOD;
use crate::trading::{
    finite, Forecast, MovingAverageTracker, OrderStatus, TradeRecord, TradeSnapshot, TradeStrategy,
    TradingBox,
};
use crate::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    New,
    InExecution,
    Executed,
    Finished,
}

/// What makes a NEW trade buy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyTrigger {
    /// Confirmed ascending breakout
    #[default]
    Breakout,
    /// Low touches the lower boundary and the close stays inside
    TouchPoint,
}

impl BuyTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            BuyTrigger::Breakout => "breakout",
            BuyTrigger::TouchPoint => "touch_point",
        }
    }
}

/// Why an EXECUTED trade is sold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellTrigger {
    StopLoss,
    Limit,
    PatternEnd,
    PatternVanished,
    Cancel,
}

/// Reason code recorded when a trade leaves the active set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemovalReason {
    TradeFinished,
    PatternVanished,
    WrongBreakout,
    BuyingPreconditionProblem,
    BuyingProblem,
    SellProblem,
    TradeCancelled,
}

impl RemovalReason {
    /// Removals that suppress the (pattern type, ticker) pair for a while
    #[inline]
    pub fn blacklists(self) -> bool {
        matches!(
            self,
            RemovalReason::WrongBreakout
                | RemovalReason::BuyingPreconditionProblem
                | RemovalReason::BuyingProblem
        )
    }
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RemovalReason::TradeFinished => "TRADE_FINISHED",
            RemovalReason::PatternVanished => "PATTERN_VANISHED",
            RemovalReason::WrongBreakout => "WRONG_BREAKOUT",
            RemovalReason::BuyingPreconditionProblem => "BUYING_PRECONDITION_PROBLEM",
            RemovalReason::BuyingProblem => "BUYING_PROBLEM",
            RemovalReason::SellProblem => "SELL_PROBLEM",
            RemovalReason::TradeCancelled => "TRADE_CANCELLED",
        };
        f.write_str(s)
    }
}

/// A pattern bound to a buy trigger, a strategy and a trading box
///
/// Created NEW at admission, mutated once per cycle by the handler and
/// dropped from the handler on any terminal transition.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternTrade {
    id: String,
    pattern: Pattern,
    buy_trigger: BuyTrigger,
    status: TradeStatus,
    is_simulation: bool,
    forecast: Option<Forecast>,
    trading_box: TradingBox,
    ticks: Vec<Tick>,
    breakout: Option<PatternBreakout>,
    is_touched: bool,
    is_wrong_breakout: bool,
    order_buy: Option<OrderStatus>,
    order_sell: Option<OrderStatus>,
    sell_trigger: Option<SellTrigger>,
    time_stamp_end: i64,
}

impl PatternTrade {
    /// NEW trade admitted at `now`. The box and the trade window are
    /// provisional until the buy anchors them.
    pub fn new(
        pattern: Pattern,
        buy_trigger: BuyTrigger,
        strategy: TradeStrategy,
        forecast: Option<Forecast>,
        is_simulation: bool,
        now: i64,
        ctx: &DetectionContext,
    ) -> Self {
        let breakout = match buy_trigger {
            BuyTrigger::Breakout => pattern.breakout().cloned(),
            BuyTrigger::TouchPoint => None,
        };
        let closes: Vec<f64> = pattern.part_main().ticks().iter().map(|t| t.close).collect();
        let trading_box = Self::build_trading_box(
            &pattern,
            breakout.as_ref(),
            buy_trigger,
            strategy,
            forecast.as_ref(),
            &closes,
            ctx,
        );

        Self {
            id: format!("{}_{}_{}", pattern.id(), buy_trigger.as_str(), strategy),
            time_stamp_end: now + pattern.duration_secs(),
            pattern,
            buy_trigger,
            status: TradeStatus::New,
            is_simulation,
            forecast,
            trading_box,
            ticks: Vec::new(),
            breakout,
            is_touched: false,
            is_wrong_breakout: false,
            order_buy: None,
            order_sell: None,
            sell_trigger: None,
        }
    }

    /// Breakout boxes sit on the upper bound at the breakout tick (the
    /// main part's last tick without one), touch-point boxes on the
    /// lower bound at the last known tick.
    fn build_trading_box(
        pattern: &Pattern,
        breakout: Option<&PatternBreakout>,
        buy_trigger: BuyTrigger,
        strategy: TradeStrategy,
        forecast: Option<&Forecast>,
        closes: &[f64],
        ctx: &DetectionContext,
    ) -> TradingBox {
        let seed = &closes[closes.len().saturating_sub(DEFAULT_SMA_PERIOD)..];
        let sma = MovingAverageTracker::new(DEFAULT_SMA_PERIOD, seed);
        let functions = pattern.functions();
        let main_x = pattern.part_main().tick_last().f_var;
        match buy_trigger {
            BuyTrigger::Breakout => {
                let x = breakout.map_or(main_x, |b| b.tick_breakout().f_var);
                let offset = functions.upper_at(x);
                TradingBox::expected_win(strategy, offset, pattern.expected_win(), forecast, sma)
            },
            BuyTrigger::TouchPoint => {
                let height = functions.breadth_at(main_x);
                let distance_bottom = height * ctx.breakout_range_pct.get();
                let offset = functions.lower_at(main_x);
                TradingBox::touch_point(strategy, offset, height, distance_bottom, sma)
            },
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn ticker(&self) -> &str {
        self.pattern.ticker()
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    #[inline]
    pub fn status(&self) -> TradeStatus {
        self.status
    }

    pub fn buy_trigger(&self) -> BuyTrigger {
        self.buy_trigger
    }

    pub fn strategy(&self) -> TradeStrategy {
        self.trading_box.strategy()
    }

    pub fn is_simulation(&self) -> bool {
        self.is_simulation
    }

    pub fn forecast(&self) -> Option<&Forecast> {
        self.forecast.as_ref()
    }

    pub fn trading_box(&self) -> &TradingBox {
        &self.trading_box
    }

    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    pub fn tick_actual(&self) -> Option<&Tick> {
        self.ticks.last()
    }

    pub fn last_price(&self) -> Option<f64> {
        self.tick_actual().map(|t| t.close)
    }

    pub fn breakout(&self) -> Option<&PatternBreakout> {
        self.breakout.as_ref()
    }

    pub fn is_wrong_breakout(&self) -> bool {
        self.is_wrong_breakout
    }

    pub fn time_stamp_end(&self) -> i64 {
        self.time_stamp_end
    }

    pub fn order_buy(&self) -> Option<&OrderStatus> {
        self.order_buy.as_ref()
    }

    pub fn order_sell(&self) -> Option<&OrderStatus> {
        self.order_sell.as_ref()
    }

    pub fn sell_trigger(&self) -> Option<SellTrigger> {
        self.sell_trigger
    }

    pub fn executed_amount(&self) -> f64 {
        self.order_buy.as_ref().map_or(0.0, |o| o.executed_amount)
    }

    pub fn stop_loss_current(&self) -> f64 {
        self.trading_box.stop_loss()
    }

    pub fn limit_current(&self) -> f64 {
        self.trading_box.limit()
    }

    fn functions(&self) -> &FunctionContainer {
        self.pattern.functions()
    }

    /// Append the cycle's tick. A NEW trade checks it for an entry
    /// signal or a move against the pattern.
    pub(crate) fn add_tick(&mut self, tick: Tick, ctx: &DetectionContext) {
        let is_repeat = |t: &Tick| t.position == tick.position && t.timestamp == tick.timestamp;
        if self.ticks.last().is_some_and(is_repeat) {
            return;
        }
        let previous = self.ticks.last().copied().unwrap_or(*self.pattern.part_main().tick_last());
        self.ticks.push(tick);
        if self.status != TradeStatus::New {
            return;
        }

        let candidate = PatternBreakout::new(&previous, &tick, self.functions(), ctx);
        if tick.close < candidate.limit_lower() {
            log::info!("{}: wrong breakout at {:.2} on {}", self.id, tick.close, tick.timestamp);
            self.is_wrong_breakout = true;
            return;
        }
        if self.breakout.as_ref().is_some_and(|b| b.direction() == Direction::Descending) {
            self.is_wrong_breakout = true;
            return;
        }

        match self.buy_trigger {
            BuyTrigger::Breakout
                if self.breakout.is_none() && tick.close > candidate.limit_upper() =>
            {
                match candidate.confirm() {
                    Ok(()) => {
                        log::info!("{}: breakout confirmed - {}", self.id, candidate.summary());
                        self.breakout = Some(candidate);
                    },
                    Err(e) => log::debug!("{}: {e}", self.id),
                }
            },
            BuyTrigger::TouchPoint => {
                let lower = self.functions().lower_at(tick.f_var);
                let band = lower.abs() * ctx.equal_tolerance_pct.get();
                self.is_touched = tick.low <= lower + band && tick.close > lower;
            },
            BuyTrigger::Breakout => {},
        }
    }

    /// Entry condition of the buy trigger holds.
    pub fn is_entry_signal(&self) -> bool {
        match self.buy_trigger {
            BuyTrigger::Breakout => self
                .breakout
                .as_ref()
                .is_some_and(|b| b.direction() == Direction::Ascending && b.is_signal()),
            BuyTrigger::TouchPoint => self.is_touched,
        }
    }

    /// Forecast (if any) is positive enough and the box has room to win.
    pub fn are_preconditions_fulfilled(&self, min_forecast_positive: f64) -> bool {
        let forecast_ok = self
            .forecast
            .as_ref()
            .map_or(true, |f| f.is_sufficient(min_forecast_positive));
        forecast_ok && self.trading_box.height() > 0.0
    }

    /// Feed the last price to the trading box of an EXECUTED trade.
    pub(crate) fn adjust_trading_box(&mut self) -> bool {
        match (self.status, self.last_price()) {
            (TradeStatus::Executed, Some(price)) => {
                self.trading_box.adjust_to_next_ticker_last_price(price)
            },
            _ => false,
        }
    }

    /// First sell trigger in priority order: stop loss, limit, end of the
    /// trade window, pattern no longer detected (when configured).
    pub fn sell_trigger_for(
        &self,
        now: i64,
        pattern_active: bool,
        finish_vanished: bool,
    ) -> Option<SellTrigger> {
        if self.status != TradeStatus::Executed {
            return None;
        }
        let price = self.last_price()?;
        if self.stop_loss_current() > price {
            Some(SellTrigger::StopLoss)
        } else if self.limit_current() < price {
            Some(SellTrigger::Limit)
        } else if self.time_stamp_end < now {
            Some(SellTrigger::PatternEnd)
        } else if !pattern_active && finish_vanished {
            Some(SellTrigger::PatternVanished)
        } else {
            None
        }
    }

    pub fn actual_buy_price(&self) -> Option<f64> {
        self.last_price()
    }

    /// Stop loss and limit sells fill at their level, the rest at the
    /// last price.
    pub fn actual_sell_price(&self, trigger: SellTrigger) -> Option<f64> {
        let price = self.last_price()?;
        Some(match trigger {
            SellTrigger::StopLoss => self.stop_loss_current(),
            SellTrigger::Limit => self.limit_current(),
            _ => price,
        })
    }

    /// Re-anchor box and trade window at the buy: the box on the
    /// confirmed breakout, the window at `now` plus the pattern duration.
    pub(crate) fn set_in_execution(&mut self, now: i64, ctx: &DetectionContext) {
        let closes: Vec<f64> = self
            .pattern
            .part_main()
            .ticks()
            .iter()
            .chain(self.ticks.iter())
            .map(|t| t.close)
            .collect();
        let mut trading_box = Self::build_trading_box(
            &self.pattern,
            self.breakout.as_ref(),
            self.buy_trigger,
            self.trading_box.strategy(),
            self.forecast.as_ref(),
            &closes,
            ctx,
        );
        if let Some(price) = self.last_price() {
            trading_box = trading_box.with_buy_price(price);
        }
        log::debug!("{}: {}", self.id, trading_box.summary());
        self.trading_box = trading_box;
        self.time_stamp_end = now + self.pattern.duration_secs();
        self.status = TradeStatus::InExecution;
    }

    pub(crate) fn set_order_buy(&mut self, order: OrderStatus) {
        self.order_buy = Some(order);
        self.status = TradeStatus::Executed;
    }

    pub(crate) fn set_order_sell(&mut self, order: OrderStatus, trigger: SellTrigger) {
        self.order_sell = Some(order);
        self.sell_trigger = Some(trigger);
        self.status = TradeStatus::Finished;
    }

    pub fn record(&self) -> TradeRecord {
        let result = match (&self.order_buy, &self.order_sell) {
            (Some(buy), Some(sell)) => Some(sell.value() - buy.value()),
            _ => None,
        };
        TradeRecord {
            id: self.id.clone(),
            pattern_id: self.pattern.id().to_string(),
            ticker: self.ticker().to_string(),
            pattern_type: self.pattern.pattern_type(),
            buy_trigger: self.buy_trigger,
            strategy: self.strategy(),
            is_simulation: self.is_simulation,
            status: self.status,
            buy_price: self.order_buy.as_ref().map(|o| o.price),
            buy_amount: self.order_buy.as_ref().map(|o| o.executed_amount),
            bought_on: self.order_buy.as_ref().map(|o| o.timestamp),
            sell_price: self.order_sell.as_ref().map(|o| o.price),
            sold_on: self.order_sell.as_ref().map(|o| o.timestamp),
            sell_trigger: self.sell_trigger,
            stop_loss_orig: self.trading_box.stop_loss_orig(),
            limit_orig: finite(self.trading_box.limit_orig()),
            stop_loss: self.trading_box.stop_loss(),
            result,
        }
    }

    pub fn snapshot(&self) -> TradeSnapshot {
        TradeSnapshot {
            id: self.id.clone(),
            pattern_id: self.pattern.id().to_string(),
            ticker: self.ticker().to_string(),
            pattern_type: self.pattern.pattern_type(),
            status: self.status,
            strategy: self.strategy(),
            is_simulation: self.is_simulation,
            last_price: self.last_price(),
            stop_loss: self.stop_loss_current(),
            limit: finite(self.limit_current()),
            buy_price: self.order_buy.as_ref().map(|o| o.price),
            time_stamp_end: self.time_stamp_end,
            is_entry_signal: self.is_entry_signal(),
        }
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
    use crate::function::{BoundaryFunction, FunctionKind};
    use crate::trading::{OrderSide, OrderType};

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

    fn trade(strategy: TradeStrategy) -> PatternTrade {
        PatternTrade::new(
            pattern(),
            BuyTrigger::Breakout,
            strategy,
            None,
            true,
            1_000,
            &DetectionContext::default(),
        )
    }

    fn order(side: OrderSide, price: f64) -> OrderStatus {
        OrderStatus {
            order_id: "1".to_string(),
            symbol: "XYZ".to_string(),
            price,
            executed_amount: 2.0,
            timestamp: 0,
            side,
            order_type: OrderType::Market,
        }
    }

    #[test]
    fn test_new_trade_levels() {
        let trade = trade(TradeStrategy::Limit);
        assert_eq!(trade.id(), "XYZ_channel_0_7_breakout_limit");
        assert_eq!(trade.status(), TradeStatus::New);
        assert_eq!(trade.stop_loss_current(), 10.0);
        assert_eq!(trade.limit_current(), 30.0);
        assert_eq!(trade.time_stamp_end(), 1_000 + 420);
        assert!(!trade.is_entry_signal());
    }

    #[test]
    fn test_breakout_tick_confirms_entry() {
        let ctx = DetectionContext::default();
        let mut trade = trade(TradeStrategy::TrailingStop);
        // gap over the previous high of 19 with rising volume
        trade.add_tick(Tick::new(8, 480, 19.6, 22.2, 19.5, 22.0, 1300.0), &ctx);
        assert!(trade.is_entry_signal());
        assert_eq!(trade.breakout().unwrap().direction(), Direction::Ascending);
        assert!(!trade.is_wrong_breakout());
    }

    #[test]
    fn test_ambiguous_breakout_waits() {
        let ctx = DetectionContext::default();
        let mut trade = trade(TradeStrategy::TrailingStop);
        // over the limit only
        trade.add_tick(Tick::new(8, 480, 18.0, 21.2, 17.0, 21.0, 1000.0), &ctx);
        assert!(!trade.is_entry_signal());
        assert!(trade.breakout().is_none());
    }

    #[test]
    fn test_close_below_pattern_is_wrong_breakout() {
        let ctx = DetectionContext::default();
        let mut trade = trade(TradeStrategy::TrailingStop);
        trade.add_tick(Tick::new(8, 480, 11.0, 11.5, 8.5, 9.0, 1000.0), &ctx);
        assert!(trade.is_wrong_breakout());
    }

    #[test]
    fn test_sell_trigger_priority() {
        let ctx = DetectionContext::default();
        let mut trade = trade(TradeStrategy::Limit);
        trade.set_in_execution(1_000, &DetectionContext::default());
        trade.set_order_buy(order(OrderSide::Buy, 21.0));

        trade.add_tick(Tick::new(8, 480, 9.0, 9.5, 8.0, 9.0, 1000.0), &ctx);
        // stop loss wins over an expired window
        assert_eq!(trade.sell_trigger_for(10_000, false, true), Some(SellTrigger::StopLoss));

        trade.add_tick(Tick::new(9, 540, 25.0, 26.0, 24.0, 25.0, 1000.0), &ctx);
        assert_eq!(trade.sell_trigger_for(10_000, false, true), Some(SellTrigger::PatternEnd));
        assert_eq!(trade.sell_trigger_for(1_000, false, true), Some(SellTrigger::PatternVanished));
        assert_eq!(trade.sell_trigger_for(1_000, false, false), None);
        assert_eq!(trade.actual_sell_price(SellTrigger::StopLoss), Some(10.0));
    }

    #[test]
    fn test_buy_reanchors_window_and_box() {
        let ctx = DetectionContext::default();
        let mut trade = trade(TradeStrategy::TrailingStop);
        trade.add_tick(Tick::new(8, 1_600, 19.6, 22.2, 19.5, 22.0, 1300.0).with_f_var(8.0), &ctx);
        trade.set_in_execution(1_600, &ctx);
        assert_eq!(trade.status(), TradeStatus::InExecution);
        assert_eq!(trade.time_stamp_end(), 1_600 + 420);
        assert_eq!(trade.stop_loss_current(), 10.0);
        assert_eq!(trade.trading_box().max_price(), 22.0);
    }

    #[test]
    fn test_record_result() {
        let mut trade = trade(TradeStrategy::TrailingStop);
        trade.set_in_execution(1_000, &DetectionContext::default());
        trade.set_order_buy(order(OrderSide::Buy, 21.0));
        trade.set_order_sell(order(OrderSide::Sell, 24.0), SellTrigger::Limit);
        let record = trade.record();
        assert_eq!(record.status, TradeStatus::Finished);
        assert_eq!(record.result, Some(6.0));
        assert_eq!(record.limit_orig, None);
        assert_eq!(trade.snapshot().limit, None);
    }

    #[test]
    fn test_touch_point_entry() {
        let ctx = DetectionContext::default();
        let mut trade = PatternTrade::new(
            pattern(),
            BuyTrigger::TouchPoint,
            TradeStrategy::Limit,
            None,
            true,
            0,
            &ctx,
        );
        assert_eq!(trade.stop_loss_current(), 9.5);
        assert_eq!(trade.limit_current(), 19.5);
        trade.add_tick(Tick::new(8, 480, 11.0, 12.0, 10.02, 11.5, 1000.0), &ctx);
        assert!(trade.is_entry_signal());
    }

    #[test]
    fn test_blacklisting_reasons() {
        assert!(RemovalReason::WrongBreakout.blacklists());
        assert!(!RemovalReason::TradeFinished.blacklists());
        assert_eq!(RemovalReason::BuyingProblem.to_string(), "BUYING_PROBLEM");
    }
}

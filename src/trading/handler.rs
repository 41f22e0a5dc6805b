//! Per-cycle orchestration of all active trades
//!
//! One call to [`PatternTradeHandler::run_cycle`] runs these steps to
//! completion:
//!
//! 1. retry failed saves that are due, prune the black-list
//! 2. admit newly detected patterns as NEW trades (duplicates are rejected
//!    and black-listed) and drop NEW trades whose pattern vanished
//! 3. attach the latest tick to every trade
//! 4. adjust stop loss and limit of EXECUTED trades
//! 5. sell EXECUTED trades on the first matching trigger
//! 6. remove NEW trades with a wrong breakout
//! 7. buy NEW trades whose entry signal holds
//!
//! The handler owns its trades exclusively. Other consumers get
//! [`TradeSnapshot`] copies.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::context::{DetectionContext, TradeConfig};
use crate::formations::Pattern;
use crate::tick::Tick;
use crate::trading::retry::RetryEntry;
use crate::trading::{
    Blacklist, BuyTrigger, Forecast, NoopRecorder, PatternRecord, PatternTrade, RemovalReason,
    RetryQueue, SellTrigger,
    SimulatedTradeClient, TradeClient, TradeRecord, TradeRecorder, TradeSnapshot, TradeStatus,
};
use crate::{PatternError, Result};

// ============================================================
// CYCLE INPUT / REPORT
// ============================================================

/// Everything one cycle consumes
#[derive(Debug, Clone, Default)]
pub struct CycleInput {
    /// Current time of the cycle
    pub timestamp: i64,
    /// Latest tick per ticker
    pub ticks: HashMap<String, Tick>,
    /// Latest detection set; `None` keeps the previous one
    pub detection: Option<Vec<Pattern>>,
    /// Forecasts keyed by pattern id
    pub forecasts: HashMap<String, Forecast>,
}

impl CycleInput {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }

    pub fn with_tick(mut self, ticker: &str, tick: Tick) -> Self {
        self.ticks.insert(ticker.to_string(), tick);
        self
    }

    pub fn with_detection(mut self, patterns: Vec<Pattern>) -> Self {
        self.detection = Some(patterns);
        self
    }

    pub fn with_forecast(mut self, pattern_id: &str, forecast: Forecast) -> Self {
        self.forecasts.insert(pattern_id.to_string(), forecast);
        self
    }
}

/// What happened during one cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub admitted: Vec<String>,
    /// Pattern ids refused at admission
    pub rejected: Vec<String>,
    pub bought: Vec<String>,
    pub sold: Vec<(String, SellTrigger)>,
    pub removed: Vec<(String, RemovalReason)>,
    pub stops_adjusted: usize,
    /// Save attempts taken from the retry queue
    pub retried: usize,
}

impl CycleReport {
    pub fn removed_for(&self, reason: RemovalReason) -> usize {
        self.removed.iter().filter(|(_, r)| *r == reason).count()
    }

    pub fn has_wrong_breakout(&self) -> bool {
        self.removed_for(RemovalReason::WrongBreakout) > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PendingRecord {
    Pattern(PatternRecord),
    Trade(TradeRecord),
}

// ============================================================
// HANDLER
// ============================================================

/// Top-level orchestrator owning every active trade
///
/// Trades flagged as simulation always go to the built-in
/// [`SimulatedTradeClient`]; the others go to `C`.
#[derive(Debug)]
pub struct PatternTradeHandler<
    C: TradeClient = SimulatedTradeClient,
    R: TradeRecorder = NoopRecorder,
> {
    ctx: DetectionContext,
    config: TradeConfig,
    client: C,
    simulator: SimulatedTradeClient,
    recorder: R,
    trades: BTreeMap<String, PatternTrade>,
    blacklist: Blacklist,
    retries: RetryQueue<PendingRecord>,
    actual_pattern_ids: HashSet<String>,
    finished_pattern_ids: HashSet<String>,
    cycle: u64,
    now: i64,
}

impl PatternTradeHandler {
    /// Handler with the simulated client and no persistence
    pub fn new(ctx: DetectionContext, config: TradeConfig) -> Result<Self> {
        let client = SimulatedTradeClient::new(config.buy_order_value);
        Self::with_collaborators(ctx, config, client, NoopRecorder)
    }
}

impl<C: TradeClient, R: TradeRecorder> PatternTradeHandler<C, R> {
    pub fn with_collaborators(
        ctx: DetectionContext,
        config: TradeConfig,
        client: C,
        recorder: R,
    ) -> Result<Self> {
        ctx.validate()?;
        config.validate()?;
        Ok(Self {
            simulator: SimulatedTradeClient::new(config.buy_order_value),
            blacklist: Blacklist::new(config.blacklist_ttl_secs),
            retries: RetryQueue::new(
                config.retry_capacity,
                config.retry_max_attempts,
                config.retry_backoff_cycles,
            ),
            ctx,
            config,
            client,
            recorder,
            trades: BTreeMap::new(),
            actual_pattern_ids: HashSet::new(),
            finished_pattern_ids: HashSet::new(),
            cycle: 0,
            now: 0,
        })
    }

    // --------------------------------------------------------
    // Accessors
    // --------------------------------------------------------

    pub fn context(&self) -> &DetectionContext {
        &self.ctx
    }

    pub fn config(&self) -> &TradeConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn simulator(&self) -> &SimulatedTradeClient {
        &self.simulator
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    pub fn pending_retries(&self) -> usize {
        self.retries.len()
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn trade(&self, id: &str) -> Option<&PatternTrade> {
        self.trades.get(id)
    }

    pub fn trades(&self) -> impl Iterator<Item = &PatternTrade> {
        self.trades.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.trades.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn count_by_status(&self, status: TradeStatus) -> usize {
        self.trades.values().filter(|t| t.status() == status).count()
    }

    /// Immutable copies of all active trades in id order
    pub fn snapshots(&self) -> Vec<TradeSnapshot> {
        self.trades.values().map(PatternTrade::snapshot).collect()
    }

    fn ids_with_status(&self, status: TradeStatus) -> Vec<String> {
        self.trades
            .values()
            .filter(|t| t.status() == status)
            .map(|t| t.id().to_string())
            .collect()
    }

    // --------------------------------------------------------
    // Cycle
    // --------------------------------------------------------

    pub fn run_cycle(&mut self, input: CycleInput) -> CycleReport {
        self.cycle += 1;
        self.now = input.timestamp;
        let mut report = CycleReport {
            cycle: self.cycle,
            ..CycleReport::default()
        };

        report.retried = self.drain_retries();
        let pruned = self.blacklist.prune(self.now);
        if pruned > 0 {
            log::debug!("{pruned} black-list entries expired");
        }

        if let Some(patterns) = input.detection {
            self.actual_pattern_ids = patterns.iter().map(|p| p.id().to_string()).collect();
            for pattern in patterns {
                let pattern_id = pattern.id().to_string();
                let forecast = input.forecasts.get(&pattern_id).copied();
                match self.add_pattern_for_trade(pattern, BuyTrigger::Breakout, forecast) {
                    Ok(Some(id)) => report.admitted.push(id),
                    Ok(None) => {},
                    Err(e) => {
                        log::debug!("{pattern_id} not admitted: {e}");
                        report.rejected.push(pattern_id);
                    },
                }
            }
            self.remove_outdated_new_trades(&mut report);
        }

        self.attach_ticks(&input.ticks);
        report.stops_adjusted = self.adjust_stops_and_limits();
        self.handle_sell_triggers(&mut report);
        self.handle_wrong_breakouts(&mut report);
        self.handle_buy_triggers(&mut report);
        report
    }

    /// Admit a pattern as NEW trade with the configured strategy.
    ///
    /// `Ok(None)` when the same trade is already active or the pattern was
    /// traded before. A black-listed pair or a similar active trade (same
    /// pattern type and ticker) is an error; the latter black-lists the pair.
    pub fn add_pattern_for_trade(
        &mut self,
        pattern: Pattern,
        buy_trigger: BuyTrigger,
        forecast: Option<Forecast>,
    ) -> Result<Option<String>> {
        if self.finished_pattern_ids.contains(pattern.id()) {
            return Ok(None);
        }
        let trade = PatternTrade::new(
            pattern,
            buy_trigger,
            self.config.default_strategy,
            forecast,
            self.config.simulation,
            self.now,
            &self.ctx,
        );
        if self.trades.contains_key(trade.id()) {
            return Ok(None);
        }

        let pattern_type = trade.pattern().pattern_type();
        let ticker = trade.ticker().to_string();
        self.blacklist.check(pattern_type, &ticker, self.now)?;
        let is_similar = self
            .trades
            .values()
            .any(|t| t.pattern().pattern_type() == pattern_type && t.ticker() == ticker);
        if is_similar {
            log::warn!("{}: similar trade already active", trade.id());
            self.blacklist.insert(pattern_type, &ticker, self.now);
            return Err(PatternError::DuplicateCandidate { pattern_type, ticker });
        }

        let id = trade.id().to_string();
        log::info!(
            "added trade {id} ({})",
            if trade.is_simulation() { "simulation" } else { "live" }
        );
        self.trades.insert(id.clone(), trade);
        Ok(Some(id))
    }

    fn remove_outdated_new_trades(&mut self, report: &mut CycleReport) {
        let outdated: Vec<String> = self
            .trades
            .values()
            .filter(|t| t.status() == TradeStatus::New)
            .filter(|t| !self.actual_pattern_ids.contains(t.pattern().id()))
            .map(|t| t.id().to_string())
            .collect();
        for id in outdated {
            self.remove_trade(&id, RemovalReason::PatternVanished, report);
        }
    }

    fn attach_ticks(&mut self, ticks: &HashMap<String, Tick>) {
        for trade in self.trades.values_mut() {
            if let Some(tick) = ticks.get(trade.ticker()) {
                trade.add_tick(*tick, &self.ctx);
            }
        }
    }

    fn adjust_stops_and_limits(&mut self) -> usize {
        self.trades
            .values_mut()
            .map(|t| usize::from(t.adjust_trading_box()))
            .sum()
    }

    fn handle_sell_triggers(&mut self, report: &mut CycleReport) {
        let triggered: Vec<(String, SellTrigger)> = self
            .trades
            .values()
            .filter_map(|t| {
                let active = self.actual_pattern_ids.contains(t.pattern().id());
                t.sell_trigger_for(self.now, active, self.config.finish_vanished_trades)
                    .map(|trigger| (t.id().to_string(), trigger))
            })
            .collect();
        for (id, trigger) in triggered {
            match self.submit_sell(&id, trigger) {
                Ok(()) => {
                    report.sold.push((id.clone(), trigger));
                    self.remove_trade(&id, RemovalReason::TradeFinished, report);
                },
                Err(_) => self.remove_trade(&id, RemovalReason::SellProblem, report),
            }
        }
    }

    fn handle_wrong_breakouts(&mut self, report: &mut CycleReport) {
        let wrong: Vec<String> = self
            .trades
            .values()
            .filter(|t| t.status() == TradeStatus::New && t.is_wrong_breakout())
            .map(|t| t.id().to_string())
            .collect();
        for id in wrong {
            self.remove_trade(&id, RemovalReason::WrongBreakout, report);
        }
    }

    fn handle_buy_triggers(&mut self, report: &mut CycleReport) {
        let min_forecast = self.config.min_forecast_positive_pct.get();
        for id in self.ids_with_status(TradeStatus::New) {
            let Some(trade) = self.trades.get(&id) else {
                continue;
            };
            if !trade.is_entry_signal() || trade.last_price().is_none() {
                continue;
            }
            if !trade.are_preconditions_fulfilled(min_forecast) {
                self.remove_trade(&id, RemovalReason::BuyingPreconditionProblem, report);
                continue;
            }
            match self.submit_buy(&id) {
                Ok(()) => report.bought.push(id),
                Err(_) => self.remove_trade(&id, RemovalReason::BuyingProblem, report),
            }
        }
    }

    // --------------------------------------------------------
    // Orders
    // --------------------------------------------------------

    fn submit_buy(&mut self, id: &str) -> Result<()> {
        let trade = self
            .trades
            .get_mut(id)
            .ok_or_else(|| PatternError::UnknownTrade(id.to_string()))?;
        let price = trade
            .actual_buy_price()
            .ok_or_else(|| PatternError::Collaborator(format!("{id}: no price to buy at")))?;
        trade.set_in_execution(self.now, &self.ctx);
        let ticker = trade.ticker().to_string();
        let simulation = trade.is_simulation();

        let result = if simulation {
            self.simulator.buy(&ticker, price, self.now)
        } else {
            self.client.buy(&ticker, price, self.now)
        };
        let order = result.map_err(|e| {
            log::warn!("{id}: buy failed: {e}");
            e
        })?;
        log::info!(
            "{id}: bought {:.4} {ticker} at {:.2} on {}",
            order.executed_amount,
            order.price,
            order.timestamp
        );

        let mut records = Vec::with_capacity(2);
        if let Some(trade) = self.trades.get_mut(id) {
            trade.set_order_buy(order);
            records.push(PendingRecord::Pattern(trade.pattern().record()));
            records.push(PendingRecord::Trade(trade.record()));
        }
        for record in records {
            self.persist(record);
        }
        Ok(())
    }

    fn submit_sell(&mut self, id: &str, trigger: SellTrigger) -> Result<()> {
        let trade = self
            .trades
            .get(id)
            .ok_or_else(|| PatternError::UnknownTrade(id.to_string()))?;
        let price = trade
            .actual_sell_price(trigger)
            .ok_or_else(|| PatternError::Collaborator(format!("{id}: no price to sell at")))?;
        let ticker = trade.ticker().to_string();
        let amount = trade.executed_amount();
        let simulation = trade.is_simulation();

        let result = if simulation {
            self.simulator.sell(&ticker, amount, price, self.now)
        } else {
            self.client.sell(&ticker, amount, price, self.now)
        };
        let order = result.map_err(|e| {
            log::warn!("{id}: sell ({trigger:?}) failed: {e}");
            e
        })?;
        log::info!("{id}: sold ({trigger:?}) at {:.2} on {}", order.price, order.timestamp);

        let record = self.trades.get_mut(id).map(|trade| {
            trade.set_order_sell(order, trigger);
            trade.record()
        });
        if let Some(record) = record {
            self.persist(PendingRecord::Trade(record));
        }
        Ok(())
    }

    fn remove_trade(&mut self, id: &str, reason: RemovalReason, report: &mut CycleReport) {
        let Some(trade) = self.trades.remove(id) else {
            return;
        };
        log::info!("removed {id} ({reason})");
        if reason.blacklists() {
            self.blacklist
                .insert(trade.pattern().pattern_type(), trade.ticker(), self.now);
        }
        if matches!(
            reason,
            RemovalReason::TradeFinished
                | RemovalReason::SellProblem
                | RemovalReason::TradeCancelled
        ) {
            self.finished_pattern_ids.insert(trade.pattern().id().to_string());
        }
        report.removed.push((id.to_string(), reason));
    }

    /// Market-style exit of one trade, independent of the trigger order.
    /// Trades not yet bought are just removed.
    pub fn cancel_trade(&mut self, id: &str) -> Result<CycleReport> {
        let status = self
            .trades
            .get(id)
            .map(PatternTrade::status)
            .ok_or_else(|| PatternError::UnknownTrade(id.to_string()))?;
        let mut report = CycleReport {
            cycle: self.cycle,
            ..CycleReport::default()
        };
        if status == TradeStatus::Executed {
            if let Err(e) = self.submit_sell(id, SellTrigger::Cancel) {
                self.remove_trade(id, RemovalReason::SellProblem, &mut report);
                return Err(e);
            }
            report.sold.push((id.to_string(), SellTrigger::Cancel));
        }
        self.remove_trade(id, RemovalReason::TradeCancelled, &mut report);
        Ok(report)
    }

    /// Sell every EXECUTED trade at `tick` with the pattern-end trigger.
    /// Used at the end of a back-test.
    pub fn enforce_sell_at_end(&mut self, tick: &Tick) -> CycleReport {
        self.now = self.now.max(tick.timestamp);
        let mut report = CycleReport {
            cycle: self.cycle,
            ..CycleReport::default()
        };
        for id in self.ids_with_status(TradeStatus::Executed) {
            if let Some(trade) = self.trades.get_mut(&id) {
                trade.add_tick(*tick, &self.ctx);
            }
            match self.submit_sell(&id, SellTrigger::PatternEnd) {
                Ok(()) => {
                    report.sold.push((id.clone(), SellTrigger::PatternEnd));
                    self.remove_trade(&id, RemovalReason::TradeFinished, &mut report);
                },
                Err(_) => self.remove_trade(&id, RemovalReason::SellProblem, &mut report),
            }
        }
        report
    }

    // --------------------------------------------------------
    // Persistence
    // --------------------------------------------------------

    fn save(&mut self, record: &PendingRecord) -> Result<()> {
        match record {
            PendingRecord::Pattern(r) => self.recorder.save_pattern(r),
            PendingRecord::Trade(r) => self.recorder.save_trade(r),
        }
    }

    fn persist(&mut self, record: PendingRecord) {
        if let Err(e) = self.save(&record) {
            log::warn!("save failed, queued for retry: {e}");
            self.retries.push(record, self.cycle);
        }
    }

    fn drain_retries(&mut self) -> usize {
        let due: Vec<RetryEntry<PendingRecord>> = self.retries.drain_due(self.cycle);
        let attempted = due.len();
        for entry in due {
            if let Err(e) = self.save(&entry.item) {
                log::warn!("retry {} failed: {e}", entry.attempts);
                self.retries.reschedule(entry, self.cycle);
            }
        }
        attempted
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
    use crate::trading::{OrderSide, OrderStatus, TradeStrategy};

    const TICKER: &str = "XYZ";

    fn pattern_of(pattern_type: PatternType, first: usize) -> Pattern {
        let ticks: Vec<Tick> = (first..first + 8)
            .map(|i| {
                Tick::new(i, i as i64 * 60, 15.0, 19.0, 11.0, 15.5, 1000.0).with_f_var(i as f64)
            })
            .collect();
        let functions = FunctionContainer::new(
            BoundaryFunction::constant(20.0, FunctionKind::Upper),
            BoundaryFunction::constant(10.0, FunctionKind::Lower),
        );
        let ctx = DetectionContext::default();
        let part = PatternPart::new(pattern_type, &ticks, &functions, None).unwrap();
        let categorizer = ValueCategorizer::new(&ticks, &functions, &ctx);
        Pattern::new(
            TICKER,
            ChannelFormation::new(pattern_type).into(),
            functions,
            part,
            4,
            &categorizer,
        )
    }

    fn pattern() -> Pattern {
        pattern_of(PatternType::Channel, 0)
    }

    fn tick(position: usize, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Tick {
        Tick::new(position, position as i64 * 60, open, high, low, close, volume)
    }

    fn breakout_tick() -> Tick {
        tick(8, 19.6, 22.2, 19.5, 22.0, 1300.0)
    }

    fn handler() -> PatternTradeHandler {
        PatternTradeHandler::new(DetectionContext::default(), TradeConfig::default()).unwrap()
    }

    /// Admit the pattern and buy on the breakout tick
    fn executed_handler() -> (PatternTradeHandler, String) {
        let mut handler = handler();
        let report = handler.run_cycle(
            CycleInput::new(480)
                .with_detection(vec![pattern()])
                .with_tick(TICKER, breakout_tick()),
        );
        assert_eq!(report.admitted.len(), 1);
        assert_eq!(report.bought.len(), 1);
        let id = report.bought[0].clone();
        (handler, id)
    }

    struct RejectingClient;

    impl TradeClient for RejectingClient {
        fn buy(&mut self, ticker: &str, _price: f64, _timestamp: i64) -> Result<OrderStatus> {
            Err(PatternError::OrderRejected {
                ticker: ticker.to_string(),
                side: OrderSide::Buy,
            })
        }

        fn sell(
            &mut self,
            ticker: &str,
            _amount: f64,
            _price: f64,
            _timestamp: i64,
        ) -> Result<OrderStatus> {
            Err(PatternError::OrderRejected {
                ticker: ticker.to_string(),
                side: OrderSide::Sell,
            })
        }
    }

    #[derive(Default)]
    struct FlakyRecorder {
        failures_left: usize,
        trades: Vec<TradeRecord>,
        patterns: Vec<PatternRecord>,
    }

    impl TradeRecorder for FlakyRecorder {
        fn save_pattern(&mut self, record: &PatternRecord) -> Result<()> {
            self.patterns.push(record.clone());
            Ok(())
        }

        fn save_trade(&mut self, record: &TradeRecord) -> Result<()> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(PatternError::Collaborator("database unavailable".to_string()));
            }
            self.trades.push(record.clone());
            Ok(())
        }
    }

    #[test]
    fn test_admit_and_buy_on_breakout() {
        let (handler, id) = executed_handler();
        let trade = handler.trade(&id).unwrap();
        assert_eq!(trade.status(), TradeStatus::Executed);
        assert_eq!(trade.order_buy().unwrap().price, 22.0);
        assert_eq!(handler.simulator().orders().len(), 1);
        assert_eq!(handler.snapshots().len(), 1);
    }

    #[test]
    fn test_no_buy_without_breakout() {
        let mut handler = handler();
        let report = handler.run_cycle(
            CycleInput::new(480)
                .with_detection(vec![pattern()])
                .with_tick(TICKER, tick(8, 15.0, 18.0, 12.0, 16.0, 1000.0)),
        );
        assert_eq!(report.admitted.len(), 1);
        assert!(report.bought.is_empty());
        assert_eq!(handler.count_by_status(TradeStatus::New), 1);
    }

    #[test]
    fn test_duplicate_is_rejected_and_blacklisted() {
        let mut handler = handler();
        let detected = vec![pattern(), pattern_of(PatternType::Channel, 2)];
        let report = handler.run_cycle(CycleInput::new(0).with_detection(detected));
        assert_eq!(report.admitted.len(), 1);
        assert_eq!(report.rejected, vec!["XYZ_channel_2_9".to_string()]);
        assert!(handler.blacklist().contains(PatternType::Channel, TICKER, 1));

        // the same pattern again is neither admitted nor rejected
        let report = handler.run_cycle(CycleInput::new(60).with_detection(vec![pattern()]));
        assert!(report.admitted.is_empty());
        assert!(report.rejected.is_empty());
        assert_eq!(handler.len(), 1);
    }

    #[test]
    fn test_vanished_new_trade_is_dropped() {
        let mut handler = handler();
        handler.run_cycle(CycleInput::new(0).with_detection(vec![pattern()]));
        let report = handler.run_cycle(CycleInput::new(60).with_detection(vec![]));
        assert_eq!(report.removed_for(RemovalReason::PatternVanished), 1);
        assert!(handler.is_empty());
        // not black-listed
        assert!(handler.blacklist().is_empty());
    }

    #[test]
    fn test_wrong_breakout_removes_and_blacklists() {
        let mut handler = handler();
        let report = handler.run_cycle(
            CycleInput::new(480)
                .with_detection(vec![pattern()])
                .with_tick(TICKER, tick(8, 11.0, 11.5, 8.5, 9.0, 1000.0)),
        );
        assert!(report.has_wrong_breakout());
        assert!(handler.is_empty());
        assert!(handler.blacklist().contains(PatternType::Channel, TICKER, 500));
    }

    #[test]
    fn test_stop_loss_sells_within_cycle() {
        let (mut handler, id) = executed_handler();
        // stop loss at 10 with the default trailing stop
        let input = CycleInput::new(540).with_tick(TICKER, tick(9, 12.0, 12.0, 9.0, 9.5, 1000.0));
        let report = handler.run_cycle(input);
        assert_eq!(report.sold, vec![(id.clone(), SellTrigger::StopLoss)]);
        assert_eq!(report.removed, vec![(id, RemovalReason::TradeFinished)]);
        assert!(handler.is_empty());
        let sell = &handler.simulator().orders()[1];
        assert_eq!(sell.side, OrderSide::Sell);
        assert_eq!(sell.price, 10.0);
    }

    #[test]
    fn test_trailing_stop_adjusted_each_cycle() {
        let (mut handler, id) = executed_handler();
        let input = CycleInput::new(540).with_tick(TICKER, tick(9, 22.0, 25.5, 21.8, 25.0, 1000.0));
        let report = handler.run_cycle(input);
        assert_eq!(report.stops_adjusted, 1);
        assert_eq!(handler.trade(&id).unwrap().stop_loss_current(), 15.0);
    }

    #[test]
    fn test_pattern_end_sell() {
        let (mut handler, id) = executed_handler();
        // window ends at 480 + 420
        let input = CycleInput::new(901).with_tick(TICKER, tick(9, 22.0, 22.5, 21.5, 22.0, 1000.0));
        let report = handler.run_cycle(input);
        assert_eq!(report.sold, vec![(id, SellTrigger::PatternEnd)]);
    }

    #[test]
    fn test_vanished_executed_trade_kept_by_default() {
        let (mut handler, _) = executed_handler();
        let report = handler.run_cycle(
            CycleInput::new(540)
                .with_detection(vec![])
                .with_tick(TICKER, tick(9, 22.0, 22.5, 21.5, 22.0, 1000.0)),
        );
        assert!(report.sold.is_empty());
        assert_eq!(handler.len(), 1);
    }

    #[test]
    fn test_vanished_executed_trade_sold_when_configured() {
        let config = TradeConfig {
            finish_vanished_trades: true,
            ..TradeConfig::default()
        };
        let mut handler = PatternTradeHandler::new(DetectionContext::default(), config).unwrap();
        handler.run_cycle(
            CycleInput::new(480)
                .with_detection(vec![pattern()])
                .with_tick(TICKER, breakout_tick()),
        );
        let report = handler.run_cycle(
            CycleInput::new(540)
                .with_detection(vec![])
                .with_tick(TICKER, tick(9, 22.0, 22.5, 21.5, 22.0, 1000.0)),
        );
        assert_eq!(report.sold.len(), 1);
        assert_eq!(report.sold[0].1, SellTrigger::PatternVanished);
    }

    #[test]
    fn test_rejected_buy_removes_trade() {
        let config = TradeConfig {
            simulation: false,
            ..TradeConfig::default()
        };
        let mut handler =
            PatternTradeHandler::with_collaborators(
                DetectionContext::default(),
                config,
                RejectingClient,
                NoopRecorder,
            )
                .unwrap();
        let report = handler.run_cycle(
            CycleInput::new(480)
                .with_detection(vec![pattern()])
                .with_tick(TICKER, breakout_tick()),
        );
        assert_eq!(report.removed_for(RemovalReason::BuyingProblem), 1);
        assert!(handler.is_empty());
        assert!(handler.blacklist().contains(PatternType::Channel, TICKER, 480));
    }

    #[test]
    fn test_insufficient_forecast_blocks_buy() {
        let mut handler = handler();
        let pattern = pattern();
        let forecast = Forecast {
            half_positive_pct: 20.0,
            full_positive_pct: 10.0,
            ..Forecast::default()
        };
        let report = handler.run_cycle(
            CycleInput::new(480)
                .with_forecast(pattern.id(), forecast)
                .with_detection(vec![pattern])
                .with_tick(TICKER, breakout_tick()),
        );
        assert_eq!(report.removed_for(RemovalReason::BuyingPreconditionProblem), 1);
        assert!(report.bought.is_empty());
    }

    #[test]
    fn test_cancel_executed_trade() {
        let (mut handler, id) = executed_handler();
        let report = handler.cancel_trade(&id).unwrap();
        assert_eq!(report.sold, vec![(id.clone(), SellTrigger::Cancel)]);
        assert_eq!(report.removed, vec![(id.clone(), RemovalReason::TradeCancelled)]);
        assert!(handler.is_empty());
        assert!(matches!(handler.cancel_trade(&id), Err(PatternError::UnknownTrade(_))));

        // a cancelled pattern is not traded again
        let report = handler.run_cycle(CycleInput::new(600).with_detection(vec![pattern()]));
        assert!(report.admitted.is_empty());
    }

    #[test]
    fn test_enforce_sell_at_end() {
        let (mut handler, id) = executed_handler();
        let report = handler.enforce_sell_at_end(&tick(9, 22.0, 24.5, 21.5, 24.0, 1000.0));
        assert_eq!(report.sold, vec![(id, SellTrigger::PatternEnd)]);
        assert_eq!(handler.simulator().orders()[1].price, 24.0);
    }

    #[test]
    fn test_failed_save_is_retried() {
        let recorder = FlakyRecorder {
            failures_left: 1,
            ..FlakyRecorder::default()
        };
        let mut handler = PatternTradeHandler::with_collaborators(
            DetectionContext::default(),
            TradeConfig::default(),
            SimulatedTradeClient::default(),
            recorder,
        )
        .unwrap();
        handler.run_cycle(
            CycleInput::new(480)
                .with_detection(vec![pattern()])
                .with_tick(TICKER, breakout_tick()),
        );
        assert_eq!(handler.pending_retries(), 1);
        assert_eq!(handler.recorder().patterns.len(), 1);
        assert!(handler.recorder().trades.is_empty());

        let report = handler.run_cycle(CycleInput::new(540));
        assert_eq!(report.retried, 1);
        assert_eq!(handler.pending_retries(), 0);
        assert_eq!(handler.recorder().trades.len(), 1);
        assert_eq!(handler.recorder().trades[0].strategy, TradeStrategy::TrailingStop);
    }
}

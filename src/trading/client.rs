//! Order submission and persistence collaborators

use serde::{Deserialize, Serialize};

use crate::trading::{PatternRecord, TradeRecord};
use crate::{PatternError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    TrailingStop,
}

/// Executed order as reported by a trade client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatus {
    pub order_id: String,
    pub symbol: String,
    pub price: f64,
    pub executed_amount: f64,
    pub timestamp: i64,
    pub side: OrderSide,
    pub order_type: OrderType,
}

impl OrderStatus {
    /// Price times executed amount
    pub fn value(&self) -> f64 {
        self.price * self.executed_amount
    }
}

/// Exchange access for placing orders
///
/// A call may block. Any `Err` is treated as "no order" by the caller;
/// retries are the client's own business.
pub trait TradeClient {
    /// Buy for the client's order value at `price`.
    fn buy(&mut self, ticker: &str, price: f64, timestamp: i64) -> Result<OrderStatus>;

    /// Sell `amount` at market; `price` is the last known price.
    fn sell(&mut self, ticker: &str, amount: f64, price: f64, timestamp: i64)
        -> Result<OrderStatus>;
}

/// Fills every order at the requested price
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedTradeClient {
    buy_order_value: f64,
    next_order_id: u64,
    orders: Vec<OrderStatus>,
}

impl SimulatedTradeClient {
    pub fn new(buy_order_value: f64) -> Self {
        Self {
            buy_order_value,
            next_order_id: 1,
            orders: Vec::new(),
        }
    }

    /// Orders filled so far, oldest first
    pub fn orders(&self) -> &[OrderStatus] {
        &self.orders
    }

    fn fill(
        &mut self,
        ticker: &str,
        side: OrderSide,
        price: f64,
        amount: f64,
        timestamp: i64,
    ) -> Result<OrderStatus> {
        if !price.is_finite() || price <= 0.0 || !amount.is_finite() || amount <= 0.0 {
            return Err(PatternError::OrderRejected {
                ticker: ticker.to_string(),
                side,
            });
        }
        let order = OrderStatus {
            order_id: format!("SIM-{}", self.next_order_id),
            symbol: ticker.to_string(),
            price,
            executed_amount: amount,
            timestamp,
            side,
            order_type: OrderType::Market,
        };
        self.next_order_id += 1;
        self.orders.push(order.clone());
        Ok(order)
    }
}

impl Default for SimulatedTradeClient {
    fn default() -> Self {
        Self::new(100.0)
    }
}

impl TradeClient for SimulatedTradeClient {
    fn buy(&mut self, ticker: &str, price: f64, timestamp: i64) -> Result<OrderStatus> {
        let amount = if price > 0.0 { self.buy_order_value / price } else { 0.0 };
        self.fill(ticker, OrderSide::Buy, price, amount, timestamp)
    }

    fn sell(
        &mut self,
        ticker: &str,
        amount: f64,
        price: f64,
        timestamp: i64,
    ) -> Result<OrderStatus> {
        self.fill(ticker, OrderSide::Sell, price, amount, timestamp)
    }
}

/// Persistence of finalized patterns and trades
pub trait TradeRecorder {
    fn save_pattern(&mut self, record: &PatternRecord) -> Result<()>;

    fn save_trade(&mut self, record: &TradeRecord) -> Result<()>;
}

/// Recorder that keeps nothing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoopRecorder;

impl TradeRecorder for NoopRecorder {
    fn save_pattern(&mut self, _record: &PatternRecord) -> Result<()> {
        Ok(())
    }

    fn save_trade(&mut self, _record: &TradeRecord) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_buy_amount() {
        let mut client = SimulatedTradeClient::new(100.0);
        let order = client.buy("ETHUSD", 25.0, 60).unwrap();
        assert_eq!(order.executed_amount, 4.0);
        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.order_id, "SIM-1");
        assert!((order.value() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_simulated_rejects_bad_price() {
        let mut client = SimulatedTradeClient::default();
        match client.buy("ETHUSD", 0.0, 60) {
            Err(PatternError::OrderRejected { side, .. }) => assert_eq!(side, OrderSide::Buy),
            other => panic!("expected OrderRejected, got {other:?}"),
        }
        assert!(client.sell("ETHUSD", 1.0, f64::NAN, 60).is_err());
        assert!(client.orders().is_empty());
    }

    #[test]
    fn test_order_serde() {
        let mut client = SimulatedTradeClient::default();
        let order = client.sell("ETHUSD", 2.0, 30.0, 120).unwrap();
        let json = serde_json::to_string(&order).unwrap();
        assert!(json.contains("\"side\":\"sell\""));
        let back: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order);
    }
}

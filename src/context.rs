//! Immutable configuration passed into detection and trading calls
//!
//! A [`DetectionContext`] is borrowed by every detection, categorization,
//! breakout and simulation call. Nothing reads configuration from global
//! state, so two contexts can be used side by side.
//!
//! ```rust
//! use pattern_trade::prelude::*;
//!
//! let ctx = DetectionContext::default()
//!     .with_tolerance_pct(Ratio::new(0.02).unwrap())
//!     .with_min_breakout_votes(3);
//! assert!(ctx.validate().is_ok());
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::formations::PatternType;
use crate::params::{self, get_period, get_ratio, ParamMeta};
use crate::trading::TradeStrategy;
use crate::{PatternError, Period, Ratio, Result};

// ============================================================
// DETECTION CONTEXT
// ============================================================

/// Tolerances and thresholds for detection and breakout confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionContext {
    /// Boundary tolerance for range growth and breakout tolerance range
    pub tolerance_pct: Ratio,
    /// Tight band for touch labels
    pub equal_tolerance_pct: Ratio,
    /// Wider band for inside/outside labels
    pub in_range_tolerance_pct: Ratio,
    /// Over-limit distance as a share of the pattern breadth
    pub breakout_range_pct: Ratio,
    /// Use the full breadth as over-limit distance instead
    pub breakout_over_congestion_range: bool,
    /// Minimum volume growth of the breakout tick (0.10 = +10%)
    pub volume_increase_pct: Ratio,
    /// Checks out of three that must hold for a breakout signal
    pub min_breakout_votes: u8,
    /// Maximum adverse wick (relative to close) that lets a winner run
    pub extension_wick_pct: Ratio,
    pub min_range_elements: Period,
    pub extrema_window: Period,
    /// Normalized slope below which a boundary counts as flat
    pub flat_slope_pct: Ratio,
    /// Normalized slope difference below which boundaries count as parallel
    pub parallel_slope_pct: Ratio,
    /// TKE: last height / first height must stay below this
    pub tke_height_ratio: Ratio,
    pub doji_body_ratio: Ratio,
    /// Enabled formation types
    pub pattern_types: Vec<PatternType>,
}

impl Default for DetectionContext {
    fn default() -> Self {
        Self {
            tolerance_pct: Ratio::new_const(0.01),
            equal_tolerance_pct: Ratio::new_const(0.005),
            in_range_tolerance_pct: Ratio::new_const(0.02),
            breakout_range_pct: Ratio::new_const(0.05),
            breakout_over_congestion_range: false,
            volume_increase_pct: Ratio::new_const(0.10),
            min_breakout_votes: 2,
            extension_wick_pct: Ratio::new_const(0.005),
            min_range_elements: Period::new_const(3),
            extrema_window: Period::new_const(2),
            flat_slope_pct: Ratio::new_const(0.02),
            parallel_slope_pct: Ratio::new_const(0.01),
            tke_height_ratio: Ratio::new_const(0.5),
            doji_body_ratio: Ratio::new_const(0.1),
            pattern_types: PatternType::DETECTABLE.to_vec(),
        }
    }
}

impl DetectionContext {
    pub fn with_tolerance_pct(mut self, value: Ratio) -> Self {
        self.tolerance_pct = value;
        self
    }

    pub fn with_equal_tolerance_pct(mut self, value: Ratio) -> Self {
        self.equal_tolerance_pct = value;
        self
    }

    pub fn with_in_range_tolerance_pct(mut self, value: Ratio) -> Self {
        self.in_range_tolerance_pct = value;
        self
    }

    pub fn with_breakout_range_pct(mut self, value: Ratio) -> Self {
        self.breakout_range_pct = value;
        self
    }

    pub fn with_breakout_over_congestion_range(mut self, value: bool) -> Self {
        self.breakout_over_congestion_range = value;
        self
    }

    pub fn with_min_breakout_votes(mut self, value: u8) -> Self {
        self.min_breakout_votes = value;
        self
    }

    pub fn with_extension_wick_pct(mut self, value: Ratio) -> Self {
        self.extension_wick_pct = value;
        self
    }

    pub fn with_min_range_elements(mut self, value: Period) -> Self {
        self.min_range_elements = value;
        self
    }

    pub fn with_extrema_window(mut self, value: Period) -> Self {
        self.extrema_window = value;
        self
    }

    pub fn with_pattern_types(mut self, types: impl IntoIterator<Item = PatternType>) -> Self {
        self.pattern_types = types.into_iter().collect();
        self
    }

    #[inline]
    pub fn is_enabled(&self, pattern_type: PatternType) -> bool {
        self.pattern_types.contains(&pattern_type)
    }

    /// Cross-field consistency checks
    pub fn validate(&self) -> Result<()> {
        if self.min_breakout_votes == 0 || self.min_breakout_votes > 3 {
            return Err(PatternError::InvalidConfig(format!(
                "min_breakout_votes must be within 1..=3, got {}",
                self.min_breakout_votes
            )));
        }
        if self.equal_tolerance_pct.get() > self.in_range_tolerance_pct.get() {
            return Err(PatternError::InvalidConfig(
                "equal_tolerance_pct must not exceed in_range_tolerance_pct".to_string(),
            ));
        }
        if self.min_range_elements.get() < 2 {
            return Err(PatternError::InvalidConfig(
                "min_range_elements must be at least 2".to_string(),
            ));
        }
        Ok(())
    }

    /// Metadata for every tunable parameter
    pub fn param_meta() -> &'static [ParamMeta] {
        params::DETECTION_PARAMS
    }

    /// Context from a parameter map; missing keys keep their defaults.
    pub fn with_params(values: &HashMap<&str, f64>) -> Result<Self> {
        for (key, value) in values {
            match Self::param_meta().iter().find(|m| m.name == *key) {
                Some(meta) => meta.validate(*value)?,
                None => {
                    return Err(PatternError::InvalidConfig(format!("unknown parameter '{key}'")));
                },
            }
        }

        let d = Self::default();
        let votes = values
            .get("min_breakout_votes")
            .copied()
            .unwrap_or(f64::from(d.min_breakout_votes));

        let ratio = |key: &str, default: Ratio| get_ratio(values, key, default.get());
        let period = |key: &str, default: Period| get_period(values, key, default.get());
        let ctx = Self {
            tolerance_pct: ratio("tolerance_pct", d.tolerance_pct)?,
            equal_tolerance_pct: ratio("equal_tolerance_pct", d.equal_tolerance_pct)?,
            in_range_tolerance_pct: ratio("in_range_tolerance_pct", d.in_range_tolerance_pct)?,
            breakout_range_pct: ratio("breakout_range_pct", d.breakout_range_pct)?,
            volume_increase_pct: ratio("volume_increase_pct", d.volume_increase_pct)?,
            min_breakout_votes: votes as u8,
            extension_wick_pct: ratio("extension_wick_pct", d.extension_wick_pct)?,
            min_range_elements: period("min_range_elements", d.min_range_elements)?,
            extrema_window: period("extrema_window", d.extrema_window)?,
            flat_slope_pct: ratio("flat_slope_pct", d.flat_slope_pct)?,
            parallel_slope_pct: ratio("parallel_slope_pct", d.parallel_slope_pct)?,
            tke_height_ratio: ratio("tke_height_ratio", d.tke_height_ratio)?,
            doji_body_ratio: ratio("doji_body_ratio", d.doji_body_ratio)?,
            ..d
        };
        ctx.validate()?;
        Ok(ctx)
    }
}

// ============================================================
// TRADE CONFIG
// ============================================================

/// Settings of the trade-candidate lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeConfig {
    /// Suppression window for rejected (pattern type, ticker) pairs
    pub blacklist_ttl_secs: i64,
    /// Sell EXECUTED trades whose pattern disappeared from detection
    pub finish_vanished_trades: bool,
    /// Quote amount spent per buy
    pub buy_order_value: f64,
    pub default_strategy: TradeStrategy,
    /// Minimum positive forecast share required before buying
    pub min_forecast_positive_pct: Ratio,
    pub retry_capacity: usize,
    pub retry_max_attempts: u32,
    /// Cycles to wait before the first retry; doubles per attempt
    pub retry_backoff_cycles: u64,
    /// New trades never reach a live trade client
    pub simulation: bool,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            blacklist_ttl_secs: 3_600,
            finish_vanished_trades: false,
            buy_order_value: 100.0,
            default_strategy: TradeStrategy::TrailingStop,
            min_forecast_positive_pct: Ratio::new_const(0.5),
            retry_capacity: 64,
            retry_max_attempts: 3,
            retry_backoff_cycles: 1,
            simulation: true,
        }
    }
}

impl TradeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.blacklist_ttl_secs < 0 {
            return Err(PatternError::InvalidConfig(
                "blacklist_ttl_secs must not be negative".to_string(),
            ));
        }
        if !self.buy_order_value.is_finite() || self.buy_order_value <= 0.0 {
            return Err(PatternError::OutOfRange {
                field: "buy_order_value",
                value: self.buy_order_value,
                min: f64::MIN_POSITIVE,
                max: f64::MAX,
            });
        }
        if self.retry_capacity == 0 {
            return Err(PatternError::InvalidConfig(
                "retry_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// TESTS
// ============================================================

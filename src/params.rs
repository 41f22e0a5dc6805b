//! Parameter metadata for detection tuning
//!
//! Describes every tunable [`DetectionContext`](crate::context::DetectionContext)
//! field, enabling:
//! - Grid search optimization
//! - Parameter documentation
//! - Validation of externally supplied values
//!
//! # Example
//!
//! ```rust
//! use pattern_trade::prelude::*;
//!
//! for param in DetectionContext::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use crate::{PatternError, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value (0.0..=1.0)
  Ratio,
  /// Period value (positive integer)
  Period,
  /// Small integer count (e.g. breakout votes)
  Count,
}

/// Metadata for a single detection parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name, identical to the context field
  pub name: &'static str,
  pub param_type: ParamType,
  /// Default value
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  /// Create a new ParamMeta for a Ratio parameter
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  /// Create a new ParamMeta for a Period parameter
  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  pub const fn count(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Count, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value.is_nan() || value < min || value > max {
      return Err(PatternError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ratio::new(value).map(|_| ()),
      ParamType::Period | ParamType::Count => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(PatternError::InvalidValue("value must be a positive integer"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// DETECTION PARAMETERS
// ============================================================

pub(crate) static DETECTION_PARAMS: &[ParamMeta] = &[
  ParamMeta::ratio(
    "tolerance_pct",
    0.01,
    (0.001, 0.1, 0.005),
    "Boundary tolerance for range growth and breakout tolerance range",
  ),
  ParamMeta::ratio(
    "equal_tolerance_pct",
    0.005,
    (0.0005, 0.05, 0.0025),
    "Band around a boundary that counts as touch",
  ),
  ParamMeta::ratio(
    "in_range_tolerance_pct",
    0.02,
    (0.001, 0.1, 0.005),
    "Band around a boundary that counts as inside",
  ),
  ParamMeta::ratio(
    "breakout_range_pct",
    0.05,
    (0.0, 0.5, 0.05),
    "Share of the pattern breadth a close must clear for the over-limit check",
  ),
  ParamMeta::ratio(
    "volume_increase_pct",
    0.10,
    (0.0, 1.0, 0.05),
    "Volume growth of the breakout tick versus its predecessor",
  ),
  ParamMeta::count("min_breakout_votes", 2.0, (1.0, 3.0, 1.0), "Breakout checks that must hold"),
  ParamMeta::ratio(
    "extension_wick_pct",
    0.005,
    (0.0, 0.05, 0.0025),
    "Maximum adverse wick that extends the limit instead of selling",
  ),
  ParamMeta::period(
    "min_range_elements",
    3.0,
    (2.0, 8.0, 1.0),
    "Extrema needed for a boundary range",
  ),
  ParamMeta::period(
    "extrema_window",
    2.0,
    (1.0, 10.0, 1.0),
    "Ticks on each side for local extrema",
  ),
  ParamMeta::ratio(
    "flat_slope_pct",
    0.02,
    (0.0, 0.2, 0.01),
    "Normalized slope below which a boundary is flat",
  ),
  ParamMeta::ratio(
    "parallel_slope_pct",
    0.01,
    (0.0, 0.2, 0.01),
    "Normalized slope difference below which boundaries are parallel",
  ),
  ParamMeta::ratio(
    "tke_height_ratio",
    0.5,
    (0.1, 0.9, 0.1),
    "Height shrink required for a TKE formation",
  ),
  ParamMeta::ratio(
    "doji_body_ratio",
    0.1,
    (0.01, 0.3, 0.01),
    "Body/range ratio that counts as doji",
  ),
];

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  Period::new(value as usize)
}

// ============================================================
// TESTS
// ============================================================

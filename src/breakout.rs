//! Breakout confirmation
//!
//! A breakout is built from the tick that left the pattern and its
//! predecessor. It becomes a trading signal when enough of three
//! independent checks hold (two by default):
//!
//! - **over limit**: the close cleared the boundary by a share of the breadth
//! - **volume**: volume rose by the configured percentage
//! - **powerful**: the tick is sustainable, or it is no doji and gapped

use serde::{Deserialize, Serialize};

use crate::context::DetectionContext;
use crate::function::FunctionContainer;
use crate::tick::Tick;
use crate::{Direction, OHLCVExt, PatternError, Result};

/// Outcome of the three breakout checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BreakoutChecks {
    pub over_limit: bool,
    pub volume_rising: bool,
    pub powerful: bool,
}

impl BreakoutChecks {
    #[inline]
    pub fn votes(&self) -> u8 {
        u8::from(self.over_limit) + u8::from(self.volume_rising) + u8::from(self.powerful)
    }

    #[inline]
    pub fn is_signal(&self, required_votes: u8) -> bool {
        self.votes() >= required_votes
    }
}

/// Direction-classified boundary violation; immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternBreakout {
    tick_previous: Tick,
    tick_breakout: Tick,
    direction: Direction,
    bound_upper: f64,
    bound_lower: f64,
    pattern_breadth: f64,
    tolerance_range: f64,
    volume_change_pct: f64,
    checks: BreakoutChecks,
    required_votes: u8,
}

impl PatternBreakout {
    pub fn new(
        previous: &Tick,
        breakout: &Tick,
        functions: &FunctionContainer,
        ctx: &DetectionContext,
    ) -> Self {
        let bound_upper = functions.upper_at(breakout.f_var);
        let bound_lower = functions.lower_at(breakout.f_var);
        let pattern_breadth = bound_upper - bound_lower;
        let direction = if breakout.close > bound_upper {
            Direction::Ascending
        } else {
            Direction::Descending
        };
        let volume_change_pct = if previous.volume > 0.0 {
            breakout.volume / previous.volume - 1.0
        } else {
            0.0
        };

        let limit_range = if ctx.breakout_over_congestion_range {
            pattern_breadth
        } else {
            pattern_breadth * ctx.breakout_range_pct.get()
        };
        let over_limit = match direction {
            Direction::Ascending => breakout.close >= bound_upper + limit_range,
            Direction::Descending => breakout.close <= bound_lower - limit_range,
        };
        let checks = BreakoutChecks {
            over_limit,
            volume_rising: breakout.is_volume_rising(previous, ctx.volume_increase_pct.get()),
            powerful: breakout.is_sustainable
                || (!breakout.is_doji(ctx.doji_body_ratio.get()) && breakout.has_gap_to(previous)),
        };

        Self {
            tick_previous: *previous,
            tick_breakout: *breakout,
            direction,
            bound_upper,
            bound_lower,
            pattern_breadth,
            tolerance_range: pattern_breadth * ctx.tolerance_pct.get(),
            volume_change_pct,
            checks,
            required_votes: ctx.min_breakout_votes,
        }
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[inline]
    pub fn sign(&self) -> f64 {
        self.direction.sign()
    }

    pub fn tick_previous(&self) -> &Tick {
        &self.tick_previous
    }

    pub fn tick_breakout(&self) -> &Tick {
        &self.tick_breakout
    }

    pub fn bound_upper(&self) -> f64 {
        self.bound_upper
    }

    pub fn bound_lower(&self) -> f64 {
        self.bound_lower
    }

    pub fn pattern_breadth(&self) -> f64 {
        self.pattern_breadth
    }

    pub fn tolerance_range(&self) -> f64 {
        self.tolerance_range
    }

    pub fn limit_upper(&self) -> f64 {
        self.bound_upper + self.tolerance_range
    }

    pub fn limit_lower(&self) -> f64 {
        self.bound_lower - self.tolerance_range
    }

    /// Relative volume change versus the previous tick (0.15 = +15%)
    pub fn volume_change_pct(&self) -> f64 {
        self.volume_change_pct
    }

    pub fn checks(&self) -> BreakoutChecks {
        self.checks
    }

    #[inline]
    pub fn is_signal(&self) -> bool {
        self.checks.is_signal(self.required_votes)
    }

    /// `Ok` for a signal, otherwise the vote count as error
    pub fn confirm(&self) -> Result<()> {
        if self.is_signal() {
            Ok(())
        } else {
            Err(PatternError::BreakoutAmbiguous {
                votes: self.checks.votes(),
                required: self.required_votes,
            })
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} - {} - Volume change: {:.0}%",
            self.tick_breakout.timestamp,
            self.direction,
            self.volume_change_pct * 100.0
        )
    }
}

// ============================================================
// TESTS
// ============================================================

//! Tolerance-band classification of ticks against pattern boundaries

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::context::DetectionContext;
use crate::function::FunctionContainer;
use crate::tick::Tick;

/// Slack for values sitting exactly on a band edge
const EDGE_EPSILON: f64 = 1e-9;

/// Position of a tick relative to the pattern's functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueCategory {
    /// High within the equal band of the upper boundary
    UpperTouch,
    /// High within the in-range band of the upper boundary
    UpperIn,
    /// High beyond the in-range band of the upper boundary
    UpperOut,
    LowerTouch,
    LowerIn,
    LowerOut,
    /// Strictly between the boundaries without touching either
    MiddleIn,
    HelperUpperOut,
    HelperMiddleIn,
    HelperLowerOut,
}

impl ValueCategory {
    /// Touch/inside labels of either boundary
    #[inline]
    pub fn is_boundary_contact(self) -> bool {
        matches!(
            self,
            ValueCategory::UpperTouch
                | ValueCategory::UpperIn
                | ValueCategory::LowerTouch
                | ValueCategory::LowerIn
        )
    }
}

#[inline]
fn relative_distance(value: f64, reference: f64) -> f64 {
    if reference.abs() <= f64::EPSILON {
        return (value - reference).abs();
    }
    ((value - reference) / reference).abs()
}

#[derive(Debug, Clone)]
struct Entry {
    timestamp: i64,
    position: usize,
    categories: Vec<ValueCategory>,
}

/// Category labels for every tick of a window
#[derive(Debug, Clone)]
pub struct ValueCategorizer {
    functions: FunctionContainer,
    equal_pct: f64,
    in_range_pct: f64,
    entries: Vec<Entry>,
}

impl ValueCategorizer {
    pub fn new(ticks: &[Tick], functions: &FunctionContainer, ctx: &DetectionContext) -> Self {
        let mut categorizer = Self {
            functions: *functions,
            equal_pct: ctx.equal_tolerance_pct.get(),
            in_range_pct: ctx.in_range_tolerance_pct.get(),
            entries: Vec::with_capacity(ticks.len()),
        };
        for tick in ticks {
            let categories = categorizer.classify(tick);
            categorizer.entries.push(Entry {
                timestamp: tick.timestamp,
                position: tick.position,
                categories,
            });
        }
        categorizer
    }

    /// Labels for one tick. Crossed boundaries (upper below lower) yield
    /// no labels.
    pub fn classify(&self, tick: &Tick) -> Vec<ValueCategory> {
        let f_upper = self.functions.upper_at(tick.f_var);
        let f_lower = self.functions.lower_at(tick.f_var);
        let mut result = Vec::new();
        if f_upper < f_lower {
            return result;
        }

        let upper_distance = relative_distance(tick.high, f_upper);
        let lower_distance = relative_distance(tick.low, f_lower);
        let upper_in = upper_distance <= self.in_range_pct + EDGE_EPSILON;
        let lower_in = lower_distance <= self.in_range_pct + EDGE_EPSILON;

        if upper_distance <= self.equal_pct + EDGE_EPSILON {
            result.push(ValueCategory::UpperTouch);
        }
        if upper_in {
            result.push(ValueCategory::UpperIn);
        }
        if tick.high > f_upper && !upper_in {
            result.push(ValueCategory::UpperOut);
        }
        if lower_distance <= self.equal_pct + EDGE_EPSILON {
            result.push(ValueCategory::LowerTouch);
        }
        if lower_in {
            result.push(ValueCategory::LowerIn);
        }
        let is_inside = f_lower < tick.low && tick.high < f_upper;
        if is_inside && !result.iter().any(|c| c.is_boundary_contact()) {
            result.push(ValueCategory::MiddleIn);
        }
        if tick.low < f_lower && !lower_in {
            result.push(ValueCategory::LowerOut);
        }

        if self.functions.has_distinct_helpers() {
            self.classify_helpers(tick, &mut result);
        }
        result
    }

    fn classify_helpers(&self, tick: &Tick, result: &mut Vec<ValueCategory>) {
        let (Some(h_upper), Some(h_lower)) = (self.functions.h_upper, self.functions.h_lower) else {
            return;
        };
        let h_upper = h_upper.value_at(tick.f_var);
        let h_lower = h_lower.value_at(tick.f_var);

        let out_pct = self.in_range_pct + EDGE_EPSILON;
        if tick.high > h_upper && relative_distance(tick.high, h_upper) > out_pct {
            result.push(ValueCategory::HelperUpperOut);
        }
        if h_lower < tick.low && tick.high < h_upper {
            result.push(ValueCategory::HelperMiddleIn);
        }
        if tick.low < h_lower && relative_distance(tick.low, h_lower) > out_pct {
            result.push(ValueCategory::HelperLowerOut);
        }
    }

    /// Labels recorded for the tick at `position`
    pub fn categories_at(&self, position: usize) -> Option<&[ValueCategory]> {
        self.entries
            .iter()
            .find(|e| e.position == position)
            .map(|e| e.categories.as_slice())
    }

    /// Ticks carrying `category`, optionally limited to a timestamp range
    pub fn count(&self, category: ValueCategory, ts_range: Option<RangeInclusive<i64>>) -> usize {
        self.entries
            .iter()
            .filter(|e| ts_range.as_ref().map_or(true, |r| r.contains(&e.timestamp)))
            .filter(|e| e.categories.contains(&category))
            .count()
    }

    pub fn number_upper_touches(&self, ts_range: Option<RangeInclusive<i64>>) -> usize {
        self.count(ValueCategory::UpperTouch, ts_range)
    }

    pub fn number_lower_touches(&self, ts_range: Option<RangeInclusive<i64>>) -> usize {
        self.count(ValueCategory::LowerTouch, ts_range)
    }

    /// Every tick's labels are drawn from `allowed`.
    pub fn are_all_values_in_categories(&self, allowed: &[ValueCategory]) -> bool {
        self.entries
            .iter()
            .all(|e| e.categories.iter().all(|c| allowed.contains(c)))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================
// TESTS
// ============================================================

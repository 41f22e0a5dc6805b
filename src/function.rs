//! Linear boundary functions and the per-pattern function container

use serde::{Deserialize, Serialize};

/// Role of a fitted line within a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    Upper,
    Lower,
    Regression,
    Helper,
}

/// `|v1 - v2| / mean(v1, v2) < pct`; two zeros count as equal.
#[inline]
pub fn is_in_tolerance(v1: f64, v2: f64, pct: f64) -> bool {
    let mean = (v1 + v2) / 2.0;
    if mean.abs() <= f64::EPSILON {
        return (v1 - v2).abs() <= f64::EPSILON;
    }
    ((v1 - v2) / mean).abs() < pct
}

/// Line `y = slope * x + intercept`, valid over a tick-position interval.
///
/// Never mutated once created; a better fit produces a new value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundaryFunction {
    pub slope: f64,
    pub intercept: f64,
    pub kind: FunctionKind,
    pub position_first: usize,
    pub position_last: usize,
}

impl BoundaryFunction {
    /// Horizontal line at `value`
    pub fn constant(value: f64, kind: FunctionKind) -> Self {
        Self {
            slope: 0.0,
            intercept: value,
            kind,
            position_first: 0,
            position_last: 0,
        }
    }

    /// Line through two points. Identical x-values give a constant at the
    /// mean of both y-values.
    pub fn through(a: (f64, f64), b: (f64, f64), kind: FunctionKind) -> Self {
        let dx = b.0 - a.0;
        if dx.abs() <= f64::EPSILON {
            return Self::constant((a.1 + b.1) / 2.0, kind);
        }
        let slope = (b.1 - a.1) / dx;
        Self {
            slope,
            intercept: a.1 - slope * a.0,
            kind,
            position_first: 0,
            position_last: 0,
        }
    }

    /// Least-squares fit. Fewer than two points (or a single x-value) give a
    /// constant at the mean of the available y-values.
    pub fn fit(points: &[(f64, f64)], kind: FunctionKind) -> Self {
        let n = points.len() as f64;
        if points.is_empty() {
            return Self::constant(0.0, kind);
        }
        let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
        let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
        if points.len() < 2 {
            return Self::constant(mean_y, kind);
        }

        let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
        if sxx <= f64::EPSILON {
            return Self::constant(mean_y, kind);
        }
        let sxy: f64 = points.iter().map(|p| (p.0 - mean_x) * (p.1 - mean_y)).sum();
        let slope = sxy / sxx;
        Self {
            slope,
            intercept: mean_y - slope * mean_x,
            kind,
            position_first: 0,
            position_last: 0,
        }
    }

    /// Same slope, shifted to pass through `point`
    pub fn parallel_through(&self, point: (f64, f64), kind: FunctionKind) -> Self {
        Self {
            slope: self.slope,
            intercept: point.1 - self.slope * point.0,
            kind,
            position_first: self.position_first,
            position_last: self.position_last,
        }
    }

    pub fn with_positions(mut self, first: usize, last: usize) -> Self {
        self.position_first = first;
        self.position_last = last;
        self
    }

    #[inline]
    pub fn value_at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    #[inline]
    pub fn is_constant(&self) -> bool {
        self.slope == 0.0
    }

    /// Change between `x0` and `x1` relative to `base`
    pub fn slope_pct(&self, x0: f64, x1: f64, base: f64) -> f64 {
        if base.abs() <= f64::EPSILON {
            return 0.0;
        }
        (self.value_at(x1) - self.value_at(x0)) / base
    }

    /// Whether `value` lies within `pct` of this line at `x`
    pub fn is_in_tolerance(&self, x: f64, value: f64, pct: f64) -> bool {
        is_in_tolerance(self.value_at(x), value, pct)
    }

    /// Same line regardless of role or validity interval
    pub fn same_line(&self, other: &BoundaryFunction) -> bool {
        (self.slope - other.slope).abs() <= 1e-12
            && (self.intercept - other.intercept).abs() <= 1e-9
    }
}

/// Boundary, helper and regression lines of one pattern
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FunctionContainer {
    pub f_upper: BoundaryFunction,
    pub f_lower: BoundaryFunction,
    pub h_upper: Option<BoundaryFunction>,
    pub h_lower: Option<BoundaryFunction>,
    pub f_regression: Option<BoundaryFunction>,
}

impl FunctionContainer {
    pub fn new(f_upper: BoundaryFunction, f_lower: BoundaryFunction) -> Self {
        Self {
            f_upper,
            f_lower,
            h_upper: None,
            h_lower: None,
            f_regression: None,
        }
    }

    pub fn with_helpers(mut self, h_upper: BoundaryFunction, h_lower: BoundaryFunction) -> Self {
        self.h_upper = Some(h_upper);
        self.h_lower = Some(h_lower);
        self
    }

    pub fn with_regression(mut self, f_regression: BoundaryFunction) -> Self {
        self.f_regression = Some(f_regression);
        self
    }

    #[inline]
    pub fn upper_at(&self, x: f64) -> f64 {
        self.f_upper.value_at(x)
    }

    #[inline]
    pub fn lower_at(&self, x: f64) -> f64 {
        self.f_lower.value_at(x)
    }

    #[inline]
    pub fn breadth_at(&self, x: f64) -> f64 {
        self.upper_at(x) - self.lower_at(x)
    }

    /// Helper lines exist and differ from the primary boundaries
    pub fn has_distinct_helpers(&self) -> bool {
        match (self.h_upper, self.h_lower) {
            (Some(hu), Some(hl)) => !(hu.same_line(&self.f_upper) && hl.same_line(&self.f_lower)),
            _ => false,
        }
    }
}

// ============================================================
// TESTS
// ============================================================

//! Sub-views of the tick series belonging to a pattern

use crate::formations::PatternType;
use crate::function::{BoundaryFunction, FunctionContainer, FunctionKind};
use crate::tick::Tick;
use crate::OHLCVExt;

/// Slice of a pattern (main formation or post-breakout trade window) with
/// the metrics derived from the pattern's functions.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternPart {
    pattern_type: PatternType,
    ticks: Vec<Tick>,
    functions: FunctionContainer,
    tick_high: Tick,
    tick_low: Tick,
    bound_upper: f64,
    bound_lower: f64,
    height_at_first_position: f64,
    height_at_last_position: f64,
    distance_min: f64,
    distance_max: f64,
    height: f64,
}

impl PatternPart {
    /// `None` for an empty slice. Bounds are taken at `tick_breakout` when
    /// given, otherwise at the last tick.
    pub fn new(
        pattern_type: PatternType,
        ticks: &[Tick],
        functions: &FunctionContainer,
        tick_breakout: Option<&Tick>,
    ) -> Option<Self> {
        let first = ticks.first()?;
        let last = ticks.last()?;
        let tick_high = *ticks.iter().max_by(|a, b| a.high.total_cmp(&b.high))?;
        let tick_low = *ticks.iter().min_by(|a, b| a.low.total_cmp(&b.low))?;

        let height_at_first_position = functions.breadth_at(first.f_var);
        let x_bound = tick_breakout.unwrap_or(last).f_var;
        let bound_upper = functions.upper_at(x_bound);
        let bound_lower = functions.lower_at(x_bound);
        let height_at_last_position = bound_upper - bound_lower;

        let distance_min = height_at_first_position.abs().min(height_at_last_position.abs());
        let distance_max = height_at_first_position.abs().max(height_at_last_position.abs());
        let height = if pattern_type.uses_bound_height() {
            bound_upper - bound_lower
        } else {
            (distance_min + distance_max) / 2.0
        };

        Some(Self {
            pattern_type,
            ticks: ticks.to_vec(),
            functions: *functions,
            tick_high,
            tick_low,
            bound_upper,
            bound_lower,
            height_at_first_position,
            height_at_last_position,
            distance_min,
            distance_max,
            height,
        })
    }

    #[inline]
    pub fn pattern_type(&self) -> PatternType {
        self.pattern_type
    }

    #[inline]
    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    pub fn tick_first(&self) -> &Tick {
        &self.ticks[0]
    }

    pub fn tick_last(&self) -> &Tick {
        &self.ticks[self.ticks.len() - 1]
    }

    pub fn tick_high(&self) -> &Tick {
        &self.tick_high
    }

    pub fn tick_low(&self) -> &Tick {
        &self.tick_low
    }

    pub fn bound_upper(&self) -> f64 {
        self.bound_upper
    }

    pub fn bound_lower(&self) -> f64 {
        self.bound_lower
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn height_at_first_position(&self) -> f64 {
        self.height_at_first_position
    }

    pub fn height_at_last_position(&self) -> f64 {
        self.height_at_last_position
    }

    pub fn distance_min(&self) -> f64 {
        self.distance_min
    }

    pub fn distance_max(&self) -> f64 {
        self.distance_max
    }

    /// Span in positions
    pub fn length(&self) -> usize {
        self.tick_last().position - self.tick_first().position
    }

    /// Highest high minus lowest low
    pub fn movement(&self) -> f64 {
        (self.tick_high.high - self.tick_low.low).abs()
    }

    /// Mean of the high/low midpoints
    pub fn mean(&self) -> f64 {
        self.ticks.iter().map(|t| t.mean_hl()).sum::<f64>() / self.ticks.len() as f64
    }

    pub fn max(&self) -> f64 {
        self.tick_high.high
    }

    pub fn min(&self) -> f64 {
        self.tick_low.low
    }

    /// Standard deviation of the high/low midpoints around their regression line
    pub fn std_regression(&self) -> f64 {
        let points: Vec<(f64, f64)> = self
            .ticks
            .iter()
            .enumerate()
            .map(|(i, t)| ((i + 1) as f64, t.mean_hl()))
            .collect();
        let f = BoundaryFunction::fit(&points, FunctionKind::Regression);
        let n = points.len() as f64;
        let sum_sq: f64 = points.iter().map(|(x, y)| (y - f.value_at(*x)).powi(2)).sum();
        (sum_sq / n).sqrt()
    }

    /// Trailing distance for a trading box: regression deviation shrunk by
    /// the height contraction of the formation
    pub fn distance_for_trading_box(&self) -> f64 {
        if self.height_at_last_position == 0.0 || self.height_at_first_position == 0.0 {
            return self.std_regression();
        }
        self.std_regression() / (self.height_at_first_position / self.height_at_last_position).abs()
    }

    /// Share of this part's movement that overlaps `other` from above
    pub fn retracement_pct(&self, other: &PatternPart) -> f64 {
        if self.tick_low.low > other.tick_high.high {
            return 0.0;
        }
        let movement = self.movement();
        if movement == 0.0 {
            return 0.0;
        }
        (other.tick_high.high - self.tick_low.low).abs() / movement
    }

    /// Percentage change of upper, lower and regression line across the part
    pub fn slope_values(&self) -> (f64, f64, f64) {
        let (x0, x1) = (self.tick_first().f_var, self.tick_last().f_var);
        let pct = |f: &BoundaryFunction| {
            let base = f.value_at(x0);
            f.slope_pct(x0, x1, base) * 100.0
        };
        let regression = self.functions.f_regression.unwrap_or_else(|| {
            let points: Vec<_> = self.ticks.iter().map(|t| (t.f_var, t.mean_hl())).collect();
            BoundaryFunction::fit(&points, FunctionKind::Regression)
        });
        (pct(&self.functions.f_upper), pct(&self.functions.f_lower), pct(&regression))
    }

    pub fn summary(&self) -> String {
        let (upper, lower, regression) = self.slope_values();
        let gradients = if self.pattern_type.is_tke() || self.pattern_type.is_head_shoulder() {
            format!("Reg={regression:.1}%")
        } else {
            format!("U={upper:.1}%, L={lower:.1}%, Reg={regression:.1}%")
        };
        format!(
            "{}: {} - {} ({} ticks), Gradients: {gradients}, Height: {:.2}, Max={:.2}, Min={:.2}, \
             Std_regression={:.2}",
            self.pattern_type,
            self.tick_first().timestamp,
            self.tick_last().timestamp,
            self.ticks.len(),
            self.height,
            self.distance_max,
            self.distance_min,
            self.std_regression()
        )
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ticks() -> Vec<Tick> {
        (0..10)
            .map(|i| {
                let mid = 15.0 + 0.1 * i as f64;
                Tick::new(i, i as i64, mid - 1.0, mid + 2.0, mid - 2.0, mid + 1.0, 1000.0)
                    .with_f_var(i as f64)
            })
            .collect()
    }

    fn triangle() -> FunctionContainer {
        // width 10 at x=0 shrinking to 6 at x=10
        FunctionContainer::new(
            BoundaryFunction::through((0.0, 20.0), (10.0, 18.0), FunctionKind::Upper),
            BoundaryFunction::through((0.0, 10.0), (10.0, 12.0), FunctionKind::Lower),
        )
    }

    #[test]
    fn test_empty_part() {
        assert!(PatternPart::new(PatternType::Channel, &[], &triangle(), None).is_none());
    }

    #[test]
    fn test_height_is_mean_of_distances() {
        let part = PatternPart::new(PatternType::Triangle, &ticks(), &triangle(), None).unwrap();
        // first x=0: 10, last x=9: 6.4
        assert!((part.height_at_first_position() - 10.0).abs() < 1e-9);
        assert!((part.height_at_last_position() - 6.4).abs() < 1e-9);
        assert!((part.height() - 8.2).abs() < 1e-9);
    }

    #[test]
    fn test_tke_height_is_bound_distance() {
        let breakout = Tick::new(10, 10, 0.0, 0.0, 0.0, 0.0, 0.0).with_f_var(10.0);
        let part =
            PatternPart::new(PatternType::TkeDown, &ticks(), &triangle(), Some(&breakout)).unwrap();
        assert!((part.height() - 6.0).abs() < 1e-9);
        assert!((part.bound_upper() - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_movement_and_length() {
        let part = PatternPart::new(PatternType::Channel, &ticks(), &triangle(), None).unwrap();
        assert_eq!(part.length(), 9);
        assert!((part.movement() - (17.9 - 13.0)).abs() < 1e-9);
        assert!(part.std_regression() < 1e-9);
    }

    #[test]
    fn test_retracement_pct() {
        let up = PatternPart::new(PatternType::Channel, &ticks(), &triangle(), None).unwrap();
        let shifted: Vec<Tick> = ticks()
            .into_iter()
            .map(|mut t| {
                t.high += 10.0;
                t.low += 10.0;
                t
            })
            .collect();
        let high_part =
            PatternPart::new(PatternType::Channel, &shifted, &triangle(), None).unwrap();
        assert_eq!(high_part.retracement_pct(&up), 0.0);
        assert!(up.retracement_pct(&high_part) > 0.0);
    }
}

//! Fibonacci wave formation
//!
//! A wave is five legs through six turning points: impulse legs 1, 3, 5
//! and retracement legs 2 and 4. Waves come from an external wave finder
//! and the retracement forecast from an external predictor; this module
//! only validates the waves and turns them into a [`Pattern`].

use serde::{Deserialize, Serialize};

use crate::categorizer::ValueCategorizer;
use crate::context::DetectionContext;
use crate::formations::{build_fibonacci_pattern, Formation, Pattern, PatternPart, PatternType};
use crate::function::{BoundaryFunction, FunctionContainer, FunctionKind};
use crate::tick::{Tick, TickSeries};
use crate::{Direction, PatternError, Result};

/// Turning points per wave
pub const WAVE_POINTS: usize = 6;

/// Price of a turning point. Even points are the wave's troughs for an
/// ascending wave (lows) and its crests for a descending one (highs).
fn point_value(tick: &Tick, index: usize, direction: Direction) -> f64 {
    match (direction, index % 2 == 0) {
        (Direction::Ascending, true) | (Direction::Descending, false) => tick.low,
        (Direction::Ascending, false) | (Direction::Descending, true) => tick.high,
    }
}

// ============================================================
// WAVES
// ============================================================

/// One leg between two consecutive turning points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveLeg {
    pub tick_start: Tick,
    pub tick_end: Tick,
    pub value_start: f64,
    pub value_end: f64,
}

impl WaveLeg {
    /// Signed price movement from start to end
    pub fn movement(&self) -> f64 {
        self.value_end - self.value_start
    }

    pub fn duration(&self) -> usize {
        self.tick_end.position - self.tick_start.position
    }

    /// How much of `previous` this leg gave back (0.382 = 38.2%)
    pub fn retracement_pct(&self, previous: &WaveLeg) -> f64 {
        let base = previous.movement();
        if base == 0.0 {
            return 0.0;
        }
        (self.movement() / base).abs()
    }
}

/// Externally predicted retracement end: `(timestamp, value)` pairs from a
/// classifier and a regression model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetracementForecast {
    pub classifier: (i64, f64),
    pub regression: (i64, f64),
}

/// A five-leg wave given by its six turning points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibonacciWave {
    direction: Direction,
    points: Vec<Tick>,
    forecast: Option<RetracementForecast>,
}

impl FibonacciWave {
    /// Points must be strictly increasing in position.
    pub fn new(direction: Direction, points: [Tick; WAVE_POINTS]) -> Result<Self> {
        Self::from_points(direction, points.to_vec())
    }

    /// Wave through the ticks of `series` at the given positions
    pub fn from_series(
        direction: Direction,
        series: &TickSeries,
        positions: [usize; WAVE_POINTS],
    ) -> Result<Self> {
        let points = positions
            .iter()
            .map(|&position| {
                series.get(position).copied().ok_or(PatternError::InsufficientData {
                    need: position + 1,
                    got: series.len(),
                })
            })
            .collect::<Result<Vec<Tick>>>()?;
        Self::from_points(direction, points)
    }

    fn from_points(direction: Direction, points: Vec<Tick>) -> Result<Self> {
        if points.len() != WAVE_POINTS {
            return Err(PatternError::InsufficientData {
                need: WAVE_POINTS,
                got: points.len(),
            });
        }
        if points.windows(2).any(|p| p[1].position <= p[0].position) {
            return Err(PatternError::InvalidValue("wave points must increase in position"));
        }
        Ok(Self {
            direction,
            points,
            forecast: None,
        })
    }

    pub fn with_forecast(mut self, forecast: RetracementForecast) -> Self {
        self.forecast = Some(forecast);
        self
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn points(&self) -> &[Tick] {
        &self.points
    }

    pub fn forecast(&self) -> Option<&RetracementForecast> {
        self.forecast.as_ref()
    }

    fn value(&self, index: usize) -> f64 {
        point_value(&self.points[index], index, self.direction)
    }

    pub fn legs(&self) -> Vec<WaveLeg> {
        (0..WAVE_POINTS - 1)
            .map(|i| WaveLeg {
                tick_start: self.points[i],
                tick_end: self.points[i + 1],
                value_start: self.value(i),
                value_end: self.value(i + 1),
            })
            .collect()
    }

    pub fn tick_start(&self) -> &Tick {
        &self.points[0]
    }

    pub fn tick_end(&self) -> &Tick {
        &self.points[WAVE_POINTS - 1]
    }

    pub fn value_start(&self) -> f64 {
        self.value(0)
    }

    pub fn value_end(&self) -> f64 {
        self.value(WAVE_POINTS - 1)
    }

    /// Line through the ends of the two retracement legs
    pub fn neckline(&self) -> BoundaryFunction {
        let kind = match self.direction {
            Direction::Ascending => FunctionKind::Lower,
            Direction::Descending => FunctionKind::Upper,
        };
        BoundaryFunction::through(
            (self.points[2].f_var, self.value(2)),
            (self.points[4].f_var, self.value(4)),
            kind,
        )
    }

    /// No tick from the end of leg 2 to the end of leg 5 pierces the
    /// neckline by more than the tolerance.
    pub fn is_neckline_criteria_fulfilled(
        &self,
        series: &TickSeries,
        ctx: &DetectionContext,
    ) -> bool {
        let neckline = self.neckline();
        let tolerance = ctx.tolerance_pct.get();
        series
            .range(self.points[2].position, self.tick_end().position)
            .iter()
            .all(|tick| {
                let line = neckline.value_at(tick.f_var);
                match self.direction {
                    Direction::Ascending => tick.low >= line - line.abs() * tolerance,
                    Direction::Descending => tick.high <= line + line.abs() * tolerance,
                }
            })
    }

    /// Distance of the last crest to the neckline is positive and smaller
    /// than the one of the previous crest.
    pub fn is_closing_triangle_criteria_fulfilled(&self) -> bool {
        let neckline = self.neckline();
        let sign = self.direction.sign();
        let d3 = sign * (self.value(3) - neckline.value_at(self.points[3].f_var));
        let d5 = sign * (self.value(5) - neckline.value_at(self.points[5].f_var));
        0.0 < d5 && d5 < d3
    }

    pub fn is_valid(&self, series: &TickSeries, ctx: &DetectionContext) -> bool {
        self.is_neckline_criteria_fulfilled(series, ctx)
            && self.is_closing_triangle_criteria_fulfilled()
    }
}

// ============================================================
// FORMATION
// ============================================================

/// Valid waves of one direction with the blended retracement target
#[derive(Debug, Clone, PartialEq)]
pub struct FibonacciFormation {
    pattern_type: PatternType,
    direction: Direction,
    valid_waves: Vec<FibonacciWave>,
    target: Option<(i64, f64)>,
}

impl FibonacciFormation {
    /// Keep the waves of `direction` that pass both validity filters.
    pub fn new(
        direction: Direction,
        waves: &[FibonacciWave],
        series: &TickSeries,
        ctx: &DetectionContext,
    ) -> Self {
        let valid_waves: Vec<FibonacciWave> = waves
            .iter()
            .filter(|w| w.direction == direction)
            .filter(|w| {
                let valid = w.is_valid(series, ctx);
                if !valid {
                    log::debug!(
                        "fibonacci {direction} wave {}..{} rejected",
                        w.tick_start().position,
                        w.tick_end().position
                    );
                }
                valid
            })
            .cloned()
            .collect();
        let pattern_type = match direction {
            Direction::Ascending => PatternType::FibonacciAsc,
            Direction::Descending => PatternType::FibonacciDesc,
        };
        let target = Self::blend_target(direction, &valid_waves);
        Self {
            pattern_type,
            direction,
            valid_waves,
            target,
        }
    }

    /// Mean classifier and mean regression forecast over the waves that
    /// carry one; the larger value wins for ascending waves, the smaller
    /// for descending ones.
    fn blend_target(direction: Direction, waves: &[FibonacciWave]) -> Option<(i64, f64)> {
        let forecasts: Vec<&RetracementForecast> =
            waves.iter().filter_map(|w| w.forecast.as_ref()).collect();
        if forecasts.is_empty() {
            return None;
        }
        let n = forecasts.len() as f64;
        let mean = |pick: fn(&RetracementForecast) -> (i64, f64)| {
            let ts = forecasts.iter().map(|f| pick(f).0 as f64).sum::<f64>() / n;
            let value = forecasts.iter().map(|f| pick(f).1).sum::<f64>() / n;
            (ts as i64, value)
        };
        let classifier = mean(|f| f.classifier);
        let regression = mean(|f| f.regression);
        let pick_classifier = match direction {
            Direction::Ascending => classifier.1 >= regression.1,
            Direction::Descending => classifier.1 <= regression.1,
        };
        Some(if pick_classifier { classifier } else { regression })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn valid_waves(&self) -> &[FibonacciWave] {
        &self.valid_waves
    }

    #[inline]
    pub fn are_valid_waves_available(&self) -> bool {
        !self.valid_waves.is_empty()
    }

    fn valid_wave(&self) -> Option<&FibonacciWave> {
        self.valid_waves.first()
    }

    pub fn value_start(&self) -> f64 {
        self.valid_wave().map_or(0.0, |w| w.value_start())
    }

    pub fn value_end(&self) -> f64 {
        self.valid_wave().map_or(0.0, |w| w.value_end())
    }

    /// Distance from wave start to wave end
    pub fn height(&self) -> f64 {
        (self.value_end() - self.value_start()).abs()
    }

    /// Forecast retracement end as `(timestamp, value)`
    pub fn target_retracement(&self) -> Option<(i64, f64)> {
        self.target
    }

    /// Forecast retracement as a share of the wave height in percent
    pub fn forecast_retracement_pct(&self) -> f64 {
        match self.target {
            Some((_, value)) if self.height() > 0.0 => {
                (value - self.value_end()).abs() / self.height() * 100.0
            },
            _ => 0.0,
        }
    }

    pub fn position_span(&self) -> (usize, usize) {
        self.valid_wave()
            .map_or((0, 0), |w| (w.tick_start().position, w.tick_end().position))
    }

    pub fn point_count(&self) -> usize {
        if self.are_valid_waves_available() {
            WAVE_POINTS
        } else {
            0
        }
    }

    /// Constant bounds at the wave's start and end values
    pub fn functions(&self) -> FunctionContainer {
        let (first, last) = self.position_span();
        let (start, end) = (self.value_start(), self.value_end());
        FunctionContainer::new(
            BoundaryFunction::constant(start.max(end), FunctionKind::Upper)
                .with_positions(first, last),
            BoundaryFunction::constant(start.min(end), FunctionKind::Lower)
                .with_positions(first, last),
        )
    }

    pub fn retracement_summary(&self) -> String {
        match self.target {
            Some((ts, value)) => {
                format!("{:.2}%: {value:.2} on {ts}", self.forecast_retracement_pct())
            },
            None => String::new(),
        }
    }
}

impl Formation for FibonacciFormation {
    fn pattern_type(&self) -> PatternType {
        self.pattern_type
    }

    fn is_established(
        &self,
        _part: &PatternPart,
        _categorizer: &ValueCategorizer,
        _ctx: &DetectionContext,
    ) -> bool {
        self.are_valid_waves_available()
    }

    /// The forecast retracement range after the wave finished
    fn expected_win(&self, _part: &PatternPart) -> f64 {
        self.target.map_or(0.0, |(_, value)| (value - self.value_end()).abs())
    }

    fn breakout_direction(&self) -> Option<Direction> {
        Some(match self.direction {
            Direction::Ascending => Direction::Descending,
            Direction::Descending => Direction::Ascending,
        })
    }
}

/// One pattern per wave direction that has at least one valid wave
pub fn detect_fibonacci_patterns(
    ticker: &str,
    series: &TickSeries,
    waves: &[FibonacciWave],
    ctx: &DetectionContext,
) -> Vec<Pattern> {
    [Direction::Ascending, Direction::Descending]
        .into_iter()
        .filter(|d| waves.iter().any(|w| w.direction == *d))
        .filter_map(|d| {
            let formation = FibonacciFormation::new(d, waves, series, ctx);
            build_fibonacci_pattern(ticker, formation, series, ctx)
        })
        .collect()
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Linear legs between turning points at 0, 4, ..., 20
    fn zigzag(values: [f64; WAVE_POINTS]) -> (TickSeries, [usize; WAVE_POINTS]) {
        let positions = [0, 4, 8, 12, 16, 20];
        let mut ticks = Vec::new();
        for i in 0..WAVE_POINTS - 1 {
            let (x0, x1) = (positions[i], positions[i + 1]);
            let (v0, v1) = (values[i], values[i + 1]);
            for x in x0..x1 {
                let v = v0 + (v1 - v0) * (x - x0) as f64 / (x1 - x0) as f64;
                let tick =
                    Tick::new(x, x as i64, v, v + 0.2, v - 0.2, v, 1000.0).with_f_var(x as f64);
                ticks.push(tick);
            }
        }
        let v = values[WAVE_POINTS - 1];
        ticks.push(Tick::new(20, 20, v, v + 0.2, v - 0.2, v, 1000.0).with_f_var(20.0));
        (TickSeries::new(ticks).unwrap(), positions)
    }

    /// Ascending zigzag: troughs on 10 + 0.5x, crests shrinking toward it
    fn wave_series() -> (TickSeries, [usize; WAVE_POINTS]) {
        zigzag([10.0, 20.0, 14.0, 24.0, 18.0, 25.0])
    }

    #[test]
    fn test_leg_values_follow_direction() {
        let (series, positions) = wave_series();
        let wave = FibonacciWave::from_series(Direction::Ascending, &series, positions).unwrap();
        let legs = wave.legs();
        assert_eq!(legs.len(), 5);
        assert!((legs[0].value_start - 9.8).abs() < 1e-9);
        assert!((legs[0].value_end - 20.2).abs() < 1e-9);
        assert!(legs[1].movement() < 0.0);
        assert!((legs[1].retracement_pct(&legs[0]) - 6.4 / 10.4).abs() < 1e-9);
    }

    #[test]
    fn test_valid_ascending_wave() {
        let (series, positions) = wave_series();
        let wave = FibonacciWave::from_series(Direction::Ascending, &series, positions).unwrap();
        let ctx = DetectionContext::default();
        assert!(wave.is_neckline_criteria_fulfilled(&series, &ctx));
        // crest 3 is 8.4 above the neckline, crest 5 only 5.4
        assert!(wave.is_closing_triangle_criteria_fulfilled());
    }

    #[test]
    fn test_wave_rejects_unordered_points() {
        let t = |p: usize| Tick::new(p, p as i64, 1.0, 1.0, 1.0, 1.0, 1.0);
        let points = [t(0), t(2), t(1), t(3), t(4), t(5)];
        assert!(FibonacciWave::new(Direction::Ascending, points).is_err());
    }

    #[test]
    fn test_target_takes_max_for_ascending() {
        let (series, positions) = wave_series();
        let wave = FibonacciWave::from_series(Direction::Ascending, &series, positions)
            .unwrap()
            .with_forecast(RetracementForecast {
                classifier: (30, 20.0),
                regression: (32, 21.0),
            });
        let ctx = DetectionContext::default();
        let formation = FibonacciFormation::new(Direction::Ascending, &[wave], &series, &ctx);
        assert_eq!(formation.pattern_type(), PatternType::FibonacciAsc);
        assert_eq!(formation.target_retracement(), Some((32, 21.0)));
        assert!((formation.height() - (25.2 - 9.8)).abs() < 1e-9);
        assert_eq!(formation.breakout_direction(), Some(Direction::Descending));
        assert!(formation.retracement_summary().ends_with("21.00 on 32"));
    }

    #[test]
    fn test_target_takes_min_for_descending() {
        // mirror image of the ascending wave
        let (series, positions) = zigzag([30.0, 20.0, 26.0, 16.0, 22.0, 15.0]);
        let wave = FibonacciWave::from_series(Direction::Descending, &series, positions)
            .unwrap()
            .with_forecast(RetracementForecast {
                classifier: (30, 20.0),
                regression: (32, 19.0),
            });
        let ctx = DetectionContext::default();
        assert!(wave.is_valid(&series, &ctx));
        let formation =
            FibonacciFormation::new(Direction::Descending, &[wave.clone()], &series, &ctx);
        assert_eq!(formation.pattern_type(), PatternType::FibonacciDesc);
        assert_eq!(formation.target_retracement(), Some((32, 19.0)));
        assert_eq!(formation.breakout_direction(), Some(Direction::Ascending));

        // wave ends on the low of 14.8
        let patterns = detect_fibonacci_patterns("FIB", &series, &[wave], &ctx);
        assert_eq!(patterns.len(), 1);
        assert!((patterns[0].expected_win() - 4.2).abs() < 1e-9);
    }

    #[test]
    fn test_detect_builds_pattern() {
        let (series, positions) = wave_series();
        let wave = FibonacciWave::from_series(Direction::Ascending, &series, positions)
            .unwrap()
            .with_forecast(RetracementForecast {
                classifier: (30, 20.0),
                regression: (32, 21.0),
            });
        let ctx = DetectionContext::default();
        let patterns = detect_fibonacci_patterns("FIB", &series, &[wave], &ctx);
        assert_eq!(patterns.len(), 1);
        let pattern = &patterns[0];
        assert_eq!(pattern.pattern_type(), PatternType::FibonacciAsc);
        assert!((pattern.expected_win() - (25.2 - 21.0)).abs() < 1e-9);
        assert_eq!(pattern.range_position_last(), 20);
    }

    #[test]
    fn test_descending_waves_ignored_for_ascending_formation() {
        let (series, positions) = wave_series();
        let wave = FibonacciWave::from_series(Direction::Ascending, &series, positions).unwrap();
        let ctx = DetectionContext::default();
        let formation = FibonacciFormation::new(Direction::Descending, &[wave], &series, &ctx);
        assert!(!formation.are_valid_waves_available());
        assert_eq!(formation.retracement_summary(), "");
    }
}

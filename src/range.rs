//! Boundary-range detection over extrema
//!
//! An upper detector walks the maxima (using highs), a lower detector the
//! minima (using lows). For every start extremum it collects forward
//! candidates whose connecting line tightens monotonically, grows a range
//! while all members stay within tolerance of the newest line, and cuts the
//! range when a later extremum breaks through.

use std::collections::HashSet;

use crate::context::DetectionContext;
use crate::function::{is_in_tolerance, BoundaryFunction, FunctionKind};
use crate::tick::Tick;

/// Which boundary a range describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeSide {
    /// Built from maxima, boundary through highs
    Upper,
    /// Built from minima, boundary through lows
    Lower,
}

impl RangeSide {
    #[inline]
    pub fn value(self, tick: &Tick) -> f64 {
        match self {
            RangeSide::Upper => tick.high,
            RangeSide::Lower => tick.low,
        }
    }

    #[inline]
    pub fn accepts(self, tick: &Tick) -> bool {
        match self {
            RangeSide::Upper => tick.is_max(),
            RangeSide::Lower => tick.is_min(),
        }
    }

    #[inline]
    pub fn opposite(self) -> RangeSide {
        match self {
            RangeSide::Upper => RangeSide::Lower,
            RangeSide::Lower => RangeSide::Upper,
        }
    }

    pub(crate) fn kind(self) -> FunctionKind {
        match self {
            RangeSide::Upper => FunctionKind::Upper,
            RangeSide::Lower => FunctionKind::Lower,
        }
    }

    /// Line through two ticks on this side
    fn line(self, a: &Tick, b: &Tick) -> BoundaryFunction {
        BoundaryFunction::through((a.f_var, self.value(a)), (b.f_var, self.value(b)), self.kind())
    }

    /// Upper boundaries may only steepen, lower boundaries only flatten.
    fn is_slope_correctly_changing(self, old: &BoundaryFunction, new: &BoundaryFunction) -> bool {
        match self {
            RangeSide::Upper => new.slope >= old.slope,
            RangeSide::Lower => new.slope <= old.slope,
        }
    }

    /// The newest line passes beyond the last accepted tick.
    fn is_breakout(self, last: &Tick, new: &BoundaryFunction) -> bool {
        let f_value = new.value_at(last.f_var);
        match self {
            RangeSide::Upper => last.high < f_value,
            RangeSide::Lower => last.low > f_value,
        }
    }
}

// ============================================================
// PATTERN RANGE
// ============================================================

/// Position-ordered extrema forming one boundary side
#[derive(Debug, Clone)]
pub struct PatternRange {
    side: RangeSide,
    ticks: Vec<Tick>,
    f_param: Option<BoundaryFunction>,
    f_regression: Option<BoundaryFunction>,
    f_boundary_list: Vec<BoundaryFunction>,
    f_parallel: Option<BoundaryFunction>,
    f_const: Option<BoundaryFunction>,
    breakout_successor: Option<Tick>,
}

impl PatternRange {
    fn start(side: RangeSide, tick: Tick) -> Self {
        Self {
            side,
            ticks: vec![tick],
            f_param: None,
            f_regression: None,
            f_boundary_list: Vec::new(),
            f_parallel: None,
            f_const: None,
            breakout_successor: None,
        }
    }

    fn add_tick(&mut self, tick: Tick, f_param: Option<BoundaryFunction>) {
        self.ticks.push(tick);
        if f_param.is_some() {
            self.f_param = f_param;
        }
    }

    /// Freeze the range: primary line, regression and the complementary
    /// candidates from the opposite extrema within its span.
    fn finalize(&mut self, min_max: &[Tick], tolerance_pct: f64) {
        let (first, last) = (self.tick_first(), self.tick_last());
        let (position_first, position_last) = (first.position, last.position);
        let primary = self.f_param.unwrap_or_else(|| self.side.line(&first, &last));
        self.f_param = Some(primary.with_positions(position_first, position_last));

        let points: Vec<_> = self.ticks.iter().map(|t| (t.f_var, self.side.value(t))).collect();
        self.f_regression = Some(
            BoundaryFunction::fit(&points, FunctionKind::Regression)
                .with_positions(position_first, position_last),
        );

        let opposite = self.side.opposite();
        let others: Vec<&Tick> = min_max
            .iter()
            .filter(|t| (position_first..=position_last).contains(&t.position))
            .filter(|t| opposite.accepts(t))
            .collect();

        self.f_boundary_list = boundary_candidates(opposite, &others, tolerance_pct)
            .into_iter()
            .map(|f| f.with_positions(position_first, position_last))
            .collect();

        let extreme = match opposite {
            RangeSide::Lower => others.iter().min_by(|a, b| a.low.total_cmp(&b.low)),
            RangeSide::Upper => others.iter().max_by(|a, b| a.high.total_cmp(&b.high)),
        };
        if let Some(tick) = extreme {
            let value = opposite.value(tick);
            self.f_parallel = Some(primary.parallel_through((tick.f_var, value), opposite.kind()));
            self.f_const = Some(
                BoundaryFunction::constant(value, opposite.kind())
                    .with_positions(position_first, position_last),
            );
        }
    }

    #[inline]
    pub fn side(&self) -> RangeSide {
        self.side
    }

    #[inline]
    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    pub fn tick_first(&self) -> Tick {
        self.ticks[0]
    }

    pub fn tick_last(&self) -> Tick {
        self.ticks[self.ticks.len() - 1]
    }

    #[inline]
    pub fn position_first(&self) -> usize {
        self.ticks[0].position
    }

    #[inline]
    pub fn position_last(&self) -> usize {
        self.ticks[self.ticks.len() - 1].position
    }

    #[inline]
    pub fn range_elements(&self) -> usize {
        self.ticks.len()
    }

    /// Span in tick positions
    #[inline]
    pub fn length(&self) -> usize {
        self.position_last() - self.position_first()
    }

    pub fn position_list(&self) -> Vec<usize> {
        self.ticks.iter().map(|t| t.position).collect()
    }

    /// Primary boundary line (set once finalized)
    pub fn f_param(&self) -> Option<&BoundaryFunction> {
        self.f_param.as_ref()
    }

    pub fn f_regression(&self) -> Option<&BoundaryFunction> {
        self.f_regression.as_ref()
    }

    pub fn f_parallel(&self) -> Option<&BoundaryFunction> {
        self.f_parallel.as_ref()
    }

    pub fn f_const(&self) -> Option<&BoundaryFunction> {
        self.f_const.as_ref()
    }

    pub fn breakout_successor(&self) -> Option<&Tick> {
        self.breakout_successor.as_ref()
    }

    /// Opposite-side candidates for channels, triangles and wedges: every
    /// boundary line plus the parallel line, without duplicates.
    pub fn complementary_functions(&self) -> Vec<BoundaryFunction> {
        let mut functions = self.f_boundary_list.clone();
        if let Some(parallel) = self.f_parallel {
            if !functions.iter().any(|f| f.same_line(&parallel)) {
                functions.push(parallel);
            }
        }
        functions
    }

    #[inline]
    pub fn is_min_length_reached(&self, min_length: usize) -> bool {
        self.range_elements() >= min_length
    }

    /// Every given position is part of this range.
    pub fn is_covering_all_positions(&self, positions: &[usize]) -> bool {
        let own: HashSet<usize> = self.ticks.iter().map(|t| t.position).collect();
        positions.iter().all(|p| own.contains(p))
    }

    pub fn are_values_in_function_tolerance_range(
        &self,
        f: &BoundaryFunction,
        tolerance_pct: f64,
    ) -> bool {
        self.ticks
            .iter()
            .all(|t| is_in_tolerance(self.side.value(t), f.value_at(t.f_var), tolerance_pct))
    }

    /// Human-readable one-liner
    pub fn details(&self) -> String {
        let successor = self
            .breakout_successor
            .map(|t| t.position.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{:?} range {:?} (breakout successor: {successor})",
            self.side,
            self.position_list()
        )
    }
}

/// Lines through pairs of opposite extrema that no other extremum crosses
/// by more than the tolerance.
fn boundary_candidates(
    side: RangeSide,
    ticks: &[&Tick],
    tolerance_pct: f64,
) -> Vec<BoundaryFunction> {
    let mut result: Vec<BoundaryFunction> = Vec::new();
    for (a_index, a) in ticks.iter().enumerate() {
        for b in &ticks[a_index + 1..] {
            let f = side.line(a, b);
            let holds = ticks.iter().all(|t| {
                let bound = f.value_at(t.f_var);
                let slack = bound.abs() * tolerance_pct;
                match side {
                    RangeSide::Lower => side.value(t) >= bound - slack,
                    RangeSide::Upper => side.value(t) <= bound + slack,
                }
            });
            if holds && !result.iter().any(|r| r.same_line(&f)) {
                result.push(f);
            }
        }
    }
    result
}

// ============================================================
// DETECTOR
// ============================================================

/// Finds boundary ranges on one side of the extrema sequence
#[derive(Debug, Clone, Copy)]
pub struct PatternRangeDetector<'a> {
    side: RangeSide,
    ctx: &'a DetectionContext,
}

impl<'a> PatternRangeDetector<'a> {
    pub fn new(side: RangeSide, ctx: &'a DetectionContext) -> Self {
        Self { side, ctx }
    }

    /// Detect finalized ranges. `min_max` is the extremum-only subsequence;
    /// ticks of the other side are ignored for growth but feed the
    /// complementary functions.
    pub fn detect(&self, min_max: &[Tick]) -> Vec<PatternRange> {
        let ticks: Vec<Tick> = min_max.iter().filter(|t| self.side.accepts(t)).copied().collect();
        let min_length = self.ctx.min_range_elements.get();
        let tolerance = self.ctx.tolerance_pct.get();
        let mut accepted: Vec<PatternRange> = Vec::new();

        if ticks.len() < min_length {
            return accepted;
        }

        for i in 0..ticks.len() - (min_length - 1) {
            let tick_i = ticks[i];
            let candidates = self.next_position_candidates(&ticks, i);
            if candidates.len() < 2 {
                continue;
            }

            let mut range = PatternRange::start(self.side, tick_i);
            for (k, f_new) in candidates {
                let tick_k = ticks[k];
                if range.range_elements() == 1 {
                    range.add_tick(tick_k, None);
                } else if range.are_values_in_function_tolerance_range(&f_new, tolerance) {
                    range.add_tick(tick_k, Some(f_new));
                } else if self.side.is_breakout(&range.tick_last(), &f_new) {
                    range.breakout_successor = Some(tick_k);
                    self.add_after_check(&mut accepted, range, min_max);
                    range = PatternRange::start(self.side, tick_i);
                    range.add_tick(tick_k, None);
                }
            }
            self.add_after_check(&mut accepted, range, min_max);
        }

        accepted
    }

    /// Forward ticks whose connecting line tightens, or that stay within
    /// tolerance of the current line (old slope kept).
    fn next_position_candidates(&self, ticks: &[Tick], i: usize) -> Vec<(usize, BoundaryFunction)> {
        let tick_i = &ticks[i];
        let tolerance = self.ctx.tolerance_pct.get();
        let mut f_current: Option<BoundaryFunction> = None;
        let mut candidates: Vec<(usize, BoundaryFunction)> = Vec::new();

        for (k, tick_k) in ticks.iter().enumerate().skip(i + 1) {
            let f_ik = self.side.line(tick_i, tick_k);
            match f_current {
                Some(f) if !self.side.is_slope_correctly_changing(&f, &f_ik) => {
                    let Some(&(last_k, _)) = candidates.last() else {
                        continue;
                    };
                    let last = &ticks[last_k];
                    if f_ik.is_in_tolerance(last.f_var, self.side.value(last), tolerance) {
                        candidates.push((k, f));
                    }
                },
                _ => {
                    f_current = Some(f_ik);
                    candidates.push((k, f_ik));
                },
            }
        }
        candidates
    }

    fn add_after_check(
        &self,
        accepted: &mut Vec<PatternRange>,
        mut range: PatternRange,
        min_max: &[Tick],
    ) {
        if !range.is_min_length_reached(self.ctx.min_range_elements.get()) {
            return;
        }
        let positions = range.position_list();
        if accepted.iter().any(|old| old.is_covering_all_positions(&positions)) {
            log::debug!(
                "{:?} range {:?} rejected: covered by an accepted range",
                self.side,
                positions
            );
            return;
        }
        range.finalize(min_max, self.ctx.tolerance_pct.get());
        log::debug!("{}", range.details());
        accepted.push(range);
    }
}

// ============================================================
// TESTS
// ============================================================

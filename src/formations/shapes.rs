//! Channel, triangle, TKE and head-shoulder formations

use crate::categorizer::{ValueCategorizer, ValueCategory};
use crate::context::DetectionContext;
use crate::formations::{Formation, PatternPart, PatternType};
use crate::function::{is_in_tolerance, BoundaryFunction, FunctionContainer, FunctionKind};
use crate::range::{PatternRange, RangeSide};
use crate::tick::Tick;
use crate::Direction;

/// Touch/inside hits required on each boundary
const MIN_BOUNDARY_HITS: usize = 2;

fn has_boundary_hits(categorizer: &ValueCategorizer) -> bool {
    categorizer.count(ValueCategory::UpperIn, None) >= MIN_BOUNDARY_HITS
        && categorizer.count(ValueCategory::LowerIn, None) >= MIN_BOUNDARY_HITS
}

// ============================================================
// FORMATIONS
// ============================================================

/// Parallel boundaries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelFormation {
    pattern_type: PatternType,
}

impl ChannelFormation {
    pub fn new(pattern_type: PatternType) -> Self {
        Self { pattern_type }
    }
}

impl Formation for ChannelFormation {
    fn pattern_type(&self) -> PatternType {
        self.pattern_type
    }

    fn is_established(
        &self,
        part: &PatternPart,
        categorizer: &ValueCategorizer,
        _ctx: &DetectionContext,
    ) -> bool {
        part.height() > 0.0 && has_boundary_hits(categorizer)
    }

    fn expected_win(&self, part: &PatternPart) -> f64 {
        part.height()
    }

    fn breakout_direction(&self) -> Option<Direction> {
        None
    }
}

/// Converging boundaries: symmetric, flat-sided triangles and wedges
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleFormation {
    pattern_type: PatternType,
}

impl TriangleFormation {
    pub fn new(pattern_type: PatternType) -> Self {
        Self { pattern_type }
    }
}

impl Formation for TriangleFormation {
    fn pattern_type(&self) -> PatternType {
        self.pattern_type
    }

    fn is_established(
        &self,
        part: &PatternPart,
        categorizer: &ValueCategorizer,
        _ctx: &DetectionContext,
    ) -> bool {
        part.height_at_last_position() > 0.0 && has_boundary_hits(categorizer)
    }

    fn expected_win(&self, part: &PatternPart) -> f64 {
        part.height() / 2.0
    }

    fn breakout_direction(&self) -> Option<Direction> {
        match self.pattern_type {
            PatternType::TriangleTop | PatternType::FallingWedge => Some(Direction::Ascending),
            PatternType::TriangleBottom | PatternType::RisingWedge => Some(Direction::Descending),
            _ => None,
        }
    }
}

/// Sloped boundary converging onto a constant one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TkeFormation {
    pattern_type: PatternType,
}

impl TkeFormation {
    pub fn new(pattern_type: PatternType) -> Self {
        Self { pattern_type }
    }
}

impl Formation for TkeFormation {
    fn pattern_type(&self) -> PatternType {
        self.pattern_type
    }

    fn is_established(
        &self,
        part: &PatternPart,
        _categorizer: &ValueCategorizer,
        ctx: &DetectionContext,
    ) -> bool {
        let first = part.height_at_first_position();
        first > 0.0 && part.height_at_last_position() / first < ctx.tke_height_ratio.get()
    }

    fn expected_win(&self, part: &PatternPart) -> f64 {
        part.height()
    }

    fn breakout_direction(&self) -> Option<Direction> {
        match self.pattern_type {
            PatternType::TkeDown => Some(Direction::Ascending),
            _ => Some(Direction::Descending),
        }
    }
}

/// Head-shoulder top or bottom with a fixed head-to-neckline projection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadShoulderFormation {
    pattern_type: PatternType,
    head_height: f64,
}

impl HeadShoulderFormation {
    pub fn from_shape(shape: &HeadShoulderShape) -> Self {
        Self {
            pattern_type: shape.pattern_type,
            head_height: shape.head_height,
        }
    }
}

impl Formation for HeadShoulderFormation {
    fn pattern_type(&self) -> PatternType {
        self.pattern_type
    }

    fn is_established(
        &self,
        _part: &PatternPart,
        categorizer: &ValueCategorizer,
        _ctx: &DetectionContext,
    ) -> bool {
        let neck_hits = match self.pattern_type {
            PatternType::HeadShoulder => categorizer.count(ValueCategory::LowerIn, None),
            _ => categorizer.count(ValueCategory::UpperIn, None),
        };
        self.head_height > 0.0 && neck_hits >= MIN_BOUNDARY_HITS
    }

    fn expected_win(&self, _part: &PatternPart) -> f64 {
        self.head_height
    }

    fn breakout_direction(&self) -> Option<Direction> {
        match self.pattern_type {
            PatternType::HeadShoulder => Some(Direction::Descending),
            _ => Some(Direction::Ascending),
        }
    }
}

// ============================================================
// CLASSIFICATION
// ============================================================

/// Type from the normalized slopes of both boundaries; diverging or
/// crossing boundaries yield `None`.
pub fn classify_boundaries(
    functions: &FunctionContainer,
    x_first: f64,
    x_last: f64,
    ctx: &DetectionContext,
) -> Option<PatternType> {
    let breadth_first = functions.breadth_at(x_first);
    let breadth_last = functions.breadth_at(x_last);
    if breadth_first <= 0.0 || breadth_last <= 0.0 {
        return None;
    }

    let x_mid = (x_first + x_last) / 2.0;
    let mid_level = (functions.upper_at(x_mid) + functions.lower_at(x_mid)) / 2.0;
    let du = functions.f_upper.slope_pct(x_first, x_last, mid_level);
    let dl = functions.f_lower.slope_pct(x_first, x_last, mid_level);
    let flat = ctx.flat_slope_pct.get();
    let parallel = ctx.parallel_slope_pct.get();

    if (du - dl).abs() <= parallel {
        return Some(if du > flat {
            PatternType::ChannelUp
        } else if du < -flat {
            PatternType::ChannelDown
        } else {
            PatternType::Channel
        });
    }
    if du > dl {
        return None;
    }

    Some(if du.abs() <= flat && dl > flat {
        PatternType::TriangleTop
    } else if dl.abs() <= flat && du < -flat {
        PatternType::TriangleBottom
    } else if du > flat && dl > flat {
        PatternType::RisingWedge
    } else if du < -flat && dl < -flat {
        PatternType::FallingWedge
    } else {
        PatternType::Triangle
    })
}

/// Candidate (type, functions) pairs for a finalized range: one per
/// complementary boundary plus a TKE candidate on the constant function.
pub fn candidates_for_range(
    range: &PatternRange,
    ctx: &DetectionContext,
) -> Vec<(PatternType, FunctionContainer)> {
    let Some(primary) = range.f_param().copied() else {
        return Vec::new();
    };
    let x_first = range.tick_first().f_var;
    let x_last = range.tick_last().f_var;
    let regression = range.f_regression().copied();

    let container = |other: BoundaryFunction| {
        let functions = match range.side() {
            RangeSide::Upper => FunctionContainer::new(primary, other),
            RangeSide::Lower => FunctionContainer::new(other, primary),
        };
        match regression {
            Some(f) => functions.with_regression(f),
            None => functions,
        }
    };

    let mut candidates = Vec::new();
    for other in range.complementary_functions() {
        let functions = container(other);
        if let Some(pattern_type) = classify_boundaries(&functions, x_first, x_last, ctx) {
            candidates.push((pattern_type, functions));
        }
    }

    if let Some(f_const) = range.f_const().copied() {
        let functions = container(f_const);
        let mid_level = (functions.upper_at(x_first) + functions.lower_at(x_first)) / 2.0;
        let slope = primary.slope_pct(x_first, x_last, mid_level);
        let flat = ctx.flat_slope_pct.get();
        let tke = match range.side() {
            RangeSide::Upper if slope < -flat => Some(PatternType::TkeDown),
            RangeSide::Lower if slope > flat => Some(PatternType::TkeUp),
            _ => None,
        };
        if let (Some(pattern_type), true) = (tke, functions.breadth_at(x_last) > 0.0) {
            candidates.push((pattern_type, functions));
        }
    }
    candidates
}

// ============================================================
// HEAD-SHOULDER
// ============================================================

/// Three consecutive extrema (shoulder, head, shoulder) with their neckline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadShoulderShape {
    pub pattern_type: PatternType,
    pub shoulder_left: Tick,
    pub head: Tick,
    pub shoulder_right: Tick,
    pub neck_left: Tick,
    pub neck_right: Tick,
    pub neckline: BoundaryFunction,
    pub head_height: f64,
}

impl HeadShoulderShape {
    /// Shoulders, head and both neck ticks
    pub const POINTS: usize = 5;

    pub fn point_count(&self) -> usize {
        Self::POINTS
    }

    /// Neckline plus its parallel through the head as boundaries; the line
    /// through both shoulders as helper.
    pub fn functions(&self) -> FunctionContainer {
        let top = self.pattern_type == PatternType::HeadShoulder;
        let side = if top { RangeSide::Upper } else { RangeSide::Lower };
        let head_point = (self.head.f_var, side.value(&self.head));
        let head_line = self.neckline.parallel_through(head_point, FunctionKind::Helper);
        let shoulder_line = BoundaryFunction::through(
            (self.shoulder_left.f_var, side.value(&self.shoulder_left)),
            (self.shoulder_right.f_var, side.value(&self.shoulder_right)),
            FunctionKind::Helper,
        );
        let neckline = self.neckline;
        if top {
            let upper = BoundaryFunction { kind: FunctionKind::Upper, ..head_line };
            let lower = BoundaryFunction { kind: FunctionKind::Lower, ..neckline };
            FunctionContainer::new(upper, lower).with_helpers(shoulder_line, neckline)
        } else {
            let upper = BoundaryFunction { kind: FunctionKind::Upper, ..neckline };
            let lower = BoundaryFunction { kind: FunctionKind::Lower, ..head_line };
            FunctionContainer::new(upper, lower).with_helpers(neckline, shoulder_line)
        }
    }
}

/// Head-shoulder tops on the maxima and bottoms on the minima
pub fn detect_head_shoulders(min_max: &[Tick], ctx: &DetectionContext) -> Vec<HeadShoulderShape> {
    let mut shapes = find_shapes(min_max, RangeSide::Upper, ctx);
    shapes.extend(find_shapes(min_max, RangeSide::Lower, ctx));
    shapes
}

fn find_shapes(
    min_max: &[Tick],
    side: RangeSide,
    ctx: &DetectionContext,
) -> Vec<HeadShoulderShape> {
    let peaks: Vec<&Tick> = min_max.iter().filter(|t| side.accepts(t)).collect();
    let neck_side = side.opposite();
    let tolerance = ctx.in_range_tolerance_pct.get();
    let mut shapes = Vec::new();

    for window in peaks.windows(3) {
        let (left, head, right) = (window[0], window[1], window[2]);
        let (v_left, v_head, v_right) = (side.value(left), side.value(head), side.value(right));
        let head_beyond = match side {
            RangeSide::Upper => v_head > v_left && v_head > v_right,
            RangeSide::Lower => v_head < v_left && v_head < v_right,
        };
        if !head_beyond || !is_in_tolerance(v_left, v_right, tolerance) {
            continue;
        }

        let neck = |from: usize, to: usize| {
            let between = min_max
                .iter()
                .filter(|t| t.position > from && t.position < to && neck_side.accepts(t));
            match neck_side {
                RangeSide::Lower => between.min_by(|a, b| a.low.total_cmp(&b.low)),
                RangeSide::Upper => between.max_by(|a, b| a.high.total_cmp(&b.high)),
            }
            .copied()
        };
        let necks = (neck(left.position, head.position), neck(head.position, right.position));
        let (Some(neck_left), Some(neck_right)) = necks else {
            continue;
        };

        let neckline = BoundaryFunction::through(
            (neck_left.f_var, neck_side.value(&neck_left)),
            (neck_right.f_var, neck_side.value(&neck_right)),
            neck_side.kind(),
        );
        let head_height = (v_head - neckline.value_at(head.f_var)) * side_sign(side);
        let shoulders_clear = [left, right]
            .iter()
            .all(|t| (side.value(t) - neckline.value_at(t.f_var)) * side_sign(side) > 0.0);
        if head_height <= 0.0 || !shoulders_clear {
            continue;
        }

        shapes.push(HeadShoulderShape {
            pattern_type: match side {
                RangeSide::Upper => PatternType::HeadShoulder,
                RangeSide::Lower => PatternType::HeadShoulderBottom,
            },
            shoulder_left: *left,
            head: *head,
            shoulder_right: *right,
            neck_left,
            neck_right,
            neckline,
            head_height,
        });
    }
    shapes
}

#[inline]
fn side_sign(side: RangeSide) -> f64 {
    match side {
        RangeSide::Upper => 1.0,
        RangeSide::Lower => -1.0,
    }
}

// ============================================================
// TESTS
// ============================================================

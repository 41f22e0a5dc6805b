//! Formations built on boundary ranges
//!
//! A [`Pattern`] aggregates a finalized range (or Fibonacci waves), the
//! pattern's boundary functions, an optional breakout and the simulated
//! [`TradeResult`]. Formation-specific rules live behind the [`Formation`]
//! trait and are dispatched through [`BuiltinFormation`].

pub mod fibonacci;
pub mod part;
pub mod pattern;
pub mod result;
pub mod shapes;

use serde::{Deserialize, Serialize};

pub use fibonacci::FibonacciFormation;
pub use part::PatternPart;
pub use pattern::{Pattern, TouchPoints};
pub use result::TradeResult;
pub use shapes::{
    ChannelFormation, HeadShoulderFormation, HeadShoulderShape, TkeFormation, TriangleFormation,
};

use crate::breakout::PatternBreakout;
use crate::categorizer::ValueCategorizer;
use crate::context::DetectionContext;
use crate::function::FunctionContainer;
use crate::range::PatternRange;
use crate::tick::{Tick, TickSeries};
use crate::Direction;

// ============================================================
// PATTERN TYPE
// ============================================================

/// Formation type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Channel,
    ChannelUp,
    ChannelDown,
    Triangle,
    /// Flat top, rising bottom
    TriangleTop,
    /// Flat bottom, falling top
    TriangleBottom,
    RisingWedge,
    FallingWedge,
    /// Falling top converging onto a constant bottom
    TkeDown,
    /// Rising bottom converging onto a constant top
    TkeUp,
    HeadShoulder,
    HeadShoulderBottom,
    FibonacciAsc,
    FibonacciDesc,
}

impl PatternType {
    /// Types found by range/shape detection (Fibonacci needs supplied waves)
    pub const DETECTABLE: [PatternType; 12] = [
        PatternType::Channel,
        PatternType::ChannelUp,
        PatternType::ChannelDown,
        PatternType::Triangle,
        PatternType::TriangleTop,
        PatternType::TriangleBottom,
        PatternType::RisingWedge,
        PatternType::FallingWedge,
        PatternType::TkeDown,
        PatternType::TkeUp,
        PatternType::HeadShoulder,
        PatternType::HeadShoulderBottom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PatternType::Channel => "channel",
            PatternType::ChannelUp => "channel_up",
            PatternType::ChannelDown => "channel_down",
            PatternType::Triangle => "triangle",
            PatternType::TriangleTop => "triangle_top",
            PatternType::TriangleBottom => "triangle_bottom",
            PatternType::RisingWedge => "rising_wedge",
            PatternType::FallingWedge => "falling_wedge",
            PatternType::TkeDown => "tke_down",
            PatternType::TkeUp => "tke_up",
            PatternType::HeadShoulder => "head_shoulder",
            PatternType::HeadShoulderBottom => "head_shoulder_bottom",
            PatternType::FibonacciAsc => "fibonacci_asc",
            PatternType::FibonacciDesc => "fibonacci_desc",
        }
    }

    #[inline]
    pub fn is_channel(self) -> bool {
        matches!(self, PatternType::Channel | PatternType::ChannelUp | PatternType::ChannelDown)
    }

    #[inline]
    pub fn is_triangle(self) -> bool {
        matches!(
            self,
            PatternType::Triangle
                | PatternType::TriangleTop
                | PatternType::TriangleBottom
                | PatternType::RisingWedge
                | PatternType::FallingWedge
        )
    }

    #[inline]
    pub fn is_tke(self) -> bool {
        matches!(self, PatternType::TkeDown | PatternType::TkeUp)
    }

    #[inline]
    pub fn is_head_shoulder(self) -> bool {
        matches!(self, PatternType::HeadShoulder | PatternType::HeadShoulderBottom)
    }

    #[inline]
    pub fn is_fibonacci(self) -> bool {
        matches!(self, PatternType::FibonacciAsc | PatternType::FibonacciDesc)
    }

    /// Height is the bound difference at the end instead of the mean width
    #[inline]
    pub fn uses_bound_height(self) -> bool {
        self.is_tke() || self.is_fibonacci()
    }
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================
// FORMATION TRAIT
// ============================================================

/// Formation-specific rules shared by every pattern variant
pub trait Formation {
    fn pattern_type(&self) -> PatternType;

    /// Whether the main part is ready for a breakout
    fn is_established(
        &self,
        part: &PatternPart,
        categorizer: &ValueCategorizer,
        ctx: &DetectionContext,
    ) -> bool;

    /// Price distance the formation projects beyond its breakout bound
    fn expected_win(&self, part: &PatternPart) -> f64;

    /// Breakout direction the formation typically resolves in, if any
    fn breakout_direction(&self) -> Option<Direction>;
}

macro_rules! define_formations {
    (
        $(
            $variant:ident($formation:ty)
        ),* $(,)?
    ) => {
        /// All formation variants - static dispatch via enum
        #[derive(Debug, Clone, PartialEq)]
        pub enum BuiltinFormation {
            $($variant($formation)),*
        }

        impl Formation for BuiltinFormation {
            #[inline]
            fn pattern_type(&self) -> PatternType {
                match self {
                    $(Self::$variant(f) => Formation::pattern_type(f)),*
                }
            }

            #[inline]
            fn is_established(
                &self,
                part: &PatternPart,
                categorizer: &ValueCategorizer,
                ctx: &DetectionContext,
            ) -> bool {
                match self {
                    $(Self::$variant(f) => Formation::is_established(f, part, categorizer, ctx)),*
                }
            }

            #[inline]
            fn expected_win(&self, part: &PatternPart) -> f64 {
                match self {
                    $(Self::$variant(f) => Formation::expected_win(f, part)),*
                }
            }

            #[inline]
            fn breakout_direction(&self) -> Option<Direction> {
                match self {
                    $(Self::$variant(f) => Formation::breakout_direction(f)),*
                }
            }
        }

        $(
            impl From<$formation> for BuiltinFormation {
                fn from(f: $formation) -> Self {
                    Self::$variant(f)
                }
            }
        )*
    };
}

define_formations! {
    Channel(ChannelFormation),
    Triangle(TriangleFormation),
    Tke(TkeFormation),
    HeadShoulder(HeadShoulderFormation),
    Fibonacci(FibonacciFormation),
}

impl BuiltinFormation {
    /// Formation for a range-based type. Head-shoulder and Fibonacci need
    /// their shape data and are built by their own detectors.
    pub fn for_range_type(pattern_type: PatternType) -> Option<Self> {
        if pattern_type.is_channel() {
            Some(ChannelFormation::new(pattern_type).into())
        } else if pattern_type.is_triangle() {
            Some(TriangleFormation::new(pattern_type).into())
        } else if pattern_type.is_tke() {
            Some(TkeFormation::new(pattern_type).into())
        } else {
            None
        }
    }
}

// ============================================================
// PATTERN FACTORY
// ============================================================

/// Extrema within `[first, last]`
fn extrema_in_span(series: &TickSeries, first: usize, last: usize) -> Vec<Tick> {
    series
        .range(first, last)
        .iter()
        .filter(|t| t.extremum.is_any())
        .copied()
        .collect()
}

/// First tick after `position_last` (within `max_distance`) whose close
/// leaves the pattern by more than the tolerance range.
pub(crate) fn find_breakout(
    series: &TickSeries,
    functions: &FunctionContainer,
    position_last: usize,
    max_distance: usize,
    ctx: &DetectionContext,
) -> Option<PatternBreakout> {
    for position in position_last + 1..=position_last + max_distance.max(1) {
        let (Some(previous), Some(tick)) = (series.get(position - 1), series.get(position)) else {
            break;
        };
        let breakout = PatternBreakout::new(previous, tick, functions, ctx);
        if tick.close > breakout.limit_upper() || tick.close < breakout.limit_lower() {
            return Some(breakout);
        }
    }
    None
}

struct Assembly<'a> {
    ticker: &'a str,
    formation: BuiltinFormation,
    functions: FunctionContainer,
    position_first: usize,
    position_last: usize,
    range_elements: usize,
}

fn assemble(
    assembly: Assembly<'_>,
    series: &TickSeries,
    ctx: &DetectionContext,
) -> Option<Pattern> {
    let pattern_type = assembly.formation.pattern_type();
    let main_ticks = series.range(assembly.position_first, assembly.position_last);
    let part_main = PatternPart::new(pattern_type, main_ticks, &assembly.functions, None)?;

    let extrema = extrema_in_span(series, assembly.position_first, assembly.position_last);
    let categorizer = ValueCategorizer::new(&extrema, &assembly.functions, ctx);
    if !assembly.formation.is_established(&part_main, &categorizer, ctx) {
        log::debug!(
            "{}: {pattern_type} {}..{} not established",
            assembly.ticker,
            assembly.position_first,
            assembly.position_last
        );
        return None;
    }

    let mut pattern = Pattern::new(
        assembly.ticker,
        assembly.formation,
        assembly.functions,
        part_main,
        assembly.range_elements,
        &categorizer,
    );

    let max_distance = assembly.position_last - assembly.position_first;
    let breakout =
        find_breakout(series, &assembly.functions, assembly.position_last, max_distance, ctx);
    if let Some(breakout) = breakout {
        if breakout.is_signal() {
            pattern.attach_breakout(breakout, series, ctx);
        } else {
            log::debug!("{}: breakout without signal ({})", pattern.id(), breakout.summary());
        }
    }
    Some(pattern)
}

/// Build a range-based pattern (channel, triangle, wedge, TKE)
pub fn build_pattern(
    ticker: &str,
    pattern_type: PatternType,
    range: &PatternRange,
    functions: FunctionContainer,
    series: &TickSeries,
    ctx: &DetectionContext,
) -> Option<Pattern> {
    let formation = BuiltinFormation::for_range_type(pattern_type)?;
    assemble(
        Assembly {
            ticker,
            formation,
            functions,
            position_first: range.position_first(),
            position_last: range.position_last(),
            range_elements: range.range_elements(),
        },
        series,
        ctx,
    )
}

/// Build a head-shoulder pattern from a detected shape
pub fn build_head_shoulder_pattern(
    ticker: &str,
    shape: HeadShoulderShape,
    series: &TickSeries,
    ctx: &DetectionContext,
) -> Option<Pattern> {
    let functions = shape.functions();
    let position_first = shape.shoulder_left.position;
    let position_last = shape.shoulder_right.position;
    assemble(
        Assembly {
            ticker,
            formation: HeadShoulderFormation::from_shape(&shape).into(),
            functions,
            position_first,
            position_last,
            range_elements: shape.point_count(),
        },
        series,
        ctx,
    )
}

/// Build a Fibonacci pattern. Its main part spans the waves; no breakout
/// search is made at detection time.
pub(crate) fn build_fibonacci_pattern(
    ticker: &str,
    formation: FibonacciFormation,
    series: &TickSeries,
    ctx: &DetectionContext,
) -> Option<Pattern> {
    let functions = formation.functions();
    let (position_first, position_last) = formation.position_span();
    let pattern_type = formation.pattern_type();
    let main_ticks = series.range(position_first, position_last);
    let part_main = PatternPart::new(pattern_type, main_ticks, &functions, None)?;
    let extrema = extrema_in_span(series, position_first, position_last);
    let categorizer = ValueCategorizer::new(&extrema, &functions, ctx);
    if !formation.is_established(&part_main, &categorizer, ctx) {
        return None;
    }
    let elements = formation.point_count();
    Some(Pattern::new(ticker, formation.into(), functions, part_main, elements, &categorizer))
}

/// Drop patterns that overlap a later-ending pattern of the same type.
/// Equal ends keep the longer one, then the earlier in input order.
pub fn supersede_overlapping(patterns: Vec<Pattern>) -> Vec<Pattern> {
    let beats = |a: &Pattern, b: &Pattern| {
        (a.range_position_last(), std::cmp::Reverse(a.range_position_first()))
            > (b.range_position_last(), std::cmp::Reverse(b.range_position_first()))
    };

    let keep: Vec<bool> = patterns
        .iter()
        .enumerate()
        .map(|(i, p)| {
            !patterns.iter().enumerate().any(|(j, q)| {
                i != j
                    && q.pattern_type() == p.pattern_type()
                    && q.overlaps(p)
                    && (beats(q, p) || (!beats(p, q) && j < i))
            })
        })
        .collect();

    patterns
        .into_iter()
        .zip(keep)
        .filter_map(|(p, keep)| {
            if !keep {
                log::debug!("{} superseded", p.id());
            }
            keep.then_some(p)
        })
        .collect()
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{BoundaryFunction, FunctionKind};

    fn flat_series(n: usize) -> TickSeries {
        let ticks = (0..n)
            .map(|i| {
                let high = if i % 4 == 1 { 20.0 } else { 18.0 };
                let low = if i % 4 == 3 { 10.0 } else { 12.0 };
                let mut tick =
                    Tick::new(i, i as i64, 15.0, high, low, 15.5, 1000.0).with_f_var(i as f64);
                if i % 4 == 1 {
                    tick = tick.mark_max();
                }
                if i % 4 == 3 {
                    tick = tick.mark_min();
                }
                tick
            })
            .collect();
        TickSeries::new(ticks).unwrap()
    }

    fn channel_functions() -> FunctionContainer {
        FunctionContainer::new(
            BoundaryFunction::constant(20.0, FunctionKind::Upper),
            BoundaryFunction::constant(10.0, FunctionKind::Lower),
        )
    }

    #[test]
    fn test_pattern_type_strings() {
        assert_eq!(PatternType::ChannelUp.to_string(), "channel_up");
        assert!(PatternType::TkeDown.uses_bound_height());
        assert!(!PatternType::Channel.uses_bound_height());
        assert_eq!(PatternType::DETECTABLE.len(), 12);
    }

    #[test]
    fn test_formation_dispatch() {
        let channel = BuiltinFormation::for_range_type(PatternType::Channel).unwrap();
        assert_eq!(channel.pattern_type(), PatternType::Channel);
        assert!(channel.breakout_direction().is_none());
        let wedge = BuiltinFormation::for_range_type(PatternType::RisingWedge).unwrap();
        assert_eq!(wedge.breakout_direction(), Some(Direction::Descending));
        assert!(BuiltinFormation::for_range_type(PatternType::HeadShoulder).is_none());
    }

    #[test]
    fn test_find_breakout_none_inside() {
        let series = flat_series(20);
        let ctx = DetectionContext::default();
        assert!(find_breakout(&series, &channel_functions(), 13, 10, &ctx).is_none());
    }

    #[test]
    fn test_assembled_channel_without_breakout() {
        let series = flat_series(20);
        let ctx = DetectionContext::default();
        let pattern = assemble(
            Assembly {
                ticker: "TEST",
                formation: ChannelFormation::new(PatternType::Channel).into(),
                functions: channel_functions(),
                position_first: 1,
                position_last: 13,
                range_elements: 4,
            },
            &series,
            &ctx,
        )
        .unwrap();
        assert_eq!(pattern.id(), "TEST_channel_1_13");
        assert!(pattern.breakout().is_none());
        assert!(pattern.part_trade().is_none());
        assert!((pattern.part_main().height() - 10.0).abs() < 1e-9);
    }
}

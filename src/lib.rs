//! # pattern-trade
//!
//! Boundary-pattern detection over ordered price ticks, breakout confirmation,
//! trade-result simulation and a trade-candidate lifecycle with dynamic
//! stop-loss/limit management.
//!
//! ## Quick Start
//!
//! ```rust
//! use pattern_trade::prelude::*;
//!
//! // Bring your own OHLCV data
//! struct Bar { t: i64, o: f64, h: f64, l: f64, c: f64, v: f64 }
//!
//! impl OHLCV for Bar {
//!     fn open(&self) -> f64 { self.o }
//!     fn high(&self) -> f64 { self.h }
//!     fn low(&self) -> f64 { self.l }
//!     fn close(&self) -> f64 { self.c }
//!     fn volume(&self) -> f64 { self.v }
//!     fn timestamp(&self) -> Option<i64> { Some(self.t) }
//! }
//!
//! let engine = EngineBuilder::new().build().unwrap();
//!
//! let bars: Vec<Bar> = vec![];
//! let mut series = TickSeries::from_bars(&bars).unwrap();
//! series.mark_extrema(engine.context().extrema_window);
//! let patterns = engine.detect("BTCUSD", &series).unwrap();
//! assert!(patterns.is_empty());
//! ```

pub mod breakout;
pub mod categorizer;
pub mod context;
pub mod formations;
pub mod function;
pub mod params;
pub mod range;
pub mod tick;
pub mod trading;

pub mod prelude {
    pub use crate::{
        // Detection pipeline
        breakout::{BreakoutChecks, PatternBreakout},
        categorizer::{ValueCategorizer, ValueCategory},
        // Configuration
        context::{DetectionContext, TradeConfig},
        // Formations
        formations::{
            fibonacci::{FibonacciFormation, FibonacciWave, RetracementForecast, WaveLeg},
            BuiltinFormation, Formation, Pattern, PatternPart, PatternType, TradeResult,
        },
        function::{BoundaryFunction, FunctionContainer, FunctionKind},
        params::{ParamMeta, ParamType},
        range::{PatternRange, PatternRangeDetector, RangeSide},
        tick::{Extremum, Tick, TickSeries},
        // Trading
        trading::{
            Blacklist, BuyTrigger, CycleInput, CycleReport, Forecast, MovingAverageTracker,
            NoopRecorder, OrderSide, OrderStatus, OrderType, PatternRecord, PatternTrade,
            PatternTradeHandler, RemovalReason, ReplayRunner, ReplayStatus, RetryQueue,
            SellTrigger, SimulatedTradeClient, TradeClient, TradeRecord, TradeRecorder,
            TradeSnapshot, TradeStatus, TradeStrategy, TradingBox,
        },
        // Parallel
        detect_parallel,
        DetectionError,
        DetectionResult,
        // Core types
        Direction,
        EngineBuilder,
        OHLCVExt,
        PatternEngine,
        PatternError,
        Period,
        Ratio,
        Result,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors raised by detection, configuration and the trade lifecycle.
///
/// Nothing here is fatal: lifecycle variants are produced and consumed
/// inside one orchestration cycle and end up as a removal reason or a log
/// line.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} ticks, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },

    #[error("Breakout ambiguous: {votes} of {required} required checks passed")]
    BreakoutAmbiguous { votes: u8, required: u8 },

    #[error("Order rejected: {side:?} {ticker}")]
    OrderRejected {
        ticker: String,
        side: trading::OrderSide,
    },

    #[error("Duplicate candidate: {pattern_type} already active for {ticker}")]
    DuplicateCandidate {
        pattern_type: formations::PatternType,
        ticker: String,
    },

    #[error("Black-listed: {pattern_type} for {ticker}")]
    Blacklisted {
        pattern_type: formations::PatternType,
        ticker: String,
    },

    #[error("Unknown trade: {0}")]
    UnknownTrade(String),

    #[error("Collaborator failure: {0}")]
    Collaborator(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn upper_shadow(&self) -> f64 {
        self.high() - self.open().max(self.close())
    }

    #[inline]
    fn lower_shadow(&self) -> f64 {
        self.open().min(self.close()) - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    #[inline]
    fn mean_hl(&self) -> f64 {
        (self.high() + self.low()) / 2.0
    }

    /// Body is at most `body_ratio` of the range. A flat bar counts as doji.
    #[inline]
    fn is_doji(&self, body_ratio: f64) -> bool {
        let range = self.range();
        if range <= f64::EPSILON {
            return true;
        }
        self.body() / range <= body_ratio
    }

    /// Bar range does not overlap the previous bar's range.
    #[inline]
    fn has_gap_to<P: OHLCV + ?Sized>(&self, previous: &P) -> bool {
        self.low() > previous.high() || self.high() < previous.low()
    }

    /// Volume grew by at least `pct` (0.10 = 10%) versus the previous bar.
    #[inline]
    fn is_volume_rising<P: OHLCV + ?Sized>(&self, previous: &P, pct: f64) -> bool {
        let previous_volume = previous.volume();
        if previous_volume <= 0.0 {
            return self.volume() > 0.0;
        }
        self.volume() / previous_volume >= 1.0 + pct - 1e-9
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        if self.high() < self.low() {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        if self.open().is_nan()
            || self.high().is_nan()
            || self.low().is_nan()
            || self.close().is_nan()
            || self.volume().is_nan()
        {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if self.open().is_infinite()
            || self.high().is_infinite()
            || self.low().is_infinite()
            || self.close().is_infinite()
        {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV + ?Sized> OHLCVExt for T {}

// ============================================================
// DIRECTION
// ============================================================

/// Direction of a breakout or of a formation's expected move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    /// +1 for ascending, -1 for descending
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Ascending => 1.0,
            Direction::Descending => -1.0,
        }
    }

    #[inline]
    pub fn is_ascending(self) -> bool {
        matches!(self, Direction::Ascending)
    }

    #[inline]
    pub fn is_descending(self) -> bool {
        matches!(self, Direction::Descending)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Ascending => f.write_str("ASC"),
            Direction::Descending => f.write_str("DESC"),
        }
    }
}

// ============================================================
// PATTERN ENGINE
// ============================================================

use context::DetectionContext;
use formations::fibonacci::FibonacciWave;
use formations::{Pattern, PatternType};
use range::{PatternRange, PatternRangeDetector, RangeSide};
use tick::TickSeries;

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub validate_data: bool,
}

/// Main pattern detection engine
///
/// Holds one immutable [`DetectionContext`]; every detection call borrows it,
/// so two engines with different contexts never influence each other.
#[derive(Debug, Clone)]
pub struct PatternEngine {
    context: DetectionContext,
    config: EngineConfig,
}

impl PatternEngine {
    pub fn new(context: DetectionContext) -> Self {
        Self {
            context,
            config: EngineConfig::default(),
        }
    }

    #[inline]
    pub fn context(&self) -> &DetectionContext {
        &self.context
    }

    /// Upper (max-side) and lower (min-side) boundary ranges of a series.
    pub fn detect_ranges(&self, series: &TickSeries) -> (Vec<PatternRange>, Vec<PatternRange>) {
        let min_max = series.min_max_ticks();
        let upper = PatternRangeDetector::new(RangeSide::Upper, &self.context).detect(&min_max);
        let lower = PatternRangeDetector::new(RangeSide::Lower, &self.context).detect(&min_max);
        (upper, lower)
    }

    /// Detect all enabled formations for one instrument.
    ///
    /// Extremum flags must already be set on the series (see
    /// [`TickSeries::mark_extrema`]).
    pub fn detect(&self, ticker: &str, series: &TickSeries) -> Result<Vec<Pattern>> {
        if self.config.validate_data {
            series.validate()?;
        }

        let ctx = &self.context;
        let min_max = series.min_max_ticks();
        if min_max.len() < ctx.min_range_elements.get() {
            log::debug!(
                "{ticker}: {} extrema, {} required - nothing to detect",
                min_max.len(),
                ctx.min_range_elements.get()
            );
            return Ok(Vec::new());
        }

        let (upper, lower) = self.detect_ranges(series);
        let mut patterns = Vec::new();

        for range in upper.iter().chain(lower.iter()) {
            for (pattern_type, functions) in formations::shapes::candidates_for_range(range, ctx) {
                if !ctx.is_enabled(pattern_type) {
                    continue;
                }
                if let Some(pattern) =
                    formations::build_pattern(ticker, pattern_type, range, functions, series, ctx)
                {
                    patterns.push(pattern);
                }
            }
        }

        let head_shoulders = [PatternType::HeadShoulder, PatternType::HeadShoulderBottom];
        if head_shoulders.iter().any(|t| ctx.is_enabled(*t)) {
            for shape in formations::shapes::detect_head_shoulders(&min_max, ctx) {
                if !ctx.is_enabled(shape.pattern_type) {
                    continue;
                }
                let built = formations::build_head_shoulder_pattern(ticker, shape, series, ctx);
                if let Some(pattern) = built {
                    patterns.push(pattern);
                }
            }
        }

        let patterns = formations::supersede_overlapping(patterns);
        log::debug!("{ticker}: {} patterns detected", patterns.len());
        Ok(patterns)
    }

    /// Build Fibonacci formations from externally supplied wave legs.
    pub fn detect_fibonacci(
        &self,
        ticker: &str,
        series: &TickSeries,
        waves: &[FibonacciWave],
    ) -> Result<Vec<Pattern>> {
        if self.config.validate_data {
            series.validate()?;
        }
        Ok(formations::fibonacci::detect_fibonacci_patterns(ticker, series, waves, &self.context))
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PatternEngine instances
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    context: DetectionContext,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole detection context
    pub fn context(mut self, context: DetectionContext) -> Self {
        self.context = context;
        self
    }

    /// Set the boundary tolerance used by range detection and breakouts
    pub fn tolerance_pct(mut self, tolerance_pct: Ratio) -> Self {
        self.context.tolerance_pct = tolerance_pct;
        self
    }

    /// Restrict detection to the given formation types
    pub fn only_patterns(mut self, types: impl IntoIterator<Item = PatternType>) -> Self {
        self.context.pattern_types = types.into_iter().collect();
        self
    }

    /// Enable/disable data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<PatternEngine> {
        self.context.validate()?;
        Ok(PatternEngine {
            context: self.context,
            config: self.config,
        })
    }
}

// ============================================================
// PARALLEL DETECTION
// ============================================================

use rayon::prelude::*;

/// Result of detecting a single instrument
#[derive(Debug)]
pub struct DetectionResult {
    pub ticker: String,
    pub patterns: Vec<Pattern>,
}

/// Error from detecting a single instrument
#[derive(Debug)]
pub struct DetectionError {
    pub ticker: String,
    pub error: PatternError,
}

/// Parallel detection over multiple instruments
pub fn detect_parallel<'a, I>(
    engine: &PatternEngine,
    instruments: I,
) -> (Vec<DetectionResult>, Vec<DetectionError>)
where
    I: IntoParallelIterator<Item = (&'a str, &'a TickSeries)>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(ticker, series)| {
            engine
                .detect(ticker, series)
                .map(|patterns| DetectionResult {
                    ticker: ticker.to_string(),
                    patterns,
                })
                .map_err(|error| DetectionError {
                    ticker: ticker.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================

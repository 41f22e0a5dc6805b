//! Price ticks and the ordered series that owns them
//!
//! A [`Tick`] is one OHLCV data point with its ordinal position in the
//! series, a timestamp and the x-coordinate (`f_var`) used to evaluate
//! boundary functions. Ticks are derived once from source bars and are
//! not mutated afterwards, apart from extremum marking on the series.

use serde::{Deserialize, Serialize};

use crate::{OHLCVExt, PatternError, Period, Result, OHLCV};

// ============================================================
// EXTREMUM FLAGS
// ============================================================

/// Local/global extremum flags of a tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extremum {
    pub local_min: bool,
    pub local_max: bool,
    pub global_min: bool,
    pub global_max: bool,
}

impl Extremum {
    pub const NONE: Extremum = Extremum {
        local_min: false,
        local_max: false,
        global_min: false,
        global_max: false,
    };

    #[inline]
    pub fn is_min(&self) -> bool {
        self.local_min || self.global_min
    }

    #[inline]
    pub fn is_max(&self) -> bool {
        self.local_max || self.global_max
    }

    #[inline]
    pub fn is_any(&self) -> bool {
        self.is_min() || self.is_max()
    }
}

// ============================================================
// TICK
// ============================================================

/// One OHLCV data point positioned in a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub position: usize,
    pub timestamp: i64,
    /// x-coordinate for boundary functions
    pub f_var: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub extremum: Extremum,
    pub is_sustainable: bool,
}

impl Tick {
    /// New tick whose x-coordinate is its timestamp
    pub fn new(
        position: usize,
        timestamp: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            position,
            timestamp,
            f_var: timestamp as f64,
            open,
            high,
            low,
            close,
            volume,
            extremum: Extremum::NONE,
            is_sustainable: false,
        }
    }

    pub fn with_f_var(mut self, f_var: f64) -> Self {
        self.f_var = f_var;
        self
    }

    pub fn with_extremum(mut self, extremum: Extremum) -> Self {
        self.extremum = extremum;
        self
    }

    pub fn with_sustainable(mut self, sustainable: bool) -> Self {
        self.is_sustainable = sustainable;
        self
    }

    /// Flag as local minimum
    pub fn mark_min(mut self) -> Self {
        self.extremum.local_min = true;
        self
    }

    /// Flag as local maximum
    pub fn mark_max(mut self) -> Self {
        self.extremum.local_max = true;
        self
    }

    #[inline]
    pub fn is_min(&self) -> bool {
        self.extremum.is_min()
    }

    #[inline]
    pub fn is_max(&self) -> bool {
        self.extremum.is_max()
    }

    fn from_bar<T: OHLCV + ?Sized>(position: usize, bar: &T) -> Self {
        let timestamp = bar.timestamp().unwrap_or(position as i64);
        Tick::new(
            position,
            timestamp,
            bar.open(),
            bar.high(),
            bar.low(),
            bar.close(),
            bar.volume(),
        )
    }
}

impl OHLCV for Tick {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

// ============================================================
// TICK SERIES
// ============================================================

/// Ordered tick container with contiguous positions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickSeries {
    ticks: Vec<Tick>,
}

impl TickSeries {
    /// Wrap ticks whose positions increase by exactly one.
    pub fn new(ticks: Vec<Tick>) -> Result<Self> {
        for pair in ticks.windows(2) {
            if pair[1].position != pair[0].position + 1 {
                return Err(PatternError::InvalidValue(
                    "tick positions must be contiguous and increasing",
                ));
            }
        }
        Ok(Self { ticks })
    }

    /// Build a series from any OHLCV bars; positions start at 0 and a
    /// missing timestamp falls back to the position.
    pub fn from_bars<T: OHLCV>(bars: &[T]) -> Result<Self> {
        let ticks = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| Tick::from_bar(i, bar))
            .collect();
        Self::new(ticks)
    }

    /// Validate OHLCV consistency of every tick.
    pub fn validate(&self) -> Result<()> {
        for (index, tick) in self.ticks.iter().enumerate() {
            tick.validate().map_err(|e| match e {
                PatternError::InvalidOHLCV { reason, .. } => {
                    PatternError::InvalidOHLCV { index, reason }
                },
                other => other,
            })?;
        }
        Ok(())
    }

    /// Append the next tick; its position must follow the current last one.
    pub fn push(&mut self, tick: Tick) -> Result<()> {
        if let Some(last) = self.ticks.last() {
            if tick.position != last.position + 1 {
                return Err(PatternError::InvalidValue(
                    "appended tick must follow the last position",
                ));
            }
        }
        self.ticks.push(tick);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    #[inline]
    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    pub fn first(&self) -> Option<&Tick> {
        self.ticks.first()
    }

    pub fn last(&self) -> Option<&Tick> {
        self.ticks.last()
    }

    fn index_of(&self, position: usize) -> Option<usize> {
        let offset = self.ticks.first()?.position;
        let index = position.checked_sub(offset)?;
        (index < self.ticks.len()).then_some(index)
    }

    /// Tick at an absolute position
    pub fn get(&self, position: usize) -> Option<&Tick> {
        self.index_of(position).map(|i| &self.ticks[i])
    }

    /// Ticks between two absolute positions (inclusive), clipped to the series.
    pub fn range(&self, first: usize, last: usize) -> &[Tick] {
        let (Some(offset), Some(end)) = (self.ticks.first(), self.ticks.last()) else {
            return &[];
        };
        let (offset, end) = (offset.position, end.position);
        let first = first.max(offset);
        let last = last.min(end);
        if first > last {
            return &[];
        }
        &self.ticks[first - offset..=last - offset]
    }

    /// Flag local extrema within `window` ticks on each side plus the single
    /// global minimum and maximum. Previous flags are cleared.
    ///
    /// A local max is ≥ every high to its left and > every high to its
    /// right, which keeps one tick per plateau. The first and last tick are
    /// never local extrema.
    pub fn mark_extrema(&mut self, window: Period) {
        let w = window.get();
        let n = self.ticks.len();
        for tick in &mut self.ticks {
            tick.extremum = Extremum::NONE;
        }
        if n == 0 {
            return;
        }

        for i in 1..n.saturating_sub(1) {
            let left = &self.ticks[i.saturating_sub(w)..i];
            let right = &self.ticks[i + 1..(i + 1 + w).min(n)];
            let high = self.ticks[i].high;
            let low = self.ticks[i].low;

            let is_max = left.iter().all(|t| high >= t.high) && right.iter().all(|t| high > t.high);
            let is_min = left.iter().all(|t| low <= t.low) && right.iter().all(|t| low < t.low);

            self.ticks[i].extremum.local_max = is_max;
            self.ticks[i].extremum.local_min = is_min;
        }

        let mut max_index = 0;
        let mut min_index = 0;
        for (i, tick) in self.ticks.iter().enumerate() {
            if tick.high > self.ticks[max_index].high {
                max_index = i;
            }
            if tick.low < self.ticks[min_index].low {
                min_index = i;
            }
        }
        self.ticks[max_index].extremum.global_max = true;
        self.ticks[min_index].extremum.global_min = true;
    }

    /// Extremum-only subsequence in position order
    pub fn min_max_ticks(&self) -> Vec<Tick> {
        self.ticks.iter().filter(|t| t.extremum.is_any()).copied().collect()
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(position: usize, high: f64, low: f64) -> Tick {
        let mid = (high + low) / 2.0;
        Tick::new(position, position as i64 * 60, mid, high, low, mid, 1000.0)
    }

    fn zigzag() -> TickSeries {
        let highs = [10.0, 12.0, 11.0, 9.0, 11.0, 14.0, 12.0, 10.0, 11.0];
        let ticks = highs
            .iter()
            .enumerate()
            .map(|(i, h)| tick(i, *h, h - 2.0))
            .collect();
        TickSeries::new(ticks).unwrap()
    }

    #[test]
    fn test_rejects_gap_in_positions() {
        let ticks = vec![tick(0, 10.0, 9.0), tick(2, 10.0, 9.0)];
        assert!(TickSeries::new(ticks).is_err());
    }

    #[test]
    fn test_push_requires_next_position() {
        let mut series = TickSeries::new(vec![tick(4, 10.0, 9.0)]).unwrap();
        assert!(series.push(tick(6, 10.0, 9.0)).is_err());
        assert!(series.push(tick(5, 10.0, 9.0)).is_ok());
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn test_get_and_range_use_absolute_positions() {
        let ticks = (10..20).map(|p| tick(p, 10.0, 9.0)).collect();
        let series = TickSeries::new(ticks).unwrap();
        assert_eq!(series.get(12).map(|t| t.position), Some(12));
        assert!(series.get(9).is_none());
        assert!(series.get(20).is_none());
        let slice = series.range(8, 12);
        assert_eq!(slice.len(), 3);
        assert_eq!(slice[0].position, 10);
        assert!(series.range(15, 12).is_empty());
    }

    #[test]
    fn test_mark_extrema() {
        let mut series = zigzag();
        series.mark_extrema(Period::new_const(1));

        let positions = |pick: fn(&Tick) -> bool| -> Vec<usize> {
            series.ticks().iter().filter(|t| pick(t)).map(|t| t.position).collect()
        };
        let max_positions = positions(|t| t.extremum.local_max);
        let min_positions = positions(|t| t.extremum.local_min);

        assert_eq!(max_positions, vec![1, 5]);
        assert_eq!(min_positions, vec![3, 7]);
        assert!(series.get(5).unwrap().extremum.global_max);
        assert!(series.get(3).unwrap().extremum.global_min);
    }

    #[test]
    fn test_min_max_ticks_keeps_order() {
        let mut series = zigzag();
        series.mark_extrema(Period::new_const(1));
        let positions: Vec<_> = series.min_max_ticks().iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![1, 3, 5, 7]);
    }

    #[test]
    fn test_from_bars_falls_back_to_position() {
        struct Bar(f64);
        impl OHLCV for Bar {
            fn open(&self) -> f64 {
                self.0
            }
            fn high(&self) -> f64 {
                self.0 + 1.0
            }
            fn low(&self) -> f64 {
                self.0 - 1.0
            }
            fn close(&self) -> f64 {
                self.0
            }
            fn volume(&self) -> f64 {
                1.0
            }
        }

        let series = TickSeries::from_bars(&[Bar(1.0), Bar(2.0)]).unwrap();
        assert_eq!(series.ticks()[1].timestamp, 1);
        assert_eq!(series.ticks()[1].f_var, 1.0);
    }
}

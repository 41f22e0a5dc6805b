//! Benchmarks for boundary-pattern detection and the trade cycle.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pattern_trade::prelude::*;

/// Simple test bar structure
#[derive(Debug, Clone, Copy)]
struct TestBar {
  t: i64,
  o: f64,
  h: f64,
  l: f64,
  c: f64,
}

impl OHLCV for TestBar {
  fn open(&self) -> f64 {
    self.o
  }

  fn high(&self) -> f64 {
    self.h
  }

  fn low(&self) -> f64 {
    self.l
  }

  fn close(&self) -> f64 {
    self.c
  }

  fn volume(&self) -> f64 {
    1000.0
  }

  fn timestamp(&self) -> Option<i64> {
    Some(self.t)
  }
}

/// Oscillating bars drifting upward
fn generate_bars(n: usize) -> Vec<TestBar> {
  let mut bars = Vec::with_capacity(n);
  let mut price = 100.0;

  for i in 0..n {
    let change = ((i * 7 + 13) % 100) as f64 / 50.0 - 1.0; // Deterministic "random"
    let swing = if (i / 5) % 2 == 0 { 1.5 } else { -1.4 };
    let volatility = 2.0 + ((i * 3) % 10) as f64 / 5.0;

    let o = price;
    let c = price + swing + change * 0.3;
    let h = o.max(c) + volatility * 0.5;
    let l = o.min(c) - volatility * 0.5;

    bars.push(TestBar { t: i as i64 * 60, o, h, l, c });
    price = c;
  }

  bars
}

fn marked_series(n: usize, engine: &PatternEngine) -> TickSeries {
  let mut series = TickSeries::from_bars(&generate_bars(n)).unwrap();
  series.mark_extrema(engine.context().extrema_window);
  series
}

fn bench_range_detection(c: &mut Criterion) {
  let engine = EngineBuilder::new().build().unwrap();
  let series = marked_series(1000, &engine);

  c.bench_function("detect_ranges_1000_ticks", |b| {
    b.iter(|| {
      let _ = black_box(engine.detect_ranges(black_box(&series)));
    })
  });
}

fn bench_detection(c: &mut Criterion) {
  let engine = EngineBuilder::new().build().unwrap();
  let series = marked_series(1000, &engine);

  c.bench_function("detect_all_1000_ticks", |b| {
    b.iter(|| {
      let _ = black_box(engine.detect("BENCH", black_box(&series)));
    })
  });
}

fn bench_scaling(c: &mut Criterion) {
  let engine = EngineBuilder::new().build().unwrap();

  let mut group = c.benchmark_group("scaling");

  for size in [100, 500, 1000, 2000].iter() {
    let series = marked_series(*size, &engine);

    group.bench_with_input(BenchmarkId::new("detect", size), size, |b, _| {
      b.iter(|| {
        let _ = black_box(engine.detect("BENCH", black_box(&series)));
      })
    });
  }

  group.finish();
}

fn bench_parallel_detection(c: &mut Criterion) {
  let engine = EngineBuilder::new().build().unwrap();
  let s1 = marked_series(1000, &engine);
  let s2 = marked_series(1000, &engine);
  let s3 = marked_series(1000, &engine);
  let s4 = marked_series(1000, &engine);

  let instruments: Vec<(&str, &TickSeries)> =
    vec![("SYM1", &s1), ("SYM2", &s2), ("SYM3", &s3), ("SYM4", &s4)];

  c.bench_function("parallel_detect_4_instruments", |b| {
    b.iter(|| {
      let _ = black_box(detect_parallel(black_box(&engine), black_box(instruments.clone())));
    })
  });
}

fn bench_trade_cycles(c: &mut Criterion) {
  let engine = EngineBuilder::new().build().unwrap();
  let series = marked_series(1000, &engine);
  let patterns = engine.detect("BENCH", &series).unwrap();
  let ticks: Vec<Tick> = series.ticks().to_vec();

  c.bench_function("trade_cycles_1000_ticks", |b| {
    b.iter(|| {
      let mut handler =
        PatternTradeHandler::new(DetectionContext::default(), TradeConfig::default()).unwrap();
      let mut input = CycleInput::new(0).with_detection(patterns.clone());
      for tick in &ticks {
        input.timestamp = tick.timestamp;
        input = input.with_tick("BENCH", *tick);
        black_box(handler.run_cycle(input));
        input = CycleInput::new(tick.timestamp);
      }
    })
  });
}

criterion_group!(
  benches,
  bench_range_detection,
  bench_detection,
  bench_scaling,
  bench_parallel_detection,
  bench_trade_cycles,
);

criterion_main!(benches);

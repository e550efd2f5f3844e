// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use activity_automator::services::ftp::{best_interval_averages, normalized_power};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

/// Synthetic watts stream with surges every few minutes.
fn synthetic_stream(seconds: usize) -> Vec<f64> {
    (0..seconds)
        .map(|t| {
            let base = 180.0 + 40.0 * ((t as f64) / 90.0).sin();
            if (t / 240) % 3 == 0 {
                base + 120.0
            } else {
                base
            }
        })
        .collect()
}

fn benchmark_power_intervals(c: &mut Criterion) {
    let one_hour = synthetic_stream(3600);
    let five_hours = synthetic_stream(5 * 3600);

    let mut group = c.benchmark_group("power_intervals");

    group.bench_function("one_hour_ride", |b| {
        b.iter(|| best_interval_averages(black_box(&one_hour)))
    });

    group.bench_function("five_hour_ride", |b| {
        b.iter(|| best_interval_averages(black_box(&five_hours)))
    });

    group.finish();

    c.bench_function("normalized_power", |b| {
        b.iter(|| {
            (1200..=4 * 3600)
                .step_by(60)
                .filter_map(|t| normalized_power(black_box(t), 250.0))
                .sum::<f64>()
        })
    });
}

criterion_group!(benches, benchmark_power_intervals);
criterion_main!(benches);

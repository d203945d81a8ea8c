//! Benchmarks for the oscillation-mapping signal chain
//!
//! Run with: cargo bench --package oscmap-signal

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use oscmap_core::{BinThresholds, SegmentationMethod};
use std::f64::consts::PI;
use std::time::Duration;

use oscmap_signal::{
    assign_bins, bandpass, decompose_with_ratio, detrend, find_high_low_indices,
    fit_sum_of_sines, wavelet_denoise,
};

/// RBC k0 trace: hyperpolarization decay with a cardiogenic ripple
fn k0_trace(len: usize) -> Array1<f64> {
    Array1::from_shape_fn(len, |i| {
        let t = i as f64;
        4.0 * (-t / 900.0).exp() + 0.05 * (2.0 * PI * t / 55.0).sin() + 0.01 * (t * 1.7).sin()
    })
}

fn bench_sine_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("Sine Fit");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    for &components in &[1usize, 3, 8] {
        let signal = Array1::from_shape_fn(512, |i| {
            let t = i as f64;
            (0.11 * t).sin() + 0.6 * (0.37 * t + 0.4).sin() + 0.3 * (0.8 * t + 1.1).sin()
        });
        group.bench_with_input(
            BenchmarkId::new("components", components),
            &signal,
            |b, s| b.iter(|| fit_sum_of_sines(black_box(s), components)),
        );
    }
    group.finish();
}

fn bench_conditioning(c: &mut Criterion) {
    let mut group = c.benchmark_group("Conditioning");

    for &len in &[500usize, 2000, 8000] {
        let trace = k0_trace(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("bandpass", len), &trace, |b, t| {
            b.iter(|| bandpass(black_box(t), 0.5, 2.5, 1.0 / 0.015))
        });
        group.bench_with_input(BenchmarkId::new("wavelet_denoise", len), &trace, |b, t| {
            b.iter(|| wavelet_denoise(black_box(t), 3))
        });
        group.bench_with_input(BenchmarkId::new("detrend", len), &trace, |b, t| {
            b.iter(|| detrend(black_box(t)))
        });
    }
    group.finish();
}

fn bench_decomposition(c: &mut Criterion) {
    let mut group = c.benchmark_group("Dixon");

    for &(projections, samples) in &[(1000usize, 64usize), (4000, 128)] {
        let data = Array2::from_shape_fn((projections, samples), |(p, s)| {
            Complex64::from_polar((-(s as f64) / 30.0).exp(), 0.4 + 0.001 * p as f64)
        });
        group.throughput(Throughput::Elements((projections * samples) as u64));
        group.bench_with_input(
            BenchmarkId::new("decompose", format!("{projections}x{samples}")),
            &data,
            |b, d| b.iter(|| decompose_with_ratio(black_box(d), 0.45)),
        );
    }
    group.finish();
}

fn bench_segmentation_and_binning(c: &mut Criterion) {
    let mut group = c.benchmark_group("Segmentation");

    let trace = Array1::from_shape_fn(4000, |i| (2.0 * PI * i as f64 / 55.0).sin());
    for method in [SegmentationMethod::Peaks, SegmentationMethod::Threshold] {
        group.bench_with_input(
            BenchmarkId::new("find_high_low", format!("{method:?}")),
            &trace,
            |b, t| b.iter(|| find_high_low_indices(black_box(t), 55, 0.2, true, method)),
        );
    }

    let thresholds = BinThresholds::from_statistics(0.58, 0.19).unwrap();
    let image = Array2::from_shape_fn((128, 128), |(i, j)| ((i * 31 + j * 17) % 97) as f64 / 80.0);
    let mask = image.mapv(|v| v > 0.05);
    group.bench_function("assign_bins_128x128", |b| {
        b.iter(|| assign_bins(black_box(&image), &mask, &thresholds, 99.0))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_sine_fit,
    bench_conditioning,
    bench_decomposition,
    bench_segmentation_and_binning,
);

criterion_main!(benches);

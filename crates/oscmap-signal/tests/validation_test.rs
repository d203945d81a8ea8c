//! Validation tests for the oscillation-mapping signal chain
//!
//! Each test checks an algorithm against a result that can be derived by hand

use ndarray::{Array1, Array2};
use num_complex::Complex64;
use oscmap_core::utils::index_axis;
use oscmap_core::{
    BinThresholds, ContaminationParameters, CoreError, PipelineConfig, SegmentationMethod,
};
use oscmap_signal::{
    assign_bins, calibrate_rbc_m_ratio, decompose_with_ratio, find_high_low_indices,
    fit_sum_of_sines, median_filter, moving_average_filter, remove_gas_contamination,
    RatioSource,
};
use std::f64::consts::PI;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Decomposing `A·exp(i·atan2(r, 1))` yields `A·sin` on the RBC channel and
/// `A·cos` on the membrane channel for any positive ratio
#[test]
fn validate_decomposition_round_trip() {
    init_tracing();
    for &r in &[0.05_f64, 0.3, 1.0, 2.7, 40.0] {
        let angle = r.atan2(1.0);
        let amplitudes =
            Array2::from_shape_fn((5, 12), |(p, s)| 1.0 + 0.1 * p as f64 + 0.01 * s as f64);
        let data = amplitudes.mapv(|a| Complex64::from_polar(a, angle));
        let channels = decompose_with_ratio(&data, r).unwrap();

        let mut max_error = 0.0f64;
        for ((a, rbc), mem) in amplitudes
            .iter()
            .zip(channels.rbc.iter())
            .zip(channels.membrane.iter())
        {
            max_error = max_error
                .max((rbc - a * angle.sin()).abs())
                .max((mem - a * angle.cos()).abs());
        }
        println!("ratio {r}: max channel error {max_error:.3e}");
        assert!(max_error < 1e-10, "ratio {r}: error {max_error}");
    }
}

/// Data placed at the calibrated angle keeps `rbc / membrane == ratio`
#[test]
fn validate_dixon_channel_ratio() {
    let angle = 0.3_f64.atan2(1.0);
    let data = Array2::from_elem((8, 64), Complex64::from_polar(1.0, angle));
    let channels = decompose_with_ratio(&data, 0.3).unwrap();
    for (rbc, mem) in channels.rbc.iter().zip(channels.membrane.iter()) {
        assert!((rbc / mem - 0.3).abs() < 1e-12);
    }
}

/// Zero contamination area leaves the dissolved data untouched
#[test]
fn validate_contamination_zero_area_is_noop() {
    let dissolved = Array2::from_shape_fn((30, 20), |(p, s)| {
        Complex64::new((p as f64 * 0.1).cos(), (s as f64 * 0.2).sin())
    });
    let gas = Array2::from_shape_fn((30, 20), |(p, s)| {
        Complex64::from_polar(3.0, 0.01 * (p + s) as f64)
    });
    let params = ContaminationParameters {
        freq_offset_hz: -7000.0,
        phase_offset_deg: 45.0,
        area: 0.0,
        gas_flip_angle_deg: 0.5,
    };
    let cleaned = remove_gas_contamination(&dissolved, &gas, 1e-5, &params).unwrap();
    assert_eq!(cleaned, dissolved);
}

/// Mismatched dissolved and gas shapes are invalid input
#[test]
fn validate_contamination_shape_mismatch() {
    let dissolved = Array2::<Complex64>::zeros((4, 8));
    let gas = Array2::<Complex64>::zeros((4, 7));
    let params = ContaminationParameters {
        freq_offset_hz: 0.0,
        phase_offset_deg: 0.0,
        area: 1.0,
        gas_flip_angle_deg: 0.5,
    };
    assert!(matches!(
        remove_gas_contamination(&dissolved, &gas, 1e-5, &params),
        Err(CoreError::InvalidInput(_))
    ));
}

/// Index sets are strictly ascending, inside the signal and equal in length
#[test]
fn validate_index_set_invariants() {
    let signals: Vec<Array1<f64>> = vec![
        Array1::from_shape_fn(1000, |i| (2.0 * PI * i as f64 / 100.0).sin()),
        Array1::from_shape_fn(333, |i| {
            (2.0 * PI * i as f64 / 17.0).sin() + 0.3 * (i as f64 * 0.9).cos()
        }),
        Array1::from_shape_fn(64, |i| if i % 9 == 0 { 2.0 } else { -0.5 }),
        Array1::from_shape_fn(200, |i| (i as f64 * 0.05).exp().sin()),
    ];
    for (n, signal) in signals.iter().enumerate() {
        for method in [SegmentationMethod::Peaks, SegmentationMethod::Threshold] {
            for threshold in [0.0, 0.2, 0.7, 1.0] {
                let set = find_high_low_indices(signal, 20, threshold, true, method).unwrap();
                assert!(
                    set.is_valid_for(signal.len()),
                    "signal {n} {method:?} threshold {threshold}"
                );
                assert_eq!(set.high.len(), set.low.len());
            }
        }
    }
}

/// A period-100 signal over 1000 samples gives ten evenly spaced windows
#[test]
fn validate_periodic_segmentation() {
    let signal = Array1::from_shape_fn(1000, |i| (2.0 * PI * i as f64 / 100.0).sin());
    let set = find_high_low_indices(&signal, 100, 0.2, true, SegmentationMethod::Peaks).unwrap();

    let window_starts = |v: &[usize]| -> Vec<usize> {
        let mut starts = vec![v[0]];
        starts.extend(v.windows(2).filter(|w| w[1] != w[0] + 1).map(|w| w[1]));
        starts
    };
    let high = window_starts(&set.high);
    let low = window_starts(&set.low);
    println!("high windows start at {high:?}");
    assert_eq!(high.len(), 10);
    assert_eq!(low.len(), 10);
    assert!(high.windows(2).all(|w| w[1] - w[0] == 100));
    assert!(low.windows(2).all(|w| w[1] - w[0] == 100));
    assert_eq!(low[0] - high[0], 50);
}

/// Even or zero windows are rejected, odd windows are accepted
#[test]
fn validate_filter_preconditions() {
    let x = Array1::from_shape_fn(21, |i| (i as f64).sqrt());
    for w in [0usize, 2, 4, 10] {
        assert!(matches!(
            moving_average_filter(&x, w),
            Err(CoreError::Precondition { .. })
        ));
        assert!(matches!(
            median_filter(&x, w),
            Err(CoreError::Precondition { .. })
        ));
    }
    for w in [1usize, 3, 5, 21] {
        assert_eq!(moving_average_filter(&x, w).unwrap().len(), 21 - w + 1);
        assert_eq!(median_filter(&x, w).unwrap().len(), 21);
    }
}

/// Class `i` covers `[T[i-2], T[i-1])`, open-ended at both extremes
#[test]
fn validate_binning_monotonicity() {
    let thresholds = BinThresholds::new(vec![-0.4, 0.39, 0.58, 0.77, 0.96]).unwrap();
    let t = thresholds.values();
    let values: Vec<f64> = (0..=400).map(|i| -1.0 + i as f64 * 0.005).collect();

    let mut previous = 0u8;
    for &v in &values {
        let class = thresholds.classify(v);
        let i = usize::from(class);
        if i >= 2 {
            assert!(t[i - 2] <= v, "{v} in class {class}");
        }
        if i <= t.len() {
            assert!(v < t[i - 1], "{v} in class {class}");
        }
        assert!(class >= previous);
        previous = class;
    }

    // The same holds after rescaling when the percentile pixel is 1.0.
    let mut pixels = values.clone();
    pixels.push(1.0);
    let image = Array1::from(pixels);
    let mask = Array1::from_elem(image.len(), true);
    let binned = assign_bins(&image, &mask, &thresholds, 100.0).unwrap();
    let bins: Vec<u8> = binned.bins.iter().copied().collect();
    assert!(bins.windows(2).all(|w| w[0] <= w[1]));
}

/// Boundary values fall into the class above the breakpoint
#[test]
fn validate_binning_reference_boundaries() {
    let thresholds = BinThresholds::new(vec![-0.4, 0.39, 0.58, 0.77, 0.96]).unwrap();
    assert_eq!(thresholds.classify(0.58), 4);
    assert_eq!(thresholds.classify(0.5799), 3);
    assert_eq!(thresholds.classify(1.5), 6);
    assert_eq!(thresholds.classify(-3.0), 1);
    assert_eq!(thresholds.num_classes(), 6);
}

/// A manual ratio is used as-is and no spectroscopy is required
#[test]
fn validate_manual_ratio_skips_fit() {
    let config = PipelineConfig {
        rbc_m_ratio: Some(0.5),
        ..PipelineConfig::default()
    };
    let calibration = calibrate_rbc_m_ratio(&config, None).unwrap();
    assert_eq!(calibration.ratio.value(), 0.5);
    assert_eq!(calibration.source, RatioSource::Manual);
    assert!(calibration.fit.is_none());
}

/// The sum-of-sines fit reproduces a clean single tone
#[test]
fn validate_single_tone_fit() {
    // Ten cycles over the 199-sample span.
    let w = 2.0 * PI * 10.0 / 199.0;
    let x = index_axis(200);
    let y = x.mapv(|t| 2.0 * (w * t + 0.5).sin());
    let model = fit_sum_of_sines(&y, 1).unwrap();
    let c = model.components()[0];
    println!("fitted a={:.6} w={:.6} p={:.6}", c.amplitude, c.angular_frequency, c.phase);
    assert!((c.amplitude - 2.0).abs() < 1e-4);
    assert!((c.angular_frequency - w).abs() < 1e-6);
    let residual = (&model.evaluate(&x) - &y).mapv(f64::abs).fold(0.0f64, |m, &v| m.max(v));
    assert!(residual < 1e-3, "max residual {residual}");
}

//! Gas-phase contamination removal for dissolved-phase k-space.
//!
//! The gas-phase acquisition is turned into an estimate of the gas signal
//! that leaked into the dissolved acquisition, which is then subtracted:
//!
//! 1. modulate the gas data to the dissolved-acquisition frequency
//!    (first-order phase)
//! 2. apply the zero-order phase offset relative to the mean gas k0 phase
//! 3. scale so the k0 magnitude matches the measured contamination area,
//!    compensating for the gas flip angle
//! 4. subtract from the dissolved data
//!
//! # References
//! - Willmering et al. (2021), "Improved pulmonary 129Xe ventilation imaging
//!   via 3D-spiral UTE MRI", MRM 86(1)

use ndarray::{Array2, Axis, Zip};
use num_complex::Complex64;
use oscmap_core::utils::{deg_to_rad, rad_to_deg, trailing_mean};
use oscmap_core::{
    ContaminationParameters, CoreError, CoreResult, InputError, CONTAMINATION_AVERAGE_WINDOW,
};
use tracing::debug;

/// Removes gas-phase leakage from `dissolved`.
///
/// Both arrays have axes (projection, sample point). When `params.area` is
/// zero there is nothing to remove and a copy of `dissolved` is returned.
///
/// The reference k0 magnitude is the plain mean over the last
/// [`CONTAMINATION_AVERAGE_WINDOW`] projections (all of them when fewer).
///
/// # Errors
///
/// - [`InputError::ShapeMismatch`] if the arrays differ in shape
/// - [`InputError::Empty`] if the gas array has no samples
/// - [`CoreError::Precondition`] if `dwell_time_s` is not positive
/// - [`InputError::Degenerate`] if the gas k0 magnitude averages to zero or
///   the gas flip angle has no transverse component
pub fn remove_gas_contamination(
    dissolved: &Array2<Complex64>,
    gas: &Array2<Complex64>,
    dwell_time_s: f64,
    params: &ContaminationParameters,
) -> CoreResult<Array2<Complex64>> {
    if dissolved.shape() != gas.shape() {
        return Err(InputError::ShapeMismatch {
            expected: dissolved.shape().to_vec(),
            actual: gas.shape().to_vec(),
        }
        .into());
    }
    if gas.is_empty() {
        return Err(InputError::Empty { what: "gas k-space" }.into());
    }
    if !(dwell_time_s.is_finite() && dwell_time_s > 0.0) {
        return Err(CoreError::precondition(format!(
            "dwell time must be positive, got {dwell_time_s}"
        )));
    }
    if params.area == 0.0 {
        debug!("contamination area is zero, nothing to remove");
        return Ok(dissolved.clone());
    }

    let gas_k0 = gas.column(0);
    #[allow(clippy::cast_precision_loss)]
    let mean_k0_phase_deg =
        rad_to_deg(gas_k0.iter().map(|c| c.arg()).sum::<f64>() / gas_k0.len() as f64);
    let zero_order = Complex64::from_polar(
        1.0,
        deg_to_rad(params.phase_offset_deg - mean_k0_phase_deg),
    );

    let k0_magnitude: Vec<f64> = gas_k0.iter().map(|c| c.norm()).collect();
    let reference = trailing_mean(&k0_magnitude, CONTAMINATION_AVERAGE_WINDOW);
    if !(reference.is_finite() && reference > 0.0) {
        return Err(CoreError::degenerate(
            "gas k0 magnitude averages to zero, cannot scale contamination",
        ));
    }
    let flip_cos = deg_to_rad(params.gas_flip_angle_deg).cos();
    if flip_cos.abs() < 1e-12 {
        return Err(CoreError::degenerate(format!(
            "gas flip angle {} deg leaves no transverse magnetization",
            params.gas_flip_angle_deg
        )));
    }
    let scale = params.area / reference / flip_cos;

    debug!(
        freq_offset_hz = params.freq_offset_hz,
        zero_order_deg = params.phase_offset_deg - mean_k0_phase_deg,
        scale,
        "removing gas-phase contamination"
    );

    // Per-sample first-order phase, shared by every projection.
    #[allow(clippy::cast_precision_loss)]
    let modulation: Vec<Complex64> = (0..gas.ncols())
        .map(|i| {
            let t = dwell_time_s * i as f64;
            Complex64::from_polar(scale, 2.0 * std::f64::consts::PI * params.freq_offset_hz * t)
                * zero_order
        })
        .collect();

    let mut cleaned = dissolved.clone();
    for (out_row, gas_row) in cleaned.axis_iter_mut(Axis(0)).zip(gas.axis_iter(Axis(0))) {
        Zip::from(out_row)
            .and(&gas_row)
            .and(&modulation[..])
            .for_each(|o, &g, &m| *o -= g * m);
    }
    Ok(cleaned)
}

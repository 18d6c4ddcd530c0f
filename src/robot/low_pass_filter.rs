// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains functions for filtering setpoints with a first-order low-pass filter.

use nalgebra::{SVector, UnitQuaternion};
use std::f64::consts::PI;

/// Filter coefficient which disables filtering: the raw setpoint is passed through.
pub static NO_FILTERING: f64 = 1.0;

/// Computes the coefficient of a first-order low-pass filter from its cutoff frequency.
///
/// # Arguments
/// * `sample_time` - Sample time constant
/// * `cutoff_frequency` - Cutoff frequency of the low-pass filter
/// # Panics
/// This function panics if:
/// * cutoff_frequency is zero, negative, infinite or NaN.
/// * sample_time is negative, infinite or NaN.
pub fn coefficient_from_cutoff_frequency(sample_time: f64, cutoff_frequency: f64) -> f64 {
    assert!(sample_time.is_sign_positive() && sample_time.is_finite());
    assert!(cutoff_frequency > 0. && cutoff_frequency.is_finite());
    sample_time / (sample_time + (1.0 / (2.0 * PI * cutoff_frequency)))
}

/// Determines whether a filter coefficient is inside (0, 1].
pub fn is_valid_coefficient(coefficient: f64) -> bool {
    coefficient.is_finite() && coefficient > 0. && coefficient <= 1.
}

/// Applies a first-order low-pass filter
///
/// `filtered = coefficient * y + (1 - coefficient) * y_last`
/// # Arguments
/// * `coefficient` - Filter coefficient in (0, 1]. 1 disables filtering.
/// * `y` - Current raw value of the signal to be filtered
/// * `y_last` - Filtered value of the previous tick
pub fn low_pass_filter(coefficient: f64, y: f64, y_last: f64) -> f64 {
    coefficient * y + (1. - coefficient) * y_last
}

/// Applies [`low_pass_filter`] element-wise to a vector.
pub fn vector_low_pass_filter<const N: usize>(
    coefficient: f64,
    y: &SVector<f64, N>,
    y_last: &SVector<f64, N>,
) -> SVector<f64, N> {
    y * coefficient + y_last * (1. - coefficient)
}

/// Filters an orientation with spherical linear interpolation, the rotational
/// counterpart of [`low_pass_filter`].
pub fn orientation_low_pass_filter(
    coefficient: f64,
    y: &UnitQuaternion<f64>,
    y_last: &UnitQuaternion<f64>,
) -> UnitQuaternion<f64> {
    y_last
        .try_slerp(y, coefficient, 1e-9)
        .unwrap_or_else(|| if coefficient >= 0.5 { *y } else { *y_last })
}

use ndarray::prelude::*;

use crate::base::*;

/// Scale below which a selection coefficient counts as zero
pub const H: f64 = 1e-8;

/// Selection coefficients at or below this value use the small-s expansions
pub fn small_s_threshold(times: &Array1<f64>) -> f64 {
    let dt_min = time_increments(times).fold(f64::INFINITY, |m, &x| m.min(x));
    H / dt_min
}

/// Covariance of an Ornstein-Uhlenbeck frequency process started at zero at infection,
/// with restoring force `s` and diffusion constant `d0`
pub fn gaussian_covariance(times: &Array1<f64>, s: f64, d0: f64, threshold: f64) -> Array2<f64> {
    let k = times.len();
    Array2::from_shape_fn((k, k), |(i, j)| {
        let dt = (times[i] - times[j]).abs();
        let tmin = times[i].min(times[j]);
        if s > threshold {
            (-s * dt).exp() * (1.0 - (-2.0 * s * tmin).exp()) * d0 / (2.0 * s)
        } else {
            (-s * dt).exp() * (2.0 * tmin - 2.0 * s * tmin.powi(2)) * d0 / 2.0
        }
    })
}

/// Covariance when the noise amplitude scales with the square root of the mean frequency
pub fn sqrt_covariance(
    times: &Array1<f64>,
    s: f64,
    mu: f64,
    d0: f64,
    threshold: f64,
) -> Array2<f64> {
    let k = times.len();
    Array2::from_shape_fn((k, k), |(i, j)| {
        let dt = (times[i] - times[j]).abs();
        let tmin = times[i].min(times[j]);
        if s > threshold {
            (-s * dt).exp() * (1.0 - (-s * tmin).exp()) * mu * d0 / (2.0 * s.powi(2))
        } else {
            (-s * dt).exp() * (tmin - 0.5 * s * tmin.powi(2)) * mu * d0 / 2.0
        }
    })
}

/// Tridiagonal inverse of `gaussian_covariance` for a unit diffusion constant
pub fn gaussian_precision(times: &Array1<f64>, s: f64, threshold: f64) -> Array2<f64> {
    let dt = time_increments(times);
    let k = dt.len();
    let mut a: Array2<f64> = Array2::zeros((k, k));
    for i in 0..k {
        if s > threshold {
            a[(i, i)] = 2.0 * s / (1.0 - (-2.0 * s * dt[i]).exp());
            if i + 1 < k {
                let next = dt[i + 1];
                let denom = 1.0 - (-2.0 * s * next).exp();
                a[(i, i)] += 2.0 * s * (-2.0 * s * next).exp() / denom;
                a[(i, i + 1)] = -2.0 * s * (-s * next).exp() / denom;
                a[(i + 1, i)] = a[(i, i + 1)];
            }
        } else {
            a[(i, i)] = 1.0 / dt[i];
            if i + 1 < k {
                let next = dt[i + 1];
                a[(i, i)] += (1.0 - s * next).powi(2) / next;
                a[(i, i + 1)] = -(1.0 - s * next) / next;
                a[(i + 1, i)] = a[(i, i + 1)];
            }
        }
    }
    a
}

/// Expected frequency of mutations under mutation-selection balance: mu/s (1 - exp(-s t))
pub fn mean_trajectory(times: &Array1<f64>, s: f64, mu: f64, threshold: f64) -> Array1<f64> {
    if s > threshold {
        times.mapv(|t| mu * (1.0 - (-s * t).exp()) / s)
    } else {
        times.mapv(|t| mu * t)
    }
}

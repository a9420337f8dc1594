//! Evaluation primitives for `y = A*cos(2*pi*x + phi) + c`.
//!
//! The fitter relies on three operations:
//! - predict `y(x)` given parameters (for residuals/plots)
//! - build the residual vector for a trace
//! - build the analytic Jacobian for a trace
//!
//! The basis coordinate `x` is a fractional cycle position: one full period
//! of the model corresponds to `x` advancing by 1.0.

use std::f64::consts::TAU;

use nalgebra::{DMatrix, DVector};

use crate::domain::{CosineParams, Trace};

/// Parameter layout in solver space: `[amplitude, phase, offset]`.
pub const PARAM_COUNT: usize = 3;

/// Predict `y(x)` for the given parameters.
pub fn predict(x: f64, params: &CosineParams) -> f64 {
    params.amplitude * (TAU * x + params.phase).cos() + params.offset
}

/// Predict from a raw solver-space parameter slice.
///
/// # Panics
/// Panics if `p` has fewer than [`PARAM_COUNT`] entries.
pub fn predict_raw(x: f64, p: &[f64]) -> f64 {
    p[0] * (TAU * x + p[1]).cos() + p[2]
}

/// Residual vector `model(x_i) - y_i` for a trace.
pub fn residuals(trace: &Trace, p: &[f64]) -> DVector<f64> {
    DVector::from_iterator(
        trace.len(),
        trace
            .basis
            .iter()
            .zip(trace.values.iter())
            .map(|(&x, &y)| predict_raw(x, p) - y),
    )
}

/// Analytic Jacobian `d(model)/d(params)` for a trace.
///
/// Row `i` is `[cos(theta_i), -A*sin(theta_i), 1]` with
/// `theta_i = 2*pi*x_i + phi`.
pub fn jacobian(trace: &Trace, p: &[f64]) -> DMatrix<f64> {
    DMatrix::from_fn(trace.len(), PARAM_COUNT, |i, j| {
        let theta = TAU * trace.basis[i] + p[1];
        match j {
            0 => theta.cos(),
            1 => -p[0] * theta.sin(),
            _ => 1.0,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_period_is_one() {
        let params = CosineParams {
            amplitude: 0.5,
            phase: 0.3,
            offset: 0.5,
        };
        let a = predict(0.125, &params);
        let b = predict(1.125, &params);
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn residuals_vanish_on_exact_model() {
        let p = [0.4, -0.7, 0.55];
        let basis: Vec<f64> = (0..8).map(|i| i as f64 / 8.0).collect();
        let values: Vec<f64> = basis.iter().map(|&x| predict_raw(x, &p)).collect();
        let trace = Trace::new(basis, values).unwrap();

        let r = residuals(&trace, &p);
        assert!(r.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let p = [0.6, 0.9, 0.4];
        let basis: Vec<f64> = (0..6).map(|i| i as f64 / 6.0).collect();
        let values = vec![0.0; basis.len()];
        let trace = Trace::new(basis, values).unwrap();

        let j = jacobian(&trace, &p);
        let h = 1e-7;
        for col in 0..PARAM_COUNT {
            let mut plus = p;
            let mut minus = p;
            plus[col] += h;
            minus[col] -= h;
            let fd = (residuals(&trace, &plus) - residuals(&trace, &minus)) / (2.0 * h);
            for row in 0..trace.len() {
                assert!(
                    (j[(row, col)] - fd[row]).abs() < 1e-5,
                    "d/dp{col} at row {row}: analytic {} vs fd {}",
                    j[(row, col)],
                    fd[row]
                );
            }
        }
    }
}

//! Single-trace cosine fit.
//!
//! Given a trace of `(basis, value)` samples we solve a bounded nonlinear
//! least-squares problem for `y = A*cos(2*pi*x + phi) + c`:
//!
//! - initial guess `A = 0.5`, `phi = 0`, `c = 0.5` (population-like inputs)
//! - bounds `A >= 0`, `phi` in `[-pi, pi]`, `c` free
//!
//! Why a phase-start ladder?
//! The objective is nonconvex in `phi`: from a single start the solver can
//! pin the amplitude at zero whenever the true phase is more than ~pi/2 away
//! (the first step clamps `A` to its bound and the phase gradient vanishes
//! there). Re-running the same solver from a fixed, deterministic set of
//! phase starts and keeping the lowest-SSE result removes that failure mode
//! without any randomness; the configured guess stays first and wins ties.
//!
//! Two failure classes are kept deliberately distinct:
//!
//! - malformed input (too few samples, degenerate basis, non-finite values)
//!   is an error — there is no meaningful fit to attempt
//! - solver divergence is swallowed into a `converged = false` result, so a
//!   stubborn trace never aborts a batch

use std::f64::consts::{FRAC_PI_2, PI};

use crate::domain::{CosineParams, Trace, TraceFit};
use crate::error::AppError;
use crate::math::lm::{self, LmOptions, LmSolution};
use crate::math::wrap_to_pi;
use crate::models::{jacobian, residuals};

/// Minimum number of samples for a 3-parameter fit.
const MIN_SAMPLES: usize = 3;

/// Spread below which basis coordinates count as all-identical.
const BASIS_EPS: f64 = 1e-12;

/// Additional phase starts tried after the configured guess.
///
/// Together with the guess these put a start within pi/4 of any true phase.
const PHASE_STARTS: [f64; 4] = [FRAC_PI_2, -FRAC_PI_2, PI, -PI];

/// Fitting options shared by single and batch fits.
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Starting point for the solver.
    ///
    /// The default assumes values are state populations in `[0, 1]`; callers
    /// fitting raw quadrature voltages should supply their own guess.
    pub initial: CosineParams,
    pub solver: LmOptions,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            initial: CosineParams {
                amplitude: 0.5,
                phase: 0.0,
                offset: 0.5,
            },
            solver: LmOptions::default(),
        }
    }
}

/// Fit one trace. Pure function of its input.
///
/// Returns an error for input that cannot be fitted at all; returns
/// `Ok(TraceFit::diverged())` when the input is valid but the solver fails
/// from every start.
pub fn fit_trace(trace: &Trace, opts: &FitOptions) -> Result<TraceFit, AppError> {
    validate_trace(trace)?;

    let lower = [0.0, -PI, f64::NEG_INFINITY];
    let upper = [f64::INFINITY, PI, f64::INFINITY];

    let mut best: Option<LmSolution> = None;
    for phase0 in std::iter::once(opts.initial.phase).chain(PHASE_STARTS) {
        let start = [opts.initial.amplitude, phase0, opts.initial.offset];
        let solved = lm::minimize(
            |p| residuals(trace, p),
            |p| jacobian(trace, p),
            &start,
            &lower,
            &upper,
            &opts.solver,
        );

        // Deterministic selection: strict minimum SSE, so earlier starts
        // (the configured guess first) win ties.
        if let Ok(sol) = solved {
            if best.as_ref().is_none_or(|b| sol.sse < b.sse) {
                best = Some(sol);
            }
        }
    }

    let Some(sol) = best else {
        return Ok(TraceFit::diverged());
    };

    Ok(TraceFit {
        params: CosineParams {
            amplitude: sol.params[0],
            // The bounds keep phi in range; the wrap guards the last few
            // ulps a projected step can leave outside it.
            phase: wrap_to_pi(sol.params[1]),
            offset: sol.params[2],
        },
        sse: sol.sse,
        iterations: sol.iterations,
        converged: true,
    })
}

fn validate_trace(trace: &Trace) -> Result<(), AppError> {
    if trace.len() < MIN_SAMPLES {
        return Err(AppError::new(
            3,
            format!(
                "Trace has {} samples; at least {MIN_SAMPLES} are required.",
                trace.len()
            ),
        ));
    }
    if trace.basis.iter().any(|x| !x.is_finite()) || trace.values.iter().any(|y| !y.is_finite()) {
        return Err(AppError::new(4, "Trace contains non-finite samples."));
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &x in &trace.basis {
        min = min.min(x);
        max = max.max(x);
    }
    if max - min < BASIS_EPS {
        return Err(AppError::new(
            3,
            "Degenerate basis coordinates (all identical).",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::predict_raw;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    fn uniform_basis(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 / n as f64).collect()
    }

    fn noiseless_trace(n: usize, a: f64, phi: f64, c: f64) -> Trace {
        let basis = uniform_basis(n);
        let values: Vec<f64> = basis.iter().map(|&x| predict_raw(x, &[a, phi, c])).collect();
        Trace::new(basis, values).unwrap()
    }

    #[test]
    fn recovers_noiseless_parameters_over_grid() {
        let opts = FitOptions::default();
        for &a in &[0.1, 0.5, 1.0] {
            for &phi in &[-3.1, -2.8, -1.5, -0.3, 0.0, 0.9, 2.2, 3.0, 3.1] {
                for &c in &[0.0, 0.5, 1.0] {
                    let trace = noiseless_trace(24, a, phi, c);
                    let fit = fit_trace(&trace, &opts).unwrap();
                    assert!(fit.converged, "diverged at A={a}, phi={phi}, c={c}");
                    assert!(
                        (fit.params.amplitude - a).abs() < 1e-6,
                        "A at A={a}, phi={phi}, c={c}: got {}",
                        fit.params.amplitude
                    );
                    assert!(
                        (fit.params.phase - phi).abs() < 1e-6,
                        "phi at A={a}, phi={phi}, c={c}: got {}",
                        fit.params.phase
                    );
                    assert!(
                        (fit.params.offset - c).abs() < 1e-6,
                        "c at A={a}, phi={phi}, c={c}: got {}",
                        fit.params.offset
                    );
                }
            }
        }
    }

    #[test]
    fn converged_phase_stays_in_canonical_range() {
        let opts = FitOptions::default();
        for &phi in &[-4.5, -3.1, -1.0, 0.0, 1.0, 3.1, 4.5, 6.0] {
            // Raw phases outside [-pi, pi] describe the same curve as their
            // wrapped image; the fit must report the canonical value.
            let trace = noiseless_trace(20, 0.5, phi, 0.5);
            let fit = fit_trace(&trace, &opts).unwrap();
            assert!(fit.converged);
            assert!(
                fit.params.phase >= -PI && fit.params.phase <= PI,
                "phase {} out of range for raw phi {phi}",
                fit.params.phase
            );
        }
    }

    #[test]
    fn flat_trace_fits_to_zero_amplitude() {
        let basis = uniform_basis(16);
        let values = vec![0.42; 16];
        let trace = Trace::new(basis, values).unwrap();

        let fit = fit_trace(&trace, &FitOptions::default()).unwrap();
        assert!(fit.converged);
        assert!(fit.params.amplitude.abs() < 1e-6);
        assert!((fit.params.offset - 0.42).abs() < 1e-6);
    }

    #[test]
    fn rejects_too_few_samples() {
        let trace = Trace::new(vec![0.0, 0.5], vec![0.5, 0.5]).unwrap();
        let err = fit_trace(&trace, &FitOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn rejects_degenerate_basis() {
        let trace = Trace::new(vec![0.25; 5], vec![0.1, 0.2, 0.3, 0.4, 0.5]).unwrap();
        let err = fit_trace(&trace, &FitOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn rejects_non_finite_values() {
        let trace = Trace::new(vec![0.0, 0.25, 0.5], vec![0.1, f64::NAN, 0.3]).unwrap();
        let err = fit_trace(&trace, &FitOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn noisy_four_point_recovery_monte_carlo() {
        // The coarsest trace the conditional-phase experiment produces:
        // four basis points. With sigma = 0.01 readout noise the estimator
        // spread is well inside the tolerances, so at least 95% of seeded
        // trials must land within them.
        let opts = FitOptions::default();
        let basis = vec![0.0, 0.25, 0.5, 0.75];
        let truth = [0.5, 0.3, 0.5];
        let mut rng = StdRng::seed_from_u64(20250806);
        let noise = Normal::new(0.0, 0.01).unwrap();

        let trials = 1000;
        let mut ok = 0;
        for _ in 0..trials {
            let values: Vec<f64> = basis
                .iter()
                .map(|&x| predict_raw(x, &truth) + noise.sample(&mut rng))
                .collect();
            let trace = Trace::new(basis.clone(), values).unwrap();
            let fit = fit_trace(&trace, &opts).unwrap();
            if fit.converged
                && (fit.params.amplitude - truth[0]).abs() <= 0.05
                && (fit.params.phase - truth[1]).abs() <= 0.1
                && (fit.params.offset - truth[2]).abs() <= 0.05
            {
                ok += 1;
            }
        }

        assert!(ok >= 950, "only {ok}/{trials} trials within tolerance");
    }
}

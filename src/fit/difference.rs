//! ON/OFF fit comparison.
//!
//! A conditional-phase experiment measures each working point twice: with the
//! control operation applied (ON) and without it (OFF). The calibration
//! quantities are derived per pair:
//!
//! - `amplitude_ratio = A_on / A_off` (coherence loss through the operation)
//! - `phase_diff = wrap(phi_on - phi_off)` (the conditional phase itself)
//! - `offset_diff = c_on - c_off`

use std::collections::BTreeMap;

use crate::domain::{FitDelta, PairKey, TraceFit, TraceKey};
use crate::error::AppError;
use crate::math::wrap_to_pi;

/// Compare two fits of the same working point.
///
/// Meaningful only when both fits converged; NaN parameters propagate into
/// the delta, so callers that skip the `converged` check get NaN out, never a
/// plausible-looking number. `amplitude_ratio` is pinned to NaN (not inf)
/// when the OFF amplitude is exactly zero.
pub fn difference(on: &TraceFit, off: &TraceFit) -> FitDelta {
    let amplitude_ratio = if off.params.amplitude == 0.0 {
        f64::NAN
    } else {
        on.params.amplitude / off.params.amplitude
    };

    FitDelta {
        amplitude_ratio,
        phase_diff: wrap_to_pi(on.params.phase - off.params.phase),
        offset_diff: on.params.offset - off.params.offset,
    }
}

/// Derive a delta for every ON key in the batch.
///
/// An ON fit without a matching OFF fit is a data error: the caller handed us
/// half a pair, and silently dropping it would misreport the sweep coverage.
pub fn difference_batch(
    fits: &BTreeMap<TraceKey, TraceFit>,
) -> Result<BTreeMap<PairKey, FitDelta>, AppError> {
    let mut out = BTreeMap::new();

    for (key, fit_on) in fits.iter().filter(|(key, _)| key.control) {
        let off_key = key.complement();
        let Some(fit_off) = fits.get(&off_key) else {
            return Err(AppError::new(
                3,
                format!("No OFF fit paired with '{key}' in the batch."),
            ));
        };
        out.insert(key.pair_key(), difference(fit_on, fit_off));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CosineParams;
    use std::f64::consts::PI;

    fn fit(amplitude: f64, phase: f64, offset: f64) -> TraceFit {
        TraceFit {
            params: CosineParams {
                amplitude,
                phase,
                offset,
            },
            sse: 0.0,
            iterations: 1,
            converged: true,
        }
    }

    #[test]
    fn self_difference_is_identity() {
        let f = fit(0.4, 1.2, 0.5);
        let delta = difference(&f, &f);
        assert!((delta.amplitude_ratio - 1.0).abs() < 1e-12);
        assert_eq!(delta.phase_diff, 0.0);
        assert_eq!(delta.offset_diff, 0.0);
    }

    #[test]
    fn phase_difference_is_antisymmetric_up_to_wrap() {
        // Away from the +-pi branch line, swapping the arguments flips the
        // sign of the wrapped phase difference.
        let pairs = [(0.3, -1.2), (2.0, -2.4), (-0.8, 0.5), (1.4, 1.5)];
        for &(a, b) in &pairs {
            let fwd = difference(&fit(0.5, a, 0.5), &fit(0.5, b, 0.5)).phase_diff;
            let rev = difference(&fit(0.5, b, 0.5), &fit(0.5, a, 0.5)).phase_diff;
            assert!(
                (fwd + rev).abs() < 1e-12,
                "phi_on={a}, phi_off={b}: {fwd} vs {rev}"
            );
        }
    }

    #[test]
    fn phase_difference_wraps_into_canonical_range() {
        // 2.8 - (-2.9) = 5.7 > pi wraps to 5.7 - 2*pi.
        let delta = difference(&fit(0.5, 2.8, 0.5), &fit(0.5, -2.9, 0.5));
        assert!((delta.phase_diff - (5.7 - 2.0 * PI)).abs() < 1e-12);
        assert!(delta.phase_diff >= -PI && delta.phase_diff <= PI);
    }

    #[test]
    fn zero_off_amplitude_gives_nan_ratio() {
        let delta = difference(&fit(0.5, 0.0, 0.5), &fit(0.0, 0.0, 0.5));
        assert!(delta.amplitude_ratio.is_nan());
    }

    #[test]
    fn diverged_input_propagates_nan() {
        let delta = difference(&TraceFit::diverged(), &fit(0.5, 0.0, 0.5));
        assert!(delta.amplitude_ratio.is_nan());
        assert!(delta.phase_diff.is_nan());
        assert!(delta.offset_diff.is_nan());
    }

    #[test]
    fn batch_pairs_every_on_key() {
        let mut fits = BTreeMap::new();
        for outer in 0..3 {
            fits.insert(TraceKey::new("q0", vec![outer], true), fit(0.4, 1.0, 0.5));
            fits.insert(TraceKey::new("q0", vec![outer], false), fit(0.5, 0.2, 0.5));
        }

        let deltas = difference_batch(&fits).unwrap();
        assert_eq!(deltas.len(), 3);
        for delta in deltas.values() {
            assert!((delta.amplitude_ratio - 0.8).abs() < 1e-12);
            assert!((delta.phase_diff - 0.8).abs() < 1e-12);
        }
    }

    #[test]
    fn batch_reports_missing_off_partner() {
        let mut fits = BTreeMap::new();
        fits.insert(TraceKey::new("q0", vec![0], true), fit(0.4, 1.0, 0.5));

        let err = difference_batch(&fits).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}

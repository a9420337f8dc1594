//! Synthetic conditional-phase collection generation.
//!
//! The generator produces the same shape of data the hardware pipeline
//! yields for a CZ conditional-phase sweep: for every qubit and coupler
//! amplitude, one trace with the control operation applied (ON) and one
//! without (OFF). The ON trace accumulates a conditional phase that grows
//! along the amplitude axis and loses a configurable fraction of contrast;
//! Gaussian readout noise sits on top.
//!
//! Everything is deterministic: the RNG seed is derived by hashing the
//! generation settings, so the same config reproduces the same collection.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::domain::{
    CollectionStats, CosineParams, FitConfig, SweepAxis, Trace, TraceCollection, TraceKey,
};
use crate::error::AppError;
use crate::math::wrap_to_pi;
use crate::models::predict;

/// OFF-trace contrast of the simulated readout.
const BASE_AMPLITUDE: f64 = 0.45;

/// Baseline Ramsey phase of the first qubit; later qubits are offset so
/// their traces are distinguishable in plots.
const BASE_PHASE: f64 = 0.2;
const PER_QUBIT_PHASE_STEP: f64 = 0.07;

/// Population midpoint.
const BASE_OFFSET: f64 = 0.5;

/// Coupler amplitude range swept in the demo.
const AMP_MIN: f64 = -0.10;
const AMP_MAX: f64 = 0.10;

#[derive(Debug, Clone)]
pub struct SampleData {
    pub collection: TraceCollection,
    /// Noiseless parameters per trace, for debug output and tests.
    pub truth: BTreeMap<TraceKey, CosineParams>,
    pub stats: CollectionStats,
}

pub fn generate_sample(config: &FitConfig) -> Result<SampleData, AppError> {
    if config.demo_qubits == 0 {
        return Err(AppError::new(2, "Demo qubit count must be > 0."));
    }
    if config.demo_basis_steps < 3 {
        return Err(AppError::new(2, "Demo basis steps must be >= 3."));
    }
    if config.demo_amp_steps == 0 {
        return Err(AppError::new(2, "Demo amplitude steps must be > 0."));
    }
    if !(config.demo_noise_sigma.is_finite() && config.demo_noise_sigma >= 0.0) {
        return Err(AppError::new(2, "Demo noise sigma must be finite and >= 0."));
    }
    if !config.demo_cond_phase.is_finite() {
        return Err(AppError::new(2, "Demo conditional phase must be finite."));
    }
    if !(config.demo_amp_damping.is_finite()
        && config.demo_amp_damping > 0.0
        && config.demo_amp_damping <= 1.0)
    {
        return Err(AppError::new(2, "Demo amplitude damping must be in (0, 1]."));
    }

    let mut rng = StdRng::seed_from_u64(sample_seed(config));
    let noise = Normal::new(0.0, config.demo_noise_sigma)
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

    let axis = SweepAxis {
        name: "coupler_amp".to_string(),
        values: linspace(AMP_MIN, AMP_MAX, config.demo_amp_steps),
    };
    let basis: Vec<f64> = (0..config.demo_basis_steps)
        .map(|i| i as f64 / config.demo_basis_steps as f64)
        .collect();

    let mut collection = TraceCollection::new(vec![axis]);
    let mut truth = BTreeMap::new();

    for q in 0..config.demo_qubits {
        let qubit = format!("q{q}");
        let phase_off = wrap_to_pi(BASE_PHASE + PER_QUBIT_PHASE_STEP * q as f64);

        for amp_idx in 0..config.demo_amp_steps {
            // The conditional phase accumulates along the amplitude axis and
            // reaches `demo_cond_phase` at the top of the sweep.
            let frac = (amp_idx + 1) as f64 / config.demo_amp_steps as f64;

            for &control in &[false, true] {
                let params = if control {
                    CosineParams {
                        amplitude: BASE_AMPLITUDE * config.demo_amp_damping,
                        phase: wrap_to_pi(phase_off + config.demo_cond_phase * frac),
                        offset: BASE_OFFSET,
                    }
                } else {
                    CosineParams {
                        amplitude: BASE_AMPLITUDE,
                        phase: phase_off,
                        offset: BASE_OFFSET,
                    }
                };

                let values: Vec<f64> = basis
                    .iter()
                    .map(|&x| predict(x, &params) + noise.sample(&mut rng))
                    .collect();

                let key = TraceKey::new(qubit.clone(), vec![amp_idx], control);
                truth.insert(key.clone(), params);
                collection.insert(key, Trace::new(basis.clone(), values)?);
            }
        }
    }

    let stats = CollectionStats::from_collection(&collection)
        .ok_or_else(|| AppError::new(4, "Failed to compute sample stats."))?;

    Ok(SampleData {
        collection,
        truth,
        stats,
    })
}

/// `steps` evenly spaced points between `min` and `max` (inclusive).
fn linspace(min: f64, max: f64, steps: usize) -> Vec<f64> {
    if steps == 1 {
        return vec![(min + max) / 2.0];
    }
    let step = (max - min) / (steps as f64 - 1.0);
    (0..steps).map(|i| min + step * i as f64).collect()
}

fn sample_seed(config: &FitConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    config.demo_seed.hash(&mut hasher);
    config.demo_qubits.hash(&mut hasher);
    config.demo_amp_steps.hash(&mut hasher);
    config.demo_basis_steps.hash(&mut hasher);
    config.demo_noise_sigma.to_bits().hash(&mut hasher);
    config.demo_cond_phase.to_bits().hash(&mut hasher);
    config.demo_amp_damping.to_bits().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::{FitOptions, fit_trace};

    #[test]
    fn sample_is_deterministic_for_a_config() {
        let config = FitConfig::default();
        let a = generate_sample(&config).unwrap();
        let b = generate_sample(&config).unwrap();

        assert_eq!(a.collection.len(), b.collection.len());
        for ((ka, ta), (kb, tb)) in a.collection.iter().zip(b.collection.iter()) {
            assert_eq!(ka, kb);
            assert_eq!(ta.values, tb.values);
        }
    }

    #[test]
    fn sample_covers_the_full_grid() {
        let config = FitConfig {
            demo_qubits: 3,
            demo_amp_steps: 4,
            ..FitConfig::default()
        };
        let sample = generate_sample(&config).unwrap();

        // qubits x amp steps x {on, off}
        assert_eq!(sample.collection.len(), 3 * 4 * 2);
        assert_eq!(sample.truth.len(), sample.collection.len());
        for key in sample.collection.keys() {
            assert!(sample.collection.get(&key.complement()).is_some());
        }
    }

    #[test]
    fn noiseless_sample_fits_back_to_truth() {
        let config = FitConfig {
            demo_noise_sigma: 0.0,
            demo_qubits: 1,
            demo_amp_steps: 2,
            ..FitConfig::default()
        };
        let sample = generate_sample(&config).unwrap();
        let opts = FitOptions::default();

        for (key, trace) in sample.collection.iter() {
            let fit = fit_trace(trace, &opts).unwrap();
            let truth = &sample.truth[key];
            assert!(fit.converged, "diverged at {key}");
            assert!((fit.params.amplitude - truth.amplitude).abs() < 1e-6);
            assert!((fit.params.phase - truth.phase).abs() < 1e-6);
            assert!((fit.params.offset - truth.offset).abs() < 1e-6);
        }
    }

    #[test]
    fn invalid_settings_are_usage_errors() {
        let mut config = FitConfig::default();
        config.demo_basis_steps = 2;
        assert_eq!(generate_sample(&config).unwrap_err().exit_code(), 2);

        let mut config = FitConfig::default();
        config.demo_amp_damping = 0.0;
        assert_eq!(generate_sample(&config).unwrap_err().exit_code(), 2);
    }
}

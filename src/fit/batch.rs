//! Batch fitting over a whole collection.
//!
//! Each trace is an independent least-squares problem with no shared state,
//! so the batch is a parallel map. Results are keyed by trace index, not by
//! completion order, and the output always covers every input key: a trace
//! that cannot be fitted is recorded as a diverged entry rather than omitted,
//! so downstream consumers detect failures explicitly instead of hitting
//! missing keys.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::domain::{TraceCollection, TraceFit, TraceKey};
use crate::fit::fitter::{FitOptions, fit_trace};

/// Fit every trace in the collection.
pub fn fit_batch(collection: &TraceCollection, opts: &FitOptions) -> BTreeMap<TraceKey, TraceFit> {
    collection
        .entries()
        .par_iter()
        .map(|(key, trace)| {
            // Input errors (degenerate basis, too few samples) are marked the
            // same way as solver divergence here: one bad trace never aborts
            // the batch.
            let fit = fit_trace(trace, opts).unwrap_or_else(|_| TraceFit::diverged());
            (key.clone(), fit)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Trace;
    use crate::models::predict_raw;

    fn cosine_trace(n: usize, p: &[f64; 3]) -> Trace {
        let basis: Vec<f64> = (0..n).map(|i| i as f64 / n as f64).collect();
        let values: Vec<f64> = basis.iter().map(|&x| predict_raw(x, p)).collect();
        Trace::new(basis, values).unwrap()
    }

    #[test]
    fn covers_every_key_and_marks_only_the_degenerate_trace() {
        let mut collection = TraceCollection::new(Vec::new());
        let good_on = TraceKey::new("q0", vec![0], true);
        let good_off = TraceKey::new("q0", vec![0], false);
        let bad = TraceKey::new("q1", vec![0], false);

        collection.insert(good_on.clone(), cosine_trace(16, &[0.4, 1.1, 0.5]));
        collection.insert(good_off.clone(), cosine_trace(16, &[0.5, -0.4, 0.5]));
        // Degenerate: every basis coordinate identical.
        collection.insert(
            bad.clone(),
            Trace::new(vec![0.5; 16], vec![0.5; 16]).unwrap(),
        );

        let fits = fit_batch(&collection, &FitOptions::default());

        assert_eq!(fits.len(), 3);
        assert!(!fits[&bad].converged);
        assert!(fits[&bad].params.amplitude.is_nan());
        assert!(fits[&good_on].converged);
        assert!(fits[&good_off].converged);
    }

    #[test]
    fn batch_entries_match_solo_fits_exactly() {
        // A bad neighbor must not perturb the numerics of the other fits.
        let opts = FitOptions::default();
        let key = TraceKey::new("q0", vec![1], true);
        let trace = cosine_trace(20, &[0.45, 0.8, 0.52]);

        let solo = fit_trace(&trace, &opts).unwrap();

        let mut collection = TraceCollection::new(Vec::new());
        collection.insert(key.clone(), trace);
        collection.insert(
            TraceKey::new("q9", vec![0], false),
            Trace::new(vec![0.1; 8], vec![0.0; 8]).unwrap(),
        );

        let fits = fit_batch(&collection, &opts);
        let batched = &fits[&key];

        assert_eq!(batched.converged, solo.converged);
        assert_eq!(batched.params.amplitude, solo.params.amplitude);
        assert_eq!(batched.params.phase, solo.params.phase);
        assert_eq!(batched.params.offset, solo.params.offset);
    }
}

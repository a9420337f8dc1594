//! Shared "fit pipeline" logic used by every CLI command.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! load/generate -> filter -> batch fit -> ON/OFF deltas -> stats
//!
//! The commands can then focus on presentation (printing, plotting, exports).

use std::collections::BTreeMap;

use crate::data::generate_sample;
use crate::domain::{
    CollectionStats, FitConfig, FitDelta, PairKey, SignalColumn, TraceCollection, TraceFit,
    TraceKey,
};
use crate::error::AppError;
use crate::fit::{FitOptions, difference_batch, fit_batch};
use crate::io::ingest::{RowError, load_collection};
use crate::math::lm::LmOptions;

/// All computed outputs of a single run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub signal: SignalColumn,
    pub stats: CollectionStats,
    pub fits: BTreeMap<TraceKey, TraceFit>,
    pub deltas: BTreeMap<PairKey, FitDelta>,
    /// Rows skipped during ingest (always empty for synthetic runs).
    pub row_errors: Vec<RowError>,
}

/// Load the input named by the config (CSV or synthetic sweep) and fit it.
///
/// The collection is returned alongside the outputs so callers can overlay
/// raw samples in plots.
pub fn run_fit(config: &FitConfig) -> Result<(TraceCollection, RunOutput), AppError> {
    let (collection, signal, row_errors) = match &config.input_path {
        Some(path) => {
            let ingest = load_collection(path, config.signal)?;
            (ingest.collection, ingest.signal, ingest.row_errors)
        }
        None => {
            let sample = generate_sample(config)?;
            // Synthetic sweeps are state-population readouts by construction.
            (sample.collection, SignalColumn::State, Vec::new())
        }
    };

    let collection = apply_qubit_filter(collection, config.qubit_filter.as_deref())?;
    let output = run_fit_with_collection(config, &collection, signal, row_errors)?;
    Ok((collection, output))
}

/// Fit an already-loaded collection.
pub fn run_fit_with_collection(
    config: &FitConfig,
    collection: &TraceCollection,
    signal: SignalColumn,
    row_errors: Vec<RowError>,
) -> Result<RunOutput, AppError> {
    let stats = CollectionStats::from_collection(collection)
        .ok_or_else(|| AppError::new(3, "Nothing to fit: the collection is empty."))?;

    let opts = FitOptions {
        solver: LmOptions {
            max_iterations: config.max_iterations.max(1),
            ..LmOptions::default()
        },
        ..FitOptions::default()
    };

    let fits = fit_batch(collection, &opts);
    let deltas = difference_batch(&fits)?;

    Ok(RunOutput {
        signal,
        stats,
        fits,
        deltas,
        row_errors,
    })
}

fn apply_qubit_filter(
    collection: TraceCollection,
    qubit: Option<&str>,
) -> Result<TraceCollection, AppError> {
    let Some(qubit) = qubit else {
        return Ok(collection);
    };

    let mut filtered = TraceCollection::new(collection.axes.clone());
    for (key, trace) in collection.iter() {
        if key.qubit == qubit {
            filtered.insert(key.clone(), trace.clone());
        }
    }

    if filtered.is_empty() {
        return Err(AppError::new(
            3,
            format!("No traces for qubit '{qubit}' in the input."),
        ));
    }
    Ok(filtered)
}

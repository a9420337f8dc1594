//! Read/write fit-results JSON files.
//!
//! Results JSON is the "portable" representation of a finished run:
//! - resolved signal column and sweep axes
//! - per-trace fitted parameters
//! - per-pair deltas (amplitude ratio, conditional phase, offset difference)
//! - run metadata (tool name, generation timestamp)
//!
//! The `plot` command reloads these files to render fitted curves without
//! refitting.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::domain::{FitDelta, PairKey, SignalColumn, SweepAxis, TraceFit, TraceKey};
use crate::error::AppError;

/// One fitted trace in the results file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitRecord {
    pub key: TraceKey,
    pub fit: TraceFit,
}

/// One ON/OFF pair in the results file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaRecord {
    pub key: PairKey,
    pub delta: FitDelta,
}

/// A saved results file (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsFile {
    pub tool: String,
    pub generated_at: String,
    pub signal: SignalColumn,
    pub axes: Vec<SweepAxis>,
    pub fits: Vec<FitRecord>,
    pub deltas: Vec<DeltaRecord>,
}

impl ResultsFile {
    pub fn new(
        signal: SignalColumn,
        axes: Vec<SweepAxis>,
        fits: &BTreeMap<TraceKey, TraceFit>,
        deltas: &BTreeMap<PairKey, FitDelta>,
    ) -> Self {
        Self {
            tool: "czp".to_string(),
            generated_at: Local::now().to_rfc3339(),
            signal,
            axes,
            fits: fits
                .iter()
                .map(|(key, fit)| FitRecord {
                    key: key.clone(),
                    fit: fit.clone(),
                })
                .collect(),
            deltas: deltas
                .iter()
                .map(|(key, delta)| DeltaRecord {
                    key: key.clone(),
                    delta: *delta,
                })
                .collect(),
        }
    }
}

/// Write a results JSON file.
pub fn write_results_json(path: &Path, results: &ResultsFile) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create results JSON '{}': {e}", path.display()),
        )
    })?;

    serde_json::to_writer_pretty(file, results)
        .map_err(|e| AppError::new(2, format!("Failed to write results JSON: {e}")))?;

    Ok(())
}

/// Read a results JSON file.
pub fn read_results_json(path: &Path) -> Result<ResultsFile, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to open results JSON '{}': {e}", path.display()),
        )
    })?;
    let results: ResultsFile = serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid results JSON: {e}")))?;
    Ok(results)
}

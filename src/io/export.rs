//! Export per-trace fit results to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream
//! analysis scripts: one row per trace, outer sweep coordinates resolved to
//! their named values.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::{SignalColumn, TraceCollection, TraceFit, TraceKey};
use crate::error::AppError;

/// Write per-trace fit results to a CSV file.
pub fn write_fits_csv(
    path: &Path,
    collection: &TraceCollection,
    fits: &BTreeMap<TraceKey, TraceFit>,
    signal: SignalColumn,
) -> Result<(), AppError> {
    let mut file = File::create(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create export CSV '{}': {e}", path.display()),
        )
    })?;

    let axis_names: Vec<String> = collection.axes.iter().map(|a| a.name.clone()).collect();
    let mut header = String::from("qubit");
    for name in &axis_names {
        header.push(',');
        header.push_str(name);
    }
    header.push_str(",ctrl_switch,signal,amplitude,phase_rad,offset,sse,iterations,converged");
    writeln!(file, "{header}")
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV header: {e}")))?;

    for (key, fit) in fits {
        let coords = collection.outer_coords(key);
        let mut row = key.qubit.clone();
        for (_, value) in &coords {
            row.push_str(&format!(",{value:.10}"));
        }
        row.push_str(&format!(
            ",{},{},{},{},{},{},{},{}",
            key.control,
            signal.column_name(),
            fmt(fit.params.amplitude),
            fmt(fit.params.phase),
            fmt(fit.params.offset),
            fmt(fit.sse),
            fit.iterations,
            fit.converged,
        ));
        writeln!(file, "{row}")
            .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }

    Ok(())
}

fn fmt(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.10}")
    } else {
        // Diverged fits carry NaN; keep the cell explicit rather than empty.
        "NaN".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CosineParams, SweepAxis, Trace};

    #[test]
    fn writes_one_row_per_fit() {
        let dir = std::env::temp_dir().join("cz_phase_export_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("fits.csv");

        let mut collection = TraceCollection::new(vec![SweepAxis {
            name: "coupler_amp".to_string(),
            values: vec![-0.1, 0.1],
        }]);
        let key = TraceKey::new("q0", vec![1], true);
        collection.insert(
            key.clone(),
            Trace::new(vec![0.0, 0.5], vec![0.5, 0.5]).unwrap(),
        );

        let mut fits = BTreeMap::new();
        fits.insert(
            key,
            TraceFit {
                params: CosineParams {
                    amplitude: 0.4,
                    phase: 1.0,
                    offset: 0.5,
                },
                sse: 1e-9,
                iterations: 7,
                converged: true,
            },
        );
        fits.insert(TraceKey::new("q1", vec![0], false), TraceFit::diverged());

        write_fits_csv(&path, &collection, &fits, SignalColumn::State).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("qubit,coupler_amp,ctrl_switch"));
        assert!(lines[1].contains("q0"));
        assert!(lines[1].contains("true"));
        assert!(lines[2].contains("NaN"));

        std::fs::remove_file(&path).ok();
    }
}

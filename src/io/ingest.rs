//! CSV ingest and normalization.
//!
//! This module turns a long-format measurement export into a clean
//! `TraceCollection` that is safe to fit.
//!
//! Expected schema (one row per sample):
//!
//! - `qubit` — qubit label
//! - `ctrl_switch` (or `control`/`ctrl`) — control operation ON/OFF
//! - `basis` — fractional cycle position of the sample
//! - one or more signal columns (`state`, `I`, `Q`, `IQ_abs`)
//! - any further numeric columns are treated as outer sweep axes
//!   (e.g. `qubit_amp`, `coupler_amp`), in header order
//!
//! Design goals:
//! - **Strict schema** for required fields (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Deterministic behavior** (stable key ordering, no hidden randomness)
//! - **Separation of concerns**: no fitting logic here

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{
    CollectionStats, SignalColumn, SignalKind, SweepAxis, Trace, TraceCollection, TraceKey,
};
use crate::error::AppError;

/// Accepted spellings of the control-flag column.
const CONTROL_COLUMNS: [&str; 3] = ["ctrl_switch", "control", "ctrl"];

/// Columns that are never outer sweep axes.
const RESERVED_COLUMNS: [&str; 7] = ["qubit", "basis", "state", "I", "Q", "IQ_abs", "ctrl_switch"];

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: normalized collection + resolved signal + stats + row errors.
#[derive(Debug, Clone)]
pub struct IngestedCollection {
    pub collection: TraceCollection,
    pub signal: SignalColumn,
    pub stats: CollectionStats,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

/// Load and normalize a measurement CSV.
pub fn load_collection(path: &Path, signal: SignalKind) -> Result<IngestedCollection, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    read_collection(file, signal)
}

/// Normalize a measurement CSV from any reader (testable without files).
pub fn read_collection<R: Read>(
    reader: R,
    signal: SignalKind,
) -> Result<IngestedCollection, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let qubit_col = *header_map
        .get("qubit")
        .ok_or_else(|| AppError::new(2, "Missing required column 'qubit'."))?;
    let control_col = CONTROL_COLUMNS
        .iter()
        .find_map(|name| header_map.get(*name).copied())
        .ok_or_else(|| AppError::new(2, "Missing required column 'ctrl_switch'."))?;
    let basis_col = *header_map
        .get("basis")
        .ok_or_else(|| AppError::new(2, "Missing required column 'basis'."))?;

    let signal_column = resolve_signal(signal, &header_map)?;
    let signal_col = *header_map
        .get(signal_column.column_name())
        .ok_or_else(|| {
            AppError::new(
                2,
                format!("Missing signal column '{}'.", signal_column.column_name()),
            )
        })?;

    // Remaining columns become outer sweep axes, in header order.
    let axis_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, name)| {
            *i != control_col
                && !RESERVED_COLUMNS.contains(name)
                && !CONTROL_COLUMNS.contains(name)
        })
        .map(|(i, name)| (i, name.to_string()))
        .collect();

    // Pass 1: parse rows, collecting per-axis coordinate values.
    let mut rows = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, record) in reader.records().enumerate() {
        // Line 1 is the header.
        let line = idx + 2;
        rows_read += 1;

        let record = match record {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("Unreadable row: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, qubit_col, control_col, basis_col, signal_col, &axis_cols) {
            Ok(row) => rows.push(row),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    // Per-axis sorted unique coordinate values define the grid indices.
    let mut axis_values: Vec<Vec<f64>> = vec![Vec::new(); axis_cols.len()];
    for row in &rows {
        for (dim, &value) in row.outer.iter().enumerate() {
            if axis_index(&axis_values[dim], value).is_none() {
                axis_values[dim].push(value);
                axis_values[dim]
                    .sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            }
        }
    }

    let axes: Vec<SweepAxis> = axis_cols
        .iter()
        .zip(axis_values.iter())
        .map(|((_, name), values)| SweepAxis {
            name: name.clone(),
            values: values.clone(),
        })
        .collect();

    // Pass 2: group samples into traces.
    let mut grouped: BTreeMap<TraceKey, Vec<(f64, f64)>> = BTreeMap::new();
    let rows_used = rows.len();
    for row in rows {
        let outer: Vec<usize> = row
            .outer
            .iter()
            .enumerate()
            .map(|(dim, &value)| {
                // Present by construction: pass 1 saw this exact value.
                axis_index(&axis_values[dim], value).unwrap_or(0)
            })
            .collect();
        let key = TraceKey::new(row.qubit, outer, row.control);
        grouped.entry(key).or_default().push((row.basis, row.value));
    }

    let mut collection = TraceCollection::new(axes);
    for (key, mut samples) in grouped {
        samples.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        let (basis, values): (Vec<f64>, Vec<f64>) = samples.into_iter().unzip();
        collection.insert(key, Trace::new(basis, values)?);
    }

    let stats = CollectionStats::from_collection(&collection).ok_or_else(|| {
        AppError::new(
            3,
            format!("No usable rows in CSV ({} row errors).", row_errors.len()),
        )
    })?;

    Ok(IngestedCollection {
        collection,
        signal: signal_column,
        stats,
        row_errors,
        rows_read,
        rows_used,
    })
}

struct ParsedRow {
    qubit: String,
    control: bool,
    basis: f64,
    value: f64,
    outer: Vec<f64>,
}

fn parse_row(
    record: &StringRecord,
    qubit_col: usize,
    control_col: usize,
    basis_col: usize,
    signal_col: usize,
    axis_cols: &[(usize, String)],
) -> Result<ParsedRow, String> {
    let qubit = field(record, qubit_col, "qubit")?;
    if qubit.is_empty() {
        return Err("Empty qubit label.".to_string());
    }

    let control = parse_bool(&field(record, control_col, "ctrl_switch")?)?;
    let basis = parse_f64(&field(record, basis_col, "basis")?, "basis")?;
    let value = parse_f64(&field(record, signal_col, "signal")?, "signal")?;

    let mut outer = Vec::with_capacity(axis_cols.len());
    for (col, name) in axis_cols {
        outer.push(parse_f64(&field(record, *col, name)?, name)?);
    }

    Ok(ParsedRow {
        qubit: qubit.to_string(),
        control,
        basis,
        value,
        outer,
    })
}

fn field(record: &StringRecord, col: usize, name: &str) -> Result<String, String> {
    record
        .get(col)
        .map(|s| s.to_string())
        .ok_or_else(|| format!("Missing '{name}' field."))
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "on" => Ok(true),
        "false" | "0" | "off" => Ok(false),
        other => Err(format!("Invalid control flag '{other}'.")),
    }
}

fn parse_f64(raw: &str, name: &str) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("Invalid number '{raw}' in '{name}'."))?;
    if !value.is_finite() {
        return Err(format!("Non-finite value in '{name}'."));
    }
    Ok(value)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_string(), i))
        .collect()
}

/// Resolve `SignalKind::Auto` to an actual column based on which columns exist.
fn resolve_signal(
    signal: SignalKind,
    header_map: &HashMap<String, usize>,
) -> Result<SignalColumn, AppError> {
    if let Some(column) = signal.to_column() {
        return Ok(column);
    }

    for candidate in [SignalColumn::State, SignalColumn::I, SignalColumn::IqAbs] {
        if header_map.contains_key(candidate.column_name()) {
            return Ok(candidate);
        }
    }

    Err(AppError::new(
        2,
        "No signal column found (expected one of 'state', 'I', 'IQ_abs').",
    ))
}

/// Exact-match lookup of a coordinate in a sorted axis value list.
fn axis_index(values: &[f64], value: f64) -> Option<usize> {
    values
        .binary_search_by(|probe| probe.partial_cmp(&value).unwrap_or(std::cmp::Ordering::Equal))
        .ok()
        .filter(|&i| values[i] == value)
}

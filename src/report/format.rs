//! Formatted terminal output: run summary, fit/delta tables, rankings.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized (important for golden tests)

use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::domain::{
    CollectionStats, FitDelta, PairKey, SignalColumn, TraceCollection, TraceFit, TraceKey,
};
use crate::math::{to_degrees, wrap_to_pi};

/// Pairs ranked by how close their conditional phase is to a target.
///
/// A CZ calibration looks for the working point whose phase difference is
/// closest to pi; pairs with undefined deltas rank last.
#[derive(Debug, Clone)]
pub struct TargetRanking {
    pub target: f64,
    pub ranked: Vec<(PairKey, FitDelta)>,
}

/// Rank pairs by `|wrap(phase_diff - target)|`, best first.
pub fn rank_by_target(
    deltas: &BTreeMap<PairKey, FitDelta>,
    target: f64,
    top_n: usize,
) -> TargetRanking {
    let mut ranked: Vec<(PairKey, FitDelta)> = deltas
        .iter()
        .filter(|(_, delta)| delta.phase_diff.is_finite())
        .map(|(key, delta)| (key.clone(), *delta))
        .collect();

    ranked.sort_by(|a, b| {
        let da = wrap_to_pi(a.1.phase_diff - target).abs();
        let db = wrap_to_pi(b.1.phase_diff - target).abs();
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(top_n);

    TargetRanking { target, ranked }
}

/// Format the full run summary (dataset stats + fit convergence counts).
pub fn format_run_summary(
    stats: &CollectionStats,
    signal: SignalColumn,
    fits: &BTreeMap<TraceKey, TraceFit>,
    row_errors: usize,
) -> String {
    let converged = fits.values().filter(|f| f.converged).count();
    let failed = fits.len() - converged;

    let mut out = String::new();
    out.push_str("=== czp - CZ Conditional Phase Fit ===\n");
    out.push_str(&format!(
        "Signal: {} ({})\n",
        signal.column_name(),
        signal.unit_label()
    ));
    out.push_str(&format!(
        "Traces: n={} | points/trace=[{}, {}] | basis=[{:.3}, {:.3}]\n",
        stats.n_traces,
        stats.n_points_per_trace_min,
        stats.n_points_per_trace_max,
        stats.basis_min,
        stats.basis_max,
    ));
    out.push_str(&format!(
        "Values: [{:.4}, {:.4}]\n",
        stats.value_min, stats.value_max
    ));
    out.push_str(&format!("Fits: {converged} converged, {failed} failed\n"));
    if row_errors > 0 {
        out.push_str(&format!("Ingest: {row_errors} rows skipped (see stderr)\n"));
    }
    out.push('\n');

    out
}

/// Format the per-trace fit table.
pub fn format_fit_table(
    collection: &TraceCollection,
    fits: &BTreeMap<TraceKey, TraceFit>,
) -> String {
    let mut out = String::new();
    out.push_str("Per-trace fits:\n");
    out.push_str(&format!(
        "{:<20} {:>10} {:>10} {:>10} {:>12} {:>6}\n",
        "trace", "A", "phi_rad", "c", "sse", "iters"
    ));

    for (key, fit) in fits {
        let coords = collection.outer_coords(key);
        let label = trace_label(key, &coords);
        if fit.converged {
            out.push_str(&format!(
                "{:<20} {:>10.4} {:>10.4} {:>10.4} {:>12.3e} {:>6}\n",
                label, fit.params.amplitude, fit.params.phase, fit.params.offset, fit.sse,
                fit.iterations,
            ));
        } else {
            out.push_str(&format!("{label:<20} {:>10} (fit failed)\n", "-"));
        }
    }

    out
}

/// Format the ON/OFF delta table.
pub fn format_delta_table(
    collection: &TraceCollection,
    deltas: &BTreeMap<PairKey, FitDelta>,
) -> String {
    let mut out = String::new();
    out.push_str("ON/OFF contrast (per pair):\n");
    out.push_str(&format!(
        "{:<20} {:>10} {:>12} {:>12} {:>10}\n",
        "pair", "A_on/A_off", "dphi_rad", "dphi_deg", "dc"
    ));

    for (key, delta) in deltas {
        let coords = pair_coords(collection, key);
        let label = pair_label(key, &coords);
        out.push_str(&format!(
            "{:<20} {:>10.4} {:>12.4} {:>12.2} {:>10.4}\n",
            label,
            delta.amplitude_ratio,
            delta.phase_diff,
            to_degrees(delta.phase_diff),
            delta.offset_diff,
        ));
    }

    out
}

/// Format the ranking of pairs closest to the target conditional phase.
pub fn format_target_ranking(ranking: &TargetRanking) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Closest to target phase {:.4} rad ({:.1} deg):\n",
        ranking.target,
        to_degrees(ranking.target)
    ));

    for (i, (key, delta)) in ranking.ranked.iter().enumerate() {
        let miss = wrap_to_pi(delta.phase_diff - ranking.target);
        out.push_str(&format!(
            "{:>3}. {key}  dphi={:.4} rad  miss={:+.4} rad  A_ratio={:.4}\n",
            i + 1,
            delta.phase_diff,
            miss,
            delta.amplitude_ratio,
        ));
    }
    if ranking.ranked.is_empty() {
        out.push_str("  (no defined pairs)\n");
    }

    out
}

/// The ON/OFF annotation block shown next to a plotted pair.
pub fn format_pair_annotation(on: &TraceFit, off: &TraceFit, delta: &FitDelta) -> String {
    format!(
        "ON: A={:.3}, phi={:.3}\nOFF: A={:.3}, phi={:.3}\nDiff: A={:.3}, phi={:.3}\n",
        on.params.amplitude,
        on.params.phase,
        off.params.amplitude,
        off.params.phase,
        delta.amplitude_ratio,
        delta.phase_diff,
    )
}

/// Default calibration target: a full conditional pi phase.
pub fn cz_target_phase() -> f64 {
    PI
}

fn trace_label(key: &TraceKey, coords: &[(String, f64)]) -> String {
    let mut label = key.qubit.clone();
    for (_, value) in coords {
        label.push_str(&format!(" {value:+.3}"));
    }
    label.push_str(if key.control { " on" } else { " off" });
    label
}

fn pair_coords(collection: &TraceCollection, key: &PairKey) -> Vec<(String, f64)> {
    let probe = TraceKey::new(key.qubit.clone(), key.outer.clone(), true);
    collection.outer_coords(&probe)
}

fn pair_label(key: &PairKey, coords: &[(String, f64)]) -> String {
    let mut label = key.qubit.clone();
    for (_, value) in coords {
        label.push_str(&format!(" {value:+.3}"));
    }
    label
}

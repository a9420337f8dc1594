//! Debug bundle writer for inspecting a full run offline.
//!
//! The bundle is a single timestamped markdown file with the run settings,
//! collection stats, every fitted trace, and every ON/OFF delta. It is the
//! artifact to attach when a sweep fits strangely on hardware.

use std::collections::BTreeMap;
use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::PathBuf;

use chrono::Local;

use crate::domain::{
    CollectionStats, FitConfig, FitDelta, PairKey, SignalColumn, TraceCollection, TraceFit,
    TraceKey,
};
use crate::error::AppError;

pub fn write_debug_bundle(
    config: &FitConfig,
    collection: &TraceCollection,
    signal: SignalColumn,
    stats: &CollectionStats,
    fits: &BTreeMap<TraceKey, TraceFit>,
    deltas: &BTreeMap<PairKey, FitDelta>,
) -> Result<PathBuf, AppError> {
    let dir = PathBuf::from("debug");
    create_dir_all(&dir).map_err(|e| AppError::new(4, format!("Failed to create debug dir: {e}")))?;

    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("czp_debug_seed{}_{ts}.md", config.demo_seed));

    let mut out = String::new();
    out.push_str("# czp debug bundle\n");
    out.push_str(&format!("- generated: {}\n", Local::now().to_rfc3339()));
    out.push_str(&format!("- signal: {}\n", signal.column_name()));
    out.push_str(&format!("- max_iterations: {}\n", config.max_iterations));
    out.push_str(&format!(
        "- demo: seed={}, qubits={}, amp_steps={}, basis_steps={}, noise={:.4}, cond_phase={:.4}, damping={:.3}\n",
        config.demo_seed,
        config.demo_qubits,
        config.demo_amp_steps,
        config.demo_basis_steps,
        config.demo_noise_sigma,
        config.demo_cond_phase,
        config.demo_amp_damping,
    ));

    out.push_str("\n## Collection\n");
    out.push_str(&format!(
        "- traces: {} | points/trace: [{}, {}]\n",
        stats.n_traces, stats.n_points_per_trace_min, stats.n_points_per_trace_max
    ));
    out.push_str(&format!(
        "- basis: [{:.4}, {:.4}] | values: [{:.4}, {:.4}]\n",
        stats.basis_min, stats.basis_max, stats.value_min, stats.value_max
    ));
    for axis in &collection.axes {
        out.push_str(&format!("- axis `{}`: {}\n", axis.name, fmt_vec(&axis.values)));
    }

    out.push_str("\n## Fits\n");
    out.push_str("| trace | A | phi | c | sse | iters | converged |\n");
    out.push_str("| - | - | - | - | - | - | - |\n");
    for (key, fit) in fits {
        out.push_str(&format!(
            "| {key} | {} | {} | {} | {} | {} | {} |\n",
            fmt_opt(fit.params.amplitude),
            fmt_opt(fit.params.phase),
            fmt_opt(fit.params.offset),
            fmt_opt(fit.sse),
            fit.iterations,
            fit.converged,
        ));
    }

    out.push_str("\n## ON/OFF deltas\n");
    out.push_str("| pair | A_on/A_off | dphi | dc |\n");
    out.push_str("| - | - | - | - |\n");
    for (key, delta) in deltas {
        out.push_str(&format!(
            "| {key} | {} | {} | {} |\n",
            fmt_opt(delta.amplitude_ratio),
            fmt_opt(delta.phase_diff),
            fmt_opt(delta.offset_diff),
        ));
    }

    let mut file =
        File::create(&path).map_err(|e| AppError::new(4, format!("Failed to create debug file: {e}")))?;
    file.write_all(out.as_bytes())
        .map_err(|e| AppError::new(4, format!("Failed to write debug file: {e}")))?;

    Ok(path)
}

fn fmt_vec(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{v:.4}")).collect();
    format!("[{}]", parts.join(", "))
}

fn fmt_opt(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.6}")
    } else {
        "-".to_string()
    }
}

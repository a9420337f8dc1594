//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - reloaded later for plotting or comparisons

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Which signal column to fit.
///
/// `Auto` means: prefer `state` if present, else `I`, else `IQ_abs`.
/// State populations live in `[0, 1]`, which is what the default initial
/// guess assumes; raw quadratures fit too, but may need a custom guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Auto,
    State,
    I,
    Q,
    IqAbs,
}

/// Concrete signal column actually used after resolving `SignalKind::Auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalColumn {
    State,
    I,
    Q,
    IqAbs,
}

impl SignalKind {
    pub fn to_column(self) -> Option<SignalColumn> {
        match self {
            SignalKind::Auto => None,
            SignalKind::State => Some(SignalColumn::State),
            SignalKind::I => Some(SignalColumn::I),
            SignalKind::Q => Some(SignalColumn::Q),
            SignalKind::IqAbs => Some(SignalColumn::IqAbs),
        }
    }
}

impl SignalColumn {
    /// Column name as it appears in measurement exports.
    pub fn column_name(self) -> &'static str {
        match self {
            SignalColumn::State => "state",
            SignalColumn::I => "I",
            SignalColumn::Q => "Q",
            SignalColumn::IqAbs => "IQ_abs",
        }
    }

    /// Unit label for terminal output.
    pub fn unit_label(self) -> &'static str {
        match self {
            SignalColumn::State => "population",
            SignalColumn::I | SignalColumn::Q | SignalColumn::IqAbs => "V",
        }
    }
}

/// One measured sequence of samples over the swept basis coordinate.
///
/// `basis` holds fractional cycle positions (a full 2π period corresponds to
/// the coordinate advancing by 1.0); `values` holds the measured signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub basis: Vec<f64>,
    pub values: Vec<f64>,
}

impl Trace {
    pub fn new(basis: Vec<f64>, values: Vec<f64>) -> Result<Self, AppError> {
        if basis.len() != values.len() {
            return Err(AppError::new(
                3,
                format!(
                    "Trace length mismatch: {} basis points vs {} values.",
                    basis.len(),
                    values.len()
                ),
            ));
        }
        Ok(Self { basis, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Index of one trace within a collection.
///
/// Outer sweep positions are stored as grid indices (not coordinate values)
/// so keys stay `Eq + Ord` and iteration order is deterministic. The
/// coordinate values live on the collection's `SweepAxis` list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TraceKey {
    pub qubit: String,
    pub outer: Vec<usize>,
    /// Control operation applied (ON) or omitted (OFF) for this trace.
    pub control: bool,
}

impl TraceKey {
    pub fn new(qubit: impl Into<String>, outer: Vec<usize>, control: bool) -> Self {
        Self {
            qubit: qubit.into(),
            outer,
            control,
        }
    }

    /// The same index with the control flag flipped.
    pub fn complement(&self) -> Self {
        Self {
            qubit: self.qubit.clone(),
            outer: self.outer.clone(),
            control: !self.control,
        }
    }

    /// The control-independent part of the key.
    pub fn pair_key(&self) -> PairKey {
        PairKey {
            qubit: self.qubit.clone(),
            outer: self.outer.clone(),
        }
    }
}

impl std::fmt::Display for TraceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.qubit)?;
        for idx in &self.outer {
            write!(f, "[{idx}]")?;
        }
        write!(f, "/{}", if self.control { "on" } else { "off" })
    }
}

/// Index of an ON/OFF pair (a `TraceKey` with the control flag stripped).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub qubit: String,
    pub outer: Vec<usize>,
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.qubit)?;
        for idx in &self.outer {
            write!(f, "[{idx}]")?;
        }
        Ok(())
    }
}

/// A named outer sweep axis (e.g. `qubit_amp`, `coupler_amp`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepAxis {
    pub name: String,
    pub values: Vec<f64>,
}

/// A read-only snapshot of measured traces, keyed for deterministic iteration.
///
/// Traces normally share the same basis coordinates, but that is a convention
/// of how experiments are run, not an enforced invariant: batch fitting must
/// tolerate (and mark) a single malformed trace without poisoning the rest.
#[derive(Debug, Clone, Default)]
pub struct TraceCollection {
    pub axes: Vec<SweepAxis>,
    traces: BTreeMap<TraceKey, Trace>,
}

impl TraceCollection {
    pub fn new(axes: Vec<SweepAxis>) -> Self {
        Self {
            axes,
            traces: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: TraceKey, trace: Trace) {
        self.traces.insert(key, trace);
    }

    pub fn get(&self, key: &TraceKey) -> Option<&Trace> {
        self.traces.get(key)
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TraceKey, &Trace)> {
        self.traces.iter()
    }

    /// Borrow the underlying map (for parallel iteration).
    pub fn entries(&self) -> &BTreeMap<TraceKey, Trace> {
        &self.traces
    }

    pub fn keys(&self) -> impl Iterator<Item = &TraceKey> {
        self.traces.keys()
    }

    /// Resolve an outer index tuple to named coordinate values.
    ///
    /// Indices beyond the known axes (or out of range) resolve to NaN so that
    /// reporting stays total even on partially described collections.
    pub fn outer_coords(&self, key: &TraceKey) -> Vec<(String, f64)> {
        key.outer
            .iter()
            .enumerate()
            .map(|(dim, &idx)| {
                let name = self
                    .axes
                    .get(dim)
                    .map(|a| a.name.clone())
                    .unwrap_or_else(|| format!("axis{dim}"));
                let value = self
                    .axes
                    .get(dim)
                    .and_then(|a| a.values.get(idx))
                    .copied()
                    .unwrap_or(f64::NAN);
                (name, value)
            })
            .collect()
    }
}

/// Best-fit parameters of `y = A*cos(2*pi*x + phi) + c`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CosineParams {
    /// Amplitude, constrained non-negative by the fit bounds.
    pub amplitude: f64,
    /// Phase in radians, always reported in `[-pi, pi]`.
    pub phase: f64,
    /// Vertical offset.
    pub offset: f64,
}

impl CosineParams {
    pub fn nan() -> Self {
        Self {
            amplitude: f64::NAN,
            phase: f64::NAN,
            offset: f64::NAN,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.amplitude.is_finite() && self.phase.is_finite() && self.offset.is_finite()
    }
}

/// Fit outcome for a single trace.
///
/// A failed fit (`converged == false`) carries NaN parameters and must not be
/// used in further arithmetic without an `is_defined` check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceFit {
    pub params: CosineParams,
    /// Sum of squared residuals at the solution (NaN when diverged).
    pub sse: f64,
    /// Solver iterations spent (0 when the fit never ran).
    pub iterations: usize,
    pub converged: bool,
}

impl TraceFit {
    /// The marker result for a fit that failed or never ran.
    pub fn diverged() -> Self {
        Self {
            params: CosineParams::nan(),
            sse: f64::NAN,
            iterations: 0,
            converged: false,
        }
    }
}

/// Derived comparison between the ON and OFF fits of one pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FitDelta {
    /// `A_on / A_off`; NaN when `A_off == 0`.
    pub amplitude_ratio: f64,
    /// `phi_on - phi_off`, wrapped to `[-pi, pi]`.
    pub phase_diff: f64,
    /// `c_on - c_off`.
    pub offset_diff: f64,
}

/// Summary stats about the traces actually used for fitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStats {
    pub n_traces: usize,
    pub n_points_per_trace_min: usize,
    pub n_points_per_trace_max: usize,
    pub basis_min: f64,
    pub basis_max: f64,
    pub value_min: f64,
    pub value_max: f64,
}

impl CollectionStats {
    pub fn from_collection(collection: &TraceCollection) -> Option<Self> {
        let mut n_min = usize::MAX;
        let mut n_max = 0usize;
        let mut basis_min = f64::INFINITY;
        let mut basis_max = f64::NEG_INFINITY;
        let mut value_min = f64::INFINITY;
        let mut value_max = f64::NEG_INFINITY;

        for (_, trace) in collection.iter() {
            n_min = n_min.min(trace.len());
            n_max = n_max.max(trace.len());
            for &x in &trace.basis {
                basis_min = basis_min.min(x);
                basis_max = basis_max.max(x);
            }
            for &y in &trace.values {
                value_min = value_min.min(y);
                value_max = value_max.max(y);
            }
        }

        if collection.is_empty() || !basis_min.is_finite() || !value_min.is_finite() {
            return None;
        }

        Some(Self {
            n_traces: collection.len(),
            n_points_per_trace_min: n_min,
            n_points_per_trace_max: n_max,
            basis_min,
            basis_max,
            value_min,
            value_max,
        })
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Input CSV (None for synthetic demo runs).
    pub input_path: Option<PathBuf>,
    pub signal: SignalKind,

    /// Restrict fitting/reporting to one qubit (None = all).
    pub qubit_filter: Option<String>,

    /// Solver iteration budget per trace.
    pub max_iterations: usize,

    pub top_n: usize,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export_results: Option<PathBuf>,
    pub export_fits: Option<PathBuf>,

    // Synthetic demo settings.
    pub demo_seed: u64,
    pub demo_qubits: usize,
    pub demo_amp_steps: usize,
    pub demo_basis_steps: usize,
    pub demo_noise_sigma: f64,
    pub demo_cond_phase: f64,
    pub demo_amp_damping: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            input_path: None,
            signal: SignalKind::Auto,
            qubit_filter: None,
            max_iterations: 200,
            top_n: 10,
            plot: true,
            plot_width: 100,
            plot_height: 25,
            export_results: None,
            export_fits: None,
            demo_seed: 42,
            demo_qubits: 2,
            demo_amp_steps: 5,
            demo_basis_steps: 20,
            demo_noise_sigma: 0.01,
            demo_cond_phase: 1.2,
            demo_amp_damping: 0.85,
        }
    }
}

//! Command-line parsing for the conditional-phase fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command
//! dispatch** separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::SignalKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "czp", version, about = "CZ Conditional-Phase Cosine Fitter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit a measurement CSV, print diagnostics, and optionally plot/export.
    Fit(FitArgs),
    /// Run the same pipeline on a synthetic conditional-phase sweep.
    ///
    /// This is the default command: a bare `czp` behaves like `czp demo`.
    Demo(DemoArgs),
    /// Plot fitted curves from a previously exported results JSON.
    Plot(PlotArgs),
    /// Write a markdown debug bundle for a synthetic sweep.
    Debug(DemoArgs),
}

/// Options shared by every fitting command.
#[derive(Debug, Parser, Clone)]
pub struct OutputArgs {
    /// Solver iteration budget per trace.
    #[arg(long, default_value_t = 200)]
    pub max_iterations: usize,

    /// Show the top-N pairs closest to the target conditional phase.
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Render an ASCII plot of the best pair (enabled by default).
    #[arg(long, default_value_t = true)]
    pub plot: bool,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Export per-trace fits to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export full results (fits + deltas) to JSON.
    #[arg(long = "export-fits")]
    pub export_fits: Option<PathBuf>,
}

/// Options for fitting a measurement CSV.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Long-format measurement CSV (one row per sample).
    #[arg(short = 'i', long, value_name = "CSV")]
    pub input: PathBuf,

    /// Signal column to fit.
    #[arg(long, value_enum, default_value_t = SignalKind::Auto)]
    pub signal: SignalKind,

    /// Restrict fitting/reporting to one qubit.
    #[arg(short = 'q', long)]
    pub qubit: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Options for the synthetic demo sweep.
#[derive(Debug, Parser, Clone)]
pub struct DemoArgs {
    /// Random seed for the synthetic sweep.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of simulated qubits.
    #[arg(long, default_value_t = 2)]
    pub qubits: usize,

    /// Coupler amplitude steps in the outer sweep.
    #[arg(long, default_value_t = 5)]
    pub amp_steps: usize,

    /// Basis points per trace.
    #[arg(long, default_value_t = 20)]
    pub basis_steps: usize,

    /// Gaussian readout noise sigma.
    #[arg(long, default_value_t = 0.01)]
    pub noise: f64,

    /// Conditional phase (radians) at the top of the amplitude sweep.
    #[arg(long, default_value_t = 1.2)]
    pub cond_phase: f64,

    /// ON-trace amplitude damping factor in (0, 1].
    #[arg(long, default_value_t = 0.85)]
    pub amp_damping: f64,

    /// Restrict fitting/reporting to one qubit.
    #[arg(short = 'q', long)]
    pub qubit: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Options for plotting a saved results file.
#[derive(Debug, Parser)]
pub struct PlotArgs {
    /// Results JSON produced by `--export-fits`.
    #[arg(long, value_name = "JSON")]
    pub fits: PathBuf,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads a measurement CSV or generates a synthetic sweep
//! - runs batch fitting + ON/OFF reduction
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;

use crate::cli::{Command, DemoArgs, FitArgs, OutputArgs, PlotArgs};
use crate::domain::{FitConfig, TraceCollection};
use crate::error::AppError;
use crate::plot::PairSeries;
use crate::report;

pub mod pipeline;

/// Entry point for the `czp` binary.
pub fn run() -> Result<(), AppError> {
    // We want `czp` and `czp --seed 7` to behave like `czp demo ...`.
    //
    // Clap requires a subcommand name, so we do a small, explicit rewrite of
    // the argv list before parsing. This preserves a clean clap structure
    // while retaining the requested UX.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Demo(args) => handle_demo(args, false),
        Command::Plot(args) => handle_plot(args),
        Command::Debug(args) => handle_demo(args, true),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_fit_args(&args);
    let (collection, run) = pipeline::run_fit(&config)?;
    report_run(&config, &collection, &run)
}

fn handle_demo(args: DemoArgs, write_bundle: bool) -> Result<(), AppError> {
    let config = fit_config_from_demo_args(&args);
    let (collection, run) = pipeline::run_fit(&config)?;
    report_run(&config, &collection, &run)?;

    if write_bundle {
        let path = crate::debug::write_debug_bundle(
            &config,
            &collection,
            run.signal,
            &run.stats,
            &run.fits,
            &run.deltas,
        )?;
        println!("Debug bundle written to {}", path.display());
    }

    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let results = crate::io::results::read_results_json(&args.fits)?;

    // Redraw each pair's fitted curves from the saved parameters (no raw
    // samples in the file, so curves only).
    for record in &results.deltas {
        let on_key = crate::domain::TraceKey::new(
            record.key.qubit.clone(),
            record.key.outer.clone(),
            true,
        );
        let off_key = on_key.complement();
        let on = results.fits.iter().find(|f| f.key == on_key);
        let off = results.fits.iter().find(|f| f.key == off_key);

        let series = PairSeries {
            on_fit: on.map(|f| &f.fit.params),
            off_fit: off.map(|f| &f.fit.params),
            ..PairSeries::default()
        };

        println!("{}:", record.key);
        println!("{}", crate::plot::render_pair_plot(&series, args.width, args.height));
        if let (Some(on), Some(off)) = (on, off) {
            println!(
                "{}",
                report::format_pair_annotation(&on.fit, &off.fit, &record.delta)
            );
        }
    }

    Ok(())
}

fn report_run(
    config: &FitConfig,
    collection: &TraceCollection,
    run: &pipeline::RunOutput,
) -> Result<(), AppError> {
    for err in &run.row_errors {
        eprintln!("line {}: {}", err.line, err.message);
    }

    print!(
        "{}",
        report::format_run_summary(&run.stats, run.signal, &run.fits, run.row_errors.len())
    );
    print!("{}", report::format_fit_table(collection, &run.fits));
    println!();
    print!("{}", report::format_delta_table(collection, &run.deltas));
    println!();

    let ranking = report::rank_by_target(&run.deltas, report::cz_target_phase(), config.top_n);
    print!("{}", report::format_target_ranking(&ranking));

    if config.plot {
        if let Some((pair, delta)) = ranking.ranked.first() {
            let on_key =
                crate::domain::TraceKey::new(pair.qubit.clone(), pair.outer.clone(), true);
            let off_key = on_key.complement();
            let on_fit = run.fits.get(&on_key);
            let off_fit = run.fits.get(&off_key);

            let series = PairSeries {
                on_trace: collection.get(&on_key),
                off_trace: collection.get(&off_key),
                on_fit: on_fit.map(|f| &f.params),
                off_fit: off_fit.map(|f| &f.params),
            };

            println!("\nBest pair {pair}:");
            println!(
                "{}",
                crate::plot::render_pair_plot(&series, config.plot_width, config.plot_height)
            );
            if let (Some(on), Some(off)) = (on_fit, off_fit) {
                print!("{}", report::format_pair_annotation(on, off, delta));
            }
        }
    }

    if let Some(path) = &config.export_results {
        crate::io::export::write_fits_csv(path, collection, &run.fits, run.signal)?;
        println!("Fits CSV written to {}", path.display());
    }
    if let Some(path) = &config.export_fits {
        let results = crate::io::results::ResultsFile::new(
            run.signal,
            collection.axes.clone(),
            &run.fits,
            &run.deltas,
        );
        crate::io::results::write_results_json(path, &results)?;
        println!("Results JSON written to {}", path.display());
    }

    Ok(())
}

fn apply_output_args(config: &mut FitConfig, output: &OutputArgs) {
    config.max_iterations = output.max_iterations;
    config.top_n = output.top;
    config.plot = output.plot && !output.no_plot;
    config.plot_width = output.width;
    config.plot_height = output.height;
    config.export_results = output.export.clone();
    config.export_fits = output.export_fits.clone();
}

pub fn fit_config_from_fit_args(args: &FitArgs) -> FitConfig {
    let mut config = FitConfig {
        input_path: Some(args.input.clone()),
        signal: args.signal,
        qubit_filter: args.qubit.clone(),
        ..FitConfig::default()
    };
    apply_output_args(&mut config, &args.output);
    config
}

pub fn fit_config_from_demo_args(args: &DemoArgs) -> FitConfig {
    let mut config = FitConfig {
        input_path: None,
        qubit_filter: args.qubit.clone(),
        demo_seed: args.seed,
        demo_qubits: args.qubits,
        demo_amp_steps: args.amp_steps,
        demo_basis_steps: args.basis_steps,
        demo_noise_sigma: args.noise,
        demo_cond_phase: args.cond_phase,
        demo_amp_damping: args.amp_damping,
        ..FitConfig::default()
    };
    apply_output_args(&mut config, &args.output);
    config
}

/// Rewrite argv so `czp` defaults to `czp demo`.
///
/// Rules:
/// - `czp`                     -> `czp demo`
/// - `czp --seed 7 ...`        -> `czp demo --seed 7 ...`
/// - `czp --help/--version/-h` -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("demo".to_string());
        return argv;
    };

    let is_top_level_help_or_version =
        matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "fit" | "demo" | "plot" | "debug");
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "demo flags".
    if arg1.starts_with('-') {
        argv.insert(1, "demo".to_string());
        return argv;
    }

    // Otherwise, leave as-is.
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_invocation_becomes_demo() {
        assert_eq!(rewrite_args(args(&["czp"])), args(&["czp", "demo"]));
    }

    #[test]
    fn leading_flags_route_to_demo() {
        assert_eq!(
            rewrite_args(args(&["czp", "--seed", "7"])),
            args(&["czp", "demo", "--seed", "7"])
        );
    }

    #[test]
    fn subcommands_and_help_pass_through() {
        assert_eq!(
            rewrite_args(args(&["czp", "fit", "-i", "x.csv"])),
            args(&["czp", "fit", "-i", "x.csv"])
        );
        assert_eq!(rewrite_args(args(&["czp", "--help"])), args(&["czp", "--help"]));
    }
}

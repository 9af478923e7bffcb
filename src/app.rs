//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - sets up logging and environment defaults
//! - resolves configuration and input files
//! - runs calibration / simulation / scenario analysis
//! - prints reports and plots

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use crate::calibration::{BayesianModel, default_params, find_mle};
use crate::cli::{Command, GlobalArgs, MleArgs, RunArgs, ScenariosArgs, SimulateArgs};
use crate::data::{
    MLE_PARAMS_FILE, RunConfig, TIME_VARIANT_FILE, load_params, load_time_variant, write_params,
};
use crate::domain::{ParamSet, Scenario, TimeVariantData};
use crate::error::AppError;
use crate::io::{DEFAULT_OUTPUT_ROOT, ensure_dir, read_trace_csv, task_output_dir, write_results_csv};
use crate::models::{ModelRunner, TbModelSpec};

pub mod pipeline;

const ENV_OUTPUT_ROOT: &str = "TBU_OUTPUT_ROOT";
const ENV_DATA_DIR: &str = "TBU_DATA_DIR";
const DEFAULT_DATA_DIR: &str = "data";

/// Entry point for the `tbu` binary.
pub fn run() -> Result<(), AppError> {
    // We want `tbu <JOB_ID> <TASK_ID>` to behave like `tbu run <JOB_ID> <TASK_ID>`,
    // matching how array jobs pass their ids.
    //
    // Clap requires a subcommand name, so we do a small, explicit rewrite of the
    // argv list before parsing.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    dotenvy::dotenv().ok();
    setup_logging(cli.global.verbose);

    match cli.command {
        Command::Run(args) => handle_run(&cli.global, args),
        Command::Mle(args) => handle_mle(&cli.global, args),
        Command::Simulate(args) => handle_simulate(&cli.global, args),
        Command::Scenarios(args) => handle_scenarios(&cli.global, args),
        Command::Tasks => handle_tasks(),
    }
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (e.g. in tests) keeps the first subscriber.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

fn handle_run(global: &GlobalArgs, args: RunArgs) -> Result<(), AppError> {
    let config = RunConfig::load(global.config.as_deref(), global.mode)?;
    let data_dir = data_dir(global);
    let time_variant = load_time_variant(&data_dir.join(TIME_VARIANT_FILE))?;
    let mle_path = args.mle.clone().unwrap_or_else(|| data_dir.join(MLE_PARAMS_FILE));
    let mle_params = load_params(&mle_path)?;

    let fixed_param = pipeline::fixed_param_for_task(args.task_id)?;
    let root = args.output_root.clone().unwrap_or_else(output_root);
    let output_dir = task_output_dir(&root, &args.job_id, &args.analysis_name, fixed_param.as_deref());
    ensure_dir(&output_dir)?;

    println!(
        "{}",
        crate::report::format_run_header(&args.job_id, args.task_id, fixed_param.as_deref(), &config)
    );

    let run = pipeline::run_analysis(
        &args.job_id,
        args.task_id,
        fixed_param.as_deref(),
        &mle_params,
        &config,
        &time_variant,
        &output_dir,
    )?;

    println!(
        "{}",
        crate::report::format_param_summary(&run.summaries, &run.manifest.acceptance_rates)
    );
    if let Some((best, log_posterior)) = run.trace.best() {
        println!(
            "{}",
            crate::report::format_params(&format!("Best draw (log posterior {log_posterior:.3})"), &best)
        );
    }
    if !args.no_plot {
        let plot =
            crate::plot::render_quantile_plot(&run.scenarios.prevalence, &pipeline::check_targets(), 100, 25)?;
        println!("{plot}");
    }
    println!("{}", crate::report::format_diff_tables(&run.scenarios.diffs));

    info!(
        output_dir = %run.output_dir.display(),
        elapsed_secs = run.manifest.elapsed_secs,
        "finished"
    );
    Ok(())
}

fn handle_mle(global: &GlobalArgs, args: MleArgs) -> Result<(), AppError> {
    let config = RunConfig::load(global.config.as_deref(), global.mode)?;
    let data_dir = data_dir(global);
    let spec = model_spec(&config, load_time_variant(&data_dir.join(TIME_VARIANT_FILE))?)?;

    let budget = args.budget.unwrap_or(config.analysis.opti_budget);
    let bcm = BayesianModel::new(spec, &ParamSet::new(), None)?;
    let mle = find_mle(&bcm, budget, config.rng_seed)?;

    let path = args.output.unwrap_or_else(|| data_dir.join(MLE_PARAMS_FILE));
    write_params(&path, &mle)?;
    println!("{}", crate::report::format_params("Point estimate", &mle));
    info!(path = %path.display(), "point estimate written");
    Ok(())
}

fn handle_simulate(global: &GlobalArgs, args: SimulateArgs) -> Result<(), AppError> {
    let config = RunConfig::load(global.config.as_deref(), global.mode)?;
    let data_dir = data_dir(global);
    let spec = model_spec(&config, load_time_variant(&data_dir.join(TIME_VARIANT_FILE))?)?;

    let mut params = default_params();
    match &args.params {
        Some(path) => params.extend(load_params(path)?),
        None => {
            let path = data_dir.join(MLE_PARAMS_FILE);
            if path.is_file() {
                params.extend(load_params(&path)?);
            }
        }
    }

    let mut interventions = args.interventions.clone();
    interventions.sort();
    interventions.dedup();
    let scenario = match interventions.as_slice() {
        [] => Scenario::baseline(),
        [single] => Scenario::single(*single),
        many => Scenario {
            name: many.iter().map(|i| i.name()).collect::<Vec<_>>().join("+"),
            interventions: many.to_vec(),
        },
    };
    info!(scenario = %scenario.name, "simulating");
    let results = spec.with_scenario(scenario).run(&params)?;

    println!("{}", crate::report::format_params("Parameters", &params));
    if let Some(path) = &args.output {
        write_results_csv(path, &results)?;
        info!(path = %path.display(), "results written");
    }
    if !args.no_plot {
        let values = results.output(&args.plot_output)?;
        let targets = if args.plot_output == pipeline::CHECK_OUTPUT {
            pipeline::check_targets()
        } else {
            Vec::new()
        };
        let start = results
            .time_index(config.model.report_start_time)
            .unwrap_or(0);
        let plot = crate::plot::render_series_plot(
            &args.plot_output,
            &results.times[start..],
            &values[start..],
            &targets,
            args.width,
            args.height,
        );
        println!("{plot}");
    }
    Ok(())
}

fn handle_scenarios(global: &GlobalArgs, args: ScenariosArgs) -> Result<(), AppError> {
    let config = RunConfig::load(global.config.as_deref(), global.mode)?;
    let data_dir = data_dir(global);
    let spec = model_spec(&config, load_time_variant(&data_dir.join(TIME_VARIANT_FILE))?)?;

    let mut base = default_params();
    let mle_path = args.mle.clone().unwrap_or_else(|| data_dir.join(MLE_PARAMS_FILE));
    base.extend(load_params(&mle_path)?);

    let trace = read_trace_csv(&args.trace)?;
    ensure_dir(&args.output_dir)?;
    let out = pipeline::run_scenarios_from_trace(
        &spec,
        &base,
        &trace,
        args.burnin.unwrap_or(config.analysis.full_runs_burnin),
        args.samples.unwrap_or(config.analysis.full_runs_samples),
        &config,
        &args.output_dir,
    )?;
    println!("{}", crate::report::format_diff_tables(&out.diffs));
    Ok(())
}

fn handle_tasks() -> Result<(), AppError> {
    for (i, fixed) in pipeline::fixed_params_list().iter().enumerate() {
        println!("{:>3}  {}", i + 1, fixed.as_deref().unwrap_or("None"));
    }
    Ok(())
}

fn model_spec(config: &RunConfig, time_variant: TimeVariantData) -> Result<TbModelSpec, AppError> {
    let spec = TbModelSpec::new(config.model.clone(), config.interventions.clone(), time_variant);
    spec.validate()?;
    Ok(spec)
}

fn data_dir(global: &GlobalArgs) -> PathBuf {
    global
        .data_dir
        .clone()
        .or_else(|| std::env::var_os(ENV_DATA_DIR).map(PathBuf::from))
        .unwrap_or_else(|| Path::new(DEFAULT_DATA_DIR).to_path_buf())
}

fn output_root() -> PathBuf {
    std::env::var_os(ENV_OUTPUT_ROOT)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_ROOT))
}

/// Global flags that take a separate value (`--mode full`).
const GLOBAL_VALUE_FLAGS: [&str; 3] = ["--data-dir", "--config", "--mode"];

/// Rewrite argv so `tbu <JOB_ID> <TASK_ID>` means `tbu run <JOB_ID> <TASK_ID>`.
///
/// Leading global flags are skipped first, then:
/// - nothing left                -> unchanged (clap prints usage)
/// - `--help/--version/-h`       -> unchanged
/// - `<subcommand> ...`          -> unchanged
/// - `<anything else> ...`       -> `run` inserted before it
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let mut i = 1;
    while let Some(arg) = argv.get(i) {
        if matches!(arg.as_str(), "-v" | "--verbose") || (arg.starts_with("--") && arg.contains('=')) {
            i += 1;
        } else if GLOBAL_VALUE_FLAGS.contains(&arg.as_str()) {
            i += 2;
        } else {
            break;
        }
    }
    let Some(arg) = argv.get(i) else {
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg.as_str(), "run" | "mle" | "simulate" | "scenarios" | "tasks");
    if is_subcommand || arg.starts_with('-') {
        return argv;
    }

    argv.insert(i, "run".to_string());
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn positional_ids_become_run_subcommand() {
        assert_eq!(rewrite_args(args(&["tbu", "123", "4"])), args(&["tbu", "run", "123", "4"]));
        assert_eq!(rewrite_args(args(&["tbu", "tasks"])), args(&["tbu", "tasks"]));
        assert_eq!(rewrite_args(args(&["tbu", "--help"])), args(&["tbu", "--help"]));
        assert_eq!(rewrite_args(args(&["tbu"])), args(&["tbu"]));
    }

    #[test]
    fn positional_ids_after_global_flags_become_run_subcommand() {
        assert_eq!(rewrite_args(args(&["tbu", "-v", "42", "1"])), args(&["tbu", "-v", "run", "42", "1"]));
        assert_eq!(
            rewrite_args(args(&["tbu", "--mode", "full", "--data-dir=d", "42", "1"])),
            args(&["tbu", "--mode", "full", "--data-dir=d", "run", "42", "1"])
        );
        assert_eq!(rewrite_args(args(&["tbu", "-v", "tasks"])), args(&["tbu", "-v", "tasks"]));
        assert_eq!(rewrite_args(args(&["tbu", "--mode", "test"])), args(&["tbu", "--mode", "test"]));
        assert_eq!(rewrite_args(args(&["tbu", "-v", "--help"])), args(&["tbu", "-v", "--help"]));

        let cli = Cli::parse_from(rewrite_args(args(&["tbu", "-v", "42", "1"])));
        assert!(cli.global.verbose);
        assert!(matches!(cli.command, Command::Run(ref run) if run.job_id == "42" && run.task_id == 1));
    }

    #[test]
    fn cli_parses_run_with_global_flags() {
        let cli = Cli::parse_from(rewrite_args(args(&["tbu", "77", "3", "--mode", "full", "-v"])));
        assert!(cli.global.verbose);
        assert_eq!(cli.global.mode, Some(crate::domain::ConfigMode::Full));
        match cli.command {
            Command::Run(run) => {
                assert_eq!(run.job_id, "77");
                assert_eq!(run.task_id, 3);
                assert_eq!(run.analysis_name, "full");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn simulate_accepts_repeated_interventions() {
        let cli = Cli::parse_from(args(&[
            "tbu",
            "simulate",
            "--intervention",
            "faster_detection",
            "--intervention",
            "preventive_treatment",
            "--no-plot",
        ]));
        match cli.command {
            Command::Simulate(sim) => assert_eq!(sim.interventions.len(), 2),
            other => panic!("unexpected command {other:?}"),
        }
    }
}

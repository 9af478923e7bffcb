//! Command-line parsing for the TB calibration tool.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modelling/calibration code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{ConfigMode, Intervention};
use crate::io::DEFAULT_ANALYSIS_NAME;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "tbu", version, about = "TB model calibration and intervention scenario analysis")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand.
#[derive(Debug, Args, Clone)]
pub struct GlobalArgs {
    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding time_variant_params.yml and mle_params.yml
    /// (default: $TBU_DATA_DIR, then ./data).
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// YAML file overriding run sizes, model settings or intervention parameters.
    #[arg(long, global = true, value_name = "YAML")]
    pub config: Option<PathBuf>,

    /// Run-size preset (takes precedence over the config file).
    #[arg(long, global = true, value_enum)]
    pub mode: Option<ConfigMode>,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Calibrate, run full runs and scenario differences for one array task.
    ///
    /// `tbu <JOB_ID> <TASK_ID>` is shorthand for `tbu run <JOB_ID> <TASK_ID>`.
    Run(RunArgs),
    /// Find the point estimate of every calibrated parameter and write it as YAML.
    Mle(MleArgs),
    /// Run the model once and write its outputs.
    Simulate(SimulateArgs),
    /// Re-run the scenario analysis from a saved trace CSV.
    Scenarios(ScenariosArgs),
    /// List array task ids and the parameter each one fixes.
    Tasks,
}

#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Array job id (shared by all tasks of one submission).
    pub job_id: String,

    /// Array task id (1-based): 1 calibrates everything, k > 1 fixes the (k-1)th prior.
    pub task_id: usize,

    /// Root of the output tree (default: $TBU_OUTPUT_ROOT, then ./outputs).
    #[arg(long, value_name = "DIR")]
    pub output_root: Option<PathBuf>,

    /// Analysis name, appended to the job id in the output path.
    #[arg(long, default_value = DEFAULT_ANALYSIS_NAME)]
    pub analysis_name: String,

    /// Point-estimate parameter file (default: <data-dir>/mle_params.yml).
    #[arg(long, value_name = "YAML")]
    pub mle: Option<PathBuf>,

    /// Skip the terminal plot of baseline prevalence.
    #[arg(long)]
    pub no_plot: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct MleArgs {
    /// Where to write the estimate (default: <data-dir>/mle_params.yml).
    #[arg(long, value_name = "YAML")]
    pub output: Option<PathBuf>,

    /// Evaluation budget (default: the preset's opti_budget).
    #[arg(long)]
    pub budget: Option<usize>,
}

#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Parameter file (default: <data-dir>/mle_params.yml); missing values use defaults.
    #[arg(long, value_name = "YAML")]
    pub params: Option<PathBuf>,

    /// Intervention to switch on (repeatable).
    #[arg(long = "intervention", value_enum)]
    pub interventions: Vec<Intervention>,

    /// Write the saved outputs to this CSV.
    #[arg(long, value_name = "CSV")]
    pub output: Option<PathBuf>,

    /// Output to plot in the terminal.
    #[arg(long, default_value = "tb_prevalence_per100k")]
    pub plot_output: String,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

#[derive(Debug, Parser, Clone)]
pub struct ScenariosArgs {
    /// Trace CSV written by `tbu run`.
    #[arg(long, value_name = "CSV")]
    pub trace: PathBuf,

    /// Directory for the quantile tables.
    #[arg(long, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Point-estimate parameter file for the parameters not in the trace.
    #[arg(long, value_name = "YAML")]
    pub mle: Option<PathBuf>,

    /// Draws to discard per chain (default: the preset's full_runs_burnin).
    #[arg(long)]
    pub burnin: Option<usize>,

    /// Posterior samples to run (default: the preset's full_runs_samples).
    #[arg(long)]
    pub samples: Option<usize>,
}

//! Shared analysis pipeline used by the `run` and `scenarios` commands.
//!
//! One calibration task:
//! sampling -> trace exports -> burn-in -> posterior samples -> full runs
//! per scenario -> prevalence quantiles + scenario differences.
//!
//! The CLI layer only resolves inputs and prints; everything that touches
//! the model lives here.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use tracing::info;

use crate::calibration::{BayesianModel, SamplerSettings, Trace, all_priors, default_targets, run_sampling};
use crate::data::RunConfig;
use crate::domain::{ParamSet, Scenario, TimeVariantData};
use crate::error::AppError;
use crate::io::{
    BASELINE_QUANTILES_CSV, MANIFEST_JSON, RunManifest, TRACE_CSV, TRACE_PLOT_SVG, TRACE_SUMMARY_CSV,
    diff_quantiles_file, write_diff_quantiles_csv, write_manifest, write_output_quantiles_csv, write_summary_csv,
    write_trace_csv,
};
use crate::models::{ModelRunner, TbModelSpec};
use crate::plot::write_trace_svg;
use crate::report::{
    DEFAULT_QUANTILES, DIFF_OUTPUTS, DiffQuantiles, FullRuns, OutputQuantiles, ParamSummary,
    calculate_diff_output_quantiles, output_quantiles_over_time, summarize_trace,
};

/// Output checked against the calibration target in the baseline full runs.
pub const CHECK_OUTPUT: &str = "tb_prevalence_per100k";

/// Offset of the posterior-subsampling RNG stream from the run seed.
const EXTRACT_SEED_OFFSET: u64 = 1_000;

/// Fixed parameter per array task: task 1 fixes nothing, task `k` fixes the `(k-1)`th prior.
pub fn fixed_params_list() -> Vec<Option<String>> {
    std::iter::once(None)
        .chain(all_priors().into_iter().map(|p| Some(p.name)))
        .collect()
}

pub fn fixed_param_for_task(task_id: usize) -> Result<Option<String>, AppError> {
    let list = fixed_params_list();
    if task_id == 0 || task_id > list.len() {
        return Err(AppError::insufficient(format!(
            "Array task id {task_id} is out of range (1..={}).",
            list.len()
        )));
    }
    Ok(list[task_id - 1].clone())
}

/// Outputs of the scenario stage.
#[derive(Debug, Clone)]
pub struct ScenarioOutput {
    /// Posterior samples re-simulated per scenario.
    pub runs: usize,
    pub prevalence: OutputQuantiles,
    pub diffs: Vec<(Scenario, DiffQuantiles)>,
    pub files: Vec<String>,
}

/// All computed outputs of one calibration task.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub fixed_param: Option<String>,
    pub output_dir: PathBuf,
    pub trace: Trace,
    pub summaries: Vec<ParamSummary>,
    pub scenarios: ScenarioOutput,
    pub manifest: RunManifest,
}

/// Calibrate with `fixed_param` held at its point estimate, then run the scenario analysis.
pub fn run_analysis(
    job_id: &str,
    task_id: usize,
    fixed_param: Option<&str>,
    mle_params: &ParamSet,
    config: &RunConfig,
    time_variant: &TimeVariantData,
    output_dir: &Path,
) -> Result<RunOutput, AppError> {
    let started = Instant::now();
    let analysis = &config.analysis;
    let spec = TbModelSpec::new(config.model.clone(), config.interventions.clone(), time_variant.clone());
    spec.validate()?;

    let bcm = BayesianModel::new(spec.clone(), mle_params, fixed_param)?;
    info!(
        fixed_param = fixed_param.unwrap_or("None"),
        free = bcm.priors().len(),
        "calibrating"
    );
    let trace = run_sampling(&bcm, &SamplerSettings::from_analysis(analysis, config.rng_seed))?;

    let summaries = summarize_trace(&trace);
    write_trace_csv(&output_dir.join(TRACE_CSV), &trace)?;
    write_summary_csv(&output_dir.join(TRACE_SUMMARY_CSV), &summaries)?;
    write_trace_svg(&output_dir.join(TRACE_PLOT_SVG), &trace)?;

    let scenarios = run_scenarios_from_trace(
        &spec,
        bcm.base_params(),
        &trace,
        analysis.full_runs_burnin,
        analysis.full_runs_samples,
        config,
        output_dir,
    )?;

    let mut manifest = RunManifest::new(job_id, task_id, fixed_param, config);
    manifest.start_params = bcm.params_for(&bcm.initial_point());
    manifest.acceptance_rates = trace.acceptance_rates();
    manifest.full_runs = scenarios.runs;
    manifest.files = [TRACE_CSV, TRACE_SUMMARY_CSV, TRACE_PLOT_SVG]
        .iter()
        .map(|f| f.to_string())
        .chain(scenarios.files.iter().cloned())
        .chain(std::iter::once(MANIFEST_JSON.to_string()))
        .collect();
    manifest.elapsed_secs = started.elapsed().as_secs_f64();
    write_manifest(&output_dir.join(MANIFEST_JSON), &manifest)?;

    Ok(RunOutput {
        fixed_param: fixed_param.map(str::to_string),
        output_dir: output_dir.to_path_buf(),
        trace,
        summaries,
        scenarios,
        manifest,
    })
}

/// Burn-in, subsample, then run every scenario for the retained samples.
pub fn run_scenarios_from_trace(
    spec: &TbModelSpec,
    base_params: &ParamSet,
    trace: &Trace,
    burnin: usize,
    n_samples: usize,
    config: &RunConfig,
    output_dir: &Path,
) -> Result<ScenarioOutput, AppError> {
    check_trace_params(trace)?;
    let kept = trace.discard_burnin(burnin)?;
    let mut rng = StdRng::seed_from_u64(config.rng_seed.wrapping_add(EXTRACT_SEED_OFFSET));
    let samples = kept.extract_samples(n_samples, &mut rng)?;
    info!(burnin, samples = samples.len(), "running full runs");

    let params: Vec<ParamSet> = samples
        .iter()
        .map(|theta| {
            let mut p = base_params.clone();
            p.extend(kept.params_for(theta));
            p
        })
        .collect();
    run_scenarios(spec, &params, config, output_dir)
}

/// Every trace column must name a calibrated parameter.
fn check_trace_params(trace: &Trace) -> Result<(), AppError> {
    let priors = all_priors();
    let unknown: Vec<&str> = trace
        .param_names
        .iter()
        .filter(|name| !priors.iter().any(|p| &p.name == *name))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(AppError::insufficient(format!(
            "Trace has columns that are not calibrated parameters: {}.",
            unknown.join(", ")
        )));
    }
    Ok(())
}

/// Run the baseline and every counterfactual scenario for each parameter set.
///
/// Run `i` of every scenario uses `params[i]`, so differences are paired.
pub fn run_scenarios(
    spec: &TbModelSpec,
    params: &[ParamSet],
    config: &RunConfig,
    output_dir: &Path,
) -> Result<ScenarioOutput, AppError> {
    let model = &config.model;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.analysis.mcmc_cores)
        .build()
        .map_err(|e| AppError::input(format!("Failed to start full-run worker pool: {e}")))?;

    let diff_outputs: Vec<&str> = DIFF_OUTPUTS.iter().map(|&(_, output)| output).collect();
    let mut baseline_outputs = vec![CHECK_OUTPUT];
    baseline_outputs.extend(&diff_outputs);
    let baseline = pool.install(|| {
        full_runs(
            &spec.with_scenario(Scenario::baseline()),
            params,
            FullRuns::from_time(&baseline_outputs, model.report_start_time, model.end_time),
        )
    })?;

    let prevalence = output_quantiles_over_time(&baseline, CHECK_OUTPUT, &DEFAULT_QUANTILES)?;
    write_output_quantiles_csv(&output_dir.join(BASELINE_QUANTILES_CSV), &prevalence)?;
    let mut files = vec![BASELINE_QUANTILES_CSV.to_string()];

    let mut diffs = Vec::new();
    for scenario in Scenario::counterfactuals() {
        let runs = pool.install(|| {
            full_runs(
                &spec.with_scenario(scenario.clone()),
                params,
                FullRuns::from_time(&diff_outputs, model.end_time, model.end_time),
            )
        })?;
        let d = calculate_diff_output_quantiles(&baseline, &runs, &DEFAULT_QUANTILES)?;
        let file = diff_quantiles_file(&scenario);
        write_diff_quantiles_csv(&output_dir.join(&file), &d)?;
        files.push(file);
        info!(scenario = %scenario.name, "scenario finished");
        diffs.push((scenario, d));
    }

    Ok(ScenarioOutput {
        runs: baseline.n_runs(),
        prevalence,
        diffs,
        files,
    })
}

/// Run `runner` for every parameter set in parallel, keeping the outputs `runs` tracks.
fn full_runs<R: ModelRunner>(runner: &R, params: &[ParamSet], mut runs: FullRuns) -> Result<FullRuns, AppError> {
    let rows = params
        .par_iter()
        .map(|p| runs.extract(&runner.run(p)?))
        .collect::<Result<Vec<_>, AppError>>()?;
    for row in rows {
        runs.push(row);
    }
    Ok(runs)
}

/// Target observations of the check output, for plotting.
pub fn check_targets() -> Vec<(f64, f64)> {
    default_targets()
        .into_iter()
        .filter(|t| t.output == CHECK_OUTPUT)
        .flat_map(|t| t.data)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::default_params;
    use crate::domain::ConfigMode;
    use crate::models::tb::fixtures;

    #[test]
    fn task_ids_map_to_fixed_params() {
        assert_eq!(fixed_params_list().len(), 10);
        assert_eq!(fixed_param_for_task(1).unwrap(), None);
        assert_eq!(fixed_param_for_task(2).unwrap().as_deref(), Some("transmission_rate"));
        assert_eq!(
            fixed_param_for_task(10).unwrap().as_deref(),
            Some("current_passive_detection_rate")
        );
        assert_eq!(fixed_param_for_task(0).unwrap_err().exit_code(), AppError::INSUFFICIENT);
        assert_eq!(fixed_param_for_task(11).unwrap_err().exit_code(), AppError::INSUFFICIENT);
    }

    fn tiny_config() -> RunConfig {
        let mut config = RunConfig::preset(ConfigMode::Test);
        config.analysis.mcmc_chains = 2;
        config.analysis.mcmc_cores = 2;
        config.analysis.mcmc_tune = 4;
        config.analysis.mcmc_samples = 6;
        config.analysis.full_runs_burnin = 2;
        config.analysis.full_runs_samples = 5;
        config
    }

    #[test]
    fn analysis_writes_trace_tables_and_manifest() {
        let config = tiny_config();
        let dir = tempfile::tempdir().unwrap();
        let run = run_analysis(
            "42",
            9,
            Some("tb_death_rate"),
            &fixtures::params(),
            &config,
            &fixtures::time_variant(),
            dir.path(),
        )
        .unwrap();

        // Sampling: 2 chains x 6 draws over the 8 free parameters.
        assert_eq!(run.trace.n_chains(), 2);
        assert_eq!(run.trace.draws_per_chain(), 6);
        assert!(!run.trace.param_names.iter().any(|n| n == "tb_death_rate"));
        assert_eq!(run.summaries.len(), 8);

        let written = crate::io::read_trace_csv(&dir.path().join(TRACE_CSV)).unwrap();
        assert_eq!(written.total_draws(), 12);
        assert_eq!(written.param_names, run.trace.param_names);
        let summary_rows = csv::Reader::from_path(dir.path().join(TRACE_SUMMARY_CSV))
            .unwrap()
            .records()
            .count();
        assert_eq!(summary_rows, 8);
        let svg = std::fs::read_to_string(dir.path().join(TRACE_PLOT_SVG)).unwrap();
        assert!(svg.contains("<svg"));

        // Burn-in leaves 2 x 4 draws; 5 of them are re-simulated.
        assert_eq!(run.scenarios.runs, 5);
        assert_eq!(run.manifest.full_runs, 5);
        assert_eq!(run.manifest.fixed_param.as_deref(), Some("tb_death_rate"));
        assert_eq!(run.manifest.acceptance_rates.len(), 2);

        let mut on_disk: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        on_disk.sort();
        let mut listed = run.manifest.files.clone();
        listed.sort();
        assert_eq!(listed, on_disk);
        assert_eq!(listed.len(), 9);

        let manifest: serde_json::Value =
            serde_json::from_reader(std::fs::File::open(dir.path().join(MANIFEST_JSON)).unwrap()).unwrap();
        assert_eq!(manifest["full_runs"], 5);
        assert_eq!(manifest["files"].as_array().unwrap().len(), 9);
    }

    #[test]
    fn scenarios_from_trace_use_every_draw_left_after_burnin() {
        let config = tiny_config();
        let spec = TbModelSpec::new(config.model.clone(), config.interventions.clone(), fixtures::time_variant());
        let mut base = default_params();
        base.extend(fixtures::params());

        let names = vec!["transmission_rate".to_string()];
        let chains = (0..2)
            .map(|c| crate::calibration::ChainTrace {
                draws: (0..5).map(|i| 7.6 + 0.1 * (c * 5 + i) as f64).collect(),
                log_posterior: vec![0.0; 5],
                accepted: vec![true; 5],
            })
            .collect();
        let trace = Trace::new(names, chains).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = run_scenarios_from_trace(&spec, &base, &trace, 3, 100, &config, dir.path()).unwrap();
        assert_eq!(out.runs, 4);
        assert_eq!(out.prevalence.values.len(), out.prevalence.times.len());

        let err = run_scenarios_from_trace(&spec, &base, &trace, 5, 100, &config, dir.path()).unwrap_err();
        assert_eq!(err.exit_code(), AppError::INSUFFICIENT);
    }

    #[test]
    fn trace_with_unknown_column_is_rejected() {
        let config = tiny_config();
        let spec = TbModelSpec::new(config.model.clone(), config.interventions.clone(), fixtures::time_variant());
        let chain = crate::calibration::ChainTrace {
            draws: vec![8.0, 0.1, 8.1, 0.1],
            log_posterior: vec![0.0; 2],
            accepted: vec![true; 2],
        };
        let trace = Trace::new(vec!["transmission_rate".into(), "transmision_rate".into()], vec![chain]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let err = run_scenarios_from_trace(&spec, &default_params(), &trace, 0, 10, &config, dir.path()).unwrap_err();
        assert_eq!(err.exit_code(), AppError::INSUFFICIENT);
        assert!(err.to_string().contains("transmision_rate"), "{err}");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn early_intervention_time_fails_before_sampling() {
        let mut config = tiny_config();
        config.model.intervention_time = 2020.0;
        let dir = tempfile::tempdir().unwrap();
        let err = run_analysis(
            "42",
            1,
            None,
            &fixtures::params(),
            &config,
            &fixtures::time_variant(),
            dir.path(),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), AppError::INPUT);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn scenario_stage_writes_every_table() {
        let mut config = RunConfig::preset(ConfigMode::Test);
        config.analysis.mcmc_cores = 2;
        let spec = TbModelSpec::new(config.model.clone(), config.interventions.clone(), fixtures::time_variant());

        let mut base = default_params();
        base.extend(fixtures::params());
        let params: Vec<ParamSet> = [7.8, 8.0, 8.2]
            .iter()
            .map(|&beta| {
                let mut p = base.clone();
                p.insert("transmission_rate".to_string(), beta);
                p
            })
            .collect();

        let dir = tempfile::tempdir().unwrap();
        let out = run_scenarios(&spec, &params, &config, dir.path()).unwrap();

        assert_eq!(out.diffs.len(), 4);
        assert_eq!(out.files.len(), 5);
        for file in &out.files {
            assert!(dir.path().join(file).is_file(), "{file}");
        }
        assert_eq!(out.prevalence.times.first(), Some(&2000.0));
        assert_eq!(out.prevalence.times.last(), Some(&2050.0));

        // Every intervention averts episodes in the median run.
        for (scenario, d) in &out.diffs {
            let averted = d.median("TB_episodes_averted").unwrap();
            assert!(averted < 0.0, "{}: {averted}", scenario.name);
        }
    }
}

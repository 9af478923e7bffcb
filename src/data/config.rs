//! Run configuration: built-in presets plus optional YAML overrides.
//!
//! Every key of the override file is optional:
//!
//! ```yaml
//! mode: test                  # preset to start from (test | full)
//! rng_seed: 2024
//! analysis:
//!   opti_budget: 500
//!   mcmc_chains: 4
//! model:
//!   end_time: 2040
//! interventions:
//!   transmission_reduction: {rel_reduction: 0.3}
//!   preventive_treatment: {rate: 0.1, efficacy: 0.8}
//!   faster_detection: {detection_rate_multiplier: 2.0}
//!   improved_treatment: {negative_outcomes_rel_reduction: 0.5}
//! ```

use std::path::Path;

use serde::Serialize;
use yaml_rust::Yaml;

use crate::data::yaml::{load_file, opt_count, opt_number};
use crate::domain::{AnalysisConfig, ConfigMode, InterventionParams, ModelConfig};
use crate::error::AppError;

/// Default seed for every random stream of a run.
pub const DEFAULT_RNG_SEED: u64 = 20_240_101;

/// Resolved configuration for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunConfig {
    pub mode: ConfigMode,
    pub analysis: AnalysisConfig,
    pub model: ModelConfig,
    pub interventions: InterventionParams,
    pub rng_seed: u64,
}

impl RunConfig {
    pub fn preset(mode: ConfigMode) -> Self {
        Self {
            mode,
            analysis: AnalysisConfig::preset(mode),
            model: ModelConfig::default(),
            interventions: InterventionParams::default(),
            rng_seed: DEFAULT_RNG_SEED,
        }
    }

    /// Start from `mode` (or the file's `mode` key if `mode` is `None`) and apply
    /// the overrides found in `path`.
    pub fn load(path: Option<&Path>, mode: Option<ConfigMode>) -> Result<Self, AppError> {
        let config = match path {
            None => Self::preset(mode.unwrap_or(ConfigMode::Test)),
            Some(path) => {
                let doc = load_file(path)?;
                Self::from_yaml(&doc, mode)
                    .map_err(|e| AppError::input(format!("{} (in '{}')", e.message(), path.display())))?
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.analysis.validate()?;
        self.model.validate()
    }

    pub(crate) fn from_yaml(doc: &Yaml, mode: Option<ConfigMode>) -> Result<Self, AppError> {
        let file_mode = match &doc["mode"] {
            Yaml::BadValue | Yaml::Null => None,
            Yaml::String(s) => Some(parse_mode(s)?),
            _ => return Err(AppError::input("Key 'mode' must be 'test' or 'full'.")),
        };
        // CLI flag wins over the file.
        let mut config = Self::preset(mode.or(file_mode).unwrap_or(ConfigMode::Test));

        if let Some(seed) = opt_count(doc, "rng_seed", "config")? {
            config.rng_seed = seed as u64;
        }

        let a = &doc["analysis"];
        let analysis = &mut config.analysis;
        for (key, slot) in [
            ("opti_budget", &mut analysis.opti_budget),
            ("mcmc_chains", &mut analysis.mcmc_chains),
            ("mcmc_cores", &mut analysis.mcmc_cores),
            ("mcmc_tune", &mut analysis.mcmc_tune),
            ("mcmc_samples", &mut analysis.mcmc_samples),
            ("full_runs_burnin", &mut analysis.full_runs_burnin),
            ("full_runs_samples", &mut analysis.full_runs_samples),
        ] {
            if let Some(v) = opt_count(a, key, "analysis")? {
                *slot = v;
            }
        }

        let m = &doc["model"];
        let model = &mut config.model;
        for (key, slot) in [
            ("start_time", &mut model.start_time),
            ("end_time", &mut model.end_time),
            ("population", &mut model.population),
            ("seed", &mut model.seed),
            ("intervention_time", &mut model.intervention_time),
            ("report_start_time", &mut model.report_start_time),
        ] {
            if let Some(v) = opt_number(m, key, "model")? {
                *slot = v;
            }
        }
        if let Some(v) = opt_count(m, "substeps_per_year", "model")? {
            model.substeps_per_year = v;
        }

        let i = &doc["interventions"];
        let ip = &mut config.interventions;
        for (group, key, slot) in [
            ("transmission_reduction", "rel_reduction", &mut ip.transmission_reduction.rel_reduction),
            ("preventive_treatment", "rate", &mut ip.preventive_treatment.rate),
            ("preventive_treatment", "efficacy", &mut ip.preventive_treatment.efficacy),
            (
                "faster_detection",
                "detection_rate_multiplier",
                &mut ip.faster_detection.detection_rate_multiplier,
            ),
            (
                "improved_treatment",
                "negative_outcomes_rel_reduction",
                &mut ip.improved_treatment.negative_outcomes_rel_reduction,
            ),
        ] {
            if let Some(v) = opt_number(&i[group], key, group)? {
                *slot = v;
            }
        }

        Ok(config)
    }
}

fn parse_mode(value: &str) -> Result<ConfigMode, AppError> {
    match value.to_ascii_lowercase().as_str() {
        "test" => Ok(ConfigMode::Test),
        "full" => Ok(ConfigMode::Full),
        other => Err(AppError::input(format!("Unknown mode '{other}' (expected test or full)."))),
    }
}

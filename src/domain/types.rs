//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - built from presets, CLI flags and YAML overrides
//! - passed by reference through model building, calibration and reporting
//! - written to the run manifest for reproducibility

use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Named parameter values (model inputs), ordered by name.
pub type ParamSet = BTreeMap<String, f64>;

/// Run-size preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConfigMode {
    /// Small budgets for smoke-testing a setup end to end.
    Test,
    /// Production budgets.
    Full,
}

/// Budgets for optimization, sampling and post-sampling full runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Objective evaluations available to the point-estimate search.
    pub opti_budget: usize,
    pub mcmc_chains: usize,
    /// Worker threads used to run chains (and full runs).
    pub mcmc_cores: usize,
    /// Tuning iterations per chain (discarded).
    pub mcmc_tune: usize,
    /// Recorded draws per chain.
    pub mcmc_samples: usize,
    /// Recorded draws discarded from the start of each chain before full runs.
    pub full_runs_burnin: usize,
    /// Number of posterior samples re-simulated for scenario analysis.
    pub full_runs_samples: usize,
}

impl AnalysisConfig {
    pub fn preset(mode: ConfigMode) -> Self {
        match mode {
            ConfigMode::Test => Self {
                opti_budget: 100,
                mcmc_chains: 4,
                mcmc_cores: 4,
                mcmc_tune: 100,
                mcmc_samples: 100,
                full_runs_burnin: 50,
                full_runs_samples: 100,
            },
            ConfigMode::Full => Self {
                opti_budget: 10_000,
                mcmc_chains: 8,
                mcmc_cores: 8,
                mcmc_tune: 10_000,
                mcmc_samples: 100_000,
                full_runs_burnin: 50_000,
                full_runs_samples: 50_000,
            },
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.mcmc_chains == 0 || self.mcmc_cores == 0 {
            return Err(AppError::input("mcmc_chains and mcmc_cores must be > 0."));
        }
        if self.mcmc_samples == 0 {
            return Err(AppError::input("mcmc_samples must be > 0."));
        }
        if self.full_runs_burnin >= self.mcmc_samples {
            return Err(AppError::insufficient(format!(
                "full_runs_burnin ({}) must be smaller than mcmc_samples ({}).",
                self.full_runs_burnin, self.mcmc_samples
            )));
        }
        if self.full_runs_samples == 0 {
            return Err(AppError::input("full_runs_samples must be > 0."));
        }
        Ok(())
    }
}

/// Simulation window and population settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub start_time: f64,
    pub end_time: f64,
    pub population: f64,
    /// Initial number of infectious individuals.
    pub seed: f64,
    /// Year from which interventions start ramping up (over one year).
    pub intervention_time: f64,
    /// First year kept in full-run tables (earlier years are only simulated).
    pub report_start_time: f64,
    /// RK4 steps per simulated year.
    pub substeps_per_year: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            start_time: 1850.0,
            end_time: 2050.0,
            population: 1.0e6,
            seed: 100.0,
            intervention_time: 2025.0,
            report_start_time: 2000.0,
            substeps_per_year: 20,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.start_time.is_finite() && self.end_time.is_finite()) || self.end_time <= self.start_time {
            return Err(AppError::input(format!(
                "Invalid simulation window: start={}, end={}.",
                self.start_time, self.end_time
            )));
        }
        if !(self.population.is_finite() && self.population > 0.0) {
            return Err(AppError::input("population must be > 0."));
        }
        if !(self.seed.is_finite() && self.seed >= 0.0 && self.seed <= self.population) {
            return Err(AppError::input("seed must be within [0, population]."));
        }
        if self.substeps_per_year == 0 {
            return Err(AppError::input("substeps_per_year must be > 0."));
        }
        if !(self.report_start_time >= self.start_time && self.report_start_time <= self.end_time) {
            return Err(AppError::input(format!(
                "report_start_time {} must lie within [{}, {}].",
                self.report_start_time, self.start_time, self.end_time
            )));
        }
        if self.intervention_time + 1.0 > self.end_time {
            return Err(AppError::input(
                "intervention_time must leave at least one year before end_time.",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionReduction {
    pub rel_reduction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreventiveTreatment {
    pub rate: f64,
    pub efficacy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FasterDetection {
    pub detection_rate_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovedTreatment {
    pub negative_outcomes_rel_reduction: f64,
}

/// Strength of each intervention once fully scaled up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionParams {
    pub transmission_reduction: TransmissionReduction,
    pub preventive_treatment: PreventiveTreatment,
    pub faster_detection: FasterDetection,
    pub improved_treatment: ImprovedTreatment,
}

impl Default for InterventionParams {
    fn default() -> Self {
        Self {
            transmission_reduction: TransmissionReduction { rel_reduction: 0.20 },
            preventive_treatment: PreventiveTreatment {
                rate: 0.10,
                efficacy: 0.8,
            },
            faster_detection: FasterDetection {
                detection_rate_multiplier: 2.0,
            },
            improved_treatment: ImprovedTreatment {
                negative_outcomes_rel_reduction: 0.50,
            },
        }
    }
}

/// Intervention that can be switched on in a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Intervention {
    TransmissionReduction,
    PreventiveTreatment,
    FasterDetection,
    ImprovedTreatment,
}

impl Intervention {
    pub const ALL: [Intervention; 4] = [
        Intervention::TransmissionReduction,
        Intervention::PreventiveTreatment,
        Intervention::FasterDetection,
        Intervention::ImprovedTreatment,
    ];

    /// Machine name (file names, CSV columns).
    pub fn name(self) -> &'static str {
        match self {
            Intervention::TransmissionReduction => "transmission_reduction",
            Intervention::PreventiveTreatment => "preventive_treatment",
            Intervention::FasterDetection => "faster_detection",
            Intervention::ImprovedTreatment => "improved_treatment",
        }
    }
}

/// A named set of active interventions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub interventions: Vec<Intervention>,
}

impl Scenario {
    pub fn baseline() -> Self {
        Self {
            name: "baseline".to_string(),
            interventions: Vec::new(),
        }
    }

    pub fn single(intervention: Intervention) -> Self {
        Self {
            name: intervention.name().to_string(),
            interventions: vec![intervention],
        }
    }

    /// Counterfactual scenarios compared against the baseline: one per intervention.
    pub fn counterfactuals() -> Vec<Self> {
        Intervention::ALL.iter().copied().map(Self::single).collect()
    }

    pub fn is_active(&self, intervention: Intervention) -> bool {
        self.interventions.contains(&intervention)
    }
}

/// A piecewise series given as knots (`times[i]`, `values[i]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> Self {
        Self { times, values }
    }

    pub fn last_value(&self) -> Option<f64> {
        self.values.last().copied()
    }
}

/// Externally supplied time-variant inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeVariantData {
    /// Births per 1000 population per year.
    pub crude_birth_rate: TimeSeries,
    /// Life expectancy at birth (years).
    pub life_expectancy: TimeSeries,
    /// Treatment success among treated cases (percent).
    pub treatment_success_perc: TimeSeries,
}

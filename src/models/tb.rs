//! Tuberculosis transmission model.
//!
//! Structure (6 compartments):
//!
//! ```text
//!   birth -> susceptible --infection--> latent_early --stabilisation--> latent_late
//!                                          |  progression_early            | progression_late
//!                                          v                               v
//!   recovered <--self_recovery-- infectious <------------------------------+
//!       ^                          |   ^
//!       |                tb_detection  | tx_relapse
//!       +------tx_recovery------ treatment
//! ```
//!
//! plus reinfection of `latent_late`/`recovered`, background mortality from
//! every compartment, and TB deaths from `infectious` and `treatment`.
//!
//! Treatment exits are parameterised through observed outcomes: with
//! `ρ = 1/tx_duration`, treatment success ratio `TSR(t)` and proportion of deaths
//! among outcomes `π = tx_prop_death`, we solve
//!
//! ```text
//!   μ_tx(t)  = ρ π / TSR(t) - μ(t)
//!   φ(t)     = (μ(t) + μ_tx(t)) (1/π - 1) - ρ
//! ```
//!
//! for the treatment death rate `μ_tx` and relapse rate `φ` (`μ` = all-cause mortality).

use std::sync::Arc;

use crate::domain::{Intervention, InterventionParams, ModelConfig, ParamSet, Scenario, TimeVariantData};
use crate::error::AppError;
use crate::math::{LinearInterpolation, SigmoidalInterpolation};
use crate::models::compartmental::{CompartmentalModel, ModelResults, TimeFn, constant, time_fn};

pub const COMPARTMENTS: [&str; 6] = [
    "susceptible",
    "latent_early",
    "latent_late",
    "infectious",
    "treatment",
    "recovered",
];

/// Parameters the model reads from a `ParamSet`.
pub const MODEL_PARAMETERS: [&str; 11] = [
    "transmission_rate",
    "activation_rate_early",
    "activation_rate_late",
    "stabilisation_rate",
    "rr_reinfection_latent_late",
    "rr_reinfection_recovered",
    "self_recovery_rate",
    "tb_death_rate",
    "current_passive_detection_rate",
    "tx_duration",
    "tx_prop_death",
];

/// Year from which passive detection starts scaling up.
const DETECTION_START: f64 = 1950.0;
/// Year by which passive detection reaches its current rate.
const DETECTION_CURRENT: f64 = 2024.0;
const DETECTION_CURVATURE: f64 = 16.0;

/// Anything that maps a parameter set to model results.
pub trait ModelRunner: Send + Sync {
    fn run(&self, params: &ParamSet) -> Result<ModelResults, AppError>;
}

/// Everything needed to build the TB model except the parameter values.
#[derive(Debug, Clone)]
pub struct TbModelSpec {
    pub config: ModelConfig,
    pub intervention_params: InterventionParams,
    pub time_variant: TimeVariantData,
    pub scenario: Scenario,
}

impl TbModelSpec {
    pub fn new(
        config: ModelConfig,
        intervention_params: InterventionParams,
        time_variant: TimeVariantData,
    ) -> Self {
        Self {
            config,
            intervention_params,
            time_variant,
            scenario: Scenario::baseline(),
        }
    }

    /// Same model under another scenario.
    pub fn with_scenario(&self, scenario: Scenario) -> Self {
        Self {
            scenario,
            ..self.clone()
        }
    }

    /// Check the settings every scenario model depends on.
    ///
    /// Scenario ramps start at `intervention_time` and extend the detection
    /// and treatment-success curves, so it must come after their last knots.
    pub fn validate(&self) -> Result<(), AppError> {
        self.config.validate()?;
        let t0 = self.config.intervention_time;
        let tsr = &self.time_variant.treatment_success_perc;
        let last_tsr = tsr
            .times
            .last()
            .copied()
            .ok_or_else(|| AppError::input("treatment_success_perc has no values."))?;
        let latest = DETECTION_CURRENT.max(last_tsr);
        if !(t0 > latest) {
            return Err(AppError::input(format!(
                "intervention_time {t0} must be later than {latest} (detection scale-up and last treatment_success_perc year)."
            )));
        }
        Ok(())
    }

    /// Declare the model for the given parameter values.
    pub fn build(&self, params: &ParamSet) -> Result<CompartmentalModel, AppError> {
        let cfg = &self.config;
        let p = |name: &str| param(params, name);
        let processes = InterventionProcesses::prepare(self, params)?;

        // Demography.
        let tv = &self.time_variant;
        let cbr = LinearInterpolation::new(
            &tv.crude_birth_rate.times,
            &tv.crude_birth_rate.values.iter().map(|v| v / 1000.0).collect::<Vec<_>>(),
        )?;
        if tv.life_expectancy.values.iter().any(|&v| v <= 0.0) {
            return Err(AppError::input("life_expectancy values must be > 0."));
        }
        let life_expectancy = Arc::new(LinearInterpolation::new(
            &tv.life_expectancy.times,
            &tv.life_expectancy.values,
        )?);
        let mortality = {
            let le = Arc::clone(&life_expectancy);
            move |t: f64| 1.0 / le.value(t)
        };

        // Detection ramps up sigmoidally from 1950 to the current rate in 2024.
        let detection_rate = p("current_passive_detection_rate")?;
        let mut detection_x = vec![DETECTION_START, DETECTION_CURRENT];
        let mut detection_y = vec![0.0, detection_rate];
        detection_x.extend_from_slice(&processes.future_detection.0);
        detection_y.extend_from_slice(&processes.future_detection.1);
        let detection = SigmoidalInterpolation::new(&detection_x, &detection_y, DETECTION_CURVATURE)?;

        // Treatment outcomes.
        let tx_duration = p("tx_duration")?;
        let tx_prop_death = p("tx_prop_death")?;
        if !(tx_duration > 0.0) {
            return Err(AppError::input(format!("tx_duration must be > 0, got {tx_duration}.")));
        }
        if !(tx_prop_death > 0.0 && tx_prop_death < 1.0) {
            return Err(AppError::input(format!(
                "tx_prop_death must be in (0, 1), got {tx_prop_death}."
            )));
        }
        let mut tsr_x = tv.treatment_success_perc.times.clone();
        let mut tsr_y: Vec<f64> = tv.treatment_success_perc.values.clone();
        tsr_x.extend_from_slice(&processes.future_tsr.0);
        tsr_y.extend_from_slice(&processes.future_tsr.1);
        if tsr_y.iter().any(|&v| !(v > 0.0 && v <= 100.0)) {
            return Err(AppError::input("treatment_success_perc values must be in (0, 100]."));
        }
        let tsr = Arc::new(LinearInterpolation::new(
            &tsr_x,
            &tsr_y.iter().map(|v| v / 100.0).collect::<Vec<_>>(),
        )?);

        let tx_recovery_rate = 1.0 / tx_duration;
        let tx_death = {
            let tsr = Arc::clone(&tsr);
            let mortality = mortality.clone();
            move |t: f64| tx_recovery_rate * tx_prop_death / tsr.value(t) - mortality(t)
        };
        let tx_relapse = {
            let tx_death = tx_death.clone();
            let mortality = mortality.clone();
            move |t: f64| (mortality(t) + tx_death(t)) * (1.0 / tx_prop_death - 1.0) - tx_recovery_rate
        };

        // Model structure.
        let mut model = CompartmentalModel::new((cfg.start_time, cfg.end_time), &COMPARTMENTS, &["infectious"])?;
        model.set_substeps(cfg.substeps_per_year)?;
        model.set_initial_population(&[
            ("susceptible", cfg.population - cfg.seed),
            ("infectious", cfg.seed),
        ])?;

        model.add_crude_birth_flow("birth", time_fn(move |t| cbr.value(t)), "susceptible")?;
        model.add_universal_death_flows("all_cause_mortality", time_fn(mortality))?;

        model.add_infection_frequency_flow(
            "infection",
            processes.transmission_rate.clone(),
            "susceptible",
            "latent_early",
        )?;
        for source in ["latent_late", "recovered"] {
            let rr = p(&format!("rr_reinfection_{source}"))?;
            let base = processes.transmission_rate.clone();
            model.add_infection_frequency_flow(
                &format!("reinfection_{source}"),
                time_fn(move |t| base(t) * rr),
                source,
                "latent_early",
            )?;
        }

        model.add_transition_flow(
            "stabilisation",
            constant(p("stabilisation_rate")?),
            "latent_early",
            "latent_late",
        )?;
        for stage in ["early", "late"] {
            model.add_transition_flow(
                &format!("progression_{stage}"),
                constant(p(&format!("activation_rate_{stage}"))?),
                &format!("latent_{stage}"),
                "infectious",
            )?;
        }

        model.add_transition_flow("self_recovery", constant(p("self_recovery_rate")?), "infectious", "recovered")?;
        model.add_death_flow("active_tb_death", constant(p("tb_death_rate")?), "infectious")?;
        model.add_transition_flow(
            "tb_detection",
            time_fn(move |t| detection.value(t)),
            "infectious",
            "treatment",
        )?;

        model.add_transition_flow("tx_recovery", constant(tx_recovery_rate), "treatment", "recovered")?;
        model.add_transition_flow("tx_relapse", time_fn(tx_relapse), "treatment", "infectious")?;
        model.add_death_flow("tx_death", time_fn(tx_death), "treatment")?;

        if let Some(pt_rate) = &processes.preventive_treatment {
            for source in ["latent_early", "latent_late"] {
                model.add_transition_flow(&format!("pt_{source}"), pt_rate.clone(), source, "susceptible")?;
            }
        }

        request_outputs(&mut model, cfg.intervention_time)?;
        Ok(model)
    }
}

impl ModelRunner for TbModelSpec {
    fn run(&self, params: &ParamSet) -> Result<ModelResults, AppError> {
        self.build(params)?.run()
    }
}

/// Time-variant processes that depend on the active interventions.
struct InterventionProcesses {
    transmission_rate: TimeFn,
    preventive_treatment: Option<TimeFn>,
    /// Extra detection knots after the intervention (times, values).
    future_detection: (Vec<f64>, Vec<f64>),
    /// Extra treatment-success knots after the intervention (times, percent values).
    future_tsr: (Vec<f64>, Vec<f64>),
}

impl InterventionProcesses {
    fn prepare(spec: &TbModelSpec, params: &ParamSet) -> Result<Self, AppError> {
        let t0 = spec.config.intervention_time;
        let ramp = [t0, t0 + 1.0];
        let ip = &spec.intervention_params;
        let scenario = &spec.scenario;

        let beta = param(params, "transmission_rate")?;
        let transmission_rate = if scenario.is_active(Intervention::TransmissionReduction) {
            let adj = LinearInterpolation::new(&ramp, &[1.0, 1.0 - ip.transmission_reduction.rel_reduction])?;
            time_fn(move |t| beta * adj.value(t))
        } else {
            constant(beta)
        };

        let preventive_treatment = if scenario.is_active(Intervention::PreventiveTreatment) {
            let pt = &ip.preventive_treatment;
            let rate = LinearInterpolation::new(&ramp, &[0.0, pt.rate * pt.efficacy])?;
            Some(time_fn(move |t| rate.value(t)))
        } else {
            None
        };

        let future_detection = if scenario.is_active(Intervention::FasterDetection) {
            let current = param(params, "current_passive_detection_rate")?;
            (
                ramp.to_vec(),
                vec![current, current * ip.faster_detection.detection_rate_multiplier],
            )
        } else {
            (Vec::new(), Vec::new())
        };

        let future_tsr = if scenario.is_active(Intervention::ImprovedTreatment) {
            let last = spec
                .time_variant
                .treatment_success_perc
                .last_value()
                .ok_or_else(|| AppError::input("treatment_success_perc has no values."))?;
            let reduction = ip.improved_treatment.negative_outcomes_rel_reduction;
            (ramp.to_vec(), vec![last, 100.0 - reduction * (100.0 - last)])
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(Self {
            transmission_rate,
            preventive_treatment,
            future_detection,
            future_tsr,
        })
    }
}

fn request_outputs(model: &mut CompartmentalModel, intervention_time: f64) -> Result<(), AppError> {
    // Raw outputs.
    model.request_output_for_compartments("raw_ltbi_prevalence", &["latent_early", "latent_late"], false)?;
    model.request_output_for_compartments("raw_tb_prevalence", &["infectious"], false)?;

    model.request_output_for_flow("progression_early", "progression_early", false)?;
    model.request_output_for_flow("progression_late", "progression_late", false)?;
    model.request_aggregate_output("raw_tb_incidence", &["progression_early", "progression_late"], false)?;

    model.request_output_for_flow("raw_notifications", "tb_detection", true)?;

    model.request_output_for_flow("active_tb_death", "active_tb_death", false)?;
    model.request_output_for_flow("tx_death", "tx_death", false)?;
    model.request_aggregate_output("all_tb_deaths", &["active_tb_death", "tx_death"], true)?;

    // Outputs relative to population size.
    model.request_output_for_compartments("population", &COMPARTMENTS, true)?;
    model.request_function_output(
        "ltbi_prop",
        &["raw_ltbi_prevalence", "population"],
        Arc::new(|v: &[f64]| v[0] / v[1]),
        true,
    )?;
    for (name, source) in [
        ("tb_prevalence_per100k", "raw_tb_prevalence"),
        ("tb_incidence_per100k", "raw_tb_incidence"),
        ("tb_mortality_per100k", "all_tb_deaths"),
    ] {
        model.request_function_output(
            name,
            &[source, "population"],
            Arc::new(|v: &[f64]| 1.0e5 * v[0] / v[1]),
            true,
        )?;
    }

    // Counterfactual comparisons accumulate from the intervention time.
    model.request_cumulative_output("cumulative_TB_deaths", "all_tb_deaths", intervention_time, true)?;
    model.request_cumulative_output("cumulative_incidence", "raw_tb_incidence", intervention_time, true)?;

    Ok(())
}

fn param(params: &ParamSet, name: &str) -> Result<f64, AppError> {
    let value = params
        .get(name)
        .copied()
        .ok_or_else(|| AppError::input(format!("Missing model parameter '{name}'.")))?;
    if !value.is_finite() {
        return Err(AppError::input(format!("Model parameter '{name}' is not finite.")));
    }
    Ok(value)
}

//! A small deterministic compartmental-model engine.
//!
//! A model is declared as:
//!
//! - a set of named compartments (some flagged infectious)
//! - an initial population distribution
//! - flows between compartments (births, deaths, infection, transitions), each
//!   with a rate that may vary over time
//! - derived outputs computed from the solution (compartment sums, flow
//!   totals, aggregates, arbitrary functions, cumulative sums)
//!
//! The solution is reported once per whole year between the start and end
//! times. Flow outputs are the amount that flowed during the preceding output
//! interval (zero at the first output time); to obtain them we integrate one
//! accumulator per flow alongside the compartments.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use nalgebra::DVector;

use crate::error::AppError;
use crate::math::integrate_rk4;

/// A (possibly time-varying) rate.
pub type TimeFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Combine derived-output values at one time point into a new value.
pub type OutputFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// Constant rate.
pub fn constant(value: f64) -> TimeFn {
    Arc::new(move |_| value)
}

/// Wrap a closure as a rate.
pub fn time_fn(f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> TimeFn {
    Arc::new(f)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowKind {
    /// `rate(t) × total population` enters `dest`.
    CrudeBirth { dest: usize },
    /// `rate(t) × size` leaves every compartment.
    UniversalDeath,
    /// `rate(t) × infectious / total × source` moves `source → dest`.
    InfectionFrequency { source: usize, dest: usize },
    /// `rate(t) × source` moves `source → dest`.
    Transition { source: usize, dest: usize },
    /// `rate(t) × source` leaves the population.
    Death { source: usize },
}

#[derive(Clone)]
struct Flow {
    name: String,
    kind: FlowKind,
    rate: TimeFn,
}

#[derive(Clone)]
enum OutputSource {
    Compartments(Vec<usize>),
    Flow(usize),
    Aggregate(Vec<String>),
    Function { inputs: Vec<String>, func: OutputFn },
    Cumulative { source: String, start_time: f64 },
}

#[derive(Clone)]
struct OutputRequest {
    name: String,
    source: OutputSource,
    save: bool,
}

/// Model declaration. Build it with the `add_*` / `request_*` methods, then `run()`.
#[derive(Clone)]
pub struct CompartmentalModel {
    start_time: f64,
    end_time: f64,
    compartments: Vec<String>,
    infectious: Vec<usize>,
    initial: Vec<f64>,
    flows: Vec<Flow>,
    outputs: Vec<OutputRequest>,
    substeps: usize,
}

impl fmt::Debug for CompartmentalModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompartmentalModel")
            .field("times", &(self.start_time, self.end_time))
            .field("compartments", &self.compartments)
            .field("flows", &self.flow_names())
            .field("outputs", &self.outputs.iter().map(|o| &o.name).collect::<Vec<_>>())
            .finish()
    }
}

impl CompartmentalModel {
    /// Declare a model over `[times.0, times.1]` (a whole number of years).
    pub fn new(times: (f64, f64), compartments: &[&str], infectious: &[&str]) -> Result<Self, AppError> {
        let (start_time, end_time) = times;
        let span = end_time - start_time;
        if !(start_time.is_finite() && end_time.is_finite()) || span < 1.0 || (span - span.round()).abs() > 1e-9 {
            return Err(AppError::input(format!(
                "Model times must span a whole number (>= 1) of years, got ({start_time}, {end_time})."
            )));
        }
        if compartments.is_empty() {
            return Err(AppError::input("Model requires at least one compartment."));
        }
        let names: Vec<String> = compartments.iter().map(|c| c.to_string()).collect();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(AppError::input(format!("Duplicate compartment '{name}'.")));
            }
        }

        let mut model = Self {
            start_time,
            end_time,
            initial: vec![0.0; names.len()],
            compartments: names,
            infectious: Vec::new(),
            flows: Vec::new(),
            outputs: Vec::new(),
            substeps: 20,
        };
        model.infectious = infectious
            .iter()
            .map(|c| model.compartment_index(c))
            .collect::<Result<_, _>>()?;
        Ok(model)
    }

    /// RK4 steps per output interval (default 20).
    pub fn set_substeps(&mut self, substeps: usize) -> Result<(), AppError> {
        if substeps == 0 {
            return Err(AppError::input("Model substeps must be > 0."));
        }
        self.substeps = substeps;
        Ok(())
    }

    /// Set initial sizes; compartments not listed start empty.
    pub fn set_initial_population(&mut self, distribution: &[(&str, f64)]) -> Result<(), AppError> {
        let mut initial = vec![0.0; self.compartments.len()];
        for &(name, value) in distribution {
            if !(value.is_finite() && value >= 0.0) {
                return Err(AppError::input(format!(
                    "Initial population for '{name}' must be finite and >= 0, got {value}."
                )));
            }
            initial[self.compartment_index(name)?] = value;
        }
        self.initial = initial;
        Ok(())
    }

    pub fn add_crude_birth_flow(&mut self, name: &str, birth_rate: TimeFn, dest: &str) -> Result<(), AppError> {
        let dest = self.compartment_index(dest)?;
        self.push_flow(name, FlowKind::CrudeBirth { dest }, birth_rate)
    }

    pub fn add_universal_death_flows(&mut self, name: &str, death_rate: TimeFn) -> Result<(), AppError> {
        self.push_flow(name, FlowKind::UniversalDeath, death_rate)
    }

    pub fn add_infection_frequency_flow(
        &mut self,
        name: &str,
        contact_rate: TimeFn,
        source: &str,
        dest: &str,
    ) -> Result<(), AppError> {
        let source = self.compartment_index(source)?;
        let dest = self.compartment_index(dest)?;
        self.push_flow(name, FlowKind::InfectionFrequency { source, dest }, contact_rate)
    }

    pub fn add_transition_flow(
        &mut self,
        name: &str,
        fractional_rate: TimeFn,
        source: &str,
        dest: &str,
    ) -> Result<(), AppError> {
        let source = self.compartment_index(source)?;
        let dest = self.compartment_index(dest)?;
        self.push_flow(name, FlowKind::Transition { source, dest }, fractional_rate)
    }

    pub fn add_death_flow(&mut self, name: &str, death_rate: TimeFn, source: &str) -> Result<(), AppError> {
        let source = self.compartment_index(source)?;
        self.push_flow(name, FlowKind::Death { source }, death_rate)
    }

    /// Sum of the given compartments.
    pub fn request_output_for_compartments(
        &mut self,
        name: &str,
        compartments: &[&str],
        save_results: bool,
    ) -> Result<(), AppError> {
        let idx = compartments
            .iter()
            .map(|c| self.compartment_index(c))
            .collect::<Result<Vec<_>, _>>()?;
        self.push_output(name, OutputSource::Compartments(idx), save_results)
    }

    /// Amount moved by a flow during each output interval.
    pub fn request_output_for_flow(&mut self, name: &str, flow_name: &str, save_results: bool) -> Result<(), AppError> {
        let idx = self
            .flows
            .iter()
            .position(|f| f.name == flow_name)
            .ok_or_else(|| AppError::input(format!("Unknown flow '{flow_name}' for output '{name}'.")))?;
        self.push_output(name, OutputSource::Flow(idx), save_results)
    }

    /// Sum of previously requested outputs.
    pub fn request_aggregate_output(&mut self, name: &str, sources: &[&str], save_results: bool) -> Result<(), AppError> {
        let sources = self.existing_outputs(name, sources)?;
        self.push_output(name, OutputSource::Aggregate(sources), save_results)
    }

    /// `func(inputs at t)` for each output time; inputs are previously requested outputs.
    pub fn request_function_output(
        &mut self,
        name: &str,
        inputs: &[&str],
        func: OutputFn,
        save_results: bool,
    ) -> Result<(), AppError> {
        let inputs = self.existing_outputs(name, inputs)?;
        self.push_output(name, OutputSource::Function { inputs, func }, save_results)
    }

    /// Running total of a previous output, counting only times after `start_time`.
    pub fn request_cumulative_output(
        &mut self,
        name: &str,
        source: &str,
        start_time: f64,
        save_results: bool,
    ) -> Result<(), AppError> {
        let mut sources = self.existing_outputs(name, &[source])?;
        let source = sources.remove(0);
        self.push_output(name, OutputSource::Cumulative { source, start_time }, save_results)
    }

    pub fn compartment_names(&self) -> &[String] {
        &self.compartments
    }

    pub fn flow_names(&self) -> Vec<&str> {
        self.flows.iter().map(|f| f.name.as_str()).collect()
    }

    /// Output times: every whole year from start to end (inclusive).
    pub fn times(&self) -> Vec<f64> {
        let n = (self.end_time - self.start_time).round() as usize;
        (0..=n).map(|i| self.start_time + i as f64).collect()
    }

    /// Integrate the model and compute every requested output.
    pub fn run(&self) -> Result<ModelResults, AppError> {
        let times = self.times();
        let n_comp = self.compartments.len();
        let n_flow = self.flows.len();

        let mut y0 = DVector::<f64>::zeros(n_comp + n_flow);
        for (i, &v) in self.initial.iter().enumerate() {
            y0[i] = v;
        }

        let states = integrate_rk4(|t, y| self.derivative(t, y), &y0, &times, self.substeps)?;

        let compartments: Vec<Vec<f64>> = (0..n_comp)
            .map(|c| states.iter().map(|s| s[c]).collect())
            .collect();
        let flow_totals: Vec<Vec<f64>> = (0..n_flow)
            .map(|f| {
                let acc: Vec<f64> = states.iter().map(|s| s[n_comp + f]).collect();
                let mut out = Vec::with_capacity(acc.len());
                out.push(0.0);
                out.extend(acc.windows(2).map(|w| w[1] - w[0]));
                out
            })
            .collect();

        let mut outputs: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut saved = Vec::new();
        for request in &self.outputs {
            let values: Vec<f64> = match &request.source {
                OutputSource::Compartments(idx) => (0..times.len())
                    .map(|i| idx.iter().map(|&c| compartments[c][i]).sum())
                    .collect(),
                OutputSource::Flow(f) => flow_totals[*f].clone(),
                OutputSource::Aggregate(sources) => (0..times.len())
                    .map(|i| sources.iter().map(|s| outputs[s][i]).sum())
                    .collect(),
                OutputSource::Function { inputs, func } => {
                    let mut args = vec![0.0; inputs.len()];
                    (0..times.len())
                        .map(|i| {
                            for (arg, input) in args.iter_mut().zip(inputs) {
                                *arg = outputs[input][i];
                            }
                            func(&args)
                        })
                        .collect()
                }
                OutputSource::Cumulative { source, start_time } => {
                    let mut total = 0.0;
                    times
                        .iter()
                        .zip(outputs[source].iter())
                        .map(|(&t, &v)| {
                            if t > *start_time {
                                total += v;
                            }
                            total
                        })
                        .collect()
                }
            };
            if request.save {
                saved.push(request.name.clone());
            }
            outputs.insert(request.name.clone(), values);
        }

        Ok(ModelResults {
            times,
            compartment_names: self.compartments.clone(),
            compartments,
            outputs,
            saved,
        })
    }

    fn derivative(&self, t: f64, y: &DVector<f64>) -> DVector<f64> {
        let n_comp = self.compartments.len();
        let mut dy = DVector::<f64>::zeros(y.len());

        let total: f64 = (0..n_comp).map(|c| y[c]).sum();
        let infectious: f64 = self.infectious.iter().map(|&c| y[c]).sum();
        let prevalence = if total > 0.0 { infectious / total } else { 0.0 };

        for (f, flow) in self.flows.iter().enumerate() {
            let rate = (flow.rate)(t);
            let amount = match flow.kind {
                FlowKind::CrudeBirth { dest } => {
                    let amount = rate * total;
                    dy[dest] += amount;
                    amount
                }
                FlowKind::UniversalDeath => {
                    let mut amount = 0.0;
                    for c in 0..n_comp {
                        let out = rate * y[c];
                        dy[c] -= out;
                        amount += out;
                    }
                    amount
                }
                FlowKind::InfectionFrequency { source, dest } => {
                    let amount = rate * prevalence * y[source];
                    dy[source] -= amount;
                    dy[dest] += amount;
                    amount
                }
                FlowKind::Transition { source, dest } => {
                    let amount = rate * y[source];
                    dy[source] -= amount;
                    dy[dest] += amount;
                    amount
                }
                FlowKind::Death { source } => {
                    let amount = rate * y[source];
                    dy[source] -= amount;
                    amount
                }
            };
            dy[n_comp + f] = amount;
        }

        dy
    }

    fn compartment_index(&self, name: &str) -> Result<usize, AppError> {
        self.compartments
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| AppError::input(format!("Unknown compartment '{name}'.")))
    }

    fn push_flow(&mut self, name: &str, kind: FlowKind, rate: TimeFn) -> Result<(), AppError> {
        if self.flows.iter().any(|f| f.name == name) {
            return Err(AppError::input(format!("Duplicate flow '{name}'.")));
        }
        self.flows.push(Flow {
            name: name.to_string(),
            kind,
            rate,
        });
        Ok(())
    }

    fn push_output(&mut self, name: &str, source: OutputSource, save: bool) -> Result<(), AppError> {
        if self.outputs.iter().any(|o| o.name == name) {
            return Err(AppError::input(format!("Duplicate output '{name}'.")));
        }
        self.outputs.push(OutputRequest {
            name: name.to_string(),
            source,
            save,
        });
        Ok(())
    }

    fn existing_outputs(&self, name: &str, sources: &[&str]) -> Result<Vec<String>, AppError> {
        sources
            .iter()
            .map(|s| {
                if self.outputs.iter().any(|o| o.name == *s) {
                    Ok(s.to_string())
                } else {
                    Err(AppError::input(format!(
                        "Output '{name}' depends on unknown output '{s}' (request it first)."
                    )))
                }
            })
            .collect()
    }
}

/// Solution of a model run.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResults {
    pub times: Vec<f64>,
    pub compartment_names: Vec<String>,
    /// `compartments[c][i]`: size of compartment `c` at `times[i]`.
    pub compartments: Vec<Vec<f64>>,
    /// Every derived output, saved or not.
    pub outputs: BTreeMap<String, Vec<f64>>,
    /// Names of outputs flagged `save_results`, in request order.
    pub saved: Vec<String>,
}

impl ModelResults {
    pub fn output(&self, name: &str) -> Result<&[f64], AppError> {
        self.outputs
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| AppError::input(format!("Model has no output '{name}'.")))
    }

    pub fn time_index(&self, time: f64) -> Option<usize> {
        self.times.iter().position(|&t| (t - time).abs() < 1e-9)
    }

    pub fn value_at(&self, name: &str, time: f64) -> Result<f64, AppError> {
        let idx = self
            .time_index(time)
            .ok_or_else(|| AppError::input(format!("Time {time} is outside the model output times.")))?;
        Ok(self.output(name)?[idx])
    }

    pub fn latest(&self, name: &str) -> Result<f64, AppError> {
        self.output(name)?
            .last()
            .copied()
            .ok_or_else(|| AppError::insufficient(format!("Output '{name}' is empty.")))
    }

    pub fn compartment(&self, name: &str) -> Option<&[f64]> {
        self.compartment_names
            .iter()
            .position(|c| c == name)
            .map(|i| self.compartments[i].as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sir(beta: f64, gamma: f64) -> CompartmentalModel {
        let mut m = CompartmentalModel::new((0.0, 50.0), &["s", "i", "r"], &["i"]).unwrap();
        m.set_initial_population(&[("s", 990.0), ("i", 10.0)]).unwrap();
        m.add_infection_frequency_flow("infection", constant(beta), "s", "i").unwrap();
        m.add_transition_flow("recovery", constant(gamma), "i", "r").unwrap();
        m
    }

    #[test]
    fn transitions_conserve_population() {
        let mut m = sir(1.5, 0.5);
        m.request_output_for_compartments("population", &["s", "i", "r"], true).unwrap();
        let res = m.run().unwrap();

        assert_eq!(res.times.len(), 51);
        for &p in res.output("population").unwrap() {
            assert!((p - 1000.0).abs() < 1e-6);
        }
        // Epidemic burns through: most people end recovered.
        assert!(res.compartment("r").unwrap()[50] > 500.0);
    }

    #[test]
    fn flow_outputs_are_interval_totals() {
        let mut m = sir(1.5, 0.5);
        m.request_output_for_flow("incidence", "infection", true).unwrap();
        m.request_cumulative_output("cum_incidence", "incidence", 0.0, true).unwrap();
        let res = m.run().unwrap();

        let inc = res.output("incidence").unwrap();
        assert_eq!(inc[0], 0.0);
        // Everyone ever infected either is infectious or has recovered.
        let ever_infected = res.compartment("i").unwrap()[50] + res.compartment("r").unwrap()[50] - 10.0;
        let total: f64 = inc.iter().sum();
        assert!((total - ever_infected).abs() < 1e-6);
        assert!((res.latest("cum_incidence").unwrap() - total).abs() < 1e-6);
    }

    #[test]
    fn births_and_deaths_balance_exponentially() {
        let mut m = CompartmentalModel::new((0.0, 10.0), &["a", "b"], &[]).unwrap();
        m.set_initial_population(&[("a", 100.0), ("b", 100.0)]).unwrap();
        m.add_crude_birth_flow("birth", constant(0.03), "a").unwrap();
        m.add_universal_death_flows("death", constant(0.01)).unwrap();
        m.add_death_flow("extra_death", constant(0.0), "b").unwrap();
        m.request_output_for_compartments("population", &["a", "b"], true).unwrap();
        m.request_output_for_flow("births", "birth", false).unwrap();
        let res = m.run().unwrap();

        let pop = res.output("population").unwrap();
        let expected = 200.0 * (0.02_f64 * 10.0).exp();
        assert!((pop[10] - expected).abs() < 1e-6);
        assert_eq!(res.saved, vec!["population".to_string()]);
        assert!(res.outputs.contains_key("births"));
    }

    #[test]
    fn derived_outputs_combine_earlier_outputs() {
        let mut m = sir(1.5, 0.5);
        m.request_output_for_compartments("infectious", &["i"], false).unwrap();
        m.request_output_for_compartments("population", &["s", "i", "r"], false).unwrap();
        m.request_aggregate_output("both", &["infectious", "population"], false).unwrap();
        m.request_function_output(
            "prev_per100k",
            &["infectious", "population"],
            Arc::new(|v: &[f64]| 1.0e5 * v[0] / v[1]),
            true,
        )
        .unwrap();
        let res = m.run().unwrap();

        assert!((res.value_at("prev_per100k", 0.0).unwrap() - 1000.0).abs() < 1e-9);
        assert!((res.value_at("both", 0.0).unwrap() - 1010.0).abs() < 1e-9);
        assert!(res.value_at("prev_per100k", 51.0).is_err());
    }

    #[test]
    fn cumulative_output_starts_after_start_time() {
        let mut m = CompartmentalModel::new((0.0, 10.0), &["a"], &[]).unwrap();
        m.set_initial_population(&[("a", 100.0)]).unwrap();
        m.add_crude_birth_flow("birth", constant(0.0), "a").unwrap();
        m.add_death_flow("death", constant(0.1), "a").unwrap();
        m.request_output_for_flow("deaths", "death", false).unwrap();
        m.request_cumulative_output("cum_deaths", "deaths", 5.0, true).unwrap();
        let res = m.run().unwrap();

        let cum = res.output("cum_deaths").unwrap();
        assert!(cum[..=5].iter().all(|&v| v == 0.0));
        let expected = 100.0 * ((-0.5_f64).exp() - (-1.0_f64).exp());
        assert!((cum[10] - expected).abs() < 1e-6);
    }

    #[test]
    fn invalid_declarations_are_rejected() {
        assert!(CompartmentalModel::new((0.0, 0.5), &["a"], &[]).is_err());
        assert!(CompartmentalModel::new((0.0, 1.0), &["a", "a"], &[]).is_err());
        assert!(CompartmentalModel::new((0.0, 1.0), &["a"], &["b"]).is_err());

        let mut m = CompartmentalModel::new((0.0, 1.0), &["a", "b"], &[]).unwrap();
        assert!(m.set_initial_population(&[("c", 1.0)]).is_err());
        assert!(m.set_initial_population(&[("a", -1.0)]).is_err());
        m.add_transition_flow("move", constant(1.0), "a", "b").unwrap();
        assert!(m.add_transition_flow("move", constant(1.0), "a", "b").is_err());
        assert!(m.add_death_flow("die", constant(1.0), "z").is_err());
        assert!(m.request_output_for_flow("x", "nope", true).is_err());
        assert!(m.request_aggregate_output("x", &["missing"], true).is_err());
    }
}

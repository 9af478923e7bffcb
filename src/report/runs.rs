//! Outputs of many model runs (one per posterior sample), kept side by side.

use std::collections::BTreeMap;

use crate::error::AppError;
use crate::models::ModelResults;

/// Selected outputs of a batch of runs at selected times.
#[derive(Debug, Clone, PartialEq)]
pub struct FullRuns {
    pub times: Vec<f64>,
    /// `outputs[name][run][t]`
    pub outputs: BTreeMap<String, Vec<Vec<f64>>>,
}

impl FullRuns {
    pub fn new(names: &[&str], times: Vec<f64>) -> Self {
        Self {
            times,
            outputs: names.iter().map(|n| (n.to_string(), Vec::new())).collect(),
        }
    }

    /// Track `names` at every whole-year output time from `from_time` to `end_time`.
    pub fn from_time(names: &[&str], from_time: f64, end_time: f64) -> Self {
        let first = from_time.ceil() as i64;
        let last = end_time.floor() as i64;
        Self::new(names, (first..=last).map(|t| t as f64).collect())
    }

    pub fn n_runs(&self) -> usize {
        self.outputs.values().next().map_or(0, Vec::len)
    }

    pub fn latest_time(&self) -> Option<f64> {
        self.times.last().copied()
    }

    /// Values of the tracked outputs of one run, in `outputs` key order.
    pub fn extract(&self, results: &ModelResults) -> Result<Vec<Vec<f64>>, AppError> {
        let indices = self
            .times
            .iter()
            .map(|&t| {
                results
                    .time_index(t)
                    .ok_or_else(|| AppError::input(format!("Model output has no time {t}.")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.outputs
            .keys()
            .map(|name| {
                let series = results.output(name)?;
                Ok(indices.iter().map(|&i| series[i]).collect())
            })
            .collect()
    }

    /// Append a run produced by `extract`.
    pub fn push(&mut self, run: Vec<Vec<f64>>) {
        for (series, values) in self.outputs.values_mut().zip(run) {
            series.push(values);
        }
    }

    pub fn series(&self, name: &str) -> Result<&[Vec<f64>], AppError> {
        self.outputs
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| AppError::input(format!("Full runs do not track output '{name}'.")))
    }

    /// Value of `name` at the latest tracked time, one per run.
    pub fn latest_values(&self, name: &str) -> Result<Vec<f64>, AppError> {
        let series = self.series(name)?;
        if self.times.is_empty() {
            return Err(AppError::insufficient("Full runs track no output times."));
        }
        let last = self.times.len() - 1;
        Ok(series.iter().map(|run| run[last]).collect())
    }

    /// Values of `name` at tracked time index `t`, one per run.
    pub fn values_at(&self, name: &str, t: usize) -> Result<Vec<f64>, AppError> {
        Ok(self.series(name)?.iter().map(|run| run[t]).collect())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Runs with `cumulative_TB_deaths` and `cumulative_incidence` at 2049/2050.
    pub fn cumulative_runs(deaths: &[f64], incidence: &[f64]) -> FullRuns {
        let mut runs = FullRuns::new(&["cumulative_TB_deaths", "cumulative_incidence"], vec![2049.0, 2050.0]);
        for (d, i) in deaths.iter().zip(incidence) {
            // Key order: cumulative_TB_deaths < cumulative_incidence.
            runs.push(vec![vec![0.0, *d], vec![0.0, *i]]);
        }
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(scale: f64) -> ModelResults {
        let mut outputs = BTreeMap::new();
        outputs.insert("a".to_string(), vec![1.0 * scale, 2.0 * scale, 3.0 * scale]);
        outputs.insert("b".to_string(), vec![10.0, 20.0, 30.0]);
        ModelResults {
            times: vec![2000.0, 2001.0, 2002.0],
            compartment_names: Vec::new(),
            compartments: Vec::new(),
            outputs,
            saved: vec!["a".to_string(), "b".to_string()],
        }
    }

    #[test]
    fn extract_and_push_keep_selected_times() {
        let mut runs = FullRuns::from_time(&["b", "a"], 2000.5, 2002.0);
        assert_eq!(runs.times, vec![2001.0, 2002.0]);
        for scale in [1.0, 2.0] {
            let run = runs.extract(&results(scale)).unwrap();
            runs.push(run);
        }
        assert_eq!(runs.n_runs(), 2);
        assert_eq!(runs.latest_values("a").unwrap(), vec![3.0, 6.0]);
        assert_eq!(runs.values_at("b", 0).unwrap(), vec![20.0, 20.0]);
        assert!(runs.series("c").is_err());
    }

    #[test]
    fn missing_time_is_an_error() {
        let runs = FullRuns::new(&["a"], vec![1999.0]);
        assert!(runs.extract(&results(1.0)).is_err());
    }
}

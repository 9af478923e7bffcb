//! Calibration targets: observed values of model outputs with normal error.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::ModelResults;

/// `data` points `(time, observed)` compared to output `output` with standard deviation `stdev`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalTarget {
    pub output: String,
    pub data: Vec<(f64, f64)>,
    pub stdev: f64,
}

impl NormalTarget {
    pub fn new(output: &str, data: Vec<(f64, f64)>, stdev: f64) -> Self {
        Self {
            output: output.to_string(),
            data,
            stdev,
        }
    }

    /// Sum of normal log-densities of the observations around the modelled values.
    pub fn log_likelihood(&self, results: &ModelResults) -> Result<f64, AppError> {
        if !(self.stdev > 0.0) {
            return Err(AppError::input(format!(
                "Target '{}' needs a positive standard deviation.",
                self.output
            )));
        }
        let norm = -0.5 * (2.0 * PI * self.stdev * self.stdev).ln();
        let mut total = 0.0;
        for &(time, observed) in &self.data {
            let modelled = results.value_at(&self.output, time)?;
            let z = (observed - modelled) / self.stdev;
            total += norm - 0.5 * z * z;
        }
        Ok(total)
    }
}

/// TB prevalence of 1000 per 100,000 in 2024.
pub fn default_targets() -> Vec<NormalTarget> {
    vec![NormalTarget::new(
        "tb_prevalence_per100k",
        vec![(2024.0, 1000.0)],
        100.0,
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn results(value: f64) -> ModelResults {
        let mut outputs = BTreeMap::new();
        outputs.insert("y".to_string(), vec![0.0, value]);
        ModelResults {
            times: vec![2023.0, 2024.0],
            compartment_names: Vec::new(),
            compartments: Vec::new(),
            outputs,
            saved: vec!["y".to_string()],
        }
    }

    #[test]
    fn likelihood_peaks_at_observation() {
        let target = NormalTarget::new("y", vec![(2024.0, 1000.0)], 100.0);
        let at = target.log_likelihood(&results(1000.0)).unwrap();
        let off = target.log_likelihood(&results(1100.0)).unwrap();
        assert!((at - (-0.5 * (2.0 * PI * 1.0e4).ln())).abs() < 1e-12);
        assert!((at - off - 0.5).abs() < 1e-12);
    }

    #[test]
    fn missing_time_or_output_is_an_error() {
        let target = NormalTarget::new("y", vec![(2030.0, 1.0)], 1.0);
        assert!(target.log_likelihood(&results(1.0)).is_err());
        let target = NormalTarget::new("z", vec![(2024.0, 1.0)], 1.0);
        assert!(target.log_likelihood(&results(1.0)).is_err());
    }
}

//! Quantiles of an output across runs, at every tracked time.

use serde::Serialize;

use crate::error::AppError;
use crate::math::quantiles;
use crate::report::runs::FullRuns;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputQuantiles {
    pub output: String,
    pub times: Vec<f64>,
    pub quantiles: Vec<f64>,
    /// `values[t][q]`
    pub values: Vec<Vec<f64>>,
}

impl OutputQuantiles {
    /// Series of quantile `q` over time.
    pub fn band(&self, q: f64) -> Option<Vec<f64>> {
        let i = self.quantiles.iter().position(|&x| (x - q).abs() < 1e-12)?;
        Some(self.values.iter().map(|row| row[i]).collect())
    }
}

pub fn output_quantiles_over_time(
    runs: &FullRuns,
    output: &str,
    quantile_levels: &[f64],
) -> Result<OutputQuantiles, AppError> {
    if runs.n_runs() == 0 {
        return Err(AppError::insufficient(format!("No runs to summarise for '{output}'.")));
    }
    let values = (0..runs.times.len())
        .map(|t| Ok(quantiles(&runs.values_at(output, t)?, quantile_levels)))
        .collect::<Result<Vec<_>, AppError>>()?;
    Ok(OutputQuantiles {
        output: output.to_string(),
        times: runs.times.clone(),
        quantiles: quantile_levels.to_vec(),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantiles_per_time() {
        let mut runs = FullRuns::new(&["prev"], vec![2000.0, 2001.0]);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            runs.push(vec![vec![v, 10.0 * v]]);
        }
        let q = output_quantiles_over_time(&runs, "prev", &[0.25, 0.5]).unwrap();
        assert_eq!(q.values, vec![vec![2.0, 3.0], vec![20.0, 30.0]]);
        assert_eq!(q.band(0.5), Some(vec![3.0, 30.0]));
        assert_eq!(q.band(0.9), None);
    }

    #[test]
    fn empty_runs_are_insufficient() {
        let runs = FullRuns::new(&["prev"], vec![2000.0]);
        assert!(output_quantiles_over_time(&runs, "prev", &[0.5]).is_err());
    }
}

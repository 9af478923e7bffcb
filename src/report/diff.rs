//! Counterfactual differences between a scenario and the baseline.
//!
//! Runs are paired by position (run `i` of both batches used the same
//! posterior sample). For each pair we take the latest-time values and form
//!
//! ```text
//!   abs = scenario - baseline
//!   rel = (scenario - baseline) / baseline
//! ```
//!
//! then report quantiles over pairs. Non-finite relative values (zero
//! baseline) are left out of the quantiles.

use serde::Serialize;

use crate::error::AppError;
use crate::math::quantiles;
use crate::report::runs::FullRuns;

pub const DEFAULT_QUANTILES: [f64; 5] = [0.025, 0.25, 0.5, 0.75, 0.975];

/// Reported column → cumulative model output it is computed from.
pub const DIFF_OUTPUTS: [(&str, &str); 2] = [
    ("deaths_averted", "cumulative_TB_deaths"),
    ("TB_episodes_averted", "cumulative_incidence"),
];

/// Quantile table: one row per quantile, one column per difference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffQuantiles {
    pub quantiles: Vec<f64>,
    pub columns: Vec<String>,
    /// `values[row][column]`
    pub values: Vec<Vec<f64>>,
}

impl DiffQuantiles {
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let c = self.columns.iter().position(|n| n == name)?;
        Some(self.values.iter().map(|row| row[c]).collect())
    }

    pub fn median(&self, name: &str) -> Option<f64> {
        let r = self.quantiles.iter().position(|&q| q == 0.5)?;
        let c = self.columns.iter().position(|n| n == name)?;
        Some(self.values[r][c])
    }
}

pub fn calculate_diff_output_quantiles(
    baseline: &FullRuns,
    scenario: &FullRuns,
    quantile_levels: &[f64],
) -> Result<DiffQuantiles, AppError> {
    if baseline.n_runs() == 0 {
        return Err(AppError::insufficient("No baseline runs to compare against."));
    }
    if baseline.n_runs() != scenario.n_runs() {
        return Err(AppError::input(format!(
            "Baseline has {} runs but the scenario has {}.",
            baseline.n_runs(),
            scenario.n_runs()
        )));
    }
    if baseline.latest_time() != scenario.latest_time() {
        return Err(AppError::input("Baseline and scenario runs end at different times."));
    }

    let mut abs_columns = Vec::with_capacity(DIFF_OUTPUTS.len());
    let mut rel_columns = Vec::with_capacity(DIFF_OUTPUTS.len());
    for (column, output) in DIFF_OUTPUTS {
        let base = baseline.latest_values(output)?;
        let sc = scenario.latest_values(output)?;
        let abs: Vec<f64> = sc.iter().zip(&base).map(|(s, b)| s - b).collect();
        let rel: Vec<f64> = abs.iter().zip(&base).map(|(d, b)| d / b).collect();
        abs_columns.push((column.to_string(), quantiles(&abs, quantile_levels)));
        rel_columns.push((format!("{column}_relative"), quantiles(&rel, quantile_levels)));
    }

    let (columns, per_column): (Vec<String>, Vec<Vec<f64>>) =
        abs_columns.into_iter().chain(rel_columns).unzip();
    let values = (0..quantile_levels.len())
        .map(|r| per_column.iter().map(|col| col[r]).collect())
        .collect();

    Ok(DiffQuantiles {
        quantiles: quantile_levels.to_vec(),
        columns,
        values,
    })
}

//! CSV exports.
//!
//! The exports are meant to be easy to consume in spreadsheets or downstream
//! scripts: one header row, plain numbers, no index magic.

use std::path::Path;

use csv::Writer;

use crate::calibration::Trace;
use crate::error::AppError;
use crate::models::ModelResults;
use crate::report::{DiffQuantiles, OutputQuantiles, ParamSummary};

fn create(path: &Path) -> Result<Writer<std::fs::File>, AppError> {
    Writer::from_path(path)
        .map_err(|e| AppError::input(format!("Failed to create CSV '{}': {e}", path.display())))
}

fn write_row<I, T>(writer: &mut Writer<std::fs::File>, path: &Path, row: I) -> Result<(), AppError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    writer
        .write_record(row)
        .map_err(|e| AppError::input(format!("Failed to write CSV '{}': {e}", path.display())))
}

fn finish(mut writer: Writer<std::fs::File>, path: &Path) -> Result<(), AppError> {
    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to flush CSV '{}': {e}", path.display())))
}

fn num(v: f64) -> String {
    format!("{v}")
}

/// One row per draw: `chain,draw,<params...>,log_posterior,accepted`.
pub fn write_trace_csv(path: &Path, trace: &Trace) -> Result<(), AppError> {
    let mut w = create(path)?;
    let mut header = vec!["chain".to_string(), "draw".to_string()];
    header.extend(trace.param_names.iter().cloned());
    header.push("log_posterior".to_string());
    header.push("accepted".to_string());
    write_row(&mut w, path, &header)?;

    for (c, chain) in trace.chains.iter().enumerate() {
        for i in 0..chain.len() {
            let mut row = vec![c.to_string(), i.to_string()];
            row.extend(chain.draw(i).iter().map(|&v| num(v)));
            row.push(num(chain.log_posterior[i]));
            row.push(chain.accepted[i].to_string());
            write_row(&mut w, path, &row)?;
        }
    }
    finish(w, path)
}

pub fn write_summary_csv(path: &Path, summaries: &[ParamSummary]) -> Result<(), AppError> {
    let mut w = create(path)?;
    write_row(&mut w, path, ["param", "mean", "sd", "q2.5", "q50", "q97.5", "r_hat", "ess"])?;
    for s in summaries {
        let row = [
            s.name.clone(),
            num(s.mean),
            num(s.sd),
            num(s.q2_5),
            num(s.median),
            num(s.q97_5),
            num(s.r_hat),
            num(s.ess),
        ];
        write_row(&mut w, path, &row)?;
    }
    finish(w, path)
}

/// One row per time, one column per quantile.
pub fn write_output_quantiles_csv(path: &Path, q: &OutputQuantiles) -> Result<(), AppError> {
    let mut w = create(path)?;
    let mut header = vec!["time".to_string()];
    header.extend(q.quantiles.iter().map(|&level| num(level)));
    write_row(&mut w, path, &header)?;
    for (t, row) in q.times.iter().zip(&q.values) {
        let mut record = vec![num(*t)];
        record.extend(row.iter().map(|&v| num(v)));
        write_row(&mut w, path, &record)?;
    }
    finish(w, path)
}

/// One row per quantile level, one column per difference.
pub fn write_diff_quantiles_csv(path: &Path, d: &DiffQuantiles) -> Result<(), AppError> {
    let mut w = create(path)?;
    let mut header = vec!["quantile".to_string()];
    header.extend(d.columns.iter().cloned());
    write_row(&mut w, path, &header)?;
    for (level, row) in d.quantiles.iter().zip(&d.values) {
        let mut record = vec![num(*level)];
        record.extend(row.iter().map(|&v| num(v)));
        write_row(&mut w, path, &record)?;
    }
    finish(w, path)
}

/// Saved outputs of a single run, one row per output time.
pub fn write_results_csv(path: &Path, results: &ModelResults) -> Result<(), AppError> {
    let mut w = create(path)?;
    let mut header = vec!["time".to_string()];
    header.extend(results.saved.iter().cloned());
    write_row(&mut w, path, &header)?;

    let series = results
        .saved
        .iter()
        .map(|name| results.output(name))
        .collect::<Result<Vec<_>, _>>()?;
    for (i, t) in results.times.iter().enumerate() {
        let mut record = vec![num(*t)];
        record.extend(series.iter().map(|s| num(s[i])));
        write_row(&mut w, path, &record)?;
    }
    finish(w, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;

    #[test]
    fn diff_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diff.csv");
        let d = DiffQuantiles {
            quantiles: vec![0.025, 0.5],
            columns: vec!["deaths_averted".into(), "deaths_averted_relative".into()],
            values: vec![vec![-10.0, -0.1], vec![-5.0, -0.05]],
        };
        write_diff_quantiles_csv(&path, &d).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "quantile,deaths_averted,deaths_averted_relative\n0.025,-10,-0.1\n0.5,-5,-0.05\n"
        );
    }

    #[test]
    fn results_csv_has_saved_outputs_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(crate::io::RESULTS_CSV);
        let mut outputs = BTreeMap::new();
        outputs.insert("kept".to_string(), vec![1.0, 2.0]);
        outputs.insert("hidden".to_string(), vec![3.0, 4.0]);
        let results = ModelResults {
            times: vec![2000.0, 2001.0],
            compartment_names: Vec::new(),
            compartments: Vec::new(),
            outputs,
            saved: vec!["kept".to_string()],
        };
        write_results_csv(&path, &results).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "time,kept\n2000,1\n2001,2\n");
    }

    #[test]
    fn unwritable_path_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("x.csv");
        let err = write_summary_csv(&path, &[]).unwrap_err();
        assert_eq!(err.exit_code(), AppError::INPUT);
    }
}

//! Read a trace CSV written by `write_trace_csv`.
//!
//! Expected header: `chain,draw,<params...>,log_posterior,accepted`. Rows of
//! a chain keep file order; chains are ordered by their index.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use crate::calibration::{ChainTrace, Trace};
use crate::error::AppError;

pub fn read_trace_csv(path: &Path) -> Result<Trace, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open trace CSV '{}': {e}", path.display())))?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read trace CSV headers: {e}")))?
        .clone();
    let names: Vec<&str> = headers.iter().map(|h| h.trim_start_matches('\u{feff}')).collect();
    let n = names.len();
    if n < 5
        || names[0] != "chain"
        || names[1] != "draw"
        || names[n - 2] != "log_posterior"
        || names[n - 1] != "accepted"
    {
        return Err(AppError::input(format!(
            "Trace CSV '{}' must have columns chain,draw,<params...>,log_posterior,accepted.",
            path.display()
        )));
    }
    let param_names: Vec<String> = names[2..n - 2].iter().map(|s| s.to_string()).collect();

    let mut chains: BTreeMap<usize, ChainTrace> = BTreeMap::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| AppError::input(format!("Trace CSV line {line}: {e}")))?;
        let field = |i: usize| record.get(i).unwrap_or("");
        let chain: usize = field(0)
            .parse()
            .map_err(|_| AppError::input(format!("Trace CSV line {line}: bad chain index '{}'.", field(0))))?;

        let entry = chains.entry(chain).or_insert_with(|| ChainTrace {
            draws: Vec::new(),
            log_posterior: Vec::new(),
            accepted: Vec::new(),
        });
        for i in 2..n - 2 {
            let v: f64 = field(i).parse().map_err(|_| {
                AppError::input(format!("Trace CSV line {line}: '{}' is not a number.", field(i)))
            })?;
            entry.draws.push(v);
        }
        let lp: f64 = field(n - 2)
            .parse()
            .map_err(|_| AppError::input(format!("Trace CSV line {line}: bad log_posterior.")))?;
        let accepted: bool = field(n - 1)
            .parse()
            .map_err(|_| AppError::input(format!("Trace CSV line {line}: 'accepted' must be true/false.")))?;
        entry.log_posterior.push(lp);
        entry.accepted.push(accepted);
    }

    if chains.is_empty() {
        return Err(AppError::insufficient(format!("Trace CSV '{}' has no draws.", path.display())));
    }
    Trace::new(param_names, chains.into_values().collect())
}

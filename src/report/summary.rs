//! Posterior summary per parameter, with convergence diagnostics.

use serde::Serialize;

use crate::calibration::Trace;
use crate::math::{effective_sample_size, mean, quantiles, split_r_hat, std_dev};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSummary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub q2_5: f64,
    pub median: f64,
    pub q97_5: f64,
    pub r_hat: f64,
    pub ess: f64,
}

pub fn summarize_trace(trace: &Trace) -> Vec<ParamSummary> {
    trace
        .param_names
        .iter()
        .enumerate()
        .map(|(p, name)| {
            let chains = trace.param_chains(p);
            let pooled = chains.concat();
            let q = quantiles(&pooled, &[0.025, 0.5, 0.975]);
            ParamSummary {
                name: name.clone(),
                mean: mean(&pooled),
                sd: std_dev(&pooled),
                q2_5: q[0],
                median: q[1],
                q97_5: q[2],
                r_hat: split_r_hat(&chains),
                ess: effective_sample_size(&chains),
            }
        })
        .collect()
}

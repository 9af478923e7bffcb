//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the calibration/simulation code stays clean and testable
//! - output changes are localized

use crate::data::RunConfig;
use crate::domain::{ParamSet, Scenario};
use crate::report::diff::DiffQuantiles;
use crate::report::summary::ParamSummary;

/// Header of a calibration task (job, task, fixed parameter, run sizes).
pub fn format_run_header(job_id: &str, task_id: usize, fixed_param: Option<&str>, config: &RunConfig) -> String {
    let a = &config.analysis;
    let mut out = String::new();
    out.push_str("=== tbu - TB calibration & scenario analysis ===\n");
    out.push_str(&format!(
        "Job: {job_id} | task: {task_id} | fixed param: {}\n",
        fixed_param.unwrap_or("None")
    ));
    out.push_str(&format!("Mode: {:?} | seed: {}\n", config.mode, config.rng_seed));
    out.push_str(&format!(
        "MCMC: chains={} cores={} tune={} draws={} | full runs: burn-in={} samples={}\n",
        a.mcmc_chains, a.mcmc_cores, a.mcmc_tune, a.mcmc_samples, a.full_runs_burnin, a.full_runs_samples
    ));
    out
}

/// Posterior summary table plus per-chain acceptance rates.
pub fn format_param_summary(summaries: &[ParamSummary], acceptance: &[f64]) -> String {
    let mut out = String::new();
    out.push_str("Posterior summary:\n");
    out.push_str(
        format!(
            "{:<32} {:>10} {:>10} {:>10} {:>10} {:>10} {:>7} {:>9}",
            "param", "mean", "sd", "2.5%", "50%", "97.5%", "r_hat", "ess"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(&format!(
        "{:-<32} {:-<10} {:-<10} {:-<10} {:-<10} {:-<10} {:-<7} {:-<9}\n",
        "", "", "", "", "", "", "", ""
    ));
    for s in summaries {
        out.push_str(&format!(
            "{:<32} {:>10} {:>10} {:>10} {:>10} {:>10} {:>7.3} {:>9.1}\n",
            truncate(&s.name, 32),
            fmt_num(s.mean),
            fmt_num(s.sd),
            fmt_num(s.q2_5),
            fmt_num(s.median),
            fmt_num(s.q97_5),
            s.r_hat,
            s.ess
        ));
    }
    out.push_str(&format!("Acceptance rates: {}\n", fmt_vec(acceptance, 3)));
    out
}

/// One quantile table per scenario.
pub fn format_diff_tables(diffs: &[(Scenario, DiffQuantiles)]) -> String {
    let mut out = String::new();
    for (scenario, d) in diffs {
        out.push_str(&format!("\nScenario '{}' vs baseline:\n", scenario.name));
        out.push_str(&format!("{:>7}", "q"));
        for c in &d.columns {
            out.push_str(&format!(" {:>30}", c));
        }
        out.push('\n');
        for (q, row) in d.quantiles.iter().zip(&d.values) {
            out.push_str(&format!("{q:>7.3}"));
            for v in row {
                out.push_str(&format!(" {:>30}", fmt_num(*v)));
            }
            out.push('\n');
        }
    }
    out
}

pub fn format_params(title: &str, params: &ParamSet) -> String {
    let mut out = format!("{title}:\n");
    for (name, value) in params {
        out.push_str(&format!("  {name:<32} {}\n", fmt_num(*value)));
    }
    out
}

/// Compact number: fixed 4 decimals in a readable range, scientific otherwise.
fn fmt_num(v: f64) -> String {
    if !v.is_finite() {
        return format!("{v}");
    }
    let a = v.abs();
    if a == 0.0 || (1e-3..1e6).contains(&a) {
        format!("{v:.4}")
    } else {
        format!("{v:.3e}")
    }
}

fn fmt_vec(v: &[f64], decimals: usize) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.decimals$}")).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

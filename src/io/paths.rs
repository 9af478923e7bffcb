//! Output layout.
//!
//! Every calibration task writes into
//!
//! ```text
//! <output_root>/<job_id>_<analysis_name>/<fixed param or "None">/
//! ```
//!
//! so the tasks of one array job share a parent directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::Scenario;
use crate::error::AppError;

pub const DEFAULT_OUTPUT_ROOT: &str = "outputs";
pub const DEFAULT_ANALYSIS_NAME: &str = "full";

pub const TRACE_CSV: &str = "trace.csv";
pub const TRACE_SUMMARY_CSV: &str = "trace_summary.csv";
pub const TRACE_PLOT_SVG: &str = "trace.svg";
pub const BASELINE_QUANTILES_CSV: &str = "baseline_prevalence_quantiles.csv";
pub const MANIFEST_JSON: &str = "manifest.json";
pub const RESULTS_CSV: &str = "results.csv";

pub fn diff_quantiles_file(scenario: &Scenario) -> String {
    format!("diff_quantiles_{}.csv", scenario.name)
}

pub fn task_output_dir(root: &Path, job_id: &str, analysis_name: &str, fixed_param: Option<&str>) -> PathBuf {
    root.join(format!("{job_id}_{analysis_name}"))
        .join(fixed_param.unwrap_or("None"))
}

pub fn ensure_dir(path: &Path) -> Result<(), AppError> {
    fs::create_dir_all(path)
        .map_err(|e| AppError::input(format!("Failed to create output directory '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Intervention;

    #[test]
    fn layout_per_task() {
        let root = Path::new("/tmp/out");
        assert_eq!(
            task_output_dir(root, "42", "full", None),
            PathBuf::from("/tmp/out/42_full/None")
        );
        assert_eq!(
            task_output_dir(root, "42", "full", Some("tb_death_rate")),
            PathBuf::from("/tmp/out/42_full/tb_death_rate")
        );
        assert_eq!(
            diff_quantiles_file(&Scenario::single(Intervention::ImprovedTreatment)),
            "diff_quantiles_improved_treatment.csv"
        );
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}

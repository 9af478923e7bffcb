//! JSON manifest describing a finished run: what ran, with which settings,
//! and which files it produced.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::data::RunConfig;
use crate::domain::ParamSet;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub tool: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub job_id: String,
    pub task_id: usize,
    pub fixed_param: Option<String>,
    pub config: RunConfig,
    /// Parameter values the chains started from.
    pub start_params: ParamSet,
    pub acceptance_rates: Vec<f64>,
    /// Posterior samples re-simulated per scenario.
    pub full_runs: usize,
    pub files: Vec<String>,
    pub elapsed_secs: f64,
}

impl RunManifest {
    pub fn new(job_id: &str, task_id: usize, fixed_param: Option<&str>, config: &RunConfig) -> Self {
        Self {
            tool: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            job_id: job_id.to_string(),
            task_id,
            fixed_param: fixed_param.map(str::to_string),
            config: config.clone(),
            start_params: ParamSet::new(),
            acceptance_rates: Vec::new(),
            full_runs: 0,
            files: Vec::new(),
            elapsed_secs: 0.0,
        }
    }
}

pub fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create manifest '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, manifest)
        .map_err(|e| AppError::input(format!("Failed to write manifest JSON: {e}")))
}

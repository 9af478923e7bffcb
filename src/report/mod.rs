//! Reporting: full-run tables, scenario differences, posterior summaries
//! and formatted terminal output.
//!
//! - `runs`: selected outputs of many model runs, side by side
//! - `diff`: counterfactual differences (deaths / episodes averted) as quantiles
//! - `quantiles`: output quantiles over time, for calibration checks
//! - `summary`: per-parameter posterior statistics and convergence diagnostics
//! - `format`: terminal tables

pub mod diff;
pub mod format;
pub mod quantiles;
pub mod runs;
pub mod summary;

pub use diff::*;
pub use format::*;
pub use quantiles::*;
pub use runs::*;
pub use summary::*;

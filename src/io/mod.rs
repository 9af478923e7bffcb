//! Input/output helpers.
//!
//! - per-task output directories and file names (`paths`)
//! - CSV exports: trace, summaries, quantiles, model results (`export`)
//! - trace CSV reader (`trace`)
//! - JSON run manifest (`manifest`)

pub mod export;
pub mod manifest;
pub mod paths;
pub mod trace;

pub use export::*;
pub use manifest::*;
pub use paths::*;
pub use trace::*;

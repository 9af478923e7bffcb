//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - run-size presets (`ConfigMode`, `AnalysisConfig`)
//! - model configuration and intervention settings (`ModelConfig`, `InterventionParams`)
//! - scenarios and parameter sets (`Intervention`, `Scenario`, `ParamSet`)
//! - time-variant input series (`TimeSeries`, `TimeVariantData`)

pub mod types;

pub use types::*;

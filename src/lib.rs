//! `tb-uncertainty` library crate.
//!
//! The binary (`tbu`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the model, calibration and reporting layers can be reused on their own
//!
//! Layout:
//!
//! - `models`: compartmental engine and the TB model built on it
//! - `calibration`: priors, targets, point estimation and MCMC
//! - `report` / `io` / `plot`: derived tables, files and figures
//! - `app`: wires everything together for the CLI

pub mod app;
pub mod calibration;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;

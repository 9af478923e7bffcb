//! YAML inputs: time-variant series, point-estimate parameters, run-config overrides.
//!
//! All files are parsed with `yaml-rust` into plain `Yaml` trees and converted
//! to domain types here, so the rest of the crate never sees YAML.

pub mod config;
pub mod params;
pub mod timevariant;
mod yaml;

pub use config::*;
pub use params::*;
pub use timevariant::*;

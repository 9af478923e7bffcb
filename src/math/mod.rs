//! Mathematical utilities: interpolation, ODE integration and summary statistics.

pub mod interp;
pub mod ode;
pub mod stats;

pub use interp::*;
pub use ode::*;
pub use stats::*;

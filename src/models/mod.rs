//! Compartmental model engine and the TB transmission model built on it.
//!
//! - `compartmental`: generic compartments/flows/derived-outputs engine
//! - `tb`: the tuberculosis model (structure, time-variant rates, interventions)

pub mod compartmental;
pub mod tb;

pub use compartmental::*;
pub use tb::*;

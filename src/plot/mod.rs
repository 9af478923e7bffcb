//! Plots: ASCII charts for the terminal and SVG trace plots.

pub mod ascii;
pub mod svg;

pub use ascii::*;
pub use svg::*;

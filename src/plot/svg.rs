//! SVG trace plot: one panel per parameter, one line per chain.
//!
//! Long chains are thinned to at most `MAX_POINTS_PER_CHAIN` points so the
//! file stays small enough to open in a browser.

use std::fmt::Display;
use std::path::Path;

use plotters::prelude::*;

use crate::calibration::Trace;
use crate::error::AppError;

const PANEL_WIDTH: u32 = 900;
const PANEL_HEIGHT: u32 = 180;
const MAX_POINTS_PER_CHAIN: usize = 2000;

pub fn write_trace_svg(path: &Path, trace: &Trace) -> Result<(), AppError> {
    let dim = trace.dim();
    if dim == 0 || trace.total_draws() == 0 {
        return Err(AppError::insufficient("Trace plot needs at least one parameter and one draw."));
    }

    let root = SVGBackend::new(path, (PANEL_WIDTH, PANEL_HEIGHT * dim as u32)).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;
    let panels = root.split_evenly((dim, 1));

    for (p, panel) in panels.iter().enumerate() {
        let chains = trace.param_chains(p);
        let n = chains.iter().map(Vec::len).max().unwrap_or(0);
        let step = n.div_ceil(MAX_POINTS_PER_CHAIN).max(1);
        let (lo, hi) = value_range(&chains);

        let mut chart = ChartBuilder::on(panel)
            .caption(&trace.param_names[p], ("sans-serif", 14))
            .margin(6)
            .x_label_area_size(24)
            .y_label_area_size(56)
            .build_cartesian_2d(0f64..(n.max(2) - 1) as f64, lo..hi)
            .map_err(draw_err)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_y_mesh()
            .x_labels(5)
            .y_labels(4)
            .draw()
            .map_err(draw_err)?;

        for (c, series) in chains.iter().enumerate() {
            let color = Palette99::pick(c);
            chart
                .draw_series(LineSeries::new(
                    series.iter().enumerate().step_by(step).map(|(i, &v)| (i as f64, v)),
                    &color,
                ))
                .map_err(draw_err)?;
        }
    }

    root.present().map_err(draw_err)?;
    Ok(())
}

fn draw_err<E: Display>(e: E) -> AppError {
    AppError::input(format!("Failed to draw trace plot: {e}"))
}

fn value_range(chains: &[Vec<f64>]) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for &v in chains.iter().flatten().filter(|v| v.is_finite()) {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    if hi - lo < 1e-12 {
        return (lo - 0.5, hi + 0.5);
    }
    let pad = 0.05 * (hi - lo);
    (lo - pad, hi + pad)
}

//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - median / single-run series: `-` line
//! - 95% band across runs: `.`
//! - calibration targets: `X`

use crate::error::AppError;
use crate::report::OutputQuantiles;

/// Plot one series over time with optional target markers.
pub fn render_series_plot(
    name: &str,
    times: &[f64],
    values: &[f64],
    targets: &[(f64, f64)],
    width: usize,
    height: usize,
) -> String {
    let curve: Vec<(f64, f64)> = times.iter().copied().zip(values.iter().copied()).collect();
    render_plot(name, &curve, None, targets, width, height)
}

/// Plot the median of an output across runs, its 95% band and target markers.
pub fn render_quantile_plot(
    q: &OutputQuantiles,
    targets: &[(f64, f64)],
    width: usize,
    height: usize,
) -> Result<String, AppError> {
    let median = q
        .band(0.5)
        .ok_or_else(|| AppError::insufficient(format!("No median computed for '{}'.", q.output)))?;
    let zip = |v: Vec<f64>| -> Vec<(f64, f64)> { q.times.iter().copied().zip(v).collect() };
    let band = match (q.band(0.025), q.band(0.975)) {
        (Some(lo), Some(hi)) => Some((zip(lo), zip(hi))),
        _ => None,
    };
    let band_ref = band.as_ref().map(|(lo, hi)| (lo.as_slice(), hi.as_slice()));
    Ok(render_plot(&q.output, &zip(median), band_ref, targets, width, height))
}

fn render_plot(
    name: &str,
    curve: &[(f64, f64)],
    band: Option<(&[(f64, f64)], &[(f64, f64)])>,
    targets: &[(f64, f64)],
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (t_min, t_max) = x_range(curve).unwrap_or((0.0, 1.0));
    let targets: Vec<(f64, f64)> = targets
        .iter()
        .copied()
        .filter(|&(t, _)| t >= t_min && t <= t_max)
        .collect();
    let mut ys: Vec<f64> = curve.iter().map(|&(_, y)| y).collect();
    if let Some((lo, hi)) = band {
        ys.extend(lo.iter().chain(hi).map(|&(_, y)| y));
    }
    ys.extend(targets.iter().map(|&(_, y)| y));
    let (y_min, y_max) = y_range(&ys).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Curve first; the band only fills cells the curve left empty.
    draw_curve(&mut grid, curve, t_min, t_max, y_min, y_max);
    if let Some((lo, hi)) = band {
        for x in 0..width {
            let t = t_min + (t_max - t_min) * x as f64 / (width as f64 - 1.0);
            let (Some(a), Some(b)) = (interp(lo, t), interp(hi, t)) else {
                continue;
            };
            let (r0, r1) = (map_y(b, y_min, y_max, height), map_y(a, y_min, y_max, height));
            for row in grid.iter_mut().take(r1.max(r0) + 1).skip(r0.min(r1)) {
                if row[x] == ' ' {
                    row[x] = '.';
                }
            }
        }
    }
    for &(t, y) in &targets {
        let x = map_x(t, t_min, t_max, width);
        let yy = map_y(y, y_min, y_max, height);
        grid[yy][x] = 'X';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: {name} | time=[{t_min:.1}, {t_max:.1}] | y=[{y_min:.2}, {y_max:.2}]\n"
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn x_range(curve: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut min_t = f64::INFINITY;
    let mut max_t = f64::NEG_INFINITY;
    for &(t, _) in curve {
        min_t = min_t.min(t);
        max_t = max_t.max(t);
    }
    if min_t.is_finite() && max_t.is_finite() && max_t > min_t {
        Some((min_t, max_t))
    } else {
        None
    }
}

fn y_range(values: &[f64]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for &y in values.iter().filter(|y| y.is_finite()) {
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }
    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else if min_y.is_finite() {
        Some((min_y - 0.5, max_y + 0.5))
    } else {
        None
    }
}

/// Linear interpolation on a time-sorted series; `None` outside it.
fn interp(series: &[(f64, f64)], t: f64) -> Option<f64> {
    let i = series.iter().position(|&(x, _)| x >= t)?;
    let (x1, y1) = series[i];
    if i == 0 || x1 == t {
        return (x1 == t).then_some(y1);
    }
    let (x0, y0) = series[i - 1];
    Some(y0 + (y1 - y0) * (t - x0) / (x1 - x0))
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], t_min: f64, t_max: f64, y_min: f64, y_max: f64) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(t, y) in curve.iter().filter(|(_, y)| y.is_finite()) {
        let x = map_x(t, t_min, t_max, width);
        let yy = map_y(y, y_min, y_max, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, x, yy, '-');
        } else {
            grid[yy][x] = '-';
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_plot_golden_snapshot_small() {
        let txt = render_series_plot("prev", &[2000.0, 2010.0], &[100.0, 100.0], &[(2010.0, 110.0)], 10, 5);
        let expected = concat!(
            "Plot: prev | time=[2000.0, 2010.0] | y=[99.50, 110.50]\n",
            "         X\n",
            "          \n",
            "          \n",
            "          \n",
            "----------\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn quantile_plot_draws_band_around_median() {
        let q = OutputQuantiles {
            output: "tb_prevalence_per100k".to_string(),
            times: vec![2000.0, 2010.0, 2020.0],
            quantiles: vec![0.025, 0.5, 0.975],
            values: vec![vec![0.0, 50.0, 100.0]; 3],
        };
        let txt = render_quantile_plot(&q, &[(2015.0, 50.0), (1990.0, 0.0)], 20, 9).unwrap();
        let rows: Vec<&str> = txt.lines().skip(1).collect();
        assert_eq!(rows.len(), 9);
        // Median sits in the middle row; band fills every other row.
        assert_eq!(rows[4].chars().filter(|&c| c == '-').count(), 19);
        assert!(rows[4].contains('X'));
        assert!(rows[0].chars().all(|c| c == '.'));
        assert!(rows[8].chars().all(|c| c == '.'));
    }

    #[test]
    fn quantile_plot_needs_median() {
        let q = OutputQuantiles {
            output: "x".to_string(),
            times: vec![0.0, 1.0],
            quantiles: vec![0.25],
            values: vec![vec![1.0], vec![2.0]],
        };
        assert!(render_quantile_plot(&q, &[], 10, 5).is_err());
    }

    #[test]
    fn interpolation_inside_and_outside() {
        let s = [(0.0, 0.0), (10.0, 100.0)];
        assert_eq!(interp(&s, 0.0), Some(0.0));
        assert_eq!(interp(&s, 2.5), Some(25.0));
        assert_eq!(interp(&s, 11.0), None);
        assert_eq!(interp(&s, -1.0), None);
    }
}

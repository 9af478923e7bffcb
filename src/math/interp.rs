//! Interpolated time functions.
//!
//! Time-variant rates are given as knots `(x_i, y_i)`. Two shapes are supported:
//!
//! - linear: straight segments between knots
//! - sigmoidal: each segment follows a logistic curve rescaled to hit both knots
//!
//! Both are flat outside the knot range (first/last value).

use crate::error::AppError;

/// Knots shared by both interpolation kinds.
#[derive(Debug, Clone, PartialEq)]
struct Knots {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Knots {
    fn new(xs: &[f64], ys: &[f64]) -> Result<Self, AppError> {
        if xs.is_empty() {
            return Err(AppError::input("Interpolation requires at least one knot."));
        }
        if xs.len() != ys.len() {
            return Err(AppError::input(format!(
                "Interpolation knots mismatch: {} x values vs {} y values.",
                xs.len(),
                ys.len()
            )));
        }
        if xs.iter().chain(ys.iter()).any(|v| !v.is_finite()) {
            return Err(AppError::input("Interpolation knots must be finite."));
        }
        if xs.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AppError::input(format!(
                "Interpolation x values must be strictly increasing, got {xs:?}."
            )));
        }
        Ok(Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
        })
    }

    /// Locate `x`: either a clamped end value or a segment index with its relative position.
    fn locate(&self, x: f64) -> Result<(usize, f64), f64> {
        let n = self.xs.len();
        if x <= self.xs[0] {
            return Err(self.ys[0]);
        }
        if x >= self.xs[n - 1] {
            return Err(self.ys[n - 1]);
        }
        // First knot strictly greater than x; guaranteed in 1..n here.
        let hi = self.xs.partition_point(|&k| k <= x);
        let lo = hi - 1;
        let u = (x - self.xs[lo]) / (self.xs[hi] - self.xs[lo]);
        Ok((lo, u))
    }
}

/// Piecewise-linear interpolation, flat outside the knot range.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearInterpolation {
    knots: Knots,
}

impl LinearInterpolation {
    pub fn new(xs: &[f64], ys: &[f64]) -> Result<Self, AppError> {
        Ok(Self {
            knots: Knots::new(xs, ys)?,
        })
    }

    pub fn value(&self, x: f64) -> f64 {
        match self.knots.locate(x) {
            Err(clamped) => clamped,
            Ok((lo, u)) => {
                let y0 = self.knots.ys[lo];
                let y1 = self.knots.ys[lo + 1];
                y0 + u * (y1 - y0)
            }
        }
    }
}

/// Piecewise logistic interpolation.
///
/// On each segment we use `s(u) = 1 / (1 + exp(-c (u - 1/2)))`, rescaled so that
/// `s(0) = 0` and `s(1) = 1`. Larger curvature `c` gives a sharper step in the
/// middle of the segment; `c → 0` approaches linear interpolation.
#[derive(Debug, Clone, PartialEq)]
pub struct SigmoidalInterpolation {
    knots: Knots,
    curvature: f64,
    s_lo: f64,
    s_span: f64,
}

/// Below this curvature the logistic is numerically indistinguishable from a line.
const MIN_CURVATURE: f64 = 1e-6;

impl SigmoidalInterpolation {
    pub fn new(xs: &[f64], ys: &[f64], curvature: f64) -> Result<Self, AppError> {
        if !(curvature.is_finite() && curvature > 0.0) {
            return Err(AppError::input(format!(
                "Sigmoidal curvature must be finite and > 0, got {curvature}."
            )));
        }
        let curvature = curvature.max(MIN_CURVATURE);
        let s_lo = logistic(-curvature / 2.0);
        let s_hi = logistic(curvature / 2.0);
        Ok(Self {
            knots: Knots::new(xs, ys)?,
            curvature,
            s_lo,
            s_span: s_hi - s_lo,
        })
    }

    pub fn value(&self, x: f64) -> f64 {
        match self.knots.locate(x) {
            Err(clamped) => clamped,
            Ok((lo, u)) => {
                let y0 = self.knots.ys[lo];
                let y1 = self.knots.ys[lo + 1];
                let s = (logistic(self.curvature * (u - 0.5)) - self.s_lo) / self.s_span;
                y0 + s * (y1 - y0)
            }
        }
    }
}

fn logistic(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

//! Budgeted derivative-free maximization of a log-posterior.
//!
//! We work in the unit cube (each coordinate rescaled to its bounds):
//!
//! 1. a Latin-hypercube design (plus the optional start point) is evaluated
//!    in parallel and the best point kept
//! 2. Nelder–Mead runs from the best point; whenever a run stops improving
//!    we restart it with a simplex half the size
//!
//! until the evaluation budget is spent. The log-density is maximized by
//! minimizing its negation; non-finite values count as `+inf`.

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::calibration::bayesian::{BayesianModel, Posterior};
use crate::domain::ParamSet;
use crate::error::AppError;
use crate::models::ModelRunner;

/// Edge length of the first simplex (unit-cube units).
const INITIAL_SIMPLEX_SCALE: f64 = 0.1;
/// Restarts stop once the simplex would be smaller than this.
const MIN_SIMPLEX_SCALE: f64 = 1e-6;
const F_TOL: f64 = 1e-10;
const X_TOL: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
pub struct OptimizerSettings {
    /// Maximum number of log-density evaluations.
    pub budget: usize,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct Optimum {
    pub theta: Vec<f64>,
    pub log_density: f64,
    pub evaluations: usize,
}

/// Point estimate of the free parameters of `model`.
pub fn find_mle<R: ModelRunner>(
    model: &BayesianModel<R>,
    budget: usize,
    seed: u64,
) -> Result<ParamSet, AppError> {
    let start = model.initial_point();
    let optimum = maximize(model, Some(&start), &OptimizerSettings { budget, seed })?;
    info!(
        log_posterior = optimum.log_density,
        evaluations = optimum.evaluations,
        "point estimate found"
    );
    Ok(model.param_names().into_iter().zip(optimum.theta).collect())
}

pub fn maximize<P: Posterior>(
    target: &P,
    start: Option<&[f64]>,
    settings: &OptimizerSettings,
) -> Result<Optimum, AppError> {
    let dim = target.dim();
    if dim == 0 {
        return Err(AppError::insufficient("Nothing to optimize: zero free parameters."));
    }
    if settings.budget == 0 {
        return Err(AppError::input("Optimization budget must be positive."));
    }
    let bounds = target.bounds();
    let to_natural = |u: &[f64]| -> Vec<f64> {
        bounds
            .iter()
            .zip(u)
            .map(|(&(lo, hi), &ui)| lo + ui.clamp(0.0, 1.0) * (hi - lo))
            .collect()
    };
    let objective = |u: &[f64]| -> f64 {
        let value = target.log_density(&to_natural(u));
        if value.is_finite() { -value } else { f64::INFINITY }
    };

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let n_init = (settings.budget / 4).max(dim + 1).min(settings.budget);
    let mut design: Vec<Vec<f64>> = Vec::with_capacity(n_init);
    if let Some(start) = start {
        design.push(
            bounds
                .iter()
                .zip(start)
                .map(|(&(lo, hi), &x)| ((x - lo) / (hi - lo)).clamp(0.0, 1.0))
                .collect(),
        );
    }
    design.extend(latin_hypercube(n_init - design.len(), dim, &mut rng));

    // Evaluate the design in parallel; ties resolve to the earliest point.
    let scores: Vec<f64> = design.par_iter().map(|u| objective(u)).collect();
    let mut best_idx = 0;
    for (idx, &score) in scores.iter().enumerate() {
        if score < scores[best_idx] {
            best_idx = idx;
        }
    }
    if !scores[best_idx].is_finite() {
        return Err(AppError::numeric(format!(
            "Optimizer found no point with a finite log-posterior ({n_init} evaluations)."
        )));
    }
    debug!(points = n_init, best = -scores[best_idx], "initial design evaluated");

    let mut evaluations = n_init;
    let mut best_u = DVector::from_vec(design.swap_remove(best_idx));
    let mut best_f = scores[best_idx];
    let mut scale = INITIAL_SIMPLEX_SCALE;
    let mut restarts = 0;

    while evaluations + dim + 1 < settings.budget && scale >= MIN_SIMPLEX_SCALE {
        let mut f = |u: &DVector<f64>| objective(u.as_slice());
        let outcome = nelder_mead(&mut f, &best_u, best_f, scale, settings.budget - evaluations);
        evaluations += outcome.evaluations;
        if outcome.value < best_f - F_TOL {
            best_u = outcome.x;
            best_f = outcome.value;
        } else {
            scale *= 0.5;
        }
        restarts += 1;
        debug!(restarts, evaluations, best = -best_f, scale, "Nelder-Mead pass finished");
    }

    Ok(Optimum {
        theta: to_natural(best_u.as_slice()),
        log_density: -best_f,
        evaluations,
    })
}

/// `n` points in `[0, 1]^dim`, one per stratum along every axis.
fn latin_hypercube(n: usize, dim: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut points = vec![vec![0.0; dim]; n];
    let mut strata: Vec<usize> = (0..n).collect();
    for d in 0..dim {
        strata.shuffle(rng);
        for (point, &stratum) in points.iter_mut().zip(&strata) {
            point[d] = (stratum as f64 + rng.r#gen::<f64>()) / n as f64;
        }
    }
    points
}

struct NelderMeadOutcome {
    x: DVector<f64>,
    value: f64,
    evaluations: usize,
}

/// Minimize `f` inside the unit cube starting from `x0` (with known value `f0`).
fn nelder_mead<F>(f: &mut F, x0: &DVector<f64>, f0: f64, scale: f64, max_evals: usize) -> NelderMeadOutcome
where
    F: FnMut(&DVector<f64>) -> f64,
{
    const ALPHA: f64 = 1.0;
    const GAMMA: f64 = 2.0;
    const RHO: f64 = 0.5;
    const SIGMA: f64 = 0.5;

    let n = x0.len();
    let mut evaluations = 0;
    let mut eval = |x: &DVector<f64>, evaluations: &mut usize| {
        *evaluations += 1;
        f(x)
    };

    let mut simplex: Vec<(DVector<f64>, f64)> = Vec::with_capacity(n + 1);
    simplex.push((x0.clone(), f0));
    for i in 0..n {
        let mut x = x0.clone();
        x[i] = if x[i] + scale <= 1.0 { x[i] + scale } else { x[i] - scale };
        let fx = eval(&x, &mut evaluations);
        simplex.push((x, fx));
    }

    loop {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let spread = simplex[n].1 - simplex[0].1;
        let size = simplex[1..]
            .iter()
            .map(|(x, _)| (x - &simplex[0].0).amax())
            .fold(0.0, f64::max);
        if size < X_TOL || (spread.is_finite() && spread <= F_TOL) {
            break;
        }
        // A shrink step needs up to n evaluations on top of reflection and contraction.
        if evaluations + n + 2 > max_evals {
            break;
        }

        let centroid = simplex[..n]
            .iter()
            .fold(DVector::<f64>::zeros(n), |acc, (x, _)| acc + x)
            / n as f64;
        let worst = simplex[n].clone();
        let second_worst = simplex[n - 1].1;

        let xr = clamp_unit(&centroid + (&centroid - &worst.0) * ALPHA);
        let fr = eval(&xr, &mut evaluations);

        if fr < simplex[0].1 {
            let xe = clamp_unit(&centroid + (&xr - &centroid) * GAMMA);
            let fe = eval(&xe, &mut evaluations);
            simplex[n] = if fe < fr { (xe, fe) } else { (xr, fr) };
            continue;
        }
        if fr < second_worst {
            simplex[n] = (xr, fr);
            continue;
        }

        let (xc, fc) = if fr < worst.1 {
            let xc = clamp_unit(&centroid + (&xr - &centroid) * RHO);
            let fc = eval(&xc, &mut evaluations);
            (xc, fc)
        } else {
            let xc = clamp_unit(&centroid + (&worst.0 - &centroid) * RHO);
            let fc = eval(&xc, &mut evaluations);
            (xc, fc)
        };
        if fc < fr.min(worst.1) {
            simplex[n] = (xc, fc);
            continue;
        }

        let best = simplex[0].0.clone();
        for vertex in simplex.iter_mut().skip(1) {
            let x = clamp_unit(&best + (&vertex.0 - &best) * SIGMA);
            let fx = eval(&x, &mut evaluations);
            *vertex = (x, fx);
        }
    }

    let (x, value) = simplex.swap_remove(0);
    NelderMeadOutcome { x, value, evaluations }
}

fn clamp_unit(mut x: DVector<f64>) -> DVector<f64> {
    x.apply(|v| *v = v.clamp(0.0, 1.0));
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::bayesian::fixtures::one_dim_model;

    /// Gaussian bump at `(3.0, -1.0)` on `[0, 10] x [-5, 5]`.
    struct Bump;

    impl Posterior for Bump {
        fn dim(&self) -> usize {
            2
        }

        fn bounds(&self) -> Vec<(f64, f64)> {
            vec![(0.0, 10.0), (-5.0, 5.0)]
        }

        fn log_density(&self, theta: &[f64]) -> f64 {
            let (x, y) = (theta[0] - 3.0, theta[1] + 1.0);
            -(x * x + 4.0 * y * y + x * y)
        }
    }

    struct Nowhere;

    impl Posterior for Nowhere {
        fn dim(&self) -> usize {
            3
        }

        fn bounds(&self) -> Vec<(f64, f64)> {
            vec![(0.0, 1.0); 3]
        }

        fn log_density(&self, _theta: &[f64]) -> f64 {
            f64::NEG_INFINITY
        }
    }

    #[test]
    fn recovers_maximum_of_smooth_objective() {
        let settings = OptimizerSettings { budget: 600, seed: 1 };
        let optimum = maximize(&Bump, None, &settings).unwrap();
        assert!((optimum.theta[0] - 3.0).abs() < 1e-3, "{:?}", optimum.theta);
        assert!((optimum.theta[1] + 1.0).abs() < 1e-3, "{:?}", optimum.theta);
        assert!(optimum.evaluations <= 600);
    }

    #[test]
    fn same_seed_gives_same_result() {
        let settings = OptimizerSettings { budget: 120, seed: 9 };
        let a = maximize(&Bump, Some(&[9.0, 4.0]), &settings).unwrap();
        let b = maximize(&Bump, Some(&[9.0, 4.0]), &settings).unwrap();
        assert_eq!(a.theta, b.theta);
    }

    #[test]
    fn no_finite_point_is_a_numeric_error() {
        let err = maximize(&Nowhere, None, &OptimizerSettings { budget: 50, seed: 0 }).unwrap_err();
        assert_eq!(err.exit_code(), AppError::NUMERIC);
    }

    #[test]
    fn latin_hypercube_fills_every_stratum() {
        let mut rng = StdRng::seed_from_u64(3);
        let points = latin_hypercube(10, 2, &mut rng);
        for d in 0..2 {
            let mut strata: Vec<usize> = points.iter().map(|p| (p[d] * 10.0) as usize).collect();
            strata.sort_unstable();
            assert_eq!(strata, (0..10).collect::<Vec<_>>());
        }
    }

    #[test]
    fn mle_of_calibration_model() {
        let params = find_mle(&one_dim_model(), 200, 5).unwrap();
        assert!((params["transmission_rate"] - 5.0).abs() < 1e-2, "{params:?}");
    }
}

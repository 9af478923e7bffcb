//! DEMetropolisZ sampling of a bounded log-posterior.
//!
//! Each chain proposes
//!
//! ```text
//!   x' = x + ε + λ (z_a - z_b)
//! ```
//!
//! where `z_a`, `z_b` are two distinct past states of the same chain and `ε`
//! is uniform noise of half-width `scaling × prior width`. During tuning the
//! scaling adapts to the acceptance rate every `tune_interval` steps; when
//! tuning ends the oldest `tune_drop_fraction` of the history is forgotten so
//! that early, poorly-mixed states stop feeding the jumps.
//!
//! Chains are independent. They run on a dedicated rayon pool, each with its
//! own RNG seeded from the run seed and the chain index, so results do not
//! depend on the number of worker threads.

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::calibration::bayesian::{BayesianModel, Posterior};
use crate::calibration::trace::{ChainTrace, Trace};
use crate::domain::AnalysisConfig;
use crate::error::AppError;
use crate::models::ModelRunner;

const DEFAULT_SCALING: f64 = 0.001;
const DEFAULT_TUNE_INTERVAL: usize = 100;
const DEFAULT_TUNE_DROP_FRACTION: f64 = 0.9;
/// Half-width of the start-point jitter, as a fraction of the prior width.
const DEFAULT_START_JITTER: f64 = 0.01;
const MAX_START_ATTEMPTS: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerSettings {
    pub draws: usize,
    pub tune: usize,
    pub chains: usize,
    pub cores: usize,
    pub seed: u64,
    /// Jump factor; `2.38 / sqrt(2 d)` when `None`.
    pub lambda: Option<f64>,
    pub initial_scaling: f64,
    pub tune_interval: usize,
    pub tune_drop_fraction: f64,
    pub start_jitter: f64,
}

impl SamplerSettings {
    pub fn new(draws: usize, tune: usize, chains: usize, cores: usize, seed: u64) -> Self {
        Self {
            draws,
            tune,
            chains,
            cores,
            seed,
            lambda: None,
            initial_scaling: DEFAULT_SCALING,
            tune_interval: DEFAULT_TUNE_INTERVAL,
            tune_drop_fraction: DEFAULT_TUNE_DROP_FRACTION,
            start_jitter: DEFAULT_START_JITTER,
        }
    }

    pub fn from_analysis(analysis: &AnalysisConfig, seed: u64) -> Self {
        Self::new(
            analysis.mcmc_samples,
            analysis.mcmc_tune,
            analysis.mcmc_chains,
            analysis.mcmc_cores,
            seed,
        )
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.draws == 0 || self.chains == 0 || self.cores == 0 {
            return Err(AppError::input("Sampler needs at least one draw, chain and core."));
        }
        if !(self.initial_scaling > 0.0) || !(0.0..1.0).contains(&self.tune_drop_fraction) {
            return Err(AppError::input(
                "Sampler scaling must be positive and tune_drop_fraction in [0, 1).",
            ));
        }
        Ok(())
    }
}

/// Sample the posterior of `model`, starting every chain near its current parameter values.
pub fn run_sampling<R: ModelRunner>(
    model: &BayesianModel<R>,
    settings: &SamplerSettings,
) -> Result<Trace, AppError> {
    let start = model.initial_point();
    let trace = sample_demz(model, &start, model.param_names(), settings)?;
    info!(
        chains = trace.n_chains(),
        draws = trace.draws_per_chain(),
        acceptance = ?trace.acceptance_rates(),
        "sampling finished"
    );
    Ok(trace)
}

pub fn sample_demz<P: Posterior>(
    target: &P,
    start: &[f64],
    param_names: Vec<String>,
    settings: &SamplerSettings,
) -> Result<Trace, AppError> {
    settings.validate()?;
    if start.len() != target.dim() || param_names.len() != target.dim() {
        return Err(AppError::input(format!(
            "Start point has {} values and {} names for {} parameters.",
            start.len(),
            param_names.len(),
            target.dim()
        )));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.cores)
        .build()
        .map_err(|e| AppError::input(format!("Failed to start sampler worker pool: {e}")))?;
    debug!(chains = settings.chains, cores = settings.cores, "starting chains");

    let chains = pool.install(|| {
        (0..settings.chains)
            .into_par_iter()
            .map(|chain| run_chain(target, start, chain, settings))
            .collect::<Result<Vec<_>, AppError>>()
    })?;

    Trace::new(param_names, chains)
}

fn chain_seed(seed: u64, chain: usize) -> u64 {
    seed.wrapping_add(chain as u64)
}

fn run_chain<P: Posterior>(
    target: &P,
    start: &[f64],
    chain: usize,
    settings: &SamplerSettings,
) -> Result<ChainTrace, AppError> {
    let dim = start.len();
    let bounds = target.bounds();
    let widths: Vec<f64> = bounds.iter().map(|(lo, hi)| hi - lo).collect();
    let mut rng = StdRng::seed_from_u64(chain_seed(settings.seed, chain));

    let (mut x, mut logp) = initial_state(target, start, &bounds, settings.start_jitter, &mut rng)
        .ok_or_else(|| {
            AppError::numeric(format!(
                "Chain {chain}: no starting point with a finite log-posterior."
            ))
        })?;

    let lambda = settings.lambda.unwrap_or(2.38 / (2.0 * dim as f64).sqrt());
    let mut scaling = settings.initial_scaling;
    let mut steps_until_tune = settings.tune_interval;
    let mut accepted_since_tune = 0usize;

    let total = settings.tune + settings.draws;
    let progress_every = (total / 10).max(1);
    let mut history: Vec<f64> = Vec::with_capacity(total * dim);
    let mut proposal = DVector::<f64>::zeros(dim);
    let mut out = ChainTrace {
        draws: Vec::with_capacity(settings.draws * dim),
        log_posterior: Vec::with_capacity(settings.draws),
        accepted: Vec::with_capacity(settings.draws),
    };

    for step in 0..total {
        let tuning = step < settings.tune;
        if tuning && settings.tune_interval > 0 && steps_until_tune == 0 {
            scaling = tune_scaling(scaling, accepted_since_tune as f64 / settings.tune_interval as f64);
            steps_until_tune = settings.tune_interval;
            accepted_since_tune = 0;
        }

        for j in 0..dim {
            proposal[j] = x[j] + scaling * widths[j] * rng.gen_range(-1.0..1.0);
        }
        let n_hist = history.len() / dim;
        if n_hist >= 2 {
            let a = rng.gen_range(0..n_hist);
            let mut b = rng.gen_range(0..n_hist - 1);
            if b >= a {
                b += 1;
            }
            for j in 0..dim {
                proposal[j] += lambda * (history[a * dim + j] - history[b * dim + j]);
            }
        }

        let lp = target.log_density(proposal.as_slice());
        let accept = lp.is_finite() && rng.r#gen::<f64>().ln() < lp - logp;
        if accept {
            x.copy_from(&proposal);
            logp = lp;
            accepted_since_tune += 1;
        }
        history.extend_from_slice(x.as_slice());
        steps_until_tune = steps_until_tune.saturating_sub(1);

        if tuning {
            if step + 1 == settings.tune {
                let drop = ((history.len() / dim) as f64 * settings.tune_drop_fraction) as usize;
                history.drain(..drop * dim);
                debug!(chain, scaling, kept = history.len() / dim, "tuning finished");
            }
        } else {
            out.draws.extend_from_slice(x.as_slice());
            out.log_posterior.push(logp);
            out.accepted.push(accept);
        }

        if (step + 1) % progress_every == 0 {
            debug!(chain, step = step + 1, total, scaling, "sampling progress");
        }
    }

    Ok(out)
}

/// Jittered copy of `start` (clamped to `bounds`) with a finite log-density.
///
/// Falls back to `start` itself when every jittered attempt fails.
fn initial_state<P: Posterior>(
    target: &P,
    start: &[f64],
    bounds: &[(f64, f64)],
    jitter: f64,
    rng: &mut StdRng,
) -> Option<(DVector<f64>, f64)> {
    for _ in 0..MAX_START_ATTEMPTS {
        let x = DVector::from_iterator(
            start.len(),
            start.iter().zip(bounds).map(|(&s, &(lo, hi))| {
                (s + jitter * (hi - lo) * rng.gen_range(-1.0..=1.0)).clamp(lo, hi)
            }),
        );
        let lp = target.log_density(x.as_slice());
        if lp.is_finite() {
            return Some((x, lp));
        }
    }
    let lp = target.log_density(start);
    lp.is_finite().then(|| (DVector::from_column_slice(start), lp))
}

/// Scaling update from the acceptance rate of the last tuning interval.
pub fn tune_scaling(scaling: f64, acceptance: f64) -> f64 {
    if acceptance < 0.001 {
        scaling * 0.1
    } else if acceptance < 0.05 {
        scaling * 0.5
    } else if acceptance < 0.2 {
        scaling * 0.9
    } else if acceptance > 0.95 {
        scaling * 10.0
    } else if acceptance > 0.75 {
        scaling * 2.0
    } else if acceptance > 0.5 {
        scaling * 1.1
    } else {
        scaling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::bayesian::fixtures::one_dim_model;
    use crate::math::mean;

    /// Independent normals, mean (1, -2), sd 0.5, truncated to [-10, 10]^2.
    struct Gaussian;

    impl Posterior for Gaussian {
        fn dim(&self) -> usize {
            2
        }

        fn bounds(&self) -> Vec<(f64, f64)> {
            vec![(-10.0, 10.0); 2]
        }

        fn log_density(&self, theta: &[f64]) -> f64 {
            if theta.iter().any(|v| v.abs() > 10.0) {
                return f64::NEG_INFINITY;
            }
            let (a, b) = ((theta[0] - 1.0) / 0.5, (theta[1] + 2.0) / 0.5);
            -0.5 * (a * a + b * b)
        }
    }

    /// Flat on the unit square.
    struct Square;

    impl Posterior for Square {
        fn dim(&self) -> usize {
            2
        }

        fn bounds(&self) -> Vec<(f64, f64)> {
            vec![(0.0, 1.0); 2]
        }

        fn log_density(&self, theta: &[f64]) -> f64 {
            if theta.iter().all(|v| (0.0..=1.0).contains(v)) { 0.0 } else { f64::NEG_INFINITY }
        }
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("p{i}")).collect()
    }

    #[test]
    fn recovers_mean_of_gaussian_target() {
        let settings = SamplerSettings::new(3000, 1000, 4, 2, 11);
        let trace = sample_demz(&Gaussian, &[0.0, 0.0], names(2), &settings).unwrap();
        assert_eq!(trace.n_chains(), 4);
        assert_eq!(trace.draws_per_chain(), 3000);

        let pooled = |p: usize| -> Vec<f64> { trace.param_chains(p).concat() };
        assert!((mean(&pooled(0)) - 1.0).abs() < 0.15, "{}", mean(&pooled(0)));
        assert!((mean(&pooled(1)) + 2.0).abs() < 0.15, "{}", mean(&pooled(1)));
        for rate in trace.acceptance_rates() {
            assert!(rate > 0.05 && rate < 0.95, "acceptance {rate}");
        }
    }

    #[test]
    fn draws_stay_inside_the_support() {
        let settings = SamplerSettings::new(500, 200, 2, 2, 3);
        let trace = sample_demz(&Square, &[0.5, 0.5], names(2), &settings).unwrap();
        for chain in &trace.chains {
            assert!(chain.draws.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn results_do_not_depend_on_worker_count() {
        let one = sample_demz(&Gaussian, &[0.0, 0.0], names(2), &SamplerSettings::new(200, 100, 3, 1, 5)).unwrap();
        let three = sample_demz(&Gaussian, &[0.0, 0.0], names(2), &SamplerSettings::new(200, 100, 3, 3, 5)).unwrap();
        assert_eq!(one, three);
    }

    #[test]
    fn scaling_follows_acceptance_rule() {
        assert_eq!(tune_scaling(1.0, 0.0), 0.1);
        assert_eq!(tune_scaling(1.0, 0.01), 0.5);
        assert_eq!(tune_scaling(1.0, 0.1), 0.9);
        assert_eq!(tune_scaling(1.0, 0.3), 1.0);
        assert_eq!(tune_scaling(1.0, 0.6), 1.1);
        assert_eq!(tune_scaling(1.0, 0.8), 2.0);
        assert_eq!(tune_scaling(1.0, 0.99), 10.0);
    }

    #[test]
    fn impossible_start_is_a_numeric_error() {
        struct Nowhere;
        impl Posterior for Nowhere {
            fn dim(&self) -> usize {
                1
            }
            fn bounds(&self) -> Vec<(f64, f64)> {
                vec![(0.0, 1.0)]
            }
            fn log_density(&self, _theta: &[f64]) -> f64 {
                f64::NEG_INFINITY
            }
        }
        let err = sample_demz(&Nowhere, &[0.5], names(1), &SamplerSettings::new(10, 0, 1, 1, 0)).unwrap_err();
        assert_eq!(err.exit_code(), AppError::NUMERIC);
    }

    #[test]
    fn calibration_posterior_centres_on_target() {
        let settings = SamplerSettings::new(1500, 500, 2, 2, 21);
        let trace = run_sampling(&one_dim_model(), &settings).unwrap();
        let draws = trace.param_chains(0).concat();
        // Posterior of transmission_rate is N(5, 0.5).
        assert!((mean(&draws) - 5.0).abs() < 0.2, "{}", mean(&draws));
    }
}

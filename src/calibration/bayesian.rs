//! Log-posterior of the model parameters.
//!
//! We calibrate only the parameters that have a prior. Every other model
//! parameter is held at its value in the merged parameter set (defaults
//! overridden by the supplied values). The free parameters are handled as a
//! plain `&[f64]` vector, ordered like the priors.

use tracing::debug;

use crate::calibration::priors::{UniformPrior, all_priors};
use crate::calibration::targets::{NormalTarget, default_targets};
use crate::domain::ParamSet;
use crate::error::AppError;
use crate::models::ModelRunner;

/// A bounded log-density over a flat parameter vector.
///
/// The optimizer and the sampler are written against this seam only.
pub trait Posterior: Sync {
    fn dim(&self) -> usize;

    /// `(lower, upper)` per dimension.
    fn bounds(&self) -> Vec<(f64, f64)>;

    /// `-inf` outside the support or when the density cannot be evaluated.
    fn log_density(&self, theta: &[f64]) -> f64;
}

/// Parameter values used where neither a prior nor a supplied value exists.
pub fn default_params() -> ParamSet {
    let mut params: ParamSet = all_priors().into_iter().map(|p| (p.name, 1.0)).collect();
    params.insert("tx_duration".to_string(), 0.5);
    params.insert("tx_prop_death".to_string(), 0.04);
    params
}

pub struct BayesianModel<R> {
    runner: R,
    base_params: ParamSet,
    priors: Vec<UniformPrior>,
    targets: Vec<NormalTarget>,
}

impl<R: ModelRunner> BayesianModel<R> {
    /// Posterior with the default priors and targets.
    ///
    /// `fixed_param` loses its prior and stays at its value in `params`
    /// (or its default).
    pub fn new(runner: R, params: &ParamSet, fixed_param: Option<&str>) -> Result<Self, AppError> {
        Self::with_priors(runner, params, all_priors(), default_targets(), fixed_param)
    }

    pub fn with_priors(
        runner: R,
        params: &ParamSet,
        priors: Vec<UniformPrior>,
        targets: Vec<NormalTarget>,
        fixed_param: Option<&str>,
    ) -> Result<Self, AppError> {
        if let Some(name) = fixed_param {
            if !priors.iter().any(|p| p.name == name) {
                return Err(AppError::insufficient(format!(
                    "Cannot fix '{name}': it is not a calibrated parameter."
                )));
            }
        }
        let priors: Vec<UniformPrior> = priors
            .into_iter()
            .filter(|p| Some(p.name.as_str()) != fixed_param)
            .collect();
        if priors.is_empty() {
            return Err(AppError::insufficient("No free parameters left to calibrate."));
        }

        let mut base_params = default_params();
        base_params.extend(params.iter().map(|(k, v)| (k.clone(), *v)));

        Ok(Self {
            runner,
            base_params,
            priors,
            targets,
        })
    }

    pub fn priors(&self) -> &[UniformPrior] {
        &self.priors
    }

    pub fn targets(&self) -> &[NormalTarget] {
        &self.targets
    }

    pub fn base_params(&self) -> &ParamSet {
        &self.base_params
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn param_names(&self) -> Vec<String> {
        self.priors.iter().map(|p| p.name.clone()).collect()
    }

    /// Full parameter set with the free parameters taken from `theta`.
    pub fn params_for(&self, theta: &[f64]) -> ParamSet {
        let mut params = self.base_params.clone();
        for (prior, &value) in self.priors.iter().zip(theta) {
            params.insert(prior.name.clone(), value);
        }
        params
    }

    /// Free parameters as stored in the merged set, clamped into their priors.
    pub fn initial_point(&self) -> Vec<f64> {
        self.priors
            .iter()
            .map(|p| p.clamp(self.base_params.get(&p.name).copied().unwrap_or(p.lower)))
            .collect()
    }

    pub fn log_prior(&self, theta: &[f64]) -> f64 {
        if theta.len() != self.priors.len() {
            return f64::NEG_INFINITY;
        }
        self.priors
            .iter()
            .zip(theta)
            .map(|(p, &v)| p.log_density(v))
            .sum()
    }

    pub fn log_likelihood(&self, params: &ParamSet) -> Result<f64, AppError> {
        let results = self.runner.run(params)?;
        let mut total = 0.0;
        for target in &self.targets {
            total += target.log_likelihood(&results)?;
        }
        Ok(total)
    }

    /// Prior plus likelihood; `-inf` outside the priors or when the model fails.
    pub fn log_posterior(&self, theta: &[f64]) -> f64 {
        let lp = self.log_prior(theta);
        if !lp.is_finite() {
            return f64::NEG_INFINITY;
        }
        match self.log_likelihood(&self.params_for(theta)) {
            Ok(ll) if ll.is_finite() => lp + ll,
            Ok(_) => f64::NEG_INFINITY,
            Err(err) => {
                debug!(error = %err, "model evaluation failed; rejecting point");
                f64::NEG_INFINITY
            }
        }
    }
}

impl<R: ModelRunner> Posterior for BayesianModel<R> {
    fn dim(&self) -> usize {
        self.priors.len()
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        self.priors.iter().map(|p| (p.lower, p.upper)).collect()
    }

    fn log_density(&self, theta: &[f64]) -> f64 {
        self.log_posterior(theta)
    }
}

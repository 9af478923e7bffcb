//! Bayesian calibration of the TB model.
//!
//! Responsibilities:
//!
//! - declare uniform priors and the prevalence target (`priors`, `targets`)
//! - wrap a model runner into a log-posterior over the free parameters (`bayesian`)
//! - find a point estimate with a budgeted derivative-free search (`optimize`)
//! - sample the posterior with DEMetropolisZ chains in parallel (`sampler`)
//! - hold, trim and subsample the resulting draws (`trace`)

pub mod bayesian;
pub mod optimize;
pub mod priors;
pub mod sampler;
pub mod targets;
pub mod trace;

pub use bayesian::*;
pub use optimize::*;
pub use priors::*;
pub use sampler::*;
pub use targets::*;
pub use trace::*;

//! Posterior draws, per chain.

use rand::Rng;
use rand::seq::index;

use crate::domain::ParamSet;
use crate::error::AppError;

/// Draws of one chain, stored row-major (`draws[i * dim + j]` is parameter `j` of draw `i`).
#[derive(Debug, Clone, PartialEq)]
pub struct ChainTrace {
    pub draws: Vec<f64>,
    pub log_posterior: Vec<f64>,
    /// Whether the proposal leading to each draw was accepted.
    pub accepted: Vec<bool>,
}

impl ChainTrace {
    pub fn len(&self) -> usize {
        self.log_posterior.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log_posterior.is_empty()
    }

    pub fn draw(&self, i: usize) -> &[f64] {
        let dim = self.draws.len() / self.len().max(1);
        &self.draws[i * dim..(i + 1) * dim]
    }

    pub fn acceptance_rate(&self) -> f64 {
        if self.accepted.is_empty() {
            return f64::NAN;
        }
        self.accepted.iter().filter(|&&a| a).count() as f64 / self.accepted.len() as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub param_names: Vec<String>,
    pub chains: Vec<ChainTrace>,
}

impl Trace {
    pub fn new(param_names: Vec<String>, chains: Vec<ChainTrace>) -> Result<Self, AppError> {
        let dim = param_names.len();
        for (c, chain) in chains.iter().enumerate() {
            if chain.draws.len() != chain.len() * dim || chain.accepted.len() != chain.len() {
                return Err(AppError::input(format!(
                    "Chain {c} has inconsistent draw storage for {dim} parameters."
                )));
            }
        }
        Ok(Self { param_names, chains })
    }

    pub fn dim(&self) -> usize {
        self.param_names.len()
    }

    pub fn n_chains(&self) -> usize {
        self.chains.len()
    }

    /// Shortest chain length.
    pub fn draws_per_chain(&self) -> usize {
        self.chains.iter().map(ChainTrace::len).min().unwrap_or(0)
    }

    pub fn total_draws(&self) -> usize {
        self.chains.iter().map(ChainTrace::len).sum()
    }

    /// Values of parameter `p`, one series per chain.
    pub fn param_chains(&self, p: usize) -> Vec<Vec<f64>> {
        let dim = self.dim();
        self.chains
            .iter()
            .map(|c| c.draws.iter().skip(p).step_by(dim.max(1)).copied().collect())
            .collect()
    }

    pub fn acceptance_rates(&self) -> Vec<f64> {
        self.chains.iter().map(ChainTrace::acceptance_rate).collect()
    }

    /// Drop the first `burnin` draws of every chain.
    pub fn discard_burnin(&self, burnin: usize) -> Result<Trace, AppError> {
        let shortest = self.draws_per_chain();
        if self.chains.is_empty() || burnin >= shortest {
            return Err(AppError::insufficient(format!(
                "Burn-in of {burnin} draws leaves nothing of chains with {shortest} draws."
            )));
        }
        let dim = self.dim();
        let chains = self
            .chains
            .iter()
            .map(|c| ChainTrace {
                draws: c.draws[burnin * dim..].to_vec(),
                log_posterior: c.log_posterior[burnin..].to_vec(),
                accepted: c.accepted[burnin..].to_vec(),
            })
            .collect();
        Ok(Trace {
            param_names: self.param_names.clone(),
            chains,
        })
    }

    /// `n` draws pooled over chains, picked without replacement.
    ///
    /// Returns every draw (in chain order) when `n` is at least the pool size.
    pub fn extract_samples<G: Rng + ?Sized>(&self, n: usize, rng: &mut G) -> Result<Vec<Vec<f64>>, AppError> {
        let total = self.total_draws();
        if total == 0 {
            return Err(AppError::insufficient("Trace holds no draws to sample from."));
        }
        let pool: Vec<&[f64]> = self
            .chains
            .iter()
            .flat_map(|c| (0..c.len()).map(move |i| c.draw(i)))
            .collect();
        if n >= total {
            return Ok(pool.into_iter().map(<[f64]>::to_vec).collect());
        }
        Ok(index::sample(rng, total, n)
            .into_iter()
            .map(|i| pool[i].to_vec())
            .collect())
    }

    /// Draw with the highest log-posterior.
    pub fn best(&self) -> Option<(ParamSet, f64)> {
        let mut best: Option<(&[f64], f64)> = None;
        for chain in &self.chains {
            for (i, &lp) in chain.log_posterior.iter().enumerate() {
                if best.is_none_or(|(_, b)| lp > b) {
                    best = Some((chain.draw(i), lp));
                }
            }
        }
        best.map(|(theta, lp)| (self.params_for(theta), lp))
    }

    pub fn params_for(&self, theta: &[f64]) -> ParamSet {
        self.param_names.iter().cloned().zip(theta.iter().copied()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Two chains of `n` draws over (a, b); draw `i` of chain `c` is `(c*100 + i, -i)`.
    fn trace(n: usize) -> Trace {
        let chains = (0..2)
            .map(|c| ChainTrace {
                draws: (0..n).flat_map(|i| [(c * 100 + i) as f64, -(i as f64)]).collect(),
                log_posterior: (0..n).map(|i| i as f64 - c as f64).collect(),
                accepted: (0..n).map(|i| i % 2 == 0).collect(),
            })
            .collect();
        Trace::new(vec!["a".into(), "b".into()], chains).unwrap()
    }

    #[test]
    fn burnin_drops_leading_draws_of_each_chain() {
        let t = trace(10).discard_burnin(4).unwrap();
        assert_eq!(t.draws_per_chain(), 6);
        assert_eq!(t.chains[1].draw(0), &[104.0, -4.0]);
        assert_eq!(t.param_chains(1)[0], vec![-4.0, -5.0, -6.0, -7.0, -8.0, -9.0]);

        let err = trace(10).discard_burnin(10).unwrap_err();
        assert_eq!(err.exit_code(), AppError::INSUFFICIENT);
    }

    #[test]
    fn extraction_is_without_replacement() {
        let t = trace(20);
        let mut rng = StdRng::seed_from_u64(1);
        let samples = t.extract_samples(25, &mut rng).unwrap();
        assert_eq!(samples.len(), 25);
        let mut keys: Vec<i64> = samples.iter().map(|s| s[0] as i64).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), 25);

        assert_eq!(t.extract_samples(1000, &mut rng).unwrap().len(), 40);
    }

    #[test]
    fn acceptance_and_best_draw() {
        let t = trace(4);
        assert_eq!(t.acceptance_rates(), vec![0.5, 0.5]);
        let (params, lp) = t.best().unwrap();
        assert_eq!(lp, 3.0);
        assert_eq!(params["a"], 3.0);
    }

    #[test]
    fn inconsistent_storage_is_rejected() {
        let chain = ChainTrace {
            draws: vec![1.0],
            log_posterior: vec![0.0],
            accepted: vec![true],
        };
        assert!(Trace::new(vec!["a".into(), "b".into()], vec![chain]).is_err());
    }
}

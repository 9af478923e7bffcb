//! Summary statistics for posterior draws and full-run outputs.
//!
//! Conventions:
//! - `quantile` uses linear interpolation between order statistics
//!   (position `q * (n - 1)`), the usual default of dataframe libraries.
//! - `std_dev` is the sample standard deviation (`n - 1` denominator).
//! - `split_r_hat` and `effective_sample_size` follow the Gelman/Vehtari
//!   multi-chain definitions.

/// Autocorrelation lags considered by the ESS estimate.
///
/// Well-mixed chains terminate long before this; it bounds the cost on
/// pathological traces.
const MAX_ESS_LAG: usize = 1000;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (n as f64 - 1.0)
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Quantile of the finite entries of `values` (NaN if there are none).
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    quantile_sorted(&sorted, q)
}

/// Several quantiles at once (sorts only once).
pub fn quantiles(values: &[f64], qs: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    qs.iter().map(|&q| quantile_sorted(&sorted, q)).collect()
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() || !q.is_finite() {
        return f64::NAN;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() as f64 - 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Split-R̂ across chains (each chain is split in half).
///
/// Returns NaN when there are fewer than 4 draws per chain.
pub fn split_r_hat(chains: &[Vec<f64>]) -> f64 {
    let half = match chains.iter().map(Vec::len).min() {
        Some(len) if len >= 4 => len / 2,
        _ => return f64::NAN,
    };

    let mut halves: Vec<&[f64]> = Vec::with_capacity(chains.len() * 2);
    for chain in chains {
        halves.push(&chain[..half]);
        halves.push(&chain[chain.len() - half..]);
    }

    let n = half as f64;
    let m = halves.len() as f64;
    let means: Vec<f64> = halves.iter().map(|h| mean(h)).collect();
    let grand = mean(&means);
    let b = n / (m - 1.0) * means.iter().map(|x| (x - grand) * (x - grand)).sum::<f64>();
    let w = mean(&halves.iter().map(|h| variance(h)).collect::<Vec<_>>());
    if !(w > 0.0) {
        return f64::NAN;
    }
    let var_plus = (n - 1.0) / n * w + b / n;
    (var_plus / w).sqrt()
}

/// Multi-chain effective sample size (Geyer initial positive sequence).
pub fn effective_sample_size(chains: &[Vec<f64>]) -> f64 {
    let n = match chains.iter().map(Vec::len).min() {
        Some(len) if len >= 4 => len,
        _ => return f64::NAN,
    };
    let m = chains.len() as f64;
    let chains: Vec<&[f64]> = chains.iter().map(|c| &c[..n]).collect();

    let means: Vec<f64> = chains.iter().map(|c| mean(c)).collect();
    let variances: Vec<f64> = chains.iter().map(|c| variance(c)).collect();
    let w = mean(&variances);
    let b_over_n = if chains.len() > 1 { variance(&means) } else { 0.0 };
    let var_plus = (n as f64 - 1.0) / n as f64 * w + b_over_n;
    if !(var_plus > 0.0) {
        return f64::NAN;
    }

    let autocov = |lag: usize| -> f64 {
        chains
            .iter()
            .zip(means.iter())
            .map(|(c, &mu)| {
                let s: f64 = (0..n - lag).map(|i| (c[i] - mu) * (c[i + lag] - mu)).sum();
                s / n as f64
            })
            .sum::<f64>()
            / m
    };

    let rho = |lag: usize| 1.0 - (w - autocov(lag)) / var_plus;

    // Sum autocorrelation pairs while they stay positive (and non-increasing).
    let max_lag = (n - 1).min(MAX_ESS_LAG);
    let mut tau = -1.0;
    let mut prev_pair = f64::INFINITY;
    let mut lag = 0;
    while lag + 1 <= max_lag {
        let pair = rho(lag) + rho(lag + 1);
        if pair <= 0.0 {
            break;
        }
        let pair = pair.min(prev_pair);
        tau += 2.0 * pair;
        prev_pair = pair;
        lag += 2;
    }

    let total = m * n as f64;
    if tau <= 0.0 {
        return total;
    }
    (total / tau).min(total * (total.log10()).max(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand::rngs::StdRng;
    use rand_distr::Normal;

    #[test]
    fn quantile_interpolates_linearly() {
        let v = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(quantile(&v, 0.0), 1.0);
        assert_eq!(quantile(&v, 1.0), 4.0);
        assert!((quantile(&v, 0.5) - 2.5).abs() < 1e-12);
        // pos = 0.25 * 3 = 0.75 -> 1 + 0.75 * (2 - 1)
        assert!((quantile(&v, 0.25) - 1.75).abs() < 1e-12);
        assert_eq!(quantiles(&v, &[0.0, 1.0]), vec![1.0, 4.0]);
    }

    #[test]
    fn quantile_skips_non_finite() {
        let v = [f64::NAN, 1.0, f64::INFINITY, 3.0];
        assert!((quantile(&v, 0.5) - 2.0).abs() < 1e-12);
        assert!(quantile(&[f64::NAN], 0.5).is_nan());
        assert!(quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn mean_and_std() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&v) - 5.0).abs() < 1e-12);
        assert!((variance(&v) - 32.0 / 7.0).abs() < 1e-12);
        assert!(std_dev(&[1.0]).is_nan());
    }

    #[test]
    fn r_hat_near_one_for_iid_chains_and_large_for_separated_chains() {
        let mut rng = StdRng::seed_from_u64(7);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let iid: Vec<Vec<f64>> = (0..4)
            .map(|_| (0..2000).map(|_| normal.sample(&mut rng)).collect())
            .collect();
        let r = split_r_hat(&iid);
        assert!((r - 1.0).abs() < 0.02, "r_hat={r}");

        let ess = effective_sample_size(&iid);
        assert!(ess > 4000.0, "ess={ess}");

        let separated: Vec<Vec<f64>> = (0..4)
            .map(|c| (0..2000).map(|_| normal.sample(&mut rng) + 5.0 * c as f64).collect())
            .collect();
        assert!(split_r_hat(&separated) > 2.0);
    }

    #[test]
    fn ess_is_small_for_sticky_chain() {
        // A random walk is strongly autocorrelated.
        let mut rng = StdRng::seed_from_u64(11);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mut x = 0.0;
        let chain: Vec<f64> = (0..2000)
            .map(|_| {
                x += normal.sample(&mut rng);
                x
            })
            .collect();
        let ess = effective_sample_size(&[chain]);
        assert!(ess < 200.0, "ess={ess}");
    }
}

//! Convergence diagnostics for multi-chain samplers.
//!
//! Both statistics follow the definitions of Gelman et al., *Bayesian Data
//! Analysis* (3rd ed.), chapter 11, as popularised by Stan:
//!
//! - the split potential scale reduction `R̂`: each chain is cut in two halves
//!   and the between-half variance is compared to the within-half variance.
//!   Values close to 1 indicate that the chains agree, values above 1.1 are a
//!   cause for concern.
//! - the effective sample size: the number of independent draws carrying the
//!   same information as the autocorrelated draws, estimated with Geyer's
//!   initial monotone positive sequence on the autocorrelations combined
//!   across chains.

use crate::summary::{mean, variance};

/// Above this value of `R̂`, a parameter is flagged.
pub const MAX_R_HAT: f64 = 1.1;
/// Below this share of the total draws, the effective sample size is flagged.
pub const MIN_ESS_RATIO: f64 = 0.1;

/// The split `R̂` of a parameter, given its draws in each chain.
///
/// Chains are truncated to the shortest one. Returns `None` when there are
/// fewer than 4 draws per chain.
pub fn split_r_hat(chains: &[Vec<f64>]) -> Option<f64> {
    let n = chains.iter().map(|c| c.len()).min()?;
    if n < 4 {
        return None;
    }
    let half = n / 2;
    let mut splits: Vec<&[f64]> = Vec::with_capacity(2 * chains.len());
    for c in chains.iter() {
        splits.push(&c[..half]);
        splits.push(&c[n - half..n]);
    }
    let means: Vec<f64> = splits.iter().map(|s| mean(s)).collect();
    let within = mean(
        &splits
            .iter()
            .map(|s| variance(s))
            .collect::<Vec<f64>>(),
    );
    let between = half as f64 * variance(&means);
    if within <= 0.0 {
        return Some(if between <= 0.0 { 1.0 } else { f64::INFINITY });
    }
    let h = half as f64;
    let var_plus = (h - 1.0) / h * within + between / h;
    Some((var_plus / within).sqrt())
}

/// The effective sample size of a parameter, pooled over the chains.
pub fn effective_sample_size(chains: &[Vec<f64>]) -> f64 {
    let m = chains.len();
    let n = chains.iter().map(|c| c.len()).min().unwrap_or(0);
    if m == 0 || n == 0 {
        return 0.0;
    }
    let total = (m * n) as f64;
    if n < 4 {
        return total;
    }
    let chains: Vec<&[f64]> = chains.iter().map(|c| &c[..n]).collect();
    let chain_means: Vec<f64> = chains.iter().map(|c| mean(c)).collect();
    let nf = n as f64;

    // Biased autocovariance at lag t, averaged over the chains.
    let mean_acov = |t: usize| -> f64 {
        let mut acc = 0.0;
        for (c, mu) in chains.iter().zip(chain_means.iter()) {
            let mut s = 0.0;
            for i in 0..(n - t) {
                s += (c[i] - mu) * (c[i + t] - mu);
            }
            acc += s / nf;
        }
        acc / m as f64
    };

    let acov0 = mean_acov(0);
    let mean_var = acov0 * nf / (nf - 1.0);
    let mut var_plus = mean_var * (nf - 1.0) / nf;
    if m > 1 {
        var_plus += variance(&chain_means);
    }
    if var_plus <= 0.0 {
        return total;
    }
    let rho = |t: usize| -> f64 { 1.0 - (mean_var - mean_acov(t)) / var_plus };

    // Geyer's initial positive sequence: sum the autocorrelations by pairs
    // while the pair sums stay positive, and keep them non-increasing.
    let mut pair_sums: Vec<f64> = Vec::new();
    let mut t = 0;
    while t + 1 < n {
        let p = if t == 0 { 1.0 + rho(1) } else { rho(t) + rho(t + 1) };
        if p <= 0.0 {
            break;
        }
        let p = match pair_sums.last() {
            Some(prev) if p > *prev => *prev,
            _ => p,
        };
        pair_sums.push(p);
        t += 2;
    }
    let tau = (-1.0 + 2.0 * pair_sums.iter().sum::<f64>()).max(1.0 / total.log10());
    total / tau
}

// Descriptive statistics of posterior draws.

use crate::config::*;
use crate::diagnostics::{effective_sample_size, split_r_hat};

pub(crate) fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample variance (n - 1 denominator). Zero for fewer than two values.
pub(crate) fn variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let mu = mean(xs);
    xs.iter().map(|x| (x - mu) * (x - mu)).sum::<f64>() / (xs.len() - 1) as f64
}

/// The q-quantile of sorted values, interpolating linearly between order
/// statistics.
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Summarizes the draws of one parameter. `chains` holds the draws of each
/// chain separately, for the diagnostics.
pub(crate) fn summarize(name: &str, chains: &[Vec<f64>], credible_level: f64) -> ParameterSummary {
    let mut pooled: Vec<f64> = chains.iter().flatten().cloned().collect();
    let mu = mean(&pooled);
    let sd = variance(&pooled).sqrt();
    pooled.sort_by(|a, b| a.total_cmp(b));
    let tail = (1.0 - credible_level) / 2.0;
    let r_hat = if chains.len() > 1 {
        split_r_hat(chains)
    } else {
        None
    };
    ParameterSummary {
        name: name.to_string(),
        estimate: quantile_sorted(&pooled, 0.5),
        mean: mu,
        sd,
        interval: Interval {
            lower: quantile_sorted(&pooled, tail),
            upper: quantile_sorted(&pooled, 1.0 - tail),
        },
        diagnostics: Diagnostics {
            r_hat,
            ess: effective_sample_size(chains),
        },
    }
}

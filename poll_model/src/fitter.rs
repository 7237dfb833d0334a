use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::*;
use crate::diagnostics::{MAX_R_HAT, MIN_ESS_RATIO};
use crate::encoder::{DesignRow, Encoder};
use crate::filter::is_usable_pct;
use crate::model::FittedModel;
use crate::sampler::{run_chain, run_optimizing, ChainDraws, RegressionProblem};
use crate::summary::summarize;

pub const SIGMA: &str = "sigma";

/// Fits the regression of `pct` on the pollster, population and recency of
/// the training polls.
///
/// Arguments:
/// * `training` the polls to learn from. They must all carry a `pct`; the
/// ones that do not are ignored.
/// * `recency` the rule deciding which polls are recent
/// * `settings` the sampler settings
///
/// An empty training set is reported as [`ModelError::EmptyInput`] before
/// any numeric work. Convergence problems do not fail the fit: they are
/// listed in [`FittedModel::warnings`].
pub fn fit(
    training: &[PollRecord],
    recency: RecencyRule,
    settings: &FitSettings,
) -> Result<FittedModel, ModelError> {
    let usable: Vec<&PollRecord> = training
        .iter()
        .filter(|r| r.pct.map_or(false, is_usable_pct))
        .collect();
    if usable.len() < training.len() {
        warn!(
            "fit: ignoring {} training polls without a usable pct",
            training.len() - usable.len()
        );
    }
    if usable.is_empty() {
        return Err(ModelError::EmptyInput);
    }
    settings.validate()?;

    let owned: Vec<PollRecord> = usable.iter().map(|r| (*r).clone()).collect();
    let encoder = Encoder::from_training(&owned, recency)?;
    let rows: Vec<DesignRow> = owned.iter().map(|r| encoder.encode(r).row).collect();
    let y: Vec<f64> = owned.iter().filter_map(|r| r.pct).collect();
    let problem = RegressionProblem::new(&rows, &y)?;
    info!(
        "fit: {} polls, {} coefficients, algorithm: {:?}",
        problem.num_rows(),
        problem.num_coefficients(),
        settings.algorithm
    );

    let start = Instant::now();
    let deadline = settings.max_wall_time.map(|d| start + d);
    let chains: Vec<ChainDraws> = match settings.algorithm {
        FitAlgorithm::Sampling => (0..settings.chain_count)
            .into_par_iter()
            .map(|c| run_chain(&problem, settings, c, deadline))
            .collect::<Result<Vec<ChainDraws>, ModelError>>()?,
        FitAlgorithm::Optimizing => vec![run_optimizing(&problem, settings)?],
    };
    debug!("fit: sampling took {:?}", start.elapsed());

    let pooled = pool_chains(chains, encoder.column_names(), settings)?;
    debug!("fit: {} draws kept per chain", pooled.kept_per_chain);
    for w in pooled.warnings.iter() {
        warn!("fit: {}", w);
    }
    for s in pooled.coefficients.iter().chain(std::iter::once(&pooled.sigma)) {
        info!(
            "{:>24} {:>9.3} [{:>9.3}, {:>9.3}] r_hat: {:?} ess: {:.0}",
            s.name, s.estimate, s.interval.lower, s.interval.upper, s.diagnostics.r_hat, s.diagnostics.ess
        );
    }

    Ok(FittedModel {
        encoder,
        coefficients: pooled.coefficients,
        sigma: pooled.sigma,
        warnings: pooled.warnings,
        settings: settings.clone(),
        training_rows: owned.len(),
        training_digest: training_digest(&owned),
        truncated: pooled.truncated,
    })
}

/// The chains put together: one summary per parameter, and the warnings.
#[derive(PartialEq, Debug, Clone)]
struct PooledDraws {
    coefficients: Vec<ParameterSummary>,
    sigma: ParameterSummary,
    warnings: Vec<FitWarning>,
    truncated: bool,
    kept_per_chain: usize,
}

/// Cuts the chains to the length of the shortest one, summarizes each
/// parameter over all the chains and flags the ones that did not converge.
/// `names` are the coefficient names; sigma comes last in each chain.
fn pool_chains(
    mut chains: Vec<ChainDraws>,
    mut names: Vec<String>,
    settings: &FitSettings,
) -> Result<PooledDraws, ModelError> {
    let kept = chains.iter().map(|c| c.len()).min().unwrap_or(0);
    if kept == 0 {
        return Err(ModelError::BudgetExhausted);
    }
    let truncated = chains.iter().any(|c| c.truncated);
    for c in chains.iter_mut() {
        c.truncate(kept);
    }

    names.push(SIGMA.to_string());
    let mut summaries: Vec<ParameterSummary> = names
        .iter()
        .enumerate()
        .map(|(k, name)| {
            let per_chain: Vec<Vec<f64>> = chains.iter().map(|c| c.draws[k].clone()).collect();
            summarize(name, &per_chain, settings.credible_level)
        })
        .collect();
    let sigma = summaries.pop().ok_or_else(|| {
        ModelError::NumericalFailure("no summary for the residual scale".to_string())
    })?;

    let total_draws = (kept * chains.len()) as f64;
    let mut warnings: Vec<FitWarning> = summaries
        .iter()
        .chain(std::iter::once(&sigma))
        .filter(|s| {
            s.diagnostics.r_hat.map_or(false, |r| !(r <= MAX_R_HAT))
                || s.diagnostics.ess < MIN_ESS_RATIO * total_draws
        })
        .map(|s| FitWarning::NonConvergence {
            parameter: s.name.clone(),
            r_hat: s.diagnostics.r_hat,
            ess: s.diagnostics.ess,
        })
        .collect();
    if truncated {
        warnings.push(FitWarning::Truncated {
            kept_draws: kept * chains.len(),
            planned_draws: settings.kept_per_chain() * chains.len(),
        });
    }
    Ok(PooledDraws {
        coefficients: summaries,
        sigma,
        warnings,
        truncated,
        kept_per_chain: kept,
    })
}

/// A digest of the rows a model was trained on, to recognise the data a
/// stored model came from.
pub fn training_digest(records: &[PollRecord]) -> String {
    let mut text = String::new();
    for r in records.iter() {
        text.push_str(&format!(
            "{}\t{}\t{}\t{}\t{:?}\t{:?}\n",
            r.id, r.pollster, r.population, r.end_date, r.numeric_grade, r.pct
        ));
    }
    sha256::digest(text.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{INTERCEPT, RECENT};
    use chrono::{Duration, NaiveDate};
    use rand::prelude::*;
    use rand::SeedableRng;
    use rand_distr::StandardNormal;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn reference_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, 1).unwrap()
    }

    fn poll(pollster: &str, population: &str, recent: bool, pct: f64) -> PollRecord {
        let age = if recent { 5 } else { 60 };
        PollRecord {
            id: format!("{}-{}-{}-{}", pollster, population, recent, pct),
            pollster: pollster.to_string(),
            candidate_name: "Harris".to_string(),
            population: population.to_string(),
            numeric_grade: Some(3.0),
            end_date: reference_date() - Duration::days(age),
            pct: Some(pct),
            state: None,
        }
    }

    fn quick_settings() -> FitSettings {
        FitSettings {
            iterations_per_chain: 600,
            warmup_iterations: 300,
            ..FitSettings::DEFAULT_SETTINGS
        }
    }

    /// 400 polls from 3 pollsters and 2 populations, with known effects.
    fn synthetic() -> Vec<PollRecord> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let pollsters = [("Emerson", 0.0), ("Siena", 1.5), ("YouGov", -2.0)];
        let populations = [("lv", 0.0), ("rv", 1.0)];
        (0..400)
            .map(|i| {
                let (p, pe) = pollsters[i % 3];
                let (q, qe) = populations[(i / 3) % 2];
                let recent = i % 5 < 2;
                let noise: f64 = rng.sample(StandardNormal);
                let pct = 46.0 + pe + qe + if recent { 0.8 } else { 0.0 } + 1.5 * noise;
                poll(p, q, recent, pct)
            })
            .collect()
    }

    #[test]
    fn empty_input_is_reported_before_fitting() {
        let res = fit(&[], RecencyRule::new(reference_date()), &quick_settings());
        assert_eq!(res, Err(ModelError::EmptyInput));

        let mut no_pct = poll("A", "lv", true, 0.0);
        no_pct.pct = None;
        let res = fit(&[no_pct], RecencyRule::new(reference_date()), &quick_settings());
        assert_eq!(res, Err(ModelError::EmptyInput));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let settings = FitSettings {
            warmup_iterations: 600,
            ..quick_settings()
        };
        let res = fit(
            &[poll("A", "lv", true, 50.0)],
            RecencyRule::new(reference_date()),
            &settings,
        );
        assert!(matches!(res, Err(ModelError::InvalidSettings(_))));
    }

    #[test]
    fn recovers_known_effects() {
        let _ = env_logger::builder().is_test(true).try_init();
        let m = fit(&synthetic(), RecencyRule::new(reference_date()), &quick_settings()).unwrap();
        let expected = [
            (INTERCEPT, 46.0),
            ("pollster:Siena", 1.5),
            ("pollster:YouGov", -2.0),
            ("population:rv", 1.0),
            (RECENT, 0.8),
        ];
        for (name, value) in expected.iter() {
            let c = m.coefficient(name).unwrap();
            assert!(
                (c.estimate - value).abs() < 0.6,
                "{}: {} vs {}",
                name,
                c.estimate,
                value
            );
            assert!(c.interval.lower < c.estimate && c.estimate < c.interval.upper);
            assert!(c.diagnostics.r_hat.unwrap() < MAX_R_HAT);
        }
        assert!((m.sigma().estimate - 1.5).abs() < 0.3);
        assert!(m.has_converged(), "{:?}", m.warnings());
        assert_eq!(m.training_rows(), 400);
        assert_eq!(m.training_digest().len(), 64);
        assert!(!m.truncated());
    }

    #[test]
    fn optimizing_agrees_with_sampling() {
        let data = synthetic();
        let sampled = fit(&data, RecencyRule::new(reference_date()), &quick_settings()).unwrap();
        let settings = FitSettings {
            algorithm: FitAlgorithm::Optimizing,
            ..quick_settings()
        };
        let optimized = fit(&data, RecencyRule::new(reference_date()), &settings).unwrap();
        for (a, b) in sampled.coefficients().iter().zip(optimized.coefficients()) {
            assert_eq!(a.name, b.name);
            assert!((a.estimate - b.estimate).abs() < 0.3, "{}", a.name);
            assert_eq!(b.diagnostics.r_hat, None);
        }
        assert!((sampled.sigma().estimate - optimized.sigma().estimate).abs() < 0.2);
    }

    #[test]
    fn fits_are_reproducible() {
        let data = synthetic();
        let a = fit(&data, RecencyRule::new(reference_date()), &quick_settings()).unwrap();
        let b = fit(&data, RecencyRule::new(reference_date()), &quick_settings()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn constant_outcome_fits_with_both_algorithms() {
        let data: Vec<PollRecord> = ["Emerson", "Siena", "YouGov", "Marist"]
            .iter()
            .flat_map(|p| {
                vec![
                    poll(p, "lv", true, 48.0),
                    poll(p, "rv", false, 48.0),
                    poll(p, "lv", false, 48.0),
                ]
            })
            .collect();
        for algorithm in [FitAlgorithm::Sampling, FitAlgorithm::Optimizing] {
            let settings = FitSettings {
                algorithm,
                ..quick_settings()
            };
            let m = fit(&data, RecencyRule::new(reference_date()), &settings).unwrap();
            assert!(
                (m.intercept().estimate - 48.0).abs() < 0.01,
                "{:?}: {}",
                algorithm,
                m.intercept().estimate
            );
            for c in m.coefficients().iter().skip(1) {
                assert!(c.estimate.abs() < 0.01, "{:?}: {:?}", algorithm, c);
            }
            assert!(m.sigma().estimate < 0.01);
        }
    }

    fn normal_draws(seed: u64, len: usize, shift: f64) -> Vec<f64> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        (0..len)
            .map(|_| shift + rng.sample::<f64, _>(StandardNormal))
            .collect()
    }

    fn chain(seed: u64, len: usize, shift: f64, truncated: bool) -> ChainDraws {
        ChainDraws {
            draws: vec![
                normal_draws(seed, len, shift),
                normal_draws(seed + 100, len, 2.0).iter().map(|x| x.abs()).collect(),
            ],
            truncated,
        }
    }

    #[test]
    fn separated_chains_raise_a_warning() {
        let chains: Vec<ChainDraws> = (0..4)
            .map(|c| chain(c, 200, 10.0 * c as f64, false))
            .collect();
        let pooled = pool_chains(chains, vec![INTERCEPT.to_string()], &quick_settings()).unwrap();
        assert_eq!(pooled.warnings.len(), 1);
        match &pooled.warnings[0] {
            FitWarning::NonConvergence {
                parameter, r_hat, ..
            } => {
                assert_eq!(parameter, INTERCEPT);
                assert!(r_hat.unwrap() > MAX_R_HAT);
            }
            w => panic!("unexpected warning {:?}", w),
        }
        assert!(!pooled.truncated);
        assert_eq!(pooled.kept_per_chain, 200);
    }

    #[test]
    fn stopped_chains_are_cut_to_the_shortest() {
        let chains = vec![
            chain(1, 300, 0.0, false),
            chain(2, 180, 0.0, true),
            chain(3, 240, 0.0, true),
        ];
        let settings = quick_settings();
        let pooled = pool_chains(chains, vec![INTERCEPT.to_string()], &settings).unwrap();
        assert!(pooled.truncated);
        assert_eq!(pooled.kept_per_chain, 180);
        assert_eq!(
            pooled.warnings,
            vec![FitWarning::Truncated {
                kept_draws: 540,
                planned_draws: 900,
            }]
        );
        assert!(pooled.sigma.diagnostics.r_hat.unwrap() < MAX_R_HAT);

        let empty = vec![chain(1, 300, 0.0, false), chain(2, 0, 0.0, true)];
        assert_eq!(
            pool_chains(empty, vec![INTERCEPT.to_string()], &settings),
            Err(ModelError::BudgetExhausted)
        );
    }

    #[test]
    fn exhausted_budget_without_draws_fails() {
        let settings = FitSettings {
            max_wall_time: Some(std::time::Duration::from_secs(0)),
            ..quick_settings()
        };
        let res = fit(&synthetic(), RecencyRule::new(reference_date()), &settings);
        assert_eq!(res, Err(ModelError::BudgetExhausted));
    }
}

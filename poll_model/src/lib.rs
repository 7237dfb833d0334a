/*!
Poll aggregation with a Bayesian regression on categorical poll attributes.

The pipeline has four steps:
* **filter** the polls for one candidate by quality grade and date
  ([`filter_polls`], [`filter_training`]),
* **encode** the pollster, population and recency of each poll as dummy
  variables against a reference level fixed at training time ([`Encoder`]),
* **fit** a linear regression of the support on these variables, with weakly
  informative priors, by multi-chain Gibbs sampling ([`fit`]),
* **predict** the support for new polls, national or by state ([`predict`]).

[`train`] chains the first three steps.

```
use chrono::NaiveDate;
use poll_model::*;

let day = |d| NaiveDate::from_ymd_opt(2024, 10, d).unwrap();
let poll = |pollster: &str, d, pct| PollRecord {
    id: format!("{}-{}", pollster, d),
    pollster: pollster.to_string(),
    candidate_name: "Kamala Harris".to_string(),
    population: "lv".to_string(),
    numeric_grade: Some(3.0),
    end_date: day(d),
    pct,
    state: None,
};
let polls = vec![poll("Siena", 2, Some(48.0)), poll("Emerson", 28, Some(49.5))];
let filter = PollFilter {
    candidate_name: "Kamala Harris".to_string(),
    min_grade: 2.7,
    min_date: None,
};
let settings = FitSettings {
    iterations_per_chain: 200,
    warmup_iterations: 100,
    ..FitSettings::DEFAULT_SETTINGS
};
let run = train(&polls, &filter, 30, None, &settings)?;
let batch = predict(&run.model, &[poll("Marist", 30, None)]);
assert_eq!(batch.predictions.len(), 1);
assert_eq!(batch.unseen.total(), 1);
# Ok::<(), ModelError>(())
```
*/

mod config;
mod diagnostics;
mod encoder;
mod filter;
mod fitter;
mod linalg;
mod model;
mod predictor;
mod records;
mod sampler;
mod summary;

pub mod aggregate;
pub mod manual;

use chrono::NaiveDate;
use log::info;

pub use crate::config::*;
pub use crate::diagnostics::{effective_sample_size, split_r_hat, MAX_R_HAT, MIN_ESS_RATIO};
pub use crate::encoder::{
    DesignRow, EncodedRow, Encoder, UnseenLevels, Vocabulary, INTERCEPT, RECENT,
};
pub use crate::filter::{filter_polls, filter_training, FilterOutcome};
pub use crate::fitter::{fit, training_digest, SIGMA};
pub use crate::model::{FittedModel, ModelParts};
pub use crate::predictor::{predict, predict_one};
pub use crate::records::{parse_date, validate_polls, ValidatedPolls};

/// The outcome of a training run.
#[derive(PartialEq, Debug, Clone)]
pub struct TrainingRun {
    pub model: FittedModel,
    pub filtered: FilterOutcome,
}

/// Filters the polls and fits a model on the ones that remain.
///
/// Arguments:
/// * `records` all the polls, for all candidates
/// * `filter` the eligibility criteria
/// * `recency_window_days` how many days before the reference date a poll
/// still counts as recent
/// * `reference_date` the date recency is measured from. If not provided,
/// the latest end date of the selected polls is used.
/// * `settings` the sampler settings
///
/// Returns [`ModelError::EmptyInput`] when no poll passes the filter.
pub fn train(
    records: &[PollRecord],
    filter: &PollFilter,
    recency_window_days: u32,
    reference_date: Option<NaiveDate>,
    settings: &FitSettings,
) -> Result<TrainingRun, ModelError> {
    let filtered = filter_training(records, filter);
    if filtered.is_empty() {
        return Err(ModelError::EmptyInput);
    }
    let reference_date = match reference_date {
        Some(d) => d,
        None => latest_end_date(&filtered.selected).ok_or(ModelError::EmptyInput)?,
    };
    let recency = RecencyRule {
        reference_date,
        window_days: recency_window_days,
    };
    info!("train: recency rule {:?}", recency);
    let model = fit(&filtered.selected, recency, settings)?;
    Ok(TrainingRun { model, filtered })
}

/// The end date of the most recent poll.
pub fn latest_end_date(records: &[PollRecord]) -> Option<NaiveDate> {
    records.iter().map(|r| r.end_date).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reference_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, 1).unwrap()
    }

    fn poll(pollster: &str, population: &str, recent: bool, pct: Option<f64>) -> PollRecord {
        PollRecord {
            id: format!("{}-{}-{}", pollster, population, recent),
            pollster: pollster.to_string(),
            candidate_name: "Harris".to_string(),
            population: population.to_string(),
            numeric_grade: Some(3.0),
            end_date: reference_date() - Duration::days(if recent { 3 } else { 45 }),
            pct,
            state: None,
        }
    }

    fn harris(min_grade: f64) -> PollFilter {
        PollFilter {
            candidate_name: "Harris".to_string(),
            min_grade,
            min_date: None,
        }
    }

    #[test]
    fn two_poll_scenario() {
        let _ = env_logger::builder().is_test(true).try_init();
        let training = vec![
            poll("A", "Voters", true, Some(50.0)),
            poll("B", "Voters", false, Some(46.0)),
        ];
        let run = train(
            &training,
            &harris(2.0),
            30,
            Some(reference_date()),
            &FitSettings::DEFAULT_SETTINGS,
        )
        .unwrap();
        let m = &run.model;
        assert_eq!(m.encoder().pollsters().reference(), "A");
        assert_eq!(m.encoder().populations().reference(), "Voters");

        let batch = predict(
            m,
            &[
                poll("A", "Voters", true, None),
                poll("C", "Voters", true, None),
            ],
        );
        let known = batch.predictions[0].predicted_pct;
        let unseen = batch.predictions[1].predicted_pct;
        assert!(
            (known - 50.0).abs() < m.sigma().estimate,
            "prediction {} sigma {}",
            known,
            m.sigma().estimate
        );
        assert_eq!(known, unseen);
        assert_eq!(batch.unseen.pollsters.get("C"), Some(&1));
    }

    #[test]
    fn strict_threshold_gives_empty_input() {
        let training = vec![
            poll("A", "Voters", true, Some(50.0)),
            poll("B", "Voters", false, Some(46.0)),
        ];
        let filtered = filter_training(&training, &harris(3.5));
        assert!(filtered.is_empty());
        assert_eq!(
            fit(
                &filtered.selected,
                RecencyRule::new(reference_date()),
                &FitSettings::DEFAULT_SETTINGS
            ),
            Err(ModelError::EmptyInput)
        );
        assert_eq!(
            train(&training, &harris(3.5), 30, None, &FitSettings::DEFAULT_SETTINGS),
            Err(ModelError::EmptyInput)
        );
    }

    #[test]
    fn reference_date_defaults_to_latest_poll() {
        let training = vec![
            poll("A", "Voters", false, Some(47.0)),
            poll("B", "Voters", true, Some(46.0)),
            poll("B", "Adults", true, Some(45.0)),
        ];
        let settings = FitSettings {
            iterations_per_chain: 200,
            warmup_iterations: 100,
            ..FitSettings::DEFAULT_SETTINGS
        };
        let run = train(&training, &harris(2.0), 30, None, &settings).unwrap();
        assert_eq!(
            run.model.encoder().recency().reference_date,
            reference_date() - Duration::days(3)
        );
        assert_eq!(run.filtered.selected.len(), 3);
    }

    #[test]
    fn unusable_outcomes_are_left_out_of_training() {
        let training = vec![
            poll("A", "Voters", true, Some(48.0)),
            poll("B", "Voters", true, Some(f64::NAN)),
            poll("A", "Voters", false, Some(-3.0)),
        ];
        let settings = FitSettings {
            iterations_per_chain: 400,
            warmup_iterations: 200,
            ..FitSettings::DEFAULT_SETTINGS
        };
        let run = train(&training, &harris(2.0), 30, None, &settings).unwrap();
        assert_eq!(run.filtered.selected.len(), 1);
        assert_eq!(
            run.filtered
                .exclusions
                .iter()
                .filter(|e| e.reason == MalformedReason::InvalidPct)
                .count(),
            2
        );
        let batch = predict(&run.model, &[poll("A", "Voters", true, None)]);
        let pct = batch.predictions[0].predicted_pct;
        assert!((pct - 48.0).abs() < 1.0, "prediction {}", pct);
    }
}

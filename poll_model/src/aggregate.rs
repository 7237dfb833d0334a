// Averages of predictions by geography.

use std::collections::BTreeMap;

use crate::config::Prediction;

#[derive(PartialEq, Debug, Clone)]
pub struct StateAverage {
    pub state: String,
    pub polls: usize,
    pub mean_predicted_pct: f64,
}

/// The mean prediction of the state polls, by state, sorted by state name.
/// National polls are not included.
pub fn by_state(predictions: &[Prediction]) -> Vec<StateAverage> {
    let mut acc: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
    for p in predictions.iter() {
        if let Some(state) = p.record.state.as_deref() {
            let e = acc.entry(state).or_insert((0, 0.0));
            e.0 += 1;
            e.1 += p.predicted_pct;
        }
    }
    acc.into_iter()
        .map(|(state, (polls, total))| StateAverage {
            state: state.to_string(),
            polls,
            mean_predicted_pct: total / polls as f64,
        })
        .collect()
}

/// The mean prediction over all the rows, if any.
pub fn overall(predictions: &[Prediction]) -> Option<f64> {
    if predictions.is_empty() {
        None
    } else {
        Some(predictions.iter().map(|p| p.predicted_pct).sum::<f64>() / predictions.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollRecord;
    use chrono::NaiveDate;

    fn prediction(state: Option<&str>, predicted_pct: f64) -> Prediction {
        Prediction {
            record: PollRecord {
                id: "x".to_string(),
                pollster: "Siena".to_string(),
                candidate_name: "Harris".to_string(),
                population: "lv".to_string(),
                numeric_grade: Some(3.0),
                end_date: NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
                pct: None,
                state: state.map(|s| s.to_string()),
            },
            predicted_pct,
        }
    }

    #[test]
    fn averages_by_state() {
        let preds = vec![
            prediction(Some("Wisconsin"), 48.0),
            prediction(None, 47.0),
            prediction(Some("Arizona"), 46.0),
            prediction(Some("Wisconsin"), 50.0),
        ];
        let avg = by_state(&preds);
        assert_eq!(
            avg,
            vec![
                StateAverage {
                    state: "Arizona".to_string(),
                    polls: 1,
                    mean_predicted_pct: 46.0
                },
                StateAverage {
                    state: "Wisconsin".to_string(),
                    polls: 2,
                    mean_predicted_pct: 49.0
                },
            ]
        );
        assert_eq!(overall(&preds), Some(47.75));
        assert_eq!(overall(&[]), None);
    }
}

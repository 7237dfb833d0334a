use log::{debug, warn};

use crate::config::*;
use crate::encoder::UnseenLevels;
use crate::linalg::dot;
use crate::model::FittedModel;

/// The point prediction for a single poll, and the levels of that poll that
/// the model has never seen.
pub fn predict_one(model: &FittedModel, record: &PollRecord) -> (f64, UnseenLevels) {
    let encoded = model.encoder().encode(record);
    let value = dot(&model.point_estimates(), &encoded.row.0);
    (value, encoded.unseen)
}

/// Predicts the support for each poll, in input order.
///
/// The polls are encoded with the training vocabulary of the model. A
/// pollster or population that was not part of it is treated as the
/// reference level: it is counted in the report, and does not fail the
/// prediction.
pub fn predict(model: &FittedModel, records: &[PollRecord]) -> PredictionBatch {
    let estimates = model.point_estimates();
    let mut res = PredictionBatch::default();
    for r in records.iter() {
        let encoded = model.encoder().encode(r);
        let predicted_pct = dot(&estimates, &encoded.row.0);
        if let Some(p) = encoded.unseen.pollster {
            debug!("predict: {}: unseen pollster {:?}", r.id, p);
            *res.unseen.pollsters.entry(p).or_insert(0) += 1;
        }
        if let Some(p) = encoded.unseen.population {
            debug!("predict: {}: unseen population {:?}", r.id, p);
            *res.unseen.populations.entry(p).or_insert(0) += 1;
        }
        res.predictions.push(Prediction {
            record: r.clone(),
            predicted_pct,
        });
    }
    if !res.unseen.is_empty() {
        warn!(
            "predict: {} rows use levels absent from training, predicted at the reference level. Pollsters: {:?} populations: {:?}",
            res.unseen.total(),
            res.unseen.pollsters,
            res.unseen.populations
        );
    }
    res
}

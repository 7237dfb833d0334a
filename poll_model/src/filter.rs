use log::{debug, info};

use crate::config::*;

/// The result of filtering: the selected polls and the number of polls
/// dropped for each reason.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct FilterOutcome {
    pub selected: Vec<PollRecord>,
    pub other_candidate: usize,
    pub below_grade: usize,
    pub before_min_date: usize,
    /// Training rows without an outcome.
    pub exclusions: Vec<Exclusion>,
}

impl FilterOutcome {
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// Selects the polls for the candidate that pass the quality and date
/// criteria.
///
/// An empty selection is a valid outcome and not an error. The input order
/// is preserved.
pub fn filter_polls(records: &[PollRecord], filter: &PollFilter) -> FilterOutcome {
    let mut res = FilterOutcome::default();
    for r in records.iter() {
        if r.candidate_name != filter.candidate_name {
            res.other_candidate += 1;
        } else if r.numeric_grade.map_or(true, |g| g < filter.min_grade) {
            res.below_grade += 1;
        } else if filter.min_date.map_or(false, |d| r.end_date < d) {
            res.before_min_date += 1;
        } else {
            res.selected.push(r.clone());
        }
    }
    info!(
        "filter_polls: {} of {} polls selected for {:?} (other candidate: {}, below grade {}: {}, before {:?}: {})",
        res.selected.len(),
        records.len(),
        filter.candidate_name,
        res.other_candidate,
        filter.min_grade,
        res.below_grade,
        filter.min_date,
        res.before_min_date
    );
    res
}

/// Like [`filter_polls`], and also drops the polls that carry no usable
/// outcome, since they cannot be used to fit a model. The outcome of every
/// selected poll is finite and non-negative.
pub fn filter_training(records: &[PollRecord], filter: &PollFilter) -> FilterOutcome {
    let mut res = filter_polls(records, filter);
    let mut selected: Vec<PollRecord> = Vec::with_capacity(res.selected.len());
    for r in res.selected.into_iter() {
        let reason = match r.pct {
            Some(x) if is_usable_pct(x) => {
                selected.push(r);
                continue;
            }
            Some(_) => MalformedReason::InvalidPct,
            None => MalformedReason::MissingPct,
        };
        debug!("filter_training: excluding {}: {}", r.id, reason);
        res.exclusions.push(Exclusion { id: r.id, reason });
    }
    res.selected = selected;
    res
}

pub(crate) fn is_usable_pct(x: f64) -> bool {
    x.is_finite() && x >= 0.0
}

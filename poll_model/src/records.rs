// Conversion of raw table rows into typed poll records.

use chrono::NaiveDate;
use log::{debug, info};

use crate::config::*;

/// The date layouts accepted for the end date of a poll.
/// The two-digit year must be tried before the four-digit one: `%Y` would
/// happily read `24` as the year 24.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y"];

#[derive(PartialEq, Debug, Clone, Default)]
pub struct ValidatedPolls {
    pub records: Vec<PollRecord>,
    pub exclusions: Vec<Exclusion>,
}

/// Validates the raw rows. Rows that cannot be used are left out and
/// reported in the exclusions, the others are returned in input order.
pub fn validate_polls(raw: &[RawPoll]) -> ValidatedPolls {
    let mut res = ValidatedPolls::default();
    for (idx, rp) in raw.iter().enumerate() {
        let id = non_empty(&rp.id).unwrap_or_else(|| format!("row-{:08}", idx + 1));
        match validate_poll(&id, rp) {
            Ok(record) => res.records.push(record),
            Err(reason) => {
                debug!("validate_polls: excluding {}: {}", id, reason);
                res.exclusions.push(Exclusion { id, reason });
            }
        }
    }
    if !res.exclusions.is_empty() {
        info!(
            "validate_polls: kept {} rows, excluded {}: {:?}",
            res.records.len(),
            res.exclusions.len(),
            count_exclusions(&res.exclusions)
        );
    }
    res
}

fn validate_poll(id: &str, rp: &RawPoll) -> Result<PollRecord, MalformedReason> {
    let pollster = non_empty(&rp.pollster).ok_or(MalformedReason::MissingPollster)?;
    let candidate_name = non_empty(&rp.candidate_name).ok_or(MalformedReason::MissingCandidate)?;
    let population = non_empty(&rp.population).ok_or(MalformedReason::MissingPopulation)?;
    let numeric_grade = match non_empty(&rp.numeric_grade) {
        None => None,
        Some(s) => match s.parse::<f64>() {
            Ok(g) if g.is_finite() => Some(g),
            _ => return Err(MalformedReason::InvalidGrade),
        },
    };
    let end_date = non_empty(&rp.end_date)
        .and_then(|s| parse_date(&s))
        .ok_or(MalformedReason::InvalidDate)?;
    let pct = match non_empty(&rp.pct) {
        None => None,
        Some(s) => match s.parse::<f64>() {
            Ok(x) if x.is_finite() && (0.0..=100.0).contains(&x) => Some(x),
            _ => return Err(MalformedReason::InvalidPct),
        },
    };
    // A blank grade is only allowed on a row that is only predicted.
    if numeric_grade.is_none() && pct.is_some() {
        return Err(MalformedReason::InvalidGrade);
    }
    let state = non_empty(&rp.state);
    let state = match non_empty(&rp.national).map(|s| parse_flag(&s)) {
        None => state,
        Some(Some(true)) if state.is_none() => None,
        Some(Some(false)) if state.is_some() => state,
        _ => return Err(MalformedReason::InconsistentState),
    };
    Ok(PollRecord {
        id: id.to_string(),
        pollster,
        candidate_name,
        population,
        numeric_grade,
        end_date,
        pct,
        state,
    })
}

/// Parses a date in one of the layouts exported by the common poll
/// aggregators.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s.trim(), fmt).ok())
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn non_empty(x: &Option<String>) -> Option<String> {
    x.as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

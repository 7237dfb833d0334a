// ********* Input data structures ***********

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Display;
use std::time::Duration;

use chrono::NaiveDate;

/// A poll row as read from a table, before any validation.
///
/// All the fields are kept as text: the validation step decides which rows
/// can be used and reports the others. In most cases, it is enough to use
/// [`crate::validate_polls`] on a list of these.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RawPoll {
    pub id: Option<String>,
    pub pollster: Option<String>,
    pub candidate_name: Option<String>,
    pub population: Option<String>,
    pub numeric_grade: Option<String>,
    pub end_date: Option<String>,
    pub pct: Option<String>,
    pub state: Option<String>,
    /// Explicit national flag. When missing, the presence of a state decides.
    pub national: Option<String>,
}

/// One observed survey result for a candidate.
#[derive(PartialEq, Debug, Clone)]
pub struct PollRecord {
    pub id: String,
    pub pollster: String,
    pub candidate_name: String,
    pub population: String,
    /// The quality grade of the pollster. Only prediction rows may lack it.
    pub numeric_grade: Option<f64>,
    pub end_date: NaiveDate,
    /// The observed support, in percent. Prediction rows may not carry it.
    pub pct: Option<f64>,
    /// Present iff the poll is not national.
    pub state: Option<String>,
}

impl PollRecord {
    pub fn is_national(&self) -> bool {
        self.state.is_none()
    }
}

/// The reasons for which a row is left out of the pipeline.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum MalformedReason {
    MissingPollster,
    MissingCandidate,
    MissingPopulation,
    InvalidGrade,
    InvalidDate,
    /// The outcome is present but not a finite, non-negative number.
    InvalidPct,
    /// The outcome is absent on a row used for training.
    MissingPct,
    /// A row flagged as a state poll without a state, or the reverse.
    InconsistentState,
}

impl Display for MalformedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MalformedReason::MissingPollster => "missing pollster",
            MalformedReason::MissingCandidate => "missing candidate name",
            MalformedReason::MissingPopulation => "missing population",
            MalformedReason::InvalidGrade => "invalid numeric grade",
            MalformedReason::InvalidDate => "invalid end date",
            MalformedReason::InvalidPct => "invalid pct",
            MalformedReason::MissingPct => "missing pct",
            MalformedReason::InconsistentState => "inconsistent state / national flag",
        };
        write!(f, "{}", s)
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Exclusion {
    pub id: String,
    pub reason: MalformedReason,
}

/// Counts the exclusions by reason, in a stable order.
pub fn count_exclusions(exclusions: &[Exclusion]) -> BTreeMap<MalformedReason, usize> {
    let mut counts: BTreeMap<MalformedReason, usize> = BTreeMap::new();
    for e in exclusions.iter() {
        *counts.entry(e.reason).or_insert(0) += 1;
    }
    counts
}

// ******** Output data structures *********

/// A central credible interval.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

/// Convergence statistics for one parameter.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct Diagnostics {
    /// Split-chain potential scale reduction. Not defined with a single chain.
    pub r_hat: Option<f64>,
    /// Effective number of independent draws, pooled over the chains.
    pub ess: f64,
}

/// The posterior summary of one parameter.
#[derive(PartialEq, Debug, Clone)]
pub struct ParameterSummary {
    pub name: String,
    /// The point estimate: the posterior median.
    pub estimate: f64,
    pub mean: f64,
    pub sd: f64,
    pub interval: Interval,
    pub diagnostics: Diagnostics,
}

/// Problems noticed while fitting. They never prevent a model from being
/// returned.
#[derive(PartialEq, Debug, Clone)]
pub enum FitWarning {
    NonConvergence {
        parameter: String,
        r_hat: Option<f64>,
        ess: f64,
    },
    /// The time budget ran out before all the iterations were done.
    Truncated { kept_draws: usize, planned_draws: usize },
}

impl Display for FitWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitWarning::NonConvergence {
                parameter,
                r_hat,
                ess,
            } => write!(
                f,
                "parameter {} may not have converged (r_hat: {:?}, ess: {:.1})",
                parameter, r_hat, ess
            ),
            FitWarning::Truncated {
                kept_draws,
                planned_draws,
            } => write!(
                f,
                "sampling stopped early: {} of {} draws kept",
                kept_draws, planned_draws
            ),
        }
    }
}

/// The prediction for one row.
#[derive(PartialEq, Debug, Clone)]
pub struct Prediction {
    pub record: PollRecord,
    pub predicted_pct: f64,
}

/// The categorical values met at prediction time that were not part of the
/// training vocabulary, with the number of rows for each.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct UnseenReport {
    pub pollsters: BTreeMap<String, usize>,
    pub populations: BTreeMap<String, usize>,
}

impl UnseenReport {
    pub fn total(&self) -> usize {
        self.pollsters.values().sum::<usize>() + self.populations.values().sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.pollsters.is_empty() && self.populations.is_empty()
    }
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct PredictionBatch {
    pub predictions: Vec<Prediction>,
    pub unseen: UnseenReport,
}

/// Errors that prevent a fit or a prediction from completing.
#[derive(PartialEq, Debug, Clone)]
pub enum ModelError {
    /// No rows to work with. This is a normal outcome of a strict filter.
    EmptyInput,
    InvalidSettings(String),
    NumericalFailure(String),
    /// The time budget ran out before any draw could be kept.
    BudgetExhausted,
    /// A model assembled from stored parts does not hold together.
    InconsistentModel(String),
}

impl Error for ModelError {}

impl Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::EmptyInput => write!(f, "no eligible polls: cannot fit a model on empty input"),
            ModelError::InvalidSettings(msg) => write!(f, "invalid fit settings: {}", msg),
            ModelError::NumericalFailure(msg) => write!(f, "numerical failure: {}", msg),
            ModelError::BudgetExhausted => {
                write!(f, "the time budget ran out before warmup completed")
            }
            ModelError::InconsistentModel(msg) => write!(f, "inconsistent model: {}", msg),
        }
    }
}

// ********* Configuration **********

/// The eligibility criteria for polls.
#[derive(PartialEq, Debug, Clone)]
pub struct PollFilter {
    pub candidate_name: String,
    pub min_grade: f64,
    pub min_date: Option<NaiveDate>,
}

/// Decides which polls count as recent.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct RecencyRule {
    pub reference_date: NaiveDate,
    pub window_days: u32,
}

impl RecencyRule {
    pub const DEFAULT_WINDOW_DAYS: u32 = 30;

    pub fn new(reference_date: NaiveDate) -> RecencyRule {
        RecencyRule {
            reference_date,
            window_days: RecencyRule::DEFAULT_WINDOW_DAYS,
        }
    }

    /// A poll is recent when its fieldwork ended at most `window_days` before
    /// the reference date. Polls ending after the reference date are recent.
    pub fn is_recent(&self, end_date: NaiveDate) -> bool {
        (self.reference_date - end_date).num_days() <= self.window_days as i64
    }
}

/// The estimation procedure.
///
/// - Sampling runs several Gibbs chains in parallel. It gives a full
/// posterior and convergence diagnostics.
///
/// - Optimizing finds the posterior mode and draws from a normal
/// approximation around it. It is much faster but only approximate, and
/// with a single chain no scale reduction can be computed.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum FitAlgorithm {
    Sampling,
    Optimizing,
}

#[derive(PartialEq, Debug, Clone)]
pub struct FitSettings {
    pub credible_level: f64,
    pub chain_count: usize,
    pub iterations_per_chain: usize,
    pub warmup_iterations: usize,
    pub seed: u64,
    pub algorithm: FitAlgorithm,
    pub max_wall_time: Option<Duration>,
}

impl FitSettings {
    pub const DEFAULT_SETTINGS: FitSettings = FitSettings {
        credible_level: 0.95,
        chain_count: 4,
        iterations_per_chain: 2000,
        warmup_iterations: 1000,
        seed: 853,
        algorithm: FitAlgorithm::Sampling,
        max_wall_time: None,
    };

    /// Post-warmup draws kept per chain.
    pub fn kept_per_chain(&self) -> usize {
        self.iterations_per_chain.saturating_sub(self.warmup_iterations)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if !(self.credible_level > 0.0 && self.credible_level < 1.0) {
            return Err(ModelError::InvalidSettings(format!(
                "credible level must be in (0, 1), got {}",
                self.credible_level
            )));
        }
        if self.chain_count == 0 {
            return Err(ModelError::InvalidSettings(
                "at least one chain is required".to_string(),
            ));
        }
        if self.warmup_iterations >= self.iterations_per_chain {
            return Err(ModelError::InvalidSettings(format!(
                "warmup ({}) must be smaller than the number of iterations ({})",
                self.warmup_iterations, self.iterations_per_chain
            )));
        }
        Ok(())
    }
}

impl Default for FitSettings {
    fn default() -> Self {
        FitSettings::DEFAULT_SETTINGS
    }
}

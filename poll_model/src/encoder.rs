// Dummy encoding of the categorical poll attributes.

use std::collections::BTreeSet;

use log::debug;

use crate::config::*;

pub const INTERCEPT: &str = "(Intercept)";
pub const RECENT: &str = "recent";

/// The levels of one categorical attribute, as seen in the training data.
///
/// Invariant: the levels are sorted and distinct, and there is at least one.
/// The first level is the reference: it gets no column in the design matrix.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Vocabulary {
    levels: Vec<String>,
}

impl Vocabulary {
    pub fn from_values<'a, I: Iterator<Item = &'a str>>(values: I) -> Option<Vocabulary> {
        let levels: BTreeSet<&str> = values.collect();
        if levels.is_empty() {
            None
        } else {
            Some(Vocabulary {
                levels: levels.into_iter().map(|s| s.to_string()).collect(),
            })
        }
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn reference(&self) -> &str {
        &self.levels[0]
    }

    /// The levels that get their own indicator column.
    pub fn non_reference(&self) -> &[String] {
        &self.levels[1..]
    }

    /// The column offset (within this attribute) of the given value.
    /// `None` for the reference level and for unknown values alike.
    fn column(&self, value: &str) -> Option<usize> {
        match self.levels.binary_search_by(|l| l.as_str().cmp(value)) {
            Ok(0) | Err(_) => None,
            Ok(idx) => Some(idx - 1),
        }
    }

    fn contains(&self, value: &str) -> bool {
        self.levels
            .binary_search_by(|l| l.as_str().cmp(value))
            .is_ok()
    }
}

/// The numeric encoding of one poll: the intercept followed by the pollster
/// indicators, the population indicators and the recency indicator.
#[derive(PartialEq, Debug, Clone)]
pub struct DesignRow(pub Vec<f64>);

/// The categorical values of a row that were not part of the vocabulary.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct UnseenLevels {
    pub pollster: Option<String>,
    pub population: Option<String>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct EncodedRow {
    pub row: DesignRow,
    pub unseen: UnseenLevels,
}

/// Turns polls into design rows, using a vocabulary fixed at training time.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Encoder {
    pollsters: Vocabulary,
    populations: Vocabulary,
    recency: RecencyRule,
}

impl Encoder {
    /// Captures the vocabulary of the training polls.
    pub fn from_training(records: &[PollRecord], recency: RecencyRule) -> Result<Encoder, ModelError> {
        let pollsters = Vocabulary::from_values(records.iter().map(|r| r.pollster.as_str()))
            .ok_or(ModelError::EmptyInput)?;
        let populations = Vocabulary::from_values(records.iter().map(|r| r.population.as_str()))
            .ok_or(ModelError::EmptyInput)?;
        debug!(
            "Encoder: reference pollster {:?} ({} levels), reference population {:?} ({} levels)",
            pollsters.reference(),
            pollsters.levels.len(),
            populations.reference(),
            populations.levels.len()
        );
        Ok(Encoder {
            pollsters,
            populations,
            recency,
        })
    }

    /// Rebuilds an encoder from stored levels. The levels are sorted again,
    /// so the reference is the same as when the model was trained.
    pub fn from_levels(
        pollsters: &[String],
        populations: &[String],
        recency: RecencyRule,
    ) -> Result<Encoder, ModelError> {
        let pollsters = Vocabulary::from_values(pollsters.iter().map(|s| s.as_str()))
            .ok_or_else(|| ModelError::InconsistentModel("no pollster levels".to_string()))?;
        let populations = Vocabulary::from_values(populations.iter().map(|s| s.as_str()))
            .ok_or_else(|| ModelError::InconsistentModel("no population levels".to_string()))?;
        Ok(Encoder {
            pollsters,
            populations,
            recency,
        })
    }

    pub fn pollsters(&self) -> &Vocabulary {
        &self.pollsters
    }

    pub fn populations(&self) -> &Vocabulary {
        &self.populations
    }

    pub fn recency(&self) -> RecencyRule {
        self.recency
    }

    /// The number of columns, intercept included.
    pub fn width(&self) -> usize {
        1 + self.pollsters.non_reference().len() + self.populations.non_reference().len() + 1
    }

    /// The names of the columns, in order.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = vec![INTERCEPT.to_string()];
        names.extend(
            self.pollsters
                .non_reference()
                .iter()
                .map(|l| format!("pollster:{}", l)),
        );
        names.extend(
            self.populations
                .non_reference()
                .iter()
                .map(|l| format!("population:{}", l)),
        );
        names.push(RECENT.to_string());
        names
    }

    /// Encodes a poll. Values outside the vocabulary are encoded as the
    /// reference level and reported in the result.
    pub fn encode(&self, record: &PollRecord) -> EncodedRow {
        let mut row = vec![0.0; self.width()];
        row[0] = 1.0;
        let pollster_offset = 1;
        let population_offset = pollster_offset + self.pollsters.non_reference().len();

        if let Some(c) = self.pollsters.column(&record.pollster) {
            row[pollster_offset + c] = 1.0;
        }
        if let Some(c) = self.populations.column(&record.population) {
            row[population_offset + c] = 1.0;
        }
        if self.recency.is_recent(record.end_date) {
            row[self.width() - 1] = 1.0;
        }

        let unseen = UnseenLevels {
            pollster: Some(&record.pollster)
                .filter(|p| !self.pollsters.contains(p))
                .cloned(),
            population: Some(&record.population)
                .filter(|p| !self.populations.contains(p))
                .cloned(),
        };
        EncodedRow {
            row: DesignRow(row),
            unseen,
        }
    }
}

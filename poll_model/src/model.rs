use crate::config::*;
use crate::encoder::{Encoder, INTERCEPT};

/// A fitted regression, ready to make predictions.
///
/// It is immutable once built: fitting returns a fresh value, and the
/// predictor only borrows it. The training vocabulary travels with the model
/// so that the reference levels never change between training and
/// prediction.
#[derive(PartialEq, Debug, Clone)]
pub struct FittedModel {
    pub(crate) encoder: Encoder,
    pub(crate) coefficients: Vec<ParameterSummary>,
    pub(crate) sigma: ParameterSummary,
    pub(crate) warnings: Vec<FitWarning>,
    pub(crate) settings: FitSettings,
    pub(crate) training_rows: usize,
    pub(crate) training_digest: String,
    pub(crate) truncated: bool,
}

/// The stored parts of a model, as they come back from a file.
#[derive(PartialEq, Debug, Clone)]
pub struct ModelParts {
    pub pollster_levels: Vec<String>,
    pub population_levels: Vec<String>,
    pub recency: RecencyRule,
    pub coefficients: Vec<ParameterSummary>,
    pub sigma: ParameterSummary,
    pub warnings: Vec<FitWarning>,
    pub settings: FitSettings,
    pub training_rows: usize,
    pub training_digest: String,
    pub truncated: bool,
}

impl FittedModel {
    /// Reassembles a model. The coefficients must be named and ordered as
    /// the columns of the encoder rebuilt from the levels.
    pub fn from_parts(parts: ModelParts) -> Result<FittedModel, ModelError> {
        let encoder =
            Encoder::from_levels(&parts.pollster_levels, &parts.population_levels, parts.recency)?;
        let expected = encoder.column_names();
        let found: Vec<String> = parts.coefficients.iter().map(|c| c.name.clone()).collect();
        if expected != found {
            return Err(ModelError::InconsistentModel(format!(
                "coefficients {:?} do not match the vocabulary columns {:?}",
                found, expected
            )));
        }
        Ok(FittedModel {
            encoder,
            coefficients: parts.coefficients,
            sigma: parts.sigma,
            warnings: parts.warnings,
            settings: parts.settings,
            training_rows: parts.training_rows,
            training_digest: parts.training_digest,
            truncated: parts.truncated,
        })
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    /// The coefficients, in design-matrix column order.
    pub fn coefficients(&self) -> &[ParameterSummary] {
        &self.coefficients
    }

    pub fn coefficient(&self, name: &str) -> Option<&ParameterSummary> {
        self.coefficients.iter().find(|c| c.name == name)
    }

    pub fn intercept(&self) -> &ParameterSummary {
        &self.coefficients[0]
    }

    /// The residual scale.
    pub fn sigma(&self) -> &ParameterSummary {
        &self.sigma
    }

    pub fn warnings(&self) -> &[FitWarning] {
        &self.warnings
    }

    pub fn has_converged(&self) -> bool {
        !self
            .warnings
            .iter()
            .any(|w| matches!(w, FitWarning::NonConvergence { .. }))
    }

    pub fn settings(&self) -> &FitSettings {
        &self.settings
    }

    pub fn training_rows(&self) -> usize {
        self.training_rows
    }

    /// SHA-256 of the training rows.
    pub fn training_digest(&self) -> &str {
        &self.training_digest
    }

    /// Whether sampling stopped early because of the time budget.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub(crate) fn point_estimates(&self) -> Vec<f64> {
        self.coefficients.iter().map(|c| c.estimate).collect()
    }

    /// The parts needed to store the model.
    pub fn to_parts(&self) -> ModelParts {
        ModelParts {
            pollster_levels: self.encoder.pollsters().levels().to_vec(),
            population_levels: self.encoder.populations().levels().to_vec(),
            recency: self.encoder.recency(),
            coefficients: self.coefficients.clone(),
            sigma: self.sigma.clone(),
            warnings: self.warnings.clone(),
            settings: self.settings.clone(),
            training_rows: self.training_rows,
            training_digest: self.training_digest.clone(),
            truncated: self.truncated,
        }
    }
}

// Storage of fitted models as JSON.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::forecast::*;

const FORMAT_VERSION: u32 = 1;

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
struct VocabularyJs {
    pollsters: Vec<String>,
    populations: Vec<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
struct RecencyJs {
    #[serde(rename = "referenceDate")]
    reference_date: String,
    #[serde(rename = "windowDays")]
    window_days: u32,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
struct ParameterJs {
    name: String,
    estimate: f64,
    mean: f64,
    sd: f64,
    lower: f64,
    upper: f64,
    // Non-finite values are written as null.
    #[serde(rename = "rHat")]
    r_hat: Option<f64>,
    ess: f64,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
enum WarningJs {
    #[serde(rename = "nonConvergence")]
    NonConvergence {
        parameter: String,
        #[serde(rename = "rHat")]
        r_hat: Option<f64>,
        ess: f64,
    },
    #[serde(rename = "truncated")]
    Truncated {
        #[serde(rename = "keptDraws")]
        kept_draws: usize,
        #[serde(rename = "plannedDraws")]
        planned_draws: usize,
    },
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
struct SettingsJs {
    #[serde(rename = "credibleLevel")]
    credible_level: f64,
    #[serde(rename = "chainCount")]
    chain_count: usize,
    #[serde(rename = "iterationsPerChain")]
    iterations_per_chain: usize,
    #[serde(rename = "warmupIterations")]
    warmup_iterations: usize,
    seed: u64,
    algorithm: String,
    #[serde(rename = "maxWallSeconds")]
    max_wall_seconds: Option<f64>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
struct TrainingJs {
    rows: usize,
    digest: String,
    truncated: bool,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
struct ModelJs {
    version: u32,
    vocabulary: VocabularyJs,
    recency: RecencyJs,
    coefficients: Vec<ParameterJs>,
    sigma: ParameterJs,
    warnings: Vec<WarningJs>,
    settings: SettingsJs,
    training: TrainingJs,
}

fn finite(x: Option<f64>) -> Option<f64> {
    x.filter(|v| v.is_finite())
}

impl From<&ParameterSummary> for ParameterJs {
    fn from(p: &ParameterSummary) -> Self {
        ParameterJs {
            name: p.name.clone(),
            estimate: p.estimate,
            mean: p.mean,
            sd: p.sd,
            lower: p.interval.lower,
            upper: p.interval.upper,
            r_hat: finite(p.diagnostics.r_hat),
            ess: p.diagnostics.ess,
        }
    }
}

impl From<&ParameterJs> for ParameterSummary {
    fn from(p: &ParameterJs) -> Self {
        ParameterSummary {
            name: p.name.clone(),
            estimate: p.estimate,
            mean: p.mean,
            sd: p.sd,
            interval: Interval {
                lower: p.lower,
                upper: p.upper,
            },
            diagnostics: Diagnostics {
                r_hat: p.r_hat,
                ess: p.ess,
            },
        }
    }
}

impl From<&FitWarning> for WarningJs {
    fn from(w: &FitWarning) -> Self {
        match w {
            FitWarning::NonConvergence {
                parameter,
                r_hat,
                ess,
            } => WarningJs::NonConvergence {
                parameter: parameter.clone(),
                r_hat: finite(*r_hat),
                ess: *ess,
            },
            FitWarning::Truncated {
                kept_draws,
                planned_draws,
            } => WarningJs::Truncated {
                kept_draws: *kept_draws,
                planned_draws: *planned_draws,
            },
        }
    }
}

impl From<&WarningJs> for FitWarning {
    fn from(w: &WarningJs) -> Self {
        match w {
            WarningJs::NonConvergence {
                parameter,
                r_hat,
                ess,
            } => FitWarning::NonConvergence {
                parameter: parameter.clone(),
                r_hat: *r_hat,
                ess: *ess,
            },
            WarningJs::Truncated {
                kept_draws,
                planned_draws,
            } => FitWarning::Truncated {
                kept_draws: *kept_draws,
                planned_draws: *planned_draws,
            },
        }
    }
}

fn algorithm_name(a: FitAlgorithm) -> &'static str {
    match a {
        FitAlgorithm::Sampling => "sampling",
        FitAlgorithm::Optimizing => "optimizing",
    }
}

fn model_to_js(model: &FittedModel) -> ModelJs {
    let parts = model.to_parts();
    let s = &parts.settings;
    ModelJs {
        version: FORMAT_VERSION,
        vocabulary: VocabularyJs {
            pollsters: parts.pollster_levels.clone(),
            populations: parts.population_levels.clone(),
        },
        recency: RecencyJs {
            reference_date: parts.recency.reference_date.format("%Y-%m-%d").to_string(),
            window_days: parts.recency.window_days,
        },
        coefficients: parts.coefficients.iter().map(ParameterJs::from).collect(),
        sigma: ParameterJs::from(&parts.sigma),
        warnings: parts.warnings.iter().map(WarningJs::from).collect(),
        settings: SettingsJs {
            credible_level: s.credible_level,
            chain_count: s.chain_count,
            iterations_per_chain: s.iterations_per_chain,
            warmup_iterations: s.warmup_iterations,
            seed: s.seed,
            algorithm: algorithm_name(s.algorithm).to_string(),
            max_wall_seconds: s.max_wall_time.map(|d| d.as_secs_f64()),
        },
        training: TrainingJs {
            rows: parts.training_rows,
            digest: parts.training_digest.clone(),
            truncated: parts.truncated,
        },
    }
}

fn model_from_js(js: &ModelJs) -> FResult<FittedModel> {
    if js.version != FORMAT_VERSION {
        whatever!(
            "Unsupported model format version {} (expected {})",
            js.version,
            FORMAT_VERSION
        );
    }
    let reference_date = match parse_date(&js.recency.reference_date) {
        Some(d) => d,
        None => InvalidDateSnafu {
            field: "recency.referenceDate",
            value: js.recency.reference_date.clone(),
        }
        .fail()?,
    };
    let algorithm = match js.settings.algorithm.as_str() {
        "sampling" => FitAlgorithm::Sampling,
        "optimizing" => FitAlgorithm::Optimizing,
        x => whatever!("Unknown algorithm {:?} in the stored model", x),
    };
    let max_wall_time = match js.settings.max_wall_seconds {
        Some(x) if x.is_finite() && x >= 0.0 => Some(Duration::from_secs_f64(x)),
        Some(x) => whatever!("Invalid maxWallSeconds {} in the stored model", x),
        None => None,
    };
    let parts = ModelParts {
        pollster_levels: js.vocabulary.pollsters.clone(),
        population_levels: js.vocabulary.populations.clone(),
        recency: RecencyRule {
            reference_date,
            window_days: js.recency.window_days,
        },
        coefficients: js.coefficients.iter().map(ParameterSummary::from).collect(),
        sigma: ParameterSummary::from(&js.sigma),
        warnings: js.warnings.iter().map(FitWarning::from).collect(),
        settings: FitSettings {
            credible_level: js.settings.credible_level,
            chain_count: js.settings.chain_count,
            iterations_per_chain: js.settings.iterations_per_chain,
            warmup_iterations: js.settings.warmup_iterations,
            seed: js.settings.seed,
            algorithm,
            max_wall_time,
        },
        training_rows: js.training.rows,
        training_digest: js.training.digest.clone(),
        truncated: js.training.truncated,
    };
    FittedModel::from_parts(parts).context(ModelSnafu {})
}

pub fn model_to_string(model: &FittedModel) -> FResult<String> {
    serde_json::to_string_pretty(&model_to_js(model)).context(WritingJsonSnafu {})
}

pub fn model_from_str(path: &str, contents: &str) -> FResult<FittedModel> {
    let js: ModelJs = serde_json::from_str(contents).context(ParsingJsonSnafu { path })?;
    model_from_js(&js)
}

pub fn write_model(path: &Path, model: &FittedModel) -> BFResult<()> {
    let text = model_to_string(model)?;
    fs::write(path, text).context(OpeningFileSnafu {
        path: path.display().to_string(),
    })?;
    Ok(())
}

pub fn read_model(path: &str) -> BFResult<FittedModel> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let model = model_from_str(path, &contents)?;
    debug!(
        "read_model: {} coefficients, trained on {} rows",
        model.coefficients().len(),
        model.training_rows()
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(name: &str, estimate: f64, r_hat: Option<f64>) -> ParameterSummary {
        ParameterSummary {
            name: name.to_string(),
            estimate,
            mean: estimate + 0.0625,
            sd: 0.375,
            interval: Interval {
                lower: estimate - 0.75,
                upper: estimate + 0.75,
            },
            diagnostics: Diagnostics { r_hat, ess: 812.5 },
        }
    }

    fn model(r_hat: Option<f64>) -> FittedModel {
        FittedModel::from_parts(ModelParts {
            pollster_levels: vec!["Siena".to_string(), "Emerson".to_string()],
            population_levels: vec!["lv".to_string()],
            recency: RecencyRule {
                reference_date: NaiveDate::from_ymd_opt(2024, 10, 30).unwrap(),
                window_days: 21,
            },
            coefficients: vec![
                summary(INTERCEPT, 47.25, r_hat),
                summary("pollster:Siena", 0.875, Some(1.0)),
                summary(RECENT, 1.125, Some(1.0)),
            ],
            sigma: summary(SIGMA, 1.75, Some(1.0)),
            warnings: vec![
                FitWarning::NonConvergence {
                    parameter: INTERCEPT.to_string(),
                    r_hat,
                    ess: 812.5,
                },
                FitWarning::Truncated {
                    kept_draws: 300,
                    planned_draws: 4000,
                },
            ],
            settings: FitSettings {
                max_wall_time: Some(Duration::from_secs(90)),
                algorithm: FitAlgorithm::Optimizing,
                ..FitSettings::DEFAULT_SETTINGS
            },
            training_rows: 42,
            training_digest: "e3b0c442".to_string(),
            truncated: true,
        })
        .unwrap()
    }

    #[test]
    fn json_round_trip() {
        let m = model(Some(1.25));
        let text = model_to_string(&m).unwrap();
        assert!(text.contains("\"referenceDate\": \"2024-10-30\""));
        let back = model_from_str("model.json", &text).unwrap();
        assert_eq!(back, m);
        assert_eq!(back.encoder().pollsters().reference(), "Emerson");
    }

    #[test]
    fn non_finite_r_hat_is_dropped() {
        let m = model(Some(f64::INFINITY));
        let text = model_to_string(&m).unwrap();
        let back = model_from_str("model.json", &text).unwrap();
        assert_eq!(back.intercept().diagnostics.r_hat, None);
    }

    #[test]
    fn rejects_bad_files() {
        let text = model_to_string(&model(Some(1.0))).unwrap();
        let renamed = text.replace("pollster:Siena", "pollster:Marist");
        assert!(matches!(
            model_from_str("model.json", &renamed),
            Err(ForecastError::Model {
                source: ModelError::InconsistentModel(_)
            })
        ));
        assert!(matches!(
            model_from_str("model.json", "{\"version\": 1}"),
            Err(ForecastError::ParsingJson { .. })
        ));
        let future = text.replace("\"version\": 1", "\"version\": 2");
        assert!(model_from_str("model.json", &future).is_err());
    }
}

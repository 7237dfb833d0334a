use crate::args::Args;
use crate::forecast::*;

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    /// csv or xlsx
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
    /// The column holding row identifiers, if any.
    #[serde(rename = "idColumn")]
    pub id_column: Option<String>,
}

impl FileSource {
    pub fn from_path(path: &str, provider: Option<&str>) -> FileSource {
        let provider = provider
            .map(|p| p.to_string())
            .unwrap_or_else(|| guess_provider(path).to_string());
        FileSource {
            provider,
            file_path: path.to_string(),
            excel_worksheet_name: None,
            id_column: None,
        }
    }
}

fn guess_provider(path: &str) -> &'static str {
    if path.to_lowercase().ends_with(".xlsx") {
        "xlsx"
    } else {
        "csv"
    }
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionSources {
    pub national: Option<FileSource>,
    pub state: Option<FileSource>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSettings {
    #[serde(rename = "minGrade")]
    pub min_grade: Option<f64>,
    #[serde(rename = "minDate")]
    pub min_date: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(rename = "recencyWindowDays")]
    pub recency_window_days: Option<u32>,
    #[serde(rename = "referenceDate")]
    pub reference_date: Option<String>,
    #[serde(rename = "credibleLevel")]
    pub credible_level: Option<f64>,
    #[serde(rename = "chainCount")]
    pub chain_count: Option<usize>,
    #[serde(rename = "iterationsPerChain")]
    pub iterations_per_chain: Option<usize>,
    #[serde(rename = "warmupIterations")]
    pub warmup_iterations: Option<usize>,
    pub seed: Option<u64>,
    pub algorithm: Option<String>,
    #[serde(rename = "maxWallSeconds")]
    pub max_wall_seconds: Option<u64>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    #[serde(rename = "modelFile")]
    pub model_file: Option<String>,
    #[serde(rename = "nationalPredictionsFile")]
    pub national_predictions_file: Option<String>,
    #[serde(rename = "statePredictionsFile")]
    pub state_predictions_file: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForecastConfig {
    #[serde(rename = "candidateName")]
    pub candidate_name: Option<String>,
    #[serde(rename = "trainingSource")]
    pub training_source: Option<FileSource>,
    #[serde(rename = "predictionSources", default)]
    pub prediction_sources: PredictionSources,
    #[serde(default)]
    pub filter: FilterSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(rename = "outputSettings", default)]
    pub output_settings: OutputSettings,
}

impl ForecastConfig {
    pub fn output_directory(&self) -> PathBuf {
        PathBuf::from(
            self.output_settings
                .output_directory
                .clone()
                .unwrap_or_else(|| ".".to_string()),
        )
    }

    pub fn model_path(&self) -> PathBuf {
        self.output_directory().join(
            self.output_settings
                .model_file
                .clone()
                .unwrap_or_else(|| "model.json".to_string()),
        )
    }

    pub fn national_predictions_path(&self) -> PathBuf {
        self.output_directory().join(
            self.output_settings
                .national_predictions_file
                .clone()
                .unwrap_or_else(|| "national_predictions.csv".to_string()),
        )
    }

    pub fn state_predictions_path(&self) -> PathBuf {
        self.output_directory().join(
            self.output_settings
                .state_predictions_file
                .clone()
                .unwrap_or_else(|| "state_predictions.csv".to_string()),
        )
    }
}

/// Reads the configuration file. The file paths it contains are resolved
/// against the directory of the file.
pub fn read_config(path: &str) -> BFResult<ForecastConfig> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let mut config: ForecastConfig =
        serde_json::from_str(&contents).context(ParsingJsonSnafu { path })?;
    let root = Path::new(path)
        .parent()
        .context(MissingParentDirSnafu { path })?;
    debug!("read_config: root directory {:?}", root);
    resolve_paths(&mut config, root);
    Ok(config)
}

fn resolve(root: &Path, p: &str) -> String {
    root.join(p).display().to_string()
}

fn resolve_paths(config: &mut ForecastConfig, root: &Path) {
    let sources = [
        config.training_source.as_mut(),
        config.prediction_sources.national.as_mut(),
        config.prediction_sources.state.as_mut(),
    ];
    for source in sources.into_iter().flatten() {
        source.file_path = resolve(root, &source.file_path);
    }
    let out = &mut config.output_settings;
    out.output_directory = Some(resolve(
        root,
        out.output_directory.as_deref().unwrap_or("."),
    ));
}

/// The command line arguments take precedence over the configuration file.
pub fn apply_args(config: &mut ForecastConfig, args: &Args) {
    let provider = args.input_type.as_deref();
    if let Some(p) = &args.input {
        config.training_source = Some(FileSource::from_path(p, provider));
    }
    if let Some(p) = &args.national {
        config.prediction_sources.national = Some(FileSource::from_path(p, None));
    }
    if let Some(p) = &args.state {
        config.prediction_sources.state = Some(FileSource::from_path(p, None));
    }
    if let Some(p) = &args.out {
        config.output_settings.output_directory = Some(p.clone());
    }
    if let Some(c) = &args.candidate {
        config.candidate_name = Some(c.clone());
    }
    if args.min_grade.is_some() {
        config.filter.min_grade = args.min_grade;
    }
    if args.min_date.is_some() {
        config.filter.min_date = args.min_date.clone();
    }
    let m = &mut config.model;
    if args.reference_date.is_some() {
        m.reference_date = args.reference_date.clone();
    }
    if args.recency_window_days.is_some() {
        m.recency_window_days = args.recency_window_days;
    }
    if args.credible_level.is_some() {
        m.credible_level = args.credible_level;
    }
    if args.chains.is_some() {
        m.chain_count = args.chains;
    }
    if args.iterations.is_some() {
        m.iterations_per_chain = args.iterations;
    }
    if args.warmup.is_some() {
        m.warmup_iterations = args.warmup;
    }
    if args.seed.is_some() {
        m.seed = args.seed;
    }
    if args.algorithm.is_some() {
        m.algorithm = args.algorithm.clone();
    }
    if args.max_wall_seconds.is_some() {
        m.max_wall_seconds = args.max_wall_seconds;
    }
}

pub fn read_config_date(field: &str, value: &Option<String>) -> FResult<Option<NaiveDate>> {
    match value {
        None => Ok(None),
        Some(s) => match parse_date(s) {
            Some(d) => Ok(Some(d)),
            None => InvalidDateSnafu {
                field,
                value: s.clone(),
            }
            .fail(),
        },
    }
}

pub fn validate_filter(config: &ForecastConfig) -> FResult<PollFilter> {
    let candidate_name = match &config.candidate_name {
        Some(c) if !c.trim().is_empty() => c.clone(),
        _ => whatever!("candidateName is required (or --candidate)"),
    };
    let min_grade = match config.filter.min_grade {
        Some(g) if g.is_finite() => g,
        x => whatever!("minGrade is required and must be a number (or --min-grade), got {:?}", x),
    };
    Ok(PollFilter {
        candidate_name,
        min_grade,
        min_date: read_config_date("minDate", &config.filter.min_date)?,
    })
}

pub fn validate_settings(model: &ModelSettings) -> FResult<FitSettings> {
    let d = FitSettings::DEFAULT_SETTINGS;
    let res = FitSettings {
        credible_level: model.credible_level.unwrap_or(d.credible_level),
        chain_count: model.chain_count.unwrap_or(d.chain_count),
        iterations_per_chain: model.iterations_per_chain.unwrap_or(d.iterations_per_chain),
        warmup_iterations: model.warmup_iterations.unwrap_or(d.warmup_iterations),
        seed: model.seed.unwrap_or(d.seed),
        algorithm: match model.algorithm.as_deref() {
            None | Some("sampling") => FitAlgorithm::Sampling,
            Some("optimizing") => FitAlgorithm::Optimizing,
            Some(x) => whatever!("Cannot use algorithm {:?}: expected sampling or optimizing", x),
        },
        max_wall_time: model.max_wall_seconds.map(Duration::from_secs),
    };
    res.validate().context(ModelSnafu)?;
    Ok(res)
}

pub fn recency_window(model: &ModelSettings) -> u32 {
    model
        .recency_window_days
        .unwrap_or(RecencyRule::DEFAULT_WINDOW_DAYS)
}

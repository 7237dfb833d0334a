use log::{debug, info, warn};

use poll_model::*;
use snafu::{prelude::*, Snafu};

use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

use text_diff::print_diff;

use crate::args::Args;
use crate::forecast::config_reader::*;
use crate::forecast::io_common::*;

pub mod config_reader;
pub mod io_common;
pub mod io_csv;
pub mod io_excel;
pub mod model_io;

#[derive(Debug, Snafu)]
pub enum ForecastError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("The file {path} has no worksheet to read"))]
    EmptyExcel { path: String },
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error writing JSON"))]
    WritingJson { source: serde_json::Error },
    #[snafu(display("Missing parent directory for {path}"))]
    MissingParentDir { path: String },
    #[snafu(display("Error opening the CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading line {lineno} of {path}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("Error writing the CSV file {path}"))]
    CsvWrite { source: csv::Error, path: String },
    #[snafu(display("The file {path} has no column {column}"))]
    MissingColumn { path: String, column: String },
    #[snafu(display("The identifier {id} appears more than once in {path}"))]
    DuplicateId { path: String, id: String },
    #[snafu(display("Cannot read {value:?} as a date for {field}"))]
    InvalidDate { field: String, value: String },
    #[snafu(display("Unknown input provider {provider:?}: expected csv or xlsx"))]
    UnknownProvider { provider: String },
    #[snafu(display("No training source: set trainingSource or --input"))]
    MissingTrainingSource {},
    #[snafu(display("A reference was given but there are no predictions to compare"))]
    NothingToCompare {},
    #[snafu(display("{source}"))]
    Model { source: ModelError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

impl ForecastError {
    /// No poll was left to fit on. This is a normal outcome of a strict
    /// filter rather than a failure of the program.
    pub fn is_empty_input(&self) -> bool {
        matches!(
            self,
            ForecastError::Model {
                source: ModelError::EmptyInput
            }
        )
    }
}

pub type FResult<T> = Result<T, ForecastError>;
pub type BFResult<T> = Result<T, Box<ForecastError>>;

/// Reads a table of polls, whatever its format.
pub fn read_table(source: &FileSource) -> BFResult<PollTable> {
    info!(
        "read_table: reading {} file {}",
        source.provider, source.file_path
    );
    let table = match source.provider.as_str() {
        "csv" => io_csv::read_csv_table(&source.file_path)?,
        "xlsx" => io_excel::read_excel_table(
            &source.file_path,
            source.excel_worksheet_name.as_deref(),
        )?,
        x => UnknownProviderSnafu { provider: x }.fail()?,
    };
    debug!(
        "read_table: {} rows, columns {:?}",
        table.rows.len(),
        table.headers
    );
    Ok(table)
}

/// Reads and validates the polls of a source.
fn read_polls(source: &FileSource) -> BFResult<(PollTable, Vec<PollRecord>)> {
    let mut table = read_table(source)?;
    let raw = table.raw_polls(source.id_column.as_deref())?;
    let validated = validate_polls(&raw);
    report_exclusions(&source.file_path, &validated.exclusions);
    Ok((table, validated.records))
}

fn report_exclusions(path: &str, exclusions: &[Exclusion]) {
    if exclusions.is_empty() {
        return;
    }
    for (reason, count) in count_exclusions(exclusions) {
        warn!("{}: {} rows left out: {}", path, count, reason);
    }
    debug!("{}: excluded rows {:?}", path, exclusions);
}

fn report_fit(model: &FittedModel) {
    info!(
        "Fitted on {} polls (digest {}), converged: {}, truncated: {}",
        model.training_rows(),
        model.training_digest(),
        model.has_converged(),
        model.truncated()
    );
    debug!("intercept: {:?}", model.intercept());
}

fn report_predictions(label: &str, batch: &PredictionBatch) {
    info!(
        "{}: {} predictions, average {:?}",
        label,
        batch.predictions.len(),
        aggregate::overall(&batch.predictions)
    );
    for s in aggregate::by_state(&batch.predictions) {
        info!(
            "  {:<20} {:>4} polls  {:.2}",
            s.state, s.polls, s.mean_predicted_pct
        );
    }
    if !batch.unseen.is_empty() {
        warn!(
            "{}: {} rows with levels unknown to the model: pollsters {:?} populations {:?}",
            label,
            batch.unseen.total(),
            batch.unseen.pollsters,
            batch.unseen.populations
        );
    }
}

/// Filters and fits, or loads a stored model.
fn obtain_model(config: &ForecastConfig, args: &Args) -> BFResult<FittedModel> {
    if let Some(p) = &args.model_in {
        let model = model_io::read_model(p)?;
        info!("Using the stored model {}", p);
        return Ok(model);
    }
    let filter = validate_filter(config)?;
    let settings = validate_settings(&config.model)?;
    let reference_date = read_config_date("referenceDate", &config.model.reference_date)?;
    let source = config
        .training_source
        .as_ref()
        .context(MissingTrainingSourceSnafu {})?;
    let (_, records) = read_polls(source)?;

    let run = match train(
        &records,
        &filter,
        recency_window(&config.model),
        reference_date,
        &settings,
    ) {
        Ok(run) => run,
        Err(ModelError::EmptyInput) => {
            warn!(
                "No poll for {} with a grade of at least {} (minimum date {:?})",
                filter.candidate_name, filter.min_grade, filter.min_date
            );
            return Err(Box::new(ForecastError::Model {
                source: ModelError::EmptyInput,
            }));
        }
        Err(e) => return Err(Box::new(ForecastError::Model { source: e })),
    };
    let f = &run.filtered;
    info!(
        "Filter: {} selected, {} other candidates, {} below the grade, {} too old",
        f.selected.len(),
        f.other_candidate,
        f.below_grade,
        f.before_min_date
    );
    report_exclusions("training", &f.exclusions);
    report_fit(&run.model);

    let model_path = config.model_path();
    model_io::write_model(&model_path, &run.model)?;
    info!("Model written to {}", model_path.display());
    Ok(run.model)
}

fn read_optional(
    source: &Option<FileSource>,
) -> BFResult<Option<(PollTable, Vec<PollRecord>)>> {
    match source {
        Some(s) => Ok(Some(read_polls(s)?)),
        None => Ok(None),
    }
}

fn predict_optional(
    model: &FittedModel,
    input: &Option<(PollTable, Vec<PollRecord>)>,
) -> Option<PredictionBatch> {
    input.as_ref().map(|(_, records)| predict(model, records))
}

fn write_optional(
    path: &Path,
    input: &Option<(PollTable, Vec<PollRecord>)>,
    batch: &Option<PredictionBatch>,
) -> BFResult<Option<String>> {
    match (input, batch) {
        (Some((table, _)), Some(b)) => {
            let text = io_csv::predictions_to_csv(table, &b.predictions)?;
            fs::write(path, &text).context(OpeningFileSnafu {
                path: path.display().to_string(),
            })?;
            info!("Predictions written to {}", path.display());
            Ok(Some(text))
        }
        _ => Ok(None),
    }
}

/// The whole run: reads the configuration, obtains a model, predicts the
/// national and state polls, and writes everything out.
pub fn run_forecast(args: &Args) -> BFResult<()> {
    let mut config = match &args.config {
        Some(p) => read_config(p)?,
        None => ForecastConfig::default(),
    };
    apply_args(&mut config, args);
    info!("config: {:?}", config);

    let out_dir = config.output_directory();
    fs::create_dir_all(&out_dir).context(OpeningFileSnafu {
        path: out_dir.display().to_string(),
    })?;

    let model = obtain_model(&config, args)?;

    let national = read_optional(&config.prediction_sources.national)?;
    let state = read_optional(&config.prediction_sources.state)?;
    if national.is_none() && state.is_none() {
        info!("No polls to predict");
    }

    // The model is only read: both batches can go at the same time.
    let (national_batch, state_batch) = rayon::join(
        || predict_optional(&model, &national),
        || predict_optional(&model, &state),
    );
    if let Some(b) = &national_batch {
        report_predictions("national", b);
    }
    if let Some(b) = &state_batch {
        report_predictions("state", b);
    }

    let national_csv = write_optional(
        &config.national_predictions_path(),
        &national,
        &national_batch,
    )?;
    let state_csv = write_optional(&config.state_predictions_path(), &state, &state_batch)?;

    // The reference predictions, if provided for comparison
    if let Some(reference_p) = &args.reference {
        let computed = national_csv
            .or(state_csv)
            .context(NothingToCompareSnafu {})?;
        check_reference(reference_p, &computed)?;
    }
    Ok(())
}

fn check_reference(path: &str, computed: &str) -> FResult<()> {
    let reference = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let normalize = |s: &str| s.replace("\r\n", "\n").trim_end().to_string();
    let (reference, computed) = (normalize(&reference), normalize(computed));
    if reference != computed {
        warn!("Found differences with the reference predictions");
        print_diff(reference.as_str(), computed.as_str(), "\n");
        whatever!("Difference detected between computed and reference predictions")
    }
    info!("The predictions match the reference {}", path);
    Ok(())
}

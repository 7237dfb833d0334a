use clap::Parser;

/// This is a poll aggregation and forecasting program.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The JSON configuration of the run. Paths in the configuration are relative to
    /// the directory of this file. The manual of the poll_model crate documents the format.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path, optional) A reference predictions file in CSV format. If provided, pollcast will
    /// check that the national predictions match the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path or empty) The polls to train on. Setting this option overrides the training source
    /// of the configuration.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (default csv) The type of the input: csv or xlsx.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (file path, optional) National polls to predict.
    #[clap(long, value_parser)]
    pub national: Option<String>,

    /// (file path, optional) State polls to predict.
    #[clap(long, value_parser)]
    pub state: Option<String>,

    /// (directory, optional) Where to write the model and the predictions. Overrides the output
    /// directory of the configuration.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path, optional) Use a stored model instead of fitting one.
    #[clap(long, value_parser)]
    pub model_in: Option<String>,

    /// The candidate to forecast.
    #[clap(long, value_parser)]
    pub candidate: Option<String>,

    /// Minimum numeric grade of the pollsters.
    #[clap(long, value_parser)]
    pub min_grade: Option<f64>,

    /// (YYYY-MM-DD) Only use polls ending on or after this date.
    #[clap(long, value_parser)]
    pub min_date: Option<String>,

    /// (YYYY-MM-DD) The date recency is measured from. Defaults to the latest poll.
    #[clap(long, value_parser)]
    pub reference_date: Option<String>,

    /// (default 30) Polls ending at most this many days before the reference date are recent.
    #[clap(long, value_parser)]
    pub recency_window_days: Option<u32>,

    /// (default 0.95) The level of the credible intervals.
    #[clap(long, value_parser)]
    pub credible_level: Option<f64>,

    /// (default 4) The number of sampling chains.
    #[clap(long, value_parser)]
    pub chains: Option<usize>,

    /// (default 2000) The number of iterations of each chain, warmup included.
    #[clap(long, value_parser)]
    pub iterations: Option<usize>,

    /// (default 1000) The number of warmup iterations of each chain.
    #[clap(long, value_parser)]
    pub warmup: Option<usize>,

    /// The seed of the random number generators.
    #[clap(long, value_parser)]
    pub seed: Option<u64>,

    /// (sampling or optimizing, default sampling) The estimation algorithm.
    #[clap(long, value_parser)]
    pub algorithm: Option<String>,

    /// (seconds, optional) Stop sampling after this time and keep the draws collected so far.
    #[clap(long, value_parser)]
    pub max_wall_seconds: Option<u64>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}

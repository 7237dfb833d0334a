mod args;
mod forecast;

use clap::Parser;
use log::{error, info};
use snafu::ErrorCompat;

use crate::args::Args;

fn main() {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    info!("args: {:?}", args);

    if let Err(e) = forecast::run_forecast(&args) {
        error!("{}", e);
        eprintln!("An error occured {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&*e) {
            eprintln!("trace: {}", bt);
        }
        // An empty selection is distinguished from other failures.
        let code = if e.is_empty_input() { 2 } else { 1 };
        std::process::exit(code);
    }
}

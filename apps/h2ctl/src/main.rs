use h2ctl::cli::Cli;
use h2ctl::logger::initialize as LoggerInitialize;

use std::process::ExitCode;

use clap::Parser;
use log::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logger FIRST
    if let Err(e) = LoggerInitialize(cli.log_dir.as_deref(), cli.log_level()) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match h2ctl::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

mod args;
mod progress;
mod run;

use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;
use pipeline_logging::{pipeline_error, pipeline_warn, LogDestination};
use tokio_util::sync::CancellationToken;

use crate::args::Args;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let destination = if args.log_file.is_some() {
        LogDestination::TerminalAndFile
    } else {
        LogDestination::Terminal
    };
    pipeline_logging::initialize(destination, level, args.log_file.as_deref());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            pipeline_warn!("Interrupt received; finishing the current row");
            on_interrupt.cancel();
        }
    });

    match run::run(&args, cancel).await {
        Ok(session) => {
            if let Some(report) = &session.report {
                println!("{}", report.summary);
            }
            if let Some(verification) = &session.verification {
                println!("{}", verification);
            }
            println!("Outcome log: {}", args.log.display());
            if session.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(err) => {
            pipeline_error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

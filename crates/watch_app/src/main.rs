//! page-watch: periodic change detection for monitored web pages.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use watch_engine::ConfigurationError;
use watch_logging::{watch_error, watch_warn};

mod commands;
mod logging;
mod report;

use logging::LogDestination;

#[derive(Debug, Parser)]
#[command(name = "page-watch")]
#[command(about = "Detect, rank and announce changes on monitored web pages", long_about = None)]
struct Cli {
    /// RON configuration file.
    #[arg(long, global = true, default_value = "page-watch.ron")]
    config: PathBuf,
    /// Where log output goes.
    #[arg(long, global = true, value_enum, default_value_t = LogDestination::Terminal)]
    log: LogDestination,
    /// Log file used by `--log file` and `--log both`.
    #[arg(long, global = true, default_value = "page-watch.log")]
    log_file: PathBuf,
    /// Enable debug logging.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one cycle for every configured target and print a JSON report
    Run(commands::RunArgs),
    /// Print stored snapshot state as JSON
    Show(commands::ShowArgs),
    /// Validate the configuration file
    Check,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    watch_warn!("interrupt received; cancelling running cycles");
                    on_signal.cancel();
                }
            });
            let report = commands::run(&cli.config, args, cancel).await?;
            print_json(&report)
        }
        Commands::Show(args) => print_json(&commands::show(&cli.config, args)?),
        Commands::Check => commands::check(&cli.config),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let destination = cli.log;
    logging::initialize(destination, cli.verbose, &cli.log_file);

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            watch_error!("{:#}", err);
            if destination == LogDestination::File {
                eprintln!("Error: {:#}", err);
            }
            if err.downcast_ref::<ConfigurationError>().is_some() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

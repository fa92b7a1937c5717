mod config;
mod telemetry;

use clap::{Parser, Subcommand};
use config::{Config, ConfigError};
use endpoint_sync::{Batch, BatchError, EndpointSyncError};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use telemetry::TelemetryError;

#[derive(Parser)]
#[command(name = "communications-manager", version)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve batch intake and the admin probes
    Run {
        #[arg(long)]
        config: PathBuf,
    },
    /// Process a single batch envelope and print its report
    Process {
        #[arg(long)]
        config: PathBuf,
        /// Envelope file, read from stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    EndpointSync(#[from] EndpointSyncError),
    #[error("could not read batch input: {0}")]
    Input(#[source] std::io::Error),
    #[error("invalid batch envelope: {0}")]
    InvalidBatch(#[from] serde_json::Error),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("could not start runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli_main(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn cli_main(command: CliCommand) -> Result<(), CliError> {
    let config_path = match &command {
        CliCommand::Run { config } | CliCommand::Process { config, .. } => config,
    };
    let config = Config::from_file(config_path)?;

    let _sentry_guard = telemetry::init_tracing(config.logging.as_ref());
    if let Some(metrics) = &config.metrics {
        telemetry::init_metrics(metrics)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    match command {
        CliCommand::Run { .. } => {
            tracing::info!("Starting endpoint sync");
            runtime.block_on(endpoint_sync::run(config.endpoint_sync))?;
            Ok(())
        }
        CliCommand::Process { input, .. } => {
            let bytes = read_input(input.as_deref()).map_err(CliError::Input)?;
            let batch = Batch::from_json(&bytes)?;
            let processor = endpoint_sync::build_processor(&config.endpoint_sync)?;

            let report = runtime.block_on(processor.process(batch))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn read_input(path: Option<&Path>) -> std::io::Result<Vec<u8>> {
    match path {
        Some(path) => std::fs::read(path),
        None => {
            let mut bytes = Vec::new();
            std::io::stdin().read_to_end(&mut bytes)?;
            Ok(bytes)
        }
    }
}

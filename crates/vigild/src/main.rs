//! vigild - Vigil monitoring daemon
//!
//! Runs the sampling and alerting daemon, or operates on the alert
//! snapshot and sample logs it writes.

use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use vigild::commands::{AlertCommand, StatusCommand, SummaryCommand, TestCommand};
use vigild::{Cli, Commands, Daemon, OutputFormat, VigilConfig};

const DEFAULT_LOG_DIRECTIVE: &str = "vigild=info,vigil_alerts=info,vigil_metrics=info";

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(io::stderr)).init();
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = OutputFormat::new(cli.format);

    if let Commands::InitConfig { output } = &cli.command {
        return init_config(output);
    }

    let config = VigilConfig::load(cli.config.as_deref())?;
    if matches!(cli.command, Commands::Run) {
        // Channels print to stdout from worker threads, so it stays unlocked.
        return run_daemon(config).await;
    }

    let mut stdout = io::stdout().lock();
    match cli.command {
        Commands::Status => StatusCommand::new(&config).execute(&mut stdout, &format)?,
        Commands::List { severity, limit } => {
            AlertCommand::new(&config.alerting.snapshot_path).list(&mut stdout, &format, severity, limit)?;
        }
        Commands::Ack { id } => {
            AlertCommand::new(&config.alerting.snapshot_path).acknowledge(&mut stdout, &format, &id)?;
        }
        Commands::Resolve { id } => {
            AlertCommand::new(&config.alerting.snapshot_path).resolve(&mut stdout, &format, &id)?;
        }
        Commands::Test { metrics } => {
            TestCommand::new(&config).execute(&mut stdout, &format, &metrics).await?;
        }
        Commands::Summary { file } => {
            SummaryCommand::new(&config.sampling.output_dir).execute(
                &mut stdout,
                &format,
                file.as_deref(),
            )?;
        }
        Commands::Run | Commands::InitConfig { .. } => {}
    }

    Ok(())
}

async fn run_daemon(config: VigilConfig) -> anyhow::Result<()> {
    let daemon = Arc::new(Daemon::new(config)?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = {
        let daemon = Arc::clone(&daemon);
        tokio::spawn(async move { daemon.run(shutdown_rx).await })
    };

    tokio::signal::ctrl_c().await?;
    info!("received SIGINT, initiating shutdown");
    let _ = shutdown_tx.send(true);

    if let Err(e) = runner.await {
        error!(error = %e, "daemon task failed");
        anyhow::bail!("daemon task failed: {e}");
    }
    Ok(())
}

fn init_config(output: &Path) -> anyhow::Result<()> {
    VigilConfig::sample().save(output)?;
    println!("Config written to {}", output.display());
    Ok(())
}

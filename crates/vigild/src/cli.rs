//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use vigil_alerts::AlertSeverity;

/// Vigil - host telemetry sampling and rule-based alerting.
#[derive(Parser, Debug, Clone)]
#[command(name = "vigild")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "VIGIL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table, global = true)]
    pub format: Format,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the sampling and alerting daemon until interrupted.
    Run,

    /// Show alert counts from the latest snapshot.
    Status,

    /// List recent alerts.
    List {
        /// Only alerts of this severity.
        #[arg(short, long, value_parser = parse_severity)]
        severity: Option<AlertSeverity>,

        /// Maximum number of alerts to show.
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Acknowledge an alert.
    Ack {
        /// Alert ID.
        id: String,
    },

    /// Mark an alert resolved.
    Resolve {
        /// Alert ID.
        id: String,
    },

    /// Evaluate the rules against synthetic metrics and dispatch the
    /// resulting alerts.
    Test {
        /// Override or add a metric, as `key=value`.
        #[arg(short, long = "metric", value_parser = parse_metric)]
        metrics: Vec<(String, f64)>,
    },

    /// Summarize a sample log file.
    Summary {
        /// Log file to read. Defaults to the newest file in the output directory.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Write a sample configuration file.
    InitConfig {
        /// Output path.
        #[arg(short, long, default_value = "vigil.toml")]
        output: PathBuf,
    },
}

fn parse_severity(s: &str) -> Result<AlertSeverity, String> {
    s.parse().map_err(|e: vigil_alerts::AlertError| e.to_string())
}

fn parse_metric(s: &str) -> Result<(String, f64), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("metric key cannot be empty".to_string());
    }
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid value for '{key}': {e}"))?;
    Ok((key.to_string(), value))
}

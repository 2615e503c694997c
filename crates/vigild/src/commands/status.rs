//! Status command implementation.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use vigil_alerts::{AlertSeverity, AlertSnapshot, SeverityCounts};
use vigil_metrics::SampleLog;

use crate::config::VigilConfig;
use crate::error::Result;
use crate::output::{OutputFormat, TableDisplay};

/// Handler for the status command.
#[derive(Debug, Clone, Copy)]
pub struct StatusCommand<'a> {
    config: &'a VigilConfig,
}

impl<'a> StatusCommand<'a> {
    /// Creates a status handler for `config`.
    #[must_use]
    pub const fn new(config: &'a VigilConfig) -> Self {
        Self { config }
    }

    /// Gathers the status report.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules fail to compile or an existing
    /// snapshot cannot be read.
    pub fn report(&self) -> Result<StatusReport> {
        let config = self.config;
        let path = &config.alerting.snapshot_path;
        let snapshot = if path.exists() {
            Some(AlertSnapshot::read(path)?)
        } else {
            None
        };

        let mut report = StatusReport {
            host: config.host(),
            rules: config.compile_rules()?.len(),
            channels: enabled_channels(config),
            snapshot_path: path.display().to_string(),
            snapshot_taken_at: snapshot.as_ref().map(|s| s.timestamp),
            total: 0,
            open: 0,
            acknowledged: 0,
            resolved: 0,
            by_severity: SeverityCounts::default(),
            sample_files: SampleLog::list_files(&config.sampling.output_dir)
                .map(|files| files.len())
                .unwrap_or(0),
        };

        for alert in snapshot.iter().flat_map(|s| &s.alerts) {
            report.total += 1;
            if alert.resolved {
                report.resolved += 1;
            } else if alert.acknowledged {
                report.acknowledged += 1;
            } else {
                report.open += 1;
            }
            match alert.severity {
                AlertSeverity::Info => report.by_severity.info += 1,
                AlertSeverity::Warning => report.by_severity.warning += 1,
                AlertSeverity::Critical => report.by_severity.critical += 1,
            }
        }

        Ok(report)
    }

    /// Writes the status report.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be gathered or written.
    pub fn execute<W: Write>(&self, out: &mut W, format: &OutputFormat) -> Result<()> {
        format.write(out, &self.report()?)
    }
}

fn enabled_channels(config: &VigilConfig) -> Vec<String> {
    let n = &config.notifications;
    [
        ("console", n.console.enabled),
        ("email", n.email.enabled),
        ("chat", n.chat.enabled),
    ]
    .into_iter()
    .filter(|(_, enabled)| *enabled)
    .map(|(name, _)| name.to_string())
    .collect()
}

/// Daemon status as seen from the snapshot and configuration.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Host identifier.
    pub host: String,
    /// Number of configured rules.
    pub rules: usize,
    /// Enabled notification channels.
    pub channels: Vec<String>,
    /// Alert snapshot location.
    pub snapshot_path: String,
    /// When the snapshot was written, if one exists.
    pub snapshot_taken_at: Option<DateTime<Utc>>,
    /// Alerts in the snapshot.
    pub total: usize,
    /// Alerts neither acknowledged nor resolved.
    pub open: usize,
    /// Acknowledged but unresolved alerts.
    pub acknowledged: usize,
    /// Resolved alerts.
    pub resolved: usize,
    /// Alert counts per severity.
    pub by_severity: SeverityCounts,
    /// Sample log files on disk.
    pub sample_files: usize,
}

impl TableDisplay for StatusReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<()> {
        writeln!(writer, "Vigil Status")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Host:             {}", self.host)?;
        writeln!(writer, "Rules:            {}", self.rules)?;
        writeln!(writer, "Channels:         {}", self.channels.join(", "))?;
        writeln!(writer, "Sample files:     {}", self.sample_files)?;
        writeln!(writer)?;
        writeln!(writer, "Snapshot")?;
        writeln!(writer, "  Path:           {}", self.snapshot_path)?;
        match self.snapshot_taken_at {
            Some(at) => writeln!(writer, "  Written:        {}", at.format("%Y-%m-%d %H:%M:%S UTC"))?,
            None => writeln!(writer, "  Written:        never")?,
        }
        writeln!(writer)?;
        writeln!(writer, "Alerts")?;
        writeln!(writer, "  Total:          {}", self.total)?;
        writeln!(writer, "  Open:           {}", self.open)?;
        writeln!(writer, "  Acknowledged:   {}", self.acknowledged)?;
        writeln!(writer, "  Resolved:       {}", self.resolved)?;
        writeln!(writer)?;
        writeln!(writer, "By Severity")?;
        for severity in AlertSeverity::ALL {
            writeln!(
                writer,
                "  {:<16}{}",
                format!("{}:", severity.as_str()),
                self.by_severity.get(severity)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;
    use tempfile::TempDir;
    use vigil_alerts::{Alert, AlertRule, AlertStore, Condition};
    use vigil_metrics::MetricView;

    fn config_in(dir: &TempDir) -> VigilConfig {
        let mut config = VigilConfig::default();
        config.host = Some("node-1".to_string());
        config.sampling.output_dir = dir.path().join("samples");
        config.alerting.snapshot_path = dir.path().join("alerts.json");
        config
    }

    fn alert(name: &str, severity: AlertSeverity) -> Alert {
        let rule = AlertRule::builder(name, Condition::parse("true").unwrap())
            .severity(severity)
            .build()
            .unwrap();
        Alert::from_rule(&rule, &MetricView::default(), Utc::now())
    }

    #[test]
    fn status_without_snapshot() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let report = StatusCommand::new(&config).report().unwrap();
        assert_eq!(report.host, "node-1");
        assert_eq!(report.rules, 10);
        assert_eq!(report.channels, vec!["console".to_string()]);
        assert!(report.snapshot_taken_at.is_none());
        assert_eq!(report.total, 0);
        assert_eq!(report.sample_files, 0);
    }

    #[test]
    fn status_counts_states_and_severities() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let store = AlertStore::default();
        let acked = alert("a", AlertSeverity::Warning);
        let resolved = alert("b", AlertSeverity::Critical);
        let (acked_id, resolved_id) = (acked.id.clone(), resolved.id.clone());
        store.extend([acked, resolved, alert("c", AlertSeverity::Warning)]);
        store.acknowledge(&acked_id);
        store.resolve(&resolved_id);
        store.persist(&config.alerting.snapshot_path, Utc::now()).unwrap();

        let report = StatusCommand::new(&config).report().unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.open, 1);
        assert_eq!(report.acknowledged, 1);
        assert_eq!(report.resolved, 1);
        assert_eq!(report.by_severity.warning, 2);
        assert_eq!(report.by_severity.critical, 1);
        assert!(report.snapshot_taken_at.is_some());
    }

    #[test]
    fn status_table_output() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let mut out = Vec::new();
        StatusCommand::new(&config)
            .execute(&mut out, &OutputFormat::new(Format::Table))
            .unwrap();
        let output = String::from_utf8(out).unwrap();

        assert!(output.contains("Vigil Status"));
        assert!(output.contains("Written:        never"));
        assert!(output.contains("critical:"));
    }
}

//! Alert listing, acknowledgement, and resolution.
//!
//! These commands work on the alert snapshot file, so they run alongside a
//! live daemon. The daemon merges the flags written here into its own next
//! snapshot.

use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use vigil_alerts::{Alert, AlertQuery, AlertSeverity, AlertStore};

use crate::error::{DaemonError, Result};
use crate::output::{OperationResponse, OutputFormat, TableDisplay, truncate};

/// Loads the alert snapshot at `path` into a store.
///
/// A missing file yields an empty store.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn load_store(path: &Path) -> Result<AlertStore> {
    let store = AlertStore::default();
    store.restore(path)?;
    Ok(store)
}

/// Handler for alert commands.
#[derive(Debug, Clone, Copy)]
pub struct AlertCommand<'a> {
    snapshot_path: &'a Path,
}

impl<'a> AlertCommand<'a> {
    /// Creates a handler for the snapshot at `snapshot_path`.
    #[must_use]
    pub const fn new(snapshot_path: &'a Path) -> Self {
        Self { snapshot_path }
    }

    /// Lists the newest alerts, optionally of one severity.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or output fails.
    pub fn list<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        severity: Option<AlertSeverity>,
        limit: usize,
    ) -> Result<()> {
        let store = load_store(self.snapshot_path)?;
        let mut query = AlertQuery::new();
        if let Some(severity) = severity {
            query = query.severity(severity);
        }
        let list = AlertList {
            alerts: store.recent(&query, limit),
        };
        format.write(out, &list)
    }

    /// Marks an alert acknowledged.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::AlertNotFound` if no alert has this id.
    pub fn acknowledge<W: Write>(&self, out: &mut W, format: &OutputFormat, id: &str) -> Result<()> {
        self.update(out, format, id, "acknowledged", AlertStore::acknowledge)
    }

    /// Marks an alert resolved.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::AlertNotFound` if no alert has this id.
    pub fn resolve<W: Write>(&self, out: &mut W, format: &OutputFormat, id: &str) -> Result<()> {
        self.update(out, format, id, "resolved", AlertStore::resolve)
    }

    fn update<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        id: &str,
        verb: &str,
        apply: fn(&AlertStore, &str) -> bool,
    ) -> Result<()> {
        let store = load_store(self.snapshot_path)?;
        if !apply(&store, id) {
            return Err(DaemonError::AlertNotFound(id.to_string()));
        }
        store.persist(self.snapshot_path, Utc::now())?;

        let response = OperationResponse {
            success: true,
            message: format!("Alert '{id}' {verb}"),
        };
        format.write(out, &response)
    }
}

/// List of alerts, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct AlertList {
    /// Alerts.
    pub alerts: Vec<Alert>,
}

fn state(alert: &Alert) -> &'static str {
    if alert.resolved {
        "resolved"
    } else if alert.acknowledged {
        "acked"
    } else {
        "open"
    }
}

impl TableDisplay for AlertList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<()> {
        if self.alerts.is_empty() {
            writeln!(writer, "No alerts found")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<40}  {:<9}  {:<9}  {:<20}  RULE",
            "ID", "SEVERITY", "STATE", "RAISED"
        )?;
        writeln!(writer, "{}", "─".repeat(110))?;

        for alert in &self.alerts {
            writeln!(
                writer,
                "{:<40}  {:<9}  {:<9}  {:<20}  {}",
                truncate(&alert.id, 40),
                alert.severity.as_str(),
                state(alert),
                alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
                alert.rule_name
            )?;
        }

        let open = self.alerts.iter().filter(|a| a.is_open()).count();
        writeln!(writer)?;
        writeln!(
            writer,
            "Total: {} alert(s) ({} open)",
            self.alerts.len(),
            open
        )?;
        Ok(())
    }
}

//! Alert history with retention and durable snapshots.
//!
//! The [`AlertStore`] keeps every alert behind one mutex, so a reader never
//! observes a partially evicted list. Snapshots are written to a temporary
//! file and renamed over the previous one.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::types::{Alert, AlertSeverity};

/// The on-disk snapshot document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSnapshot {
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Every alert held at that time, oldest first.
    pub alerts: Vec<Alert>,
}

impl AlertSnapshot {
    /// Reads a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Alert counts per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    /// Informational alerts.
    pub info: usize,
    /// Warnings.
    pub warning: usize,
    /// Critical alerts.
    pub critical: usize,
}

impl SeverityCounts {
    /// Returns the count for one severity.
    #[must_use]
    pub const fn get(&self, severity: AlertSeverity) -> usize {
        match severity {
            AlertSeverity::Info => self.info,
            AlertSeverity::Warning => self.warning,
            AlertSeverity::Critical => self.critical,
        }
    }

    /// Returns the total across severities.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.info + self.warning + self.critical
    }
}

/// Filters for [`AlertStore::query`]. Time bounds are inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertQuery {
    /// Only alerts of this severity.
    pub severity: Option<AlertSeverity>,
    /// Only alerts raised at or after this time.
    pub start: Option<DateTime<Utc>>,
    /// Only alerts raised at or before this time.
    pub end: Option<DateTime<Utc>>,
}

impl AlertQuery {
    /// Creates a query that matches everything.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            severity: None,
            start: None,
            end: None,
        }
    }

    /// Restricts to one severity.
    #[must_use]
    pub const fn severity(mut self, severity: AlertSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Sets the inclusive lower time bound.
    #[must_use]
    pub const fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Sets the inclusive upper time bound.
    #[must_use]
    pub const fn end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    fn matches(&self, alert: &Alert) -> bool {
        self.severity.is_none_or(|s| alert.severity == s)
            && self.start.is_none_or(|start| alert.timestamp >= start)
            && self.end.is_none_or(|end| alert.timestamp <= end)
    }
}

/// The alert history.
#[derive(Debug)]
pub struct AlertStore {
    alerts: Mutex<Vec<Alert>>,
    retention_days: u32,
    max_alerts: usize,
}

impl AlertStore {
    /// Creates an empty store.
    #[must_use]
    pub const fn new(retention_days: u32, max_alerts: usize) -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            retention_days,
            max_alerts,
        }
    }

    /// Returns the retention window in days.
    #[must_use]
    pub const fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// Returns the maximum number of alerts kept by [`AlertStore::cleanup`].
    #[must_use]
    pub const fn max_alerts(&self) -> usize {
        self.max_alerts
    }

    /// Appends an alert.
    pub fn append(&self, alert: Alert) {
        self.alerts.lock().push(alert);
    }

    /// Appends several alerts in order.
    pub fn extend(&self, alerts: impl IntoIterator<Item = Alert>) {
        self.alerts.lock().extend(alerts);
    }

    /// Marks an alert acknowledged. Returns `false` if the id is unknown.
    pub fn acknowledge(&self, id: &str) -> bool {
        self.update(id, |alert| alert.acknowledged = true)
    }

    /// Marks an alert resolved. Returns `false` if the id is unknown.
    pub fn resolve(&self, id: &str) -> bool {
        self.update(id, |alert| alert.resolved = true)
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut Alert)) -> bool {
        let mut alerts = self.alerts.lock();
        match alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                f(alert);
                true
            }
            None => false,
        }
    }

    /// Gets an alert by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Alert> {
        self.alerts.lock().iter().find(|a| a.id == id).cloned()
    }

    /// Returns the alerts matching `query`, oldest first.
    #[must_use]
    pub fn query(&self, query: &AlertQuery) -> Vec<Alert> {
        self.alerts
            .lock()
            .iter()
            .filter(|a| query.matches(a))
            .cloned()
            .collect()
    }

    /// Returns the newest `limit` alerts matching `query`, newest first.
    #[must_use]
    pub fn recent(&self, query: &AlertQuery, limit: usize) -> Vec<Alert> {
        let mut matched = self.query(query);
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched.truncate(limit);
        matched
    }

    /// Returns every alert, oldest first.
    #[must_use]
    pub fn all(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }

    /// Returns the number of stored alerts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    /// Returns true if no alerts are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }

    /// Counts alerts per severity.
    #[must_use]
    pub fn counts_by_severity(&self) -> SeverityCounts {
        let mut counts = SeverityCounts::default();
        for alert in self.alerts.lock().iter() {
            match alert.severity {
                AlertSeverity::Info => counts.info += 1,
                AlertSeverity::Warning => counts.warning += 1,
                AlertSeverity::Critical => counts.critical += 1,
            }
        }
        counts
    }

    /// Returns the number of alerts neither acknowledged nor resolved.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.alerts.lock().iter().filter(|a| a.is_open()).count()
    }

    /// Drops alerts older than the retention window, then keeps only the
    /// `max_alerts` most recent. Returns how many were removed.
    ///
    /// A retention window reaching past the earliest representable time
    /// keeps every alert.
    pub fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let cutoff = ChronoDuration::try_days(i64::from(self.retention_days))
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut alerts = self.alerts.lock();
        let before = alerts.len();

        alerts.retain(|a| a.timestamp > cutoff);
        alerts.sort_by_key(|a| a.timestamp);
        if alerts.len() > self.max_alerts {
            let excess = alerts.len() - self.max_alerts;
            alerts.drain(..excess);
        }

        let removed = before - alerts.len();
        drop(alerts);

        if removed > 0 {
            info!(removed, retention_days = self.retention_days, "cleaned up old alerts");
        }
        removed
    }

    /// Takes a snapshot of the current list.
    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> AlertSnapshot {
        AlertSnapshot {
            timestamp: now,
            alerts: self.all(),
        }
    }

    /// Writes a snapshot to `path`, replacing any previous one atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem step fails.
    pub fn persist(&self, path: &Path, now: DateTime<Utc>) -> Result<()> {
        let snapshot = self.snapshot(now);
        let json = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;

        debug!(path = %path.display(), alerts = snapshot.alerts.len(), "alert snapshot written");
        Ok(())
    }

    /// Replaces the current list with the snapshot at `path`.
    ///
    /// A missing file leaves the store unchanged. Returns how many alerts
    /// were loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn restore(&self, path: &Path) -> Result<usize> {
        if !path.exists() {
            return Ok(0);
        }

        let snapshot = AlertSnapshot::read(path)?;
        let loaded = snapshot.alerts.len();
        *self.alerts.lock() = snapshot.alerts;

        info!(path = %path.display(), alerts = loaded, taken_at = %snapshot.timestamp, "restored alert snapshot");
        Ok(loaded)
    }

    /// Copies acknowledged and resolved flags from `snapshot` onto the
    /// alerts with the same id. Flags are only ever set, never cleared.
    /// Returns how many alerts changed.
    pub fn merge_flags(&self, snapshot: &AlertSnapshot) -> usize {
        let mut alerts = self.alerts.lock();
        let mut changed = 0;
        for theirs in &snapshot.alerts {
            if !theirs.acknowledged && !theirs.resolved {
                continue;
            }
            if let Some(ours) = alerts.iter_mut().find(|a| a.id == theirs.id) {
                let before = (ours.acknowledged, ours.resolved);
                ours.acknowledged |= theirs.acknowledged;
                ours.resolved |= theirs.resolved;
                if before != (ours.acknowledged, ours.resolved) {
                    changed += 1;
                }
            }
        }
        changed
    }
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new(30, 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Condition;
    use crate::types::AlertRule;
    use chrono::TimeZone;
    use tempfile::TempDir;
    use vigil_metrics::MetricView;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn alert(name: &str, severity: AlertSeverity, time: DateTime<Utc>) -> Alert {
        let rule = AlertRule::builder(name, Condition::parse("true").unwrap())
            .severity(severity)
            .build()
            .unwrap();
        Alert::from_rule(&rule, &MetricView::default(), time)
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn acknowledge_and_resolve() {
            let store = AlertStore::default();
            let a = alert("cpu", AlertSeverity::Warning, at(0));
            let id = a.id.clone();
            store.append(a);

            assert!(store.acknowledge(&id));
            assert!(store.acknowledge(&id));
            assert!(store.get(&id).unwrap().acknowledged);
            assert!(!store.get(&id).unwrap().resolved);

            assert!(store.resolve(&id));
            assert!(store.resolve(&id));
            assert!(store.get(&id).unwrap().resolved);
            assert_eq!(store.open_count(), 0);
        }

        #[test]
        fn unknown_id_returns_false() {
            let store = AlertStore::default();
            assert!(!store.acknowledge("nope"));
            assert!(!store.resolve("nope"));
        }
    }

    mod query_tests {
        use super::*;

        fn populated() -> AlertStore {
            let store = AlertStore::default();
            store.extend([
                alert("a", AlertSeverity::Info, at(0)),
                alert("b", AlertSeverity::Warning, at(10)),
                alert("c", AlertSeverity::Critical, at(20)),
                alert("d", AlertSeverity::Warning, at(30)),
            ]);
            store
        }

        #[test]
        fn by_severity() {
            let found = populated().query(&AlertQuery::new().severity(AlertSeverity::Warning));
            let names: Vec<_> = found.into_iter().map(|a| a.rule_name).collect();
            assert_eq!(names, vec!["b", "d"]);
        }

        #[test]
        fn time_bounds_are_inclusive() {
            let found = populated().query(&AlertQuery::new().start(at(10)).end(at(20)));
            assert_eq!(found.len(), 2);
        }

        #[test]
        fn recent_is_newest_first() {
            let found = populated().recent(&AlertQuery::new(), 2);
            let names: Vec<_> = found.into_iter().map(|a| a.rule_name).collect();
            assert_eq!(names, vec!["d", "c"]);
        }

        #[test]
        fn severity_counts() {
            let counts = populated().counts_by_severity();
            assert_eq!(counts.info, 1);
            assert_eq!(counts.get(AlertSeverity::Warning), 2);
            assert_eq!(counts.critical, 1);
            assert_eq!(counts.total(), 4);
        }
    }

    mod cleanup_tests {
        use super::*;

        #[test]
        fn keeps_most_recent_max_alerts() {
            let store = AlertStore::new(30, 5);
            for i in 0..8 {
                store.append(alert(&format!("r{i}"), AlertSeverity::Info, at(i)));
            }

            assert_eq!(store.cleanup(at(100)), 3);
            let names: Vec<_> = store.all().into_iter().map(|a| a.rule_name).collect();
            assert_eq!(names, vec!["r3", "r4", "r5", "r6", "r7"]);
        }

        #[test]
        fn drops_alerts_past_retention() {
            let store = AlertStore::new(1, 100);
            let day = 86_400;
            store.extend([
                alert("old", AlertSeverity::Info, at(0)),
                alert("edge", AlertSeverity::Info, at(day)),
                alert("new", AlertSeverity::Info, at(day + 1)),
            ]);

            store.cleanup(at(2 * day));
            let names: Vec<_> = store.all().into_iter().map(|a| a.rule_name).collect();
            assert_eq!(names, vec!["new"]);
        }

        #[test]
        fn cleanup_is_idempotent() {
            let store = AlertStore::new(1, 3);
            for i in 0..6 {
                store.append(alert(&format!("r{i}"), AlertSeverity::Info, at(i * 30_000)));
            }

            store.cleanup(at(200_000));
            let once = store.all();
            assert_eq!(store.cleanup(at(200_000)), 0);
            assert_eq!(store.all(), once);
        }

        #[test]
        fn huge_retention_keeps_everything() {
            let store = AlertStore::new(u32::MAX, 5);
            store.extend([
                alert("a", AlertSeverity::Info, at(0)),
                alert("b", AlertSeverity::Info, at(10)),
            ]);

            assert_eq!(store.cleanup(Utc::now()), 0);
            assert_eq!(store.len(), 2);
        }
    }

    mod snapshot_tests {
        use super::*;

        #[test]
        fn persist_and_restore() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("state").join("alerts.json");

            let store = AlertStore::default();
            let a = alert("cpu", AlertSeverity::Critical, at(0));
            let id = a.id.clone();
            store.append(a);
            store.acknowledge(&id);
            store.persist(&path, at(5)).unwrap();

            let raw: serde_json::Value =
                serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
            assert!(raw.get("timestamp").is_some());
            assert_eq!(raw["alerts"].as_array().unwrap().len(), 1);

            let restored = AlertStore::default();
            assert_eq!(restored.restore(&path).unwrap(), 1);
            assert!(restored.get(&id).unwrap().acknowledged);
        }

        #[test]
        fn persist_overwrites_and_leaves_no_temp_file() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("alerts.json");
            let store = AlertStore::default();

            store.persist(&path, at(0)).unwrap();
            store.append(alert("cpu", AlertSeverity::Info, at(1)));
            store.persist(&path, at(2)).unwrap();

            let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
            assert_eq!(files.len(), 1);

            let restored = AlertStore::default();
            assert_eq!(restored.restore(&path).unwrap(), 1);
        }

        #[test]
        fn merge_flags_only_sets() {
            let store = AlertStore::default();
            let a = alert("cpu", AlertSeverity::Warning, at(0));
            let b = alert("mem", AlertSeverity::Warning, at(1));
            let (a_id, b_id) = (a.id.clone(), b.id.clone());
            store.extend([a, b]);
            store.resolve(&b_id);

            let mut on_disk = store.snapshot(at(2));
            on_disk.alerts[0].acknowledged = true;
            on_disk.alerts[1].resolved = false;

            assert_eq!(store.merge_flags(&on_disk), 1);
            assert!(store.get(&a_id).unwrap().acknowledged);
            assert!(store.get(&b_id).unwrap().resolved);
        }

        #[test]
        fn restore_missing_file_is_empty() {
            let dir = TempDir::new().unwrap();
            let store = AlertStore::default();
            assert_eq!(store.restore(&dir.path().join("none.json")).unwrap(), 0);
        }

        #[test]
        fn restore_corrupt_file_fails() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("alerts.json");
            fs::write(&path, "{not json").unwrap();
            assert!(AlertStore::default().restore(&path).is_err());
        }
    }
}

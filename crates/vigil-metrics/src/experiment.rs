//! Measurement recording for benchmark experiments.
//!
//! An [`ExperimentRun`] collects named [`MeasurementPoint`]s while an
//! experiment runs, then reduces them to per-measurement statistics.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use vigil_stats::Summary;

use crate::clock::{MonotonicTimer, ns_to_secs};
use crate::error::{MetricsError, Result};

/// One recorded measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementPoint {
    /// Measurement name, e.g. `ssh_connection_time_ms`.
    pub name: String,
    /// Measured value.
    pub value: f64,
    /// Unit of `value`.
    pub unit: String,
    /// Monotonic nanoseconds since the experiment started.
    pub timestamp_ns: u64,
    /// Free-form context.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// The result of a finished experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    /// Experiment identifier.
    pub experiment_id: String,
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,
    /// Experiment labels.
    pub labels: BTreeMap<String, String>,
    /// Seconds from start to finish.
    pub duration_secs: f64,
    /// Number of points recorded.
    pub total_measurements: usize,
    /// Points per second over the run.
    pub frequency_hz: f64,
    /// Statistics per measurement name with more than one point.
    pub statistics: BTreeMap<String, Summary>,
    /// Every recorded point, in order.
    pub measurements: Vec<MeasurementPoint>,
}

/// A running experiment.
#[derive(Debug)]
pub struct ExperimentRun {
    id: String,
    started_at: DateTime<Utc>,
    timer: MonotonicTimer,
    labels: BTreeMap<String, String>,
    points: Vec<MeasurementPoint>,
    finished: bool,
}

impl ExperimentRun {
    /// Starts an experiment. A random id is generated when none is given.
    #[must_use]
    pub fn new(id: Option<String>) -> Self {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        info!(experiment_id = %id, "experiment started");
        Self {
            id,
            started_at: Utc::now(),
            timer: MonotonicTimer::start(),
            labels: BTreeMap::new(),
            points: Vec::new(),
            finished: false,
        }
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Returns the experiment id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the points recorded so far.
    #[must_use]
    pub fn points(&self) -> &[MeasurementPoint] {
        &self.points
    }

    /// Records a measurement.
    ///
    /// # Errors
    ///
    /// Returns an error if the experiment has already finished.
    pub fn record(
        &mut self,
        name: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
    ) -> Result<()> {
        self.record_with(name, value, unit, BTreeMap::new())
    }

    /// Records a measurement with metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the experiment has already finished.
    pub fn record_with(
        &mut self,
        name: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<()> {
        if self.finished {
            return Err(MetricsError::ExperimentFinished {
                id: self.id.clone(),
            });
        }
        self.points.push(MeasurementPoint {
            name: name.into(),
            value,
            unit: unit.into(),
            timestamp_ns: self.timer.now_ns(),
            metadata,
        });
        Ok(())
    }

    /// Ends the experiment and summarizes it.
    ///
    /// Further calls to [`ExperimentRun::record`] fail. Calling `finish`
    /// again returns a fresh summary of the same points.
    pub fn finish(&mut self) -> ExperimentSummary {
        let duration_ns = self.timer.now_ns();
        self.finished = true;
        self.summarize(duration_ns)
    }

    fn summarize(&self, duration_ns: u64) -> ExperimentSummary {
        let mut series: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for point in &self.points {
            series.entry(&point.name).or_default().push(point.value);
        }

        let statistics = series
            .into_iter()
            .filter(|(_, values)| values.len() > 1)
            .filter_map(|(name, values)| {
                Summary::from_values(&values).map(|s| (name.to_string(), s))
            })
            .collect();

        let duration_secs = ns_to_secs(duration_ns);
        let frequency_hz = if duration_secs > 0.0 {
            self.points.len() as f64 / duration_secs
        } else {
            0.0
        };

        info!(
            experiment_id = %self.id,
            measurements = self.points.len(),
            duration_secs,
            "experiment finished"
        );

        ExperimentSummary {
            experiment_id: self.id.clone(),
            started_at: self.started_at,
            labels: self.labels.clone(),
            duration_secs,
            total_measurements: self.points.len(),
            frequency_hz,
            statistics,
            measurements: self.points.clone(),
        }
    }
}

impl ExperimentSummary {
    /// Writes the summary to `dir/experiment_<id>.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("experiment_{}.json", self.experiment_id));
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        info!(path = %path.display(), "experiment results saved");
        Ok(path)
    }

    /// Reads a summary written by [`ExperimentSummary::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

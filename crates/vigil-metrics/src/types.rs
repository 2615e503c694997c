//! Core types for telemetry samples.
//!
//! This module provides the fundamental data model of the sampling pipeline:
//! - [`MetricValue`]: A scalar, a numeric sequence, or a nested map
//! - [`SampleType`]: The domain a sample describes
//! - [`Sample`]: One immutable, timestamped snapshot of metrics
//! - [`SampleWindow`]: The most recent samples, handed to consumers as one value
//! - [`MetricView`]: The flat key space rules are evaluated against

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A mapping of metric key to value.
pub type Metrics = BTreeMap<String, MetricValue>;

/// A single metric value.
///
/// Serialized untagged, so a sample line reads like plain JSON:
/// numbers, arrays of numbers, and objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// A single number.
    Scalar(f64),
    /// A homogeneous numeric sequence, e.g. per-core utilization.
    Sequence(Vec<f64>),
    /// A nested structure of further values.
    Map(Metrics),
}

impl MetricValue {
    /// Returns the value as a number, if it is a scalar.
    #[must_use]
    pub const fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a numeric slice, if it is a sequence.
    #[must_use]
    pub fn as_sequence(&self) -> Option<&[f64]> {
        match self {
            Self::Sequence(values) => Some(values),
            _ => None,
        }
    }

    /// Returns the value as a map, if it is nested.
    #[must_use]
    pub const fn as_map(&self) -> Option<&Metrics> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns true if every number in the value is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Scalar(v) => v.is_finite(),
            Self::Sequence(values) => values.iter().all(|v| v.is_finite()),
            Self::Map(map) => map.values().all(Self::is_finite),
        }
    }

    /// Returns a short name for the variant, used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Sequence(_) => "sequence",
            Self::Map(_) => "map",
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<u64> for MetricValue {
    fn from(value: u64) -> Self {
        Self::Scalar(value as f64)
    }
}

impl From<Vec<f64>> for MetricValue {
    fn from(values: Vec<f64>) -> Self {
        Self::Sequence(values)
    }
}

impl From<Metrics> for MetricValue {
    fn from(map: Metrics) -> Self {
        Self::Map(map)
    }
}

/// Removes every scalar or sequence holding a NaN or an infinity, at any
/// depth. JSON has no encoding for them. Returns the removed keys, dotted
/// by nesting.
pub fn retain_finite(metrics: &mut Metrics) -> Vec<String> {
    let mut removed = Vec::new();
    metrics.retain(|key, value| match value {
        MetricValue::Map(nested) => {
            removed.extend(retain_finite(nested).into_iter().map(|k| format!("{key}.{k}")));
            true
        }
        other => {
            let keep = other.is_finite();
            if !keep {
                removed.push(key.clone());
            }
            keep
        }
    });
    removed
}

/// The domain a sample describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SampleType {
    /// Host-wide resources.
    #[default]
    System,
    /// A single process.
    Process,
    /// A container runtime.
    Container,
    /// Hardware sensors.
    Hardware,
    /// Task timing events from host automation.
    AnsibleTask,
}

impl SampleType {
    /// Returns the sample type as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Process => "process",
            Self::Container => "container",
            Self::Hardware => "hardware",
            Self::AnsibleTask => "ansible-task",
        }
    }
}

impl std::fmt::Display for SampleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One timestamped snapshot of metrics.
///
/// `metrics` is keyed by the name of the source that produced each entry.
/// A sample is immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Monotonic timestamp in nanoseconds since the sampler started.
    pub timestamp_ns: u64,
    /// Wall-clock time the sample was taken.
    pub recorded_at: DateTime<Utc>,
    /// The host the sample was taken on.
    pub host: String,
    /// The domain this sample describes.
    pub sample_type: SampleType,
    /// Collected metrics, keyed by source name.
    pub metrics: Metrics,
    /// Routing and labeling tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Sample {
    /// Creates a sample with no metrics.
    #[must_use]
    pub fn new(
        timestamp_ns: u64,
        recorded_at: DateTime<Utc>,
        host: impl Into<String>,
        sample_type: SampleType,
    ) -> Self {
        Self {
            timestamp_ns,
            recorded_at,
            host: host.into(),
            sample_type,
            metrics: Metrics::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Adds a metric entry.
    #[must_use]
    pub fn metric(mut self, key: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// The most recent samples, oldest first.
#[derive(Debug, Clone, Default)]
pub struct SampleWindow {
    samples: Vec<Arc<Sample>>,
}

impl SampleWindow {
    /// Creates a window from samples ordered oldest first.
    #[must_use]
    pub const fn new(samples: Vec<Arc<Sample>>) -> Self {
        Self { samples }
    }

    /// Returns the newest sample.
    #[must_use]
    pub fn latest(&self) -> Option<&Arc<Sample>> {
        self.samples.last()
    }

    /// Returns all samples, oldest first.
    #[must_use]
    pub fn samples(&self) -> &[Arc<Sample>] {
        &self.samples
    }

    /// Returns the number of samples in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the window holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A flat, read-only key space that rule conditions are evaluated against.
///
/// Source-level nesting is removed: the keys of every source's map become
/// top-level keys. Deeper nesting is kept and reachable by indexing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricView {
    values: Metrics,
}

impl MetricView {
    /// Creates a view directly from a metric map.
    #[must_use]
    pub const fn from_metrics(values: Metrics) -> Self {
        Self { values }
    }

    /// Builds a view from one sample.
    #[must_use]
    pub fn from_sample(sample: &Sample) -> Self {
        let mut values = Metrics::new();
        for (source, value) in &sample.metrics {
            match value {
                MetricValue::Map(map) => {
                    values.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                other => {
                    values.insert(source.clone(), other.clone());
                }
            }
        }
        Self { values }
    }

    /// Builds a view from the latest sample of a window, adding
    /// `<key>_avg`, `<key>_max`, `<key>_min`, `<key>_stddev`, `<key>_cv`
    /// (coefficient of variation, percent), and `<key>_history` for every
    /// scalar key across the window.
    ///
    /// Derived keys never shadow a key reported by a source.
    #[must_use]
    pub fn from_window(window: &SampleWindow) -> Self {
        let Some(latest) = window.latest() else {
            return Self::default();
        };

        let mut view = Self::from_sample(latest);
        let history: Vec<Self> = window.samples().iter().map(|s| Self::from_sample(s)).collect();

        let scalar_keys: Vec<String> = view
            .values
            .iter()
            .filter(|(_, v)| v.as_scalar().is_some())
            .map(|(k, _)| k.clone())
            .collect();

        for key in scalar_keys {
            let series: Vec<f64> = history
                .iter()
                .filter_map(|v| v.get(&key).and_then(MetricValue::as_scalar))
                .collect();

            let derived = [
                ("avg", vigil_stats::mean(&series).map(MetricValue::Scalar)),
                ("max", vigil_stats::max(&series).map(MetricValue::Scalar)),
                ("min", vigil_stats::min(&series).map(MetricValue::Scalar)),
                ("stddev", vigil_stats::std_dev(&series).map(MetricValue::Scalar)),
                (
                    "cv",
                    vigil_stats::coefficient_of_variation(&series).map(MetricValue::Scalar),
                ),
                ("history", Some(MetricValue::Sequence(series.clone()))),
            ];
            for (suffix, value) in derived {
                if let Some(value) = value {
                    view.values.entry(format!("{key}_{suffix}")).or_insert(value);
                }
            }
        }

        view
    }

    /// Looks up a top-level key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.values.get(key)
    }

    /// Inserts or replaces a key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetricValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Returns the whole key space.
    #[must_use]
    pub const fn as_metrics(&self) -> &Metrics {
        &self.values
    }

    /// Copies out the given keys that are present in the view.
    #[must_use]
    pub fn subset<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Metrics {
        keys.into_iter()
            .filter_map(|k| self.values.get(k).map(|v| (k.to_string(), v.clone())))
            .collect()
    }

    /// Returns the number of top-level keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the view has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

//! Sample log summary command.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use vigil_metrics::{LogSummary, MetricView, Sample, SampleLog, ns_to_secs};
use vigil_stats::Summary;

use crate::error::{DaemonError, Result};
use crate::output::{OutputFormat, TableDisplay, truncate};

/// Handler for the summary command.
#[derive(Debug, Clone, Copy)]
pub struct SummaryCommand<'a> {
    output_dir: &'a Path,
}

impl<'a> SummaryCommand<'a> {
    /// Creates a handler reading logs from `output_dir`.
    #[must_use]
    pub const fn new(output_dir: &'a Path) -> Self {
        Self { output_dir }
    }

    /// Summarizes `file`, or the newest log in the output directory.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::NoSampleLog` if there is nothing to read, or
    /// an error if the file cannot be parsed.
    pub fn report(&self, file: Option<&Path>) -> Result<SummaryReport> {
        let path = match file {
            Some(path) => path.to_path_buf(),
            None => SampleLog::latest_file(self.output_dir)
                .ok()
                .flatten()
                .ok_or_else(|| DaemonError::NoSampleLog(self.output_dir.display().to_string()))?,
        };
        let samples = SampleLog::read_file(&path)?;
        Ok(SummaryReport {
            summary: LogSummary::from_samples(&samples),
            statistics: scalar_statistics(&samples),
            file: path,
        })
    }

    /// Writes the summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the summary cannot be built or written.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        file: Option<&Path>,
    ) -> Result<()> {
        format.write(out, &self.report(file)?)
    }
}

/// Descriptive statistics for every scalar metric across `samples`.
#[must_use]
pub fn scalar_statistics(samples: &[Sample]) -> BTreeMap<String, Summary> {
    let mut series: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for sample in samples {
        let view = MetricView::from_sample(sample);
        for (key, value) in view.as_metrics() {
            if let Some(v) = value.as_scalar() {
                series.entry(key.clone()).or_default().push(v);
            }
        }
    }
    series
        .into_iter()
        .filter_map(|(key, values)| Summary::from_values(&values).map(|s| (key, s)))
        .collect()
}

/// A summarized sample log file.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    /// The file that was read.
    pub file: PathBuf,
    /// Its summary.
    #[serde(flatten)]
    pub summary: LogSummary,
    /// Statistics per scalar metric.
    pub statistics: BTreeMap<String, Summary>,
}

impl TableDisplay for SummaryReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<()> {
        let s = &self.summary;
        writeln!(writer, "Sample Log Summary")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "File:             {}", self.file.display())?;
        writeln!(writer, "Samples:          {}", s.total_samples)?;
        if let (Some(first), Some(last)) = (s.first_ns, s.last_ns) {
            writeln!(writer, "First:            {:.3}s", ns_to_secs(first))?;
            writeln!(writer, "Last:             {:.3}s", ns_to_secs(last))?;
        }
        writeln!(writer, "Duration:         {:.3}s", s.duration_secs)?;
        writeln!(writer)?;

        writeln!(writer, "Sample Types")?;
        for (sample_type, count) in &s.sample_types {
            writeln!(writer, "  {:<16}{}", sample_type.as_str(), count)?;
        }
        writeln!(writer)?;

        writeln!(writer, "Metrics ({})", s.metric_keys.len())?;
        for key in &s.metric_keys {
            writeln!(writer, "  {key}")?;
        }

        if !self.statistics.is_empty() {
            writeln!(writer)?;
            writeln!(
                writer,
                "{:<32}  {:>10}  {:>10}  {:>10}  {:>10}  {:>8}",
                "METRIC", "MEAN", "MEDIAN", "MIN", "MAX", "CV%"
            )?;
            writeln!(writer, "{}", "─".repeat(92))?;
            for (key, stats) in &self.statistics {
                writeln!(
                    writer,
                    "{:<32}  {:>10.2}  {:>10.2}  {:>10.2}  {:>10.2}  {:>8.2}",
                    truncate(key, 32),
                    stats.mean,
                    stats.median,
                    stats.min,
                    stats.max,
                    stats.cv_percent
                )?;
            }
        }
        Ok(())
    }
}

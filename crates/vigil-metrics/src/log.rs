//! Append-only JSON-lines sample log with size-based rotation.
//!
//! Each line is one serialized [`Sample`]. File names carry the wall-clock
//! time the log was opened (`samples_YYYYmmdd_HHMMSS.jsonl`); once a file
//! exceeds its size limit, writing continues in a numbered segment
//! (`samples_YYYYmmdd_HHMMSS_001.jsonl`, ...).

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::{Sample, SampleType};

const FILE_PREFIX: &str = "samples";
const FILE_EXTENSION: &str = "jsonl";

/// Default size at which a log file is rotated (64 MiB).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 64 * 1024 * 1024;

/// A writer for the durable sample log.
#[derive(Debug)]
pub struct SampleLog {
    dir: PathBuf,
    stem: String,
    max_file_bytes: u64,
    segment: u32,
    current: PathBuf,
    current_size: u64,
}

impl SampleLog {
    /// Opens a new log under `dir`, creating the directory if needed.
    ///
    /// No file is created until the first append.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>, max_file_bytes: u64) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let stem = format!("{FILE_PREFIX}_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        let current = dir.join(format!("{stem}.{FILE_EXTENSION}"));
        let current_size = fs::metadata(&current).map(|m| m.len()).unwrap_or(0);

        info!(path = %current.display(), "sample log opened");
        Ok(Self {
            dir,
            stem,
            max_file_bytes: max_file_bytes.max(1),
            segment: 0,
            current,
            current_size,
        })
    }

    /// Returns the file currently being written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.current
    }

    /// Returns the directory holding the log files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends samples in order, one JSON document per line.
    ///
    /// The batch is serialized up front, so a serialization failure writes
    /// nothing. Returns the file that received the batch.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn append<S: Borrow<Sample>>(&mut self, samples: &[S]) -> Result<PathBuf> {
        let mut buf = Vec::new();
        for sample in samples {
            serde_json::to_writer(&mut buf, sample.borrow())?;
            buf.push(b'\n');
        }

        if self.current_size > 0 && self.current_size + buf.len() as u64 > self.max_file_bytes {
            self.rotate();
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&buf)?;
        writer.flush()?;
        self.current_size += buf.len() as u64;

        debug!(
            path = %self.current.display(),
            count = samples.len(),
            bytes = buf.len(),
            "appended samples"
        );
        Ok(self.current.clone())
    }

    fn rotate(&mut self) {
        self.segment += 1;
        self.current = self
            .dir
            .join(format!("{}_{:03}.{FILE_EXTENSION}", self.stem, self.segment));
        self.current_size = 0;
        info!(path = %self.current.display(), "sample log rotated");
    }

    /// Reads every sample from one log file.
    ///
    /// Lines that fail to parse are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub fn read_file(path: &Path) -> Result<Vec<Sample>> {
        let reader = BufReader::new(File::open(path)?);
        let mut samples = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Sample>(&line) {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    warn!(path = %path.display(), line = index + 1, error = %e, "skipping malformed sample");
                }
            }
        }

        Ok(samples)
    }

    /// Lists log files in `dir`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension().is_some_and(|ext| ext == FILE_EXTENSION)
                    && p.file_name()
                        .is_some_and(|n| n.to_string_lossy().starts_with(FILE_PREFIX))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Returns the newest log file in `dir`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn latest_file(dir: &Path) -> Result<Option<PathBuf>> {
        Ok(Self::list_files(dir)?.pop())
    }

    /// Summarizes one log file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn summarize(path: &Path) -> Result<LogSummary> {
        let samples = Self::read_file(path)?;
        Ok(LogSummary::from_samples(&samples))
    }
}

/// An overview of the samples in a log file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogSummary {
    /// Number of samples.
    pub total_samples: usize,
    /// Earliest monotonic timestamp.
    pub first_ns: Option<u64>,
    /// Latest monotonic timestamp.
    pub last_ns: Option<u64>,
    /// Seconds between the first and last sample.
    pub duration_secs: f64,
    /// Sample count per sample type.
    pub sample_types: BTreeMap<SampleType, usize>,
    /// Every metric key seen, as `source.key` for nested sources.
    pub metric_keys: Vec<String>,
}

impl LogSummary {
    /// Builds a summary from samples in any order.
    #[must_use]
    pub fn from_samples(samples: &[Sample]) -> Self {
        let first_ns = samples.iter().map(|s| s.timestamp_ns).min();
        let last_ns = samples.iter().map(|s| s.timestamp_ns).max();

        let mut sample_types = BTreeMap::new();
        let mut keys = std::collections::BTreeSet::new();
        for sample in samples {
            *sample_types.entry(sample.sample_type).or_insert(0) += 1;
            for (source, value) in &sample.metrics {
                match value.as_map() {
                    Some(map) => keys.extend(map.keys().map(|k| format!("{source}.{k}"))),
                    None => {
                        keys.insert(source.clone());
                    }
                }
            }
        }

        let duration_secs = match (first_ns, last_ns) {
            (Some(first), Some(last)) => crate::clock::ns_to_secs(last - first),
            _ => 0.0,
        };

        Self {
            total_samples: samples.len(),
            first_ns,
            last_ns,
            duration_secs,
            sample_types,
            metric_keys: keys.into_iter().collect(),
        }
    }
}

//! The sampling loop.
//!
//! A [`Sampler`] polls every registered [`MetricSource`] once per tick,
//! assembles the results into one [`Sample`], buffers it, and publishes the
//! recent window to subscribers. The buffer is flushed to the [`SampleLog`]
//! when it reaches the configured threshold and once more on shutdown.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, MonotonicTimer, SystemClock};
use crate::error::{MetricsError, Result};
use crate::log::SampleLog;
use crate::schedule::{LoopHandle, Schedule, run_every};
use crate::source::MetricSource;
use crate::types::{MetricValue, Metrics, Sample, SampleType, SampleWindow, retain_finite};

/// Samples held in memory at most, as a multiple of the flush threshold,
/// while the log keeps failing.
const MAX_BUFFER_FACTOR: usize = 10;

/// Returns this machine's host name, or `"localhost"` if it is unavailable.
#[must_use]
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Sampler configuration.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Tick period.
    pub interval: Duration,
    /// Buffered samples that trigger a flush.
    pub flush_threshold: usize,
    /// Time budget for a single source per tick.
    pub source_timeout: Duration,
    /// Host identifier stamped on every sample.
    pub host: String,
    /// Sample type stamped on every sample. A tick combines all sources
    /// into one sample, so this names the sampler's domain as a whole.
    pub sample_type: SampleType,
    /// Number of recent samples published to subscribers.
    pub window_size: usize,
    /// Tags stamped on every sample.
    pub tags: BTreeMap<String, String>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            flush_threshold: 1000,
            source_timeout: Duration::from_secs(2),
            host: local_hostname(),
            sample_type: SampleType::System,
            window_size: 10,
            tags: BTreeMap::new(),
        }
    }
}

impl SamplerConfig {
    /// Sets the tick period.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the flush threshold.
    #[must_use]
    pub const fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    /// Sets the per-source timeout.
    #[must_use]
    pub const fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    /// Sets the host identifier.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the sample type.
    #[must_use]
    pub const fn with_sample_type(mut self, sample_type: SampleType) -> Self {
        self.sample_type = sample_type;
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a period, threshold, or window is zero.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(MetricsError::InvalidConfig {
                reason: "sample interval must be positive".to_string(),
            });
        }
        if self.source_timeout.is_zero() {
            return Err(MetricsError::InvalidConfig {
                reason: "source timeout must be positive".to_string(),
            });
        }
        if self.flush_threshold == 0 {
            return Err(MetricsError::InvalidConfig {
                reason: "flush threshold must be at least 1".to_string(),
            });
        }
        if self.window_size == 0 {
            return Err(MetricsError::InvalidConfig {
                reason: "window size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Counters describing sampler activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerStats {
    /// Samples assembled.
    pub samples_taken: u64,
    /// Samples written to the log.
    pub samples_flushed: u64,
    /// Samples discarded because the buffer overflowed while the log was failing.
    pub samples_dropped: u64,
    /// Source calls that failed or timed out.
    pub source_failures: u64,
    /// Flushes that failed.
    pub flush_failures: u64,
    /// Samples currently buffered.
    pub buffered: usize,
}

#[derive(Debug, Default)]
struct Counters {
    samples_taken: AtomicU64,
    samples_flushed: AtomicU64,
    samples_dropped: AtomicU64,
    source_failures: AtomicU64,
    flush_failures: AtomicU64,
}

/// Polls metric sources on a fixed period and buffers the results.
#[derive(Debug)]
pub struct Sampler {
    config: SamplerConfig,
    sources: Vec<Arc<dyn MetricSource>>,
    clock: Arc<dyn Clock>,
    timer: MonotonicTimer,
    buffer: Mutex<Vec<Arc<Sample>>>,
    recent: Mutex<VecDeque<Arc<Sample>>>,
    log: Option<Mutex<SampleLog>>,
    window_tx: watch::Sender<Arc<SampleWindow>>,
    counters: Counters,
}

impl Sampler {
    /// Creates a sampler. Without a log, flushed samples are discarded.
    #[must_use]
    pub fn new(config: SamplerConfig, log: Option<SampleLog>) -> Self {
        let (window_tx, _) = watch::channel(Arc::new(SampleWindow::default()));
        Self {
            config,
            sources: Vec::new(),
            clock: Arc::new(SystemClock),
            timer: MonotonicTimer::start(),
            buffer: Mutex::new(Vec::new()),
            recent: Mutex::new(VecDeque::new()),
            log: log.map(Mutex::new),
            window_tx,
            counters: Counters::default(),
        }
    }

    /// Uses the given wall clock for `recorded_at`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers a source. Sources are polled in registration order.
    pub fn add_source(&mut self, source: Arc<dyn MetricSource>) {
        info!(source = source.name(), "metric source registered");
        self.sources.push(source);
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Returns the names of the registered sources.
    #[must_use]
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Subscribes to the recent-sample window, updated after every tick.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<SampleWindow>> {
        self.window_tx.subscribe()
    }

    /// Polls every source concurrently, each bounded by the source timeout.
    ///
    /// Failed or timed-out sources are logged and left out of the result,
    /// as are NaN and infinite values.
    pub async fn collect_once(&self) -> Metrics {
        let timeout = self.config.source_timeout;
        let calls = self.sources.iter().map(|source| async move {
            let name = source.name();
            match tokio::time::timeout(timeout, source.collect()).await {
                Ok(Ok(metrics)) => Ok((name.to_string(), metrics)),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(MetricsError::SourceTimeout {
                    name: name.to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            }
        });

        let mut collected = Metrics::new();
        for result in futures::future::join_all(calls).await {
            match result {
                Ok((name, mut metrics)) => {
                    let dropped = retain_finite(&mut metrics);
                    if !dropped.is_empty() {
                        warn!(source = %name, keys = ?dropped, "dropped non-finite metric values");
                    }
                    collected.insert(name, MetricValue::Map(metrics));
                }
                Err(e) => {
                    self.counters.source_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "metric source skipped");
                }
            }
        }
        collected
    }

    /// Runs one tick: collects, buffers, publishes, and flushes at threshold.
    pub async fn tick(&self) -> Arc<Sample> {
        let metrics = self.collect_once().await;

        let mut sample = Sample::new(
            self.timer.now_ns(),
            self.clock.now(),
            self.config.host.clone(),
            self.config.sample_type,
        );
        sample.metrics = metrics;
        sample.tags = self.config.tags.clone();
        let sample = Arc::new(sample);
        self.counters.samples_taken.fetch_add(1, Ordering::Relaxed);

        let buffered = {
            let mut buffer = self.buffer.lock();
            buffer.push(Arc::clone(&sample));
            buffer.len()
        };
        self.publish(Arc::clone(&sample));

        debug!(
            timestamp_ns = sample.timestamp_ns,
            sources = sample.metrics.len(),
            buffered,
            "sample taken"
        );

        if buffered >= self.config.flush_threshold {
            if let Err(e) = self.flush() {
                error!(error = %e, buffered, "sample flush failed, will retry");
            }
        }

        sample
    }

    fn publish(&self, sample: Arc<Sample>) {
        let window = {
            let mut recent = self.recent.lock();
            recent.push_back(sample);
            while recent.len() > self.config.window_size {
                recent.pop_front();
            }
            SampleWindow::new(recent.iter().cloned().collect())
        };
        self.window_tx.send_replace(Arc::new(window));
    }

    /// Writes all buffered samples to the log and clears the buffer.
    ///
    /// On failure the samples stay buffered, ahead of anything taken since,
    /// and are retried on the next flush. If the buffer grows past ten
    /// times the flush threshold the oldest samples are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the log write fails.
    pub fn flush(&self) -> Result<usize> {
        let pending = std::mem::take(&mut *self.buffer.lock());
        if pending.is_empty() {
            return Ok(0);
        }
        let count = pending.len();

        let Some(log) = &self.log else {
            debug!(count, "no sample log configured, discarding flushed samples");
            return Ok(0);
        };

        let result = log.lock().append(&pending);
        match result {
            Ok(path) => {
                self.counters
                    .samples_flushed
                    .fetch_add(count as u64, Ordering::Relaxed);
                info!(count, path = %path.display(), "samples flushed");
                Ok(count)
            }
            Err(e) => {
                self.counters.flush_failures.fetch_add(1, Ordering::Relaxed);
                self.restore(pending);
                Err(e)
            }
        }
    }

    fn restore(&self, mut pending: Vec<Arc<Sample>>) {
        let mut buffer = self.buffer.lock();
        pending.append(&mut buffer);

        let limit = self.config.flush_threshold.saturating_mul(MAX_BUFFER_FACTOR);
        if pending.len() > limit {
            let excess = pending.len() - limit;
            pending.drain(..excess);
            self.counters
                .samples_dropped
                .fetch_add(excess as u64, Ordering::Relaxed);
            warn!(dropped = excess, limit, "sample buffer full, dropped oldest samples");
        }
        *buffer = pending;
    }

    /// Returns the number of buffered samples.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Returns activity counters.
    #[must_use]
    pub fn stats(&self) -> SamplerStats {
        SamplerStats {
            samples_taken: self.counters.samples_taken.load(Ordering::Relaxed),
            samples_flushed: self.counters.samples_flushed.load(Ordering::Relaxed),
            samples_dropped: self.counters.samples_dropped.load(Ordering::Relaxed),
            source_failures: self.counters.source_failures.load(Ordering::Relaxed),
            flush_failures: self.counters.flush_failures.load(Ordering::Relaxed),
            buffered: self.buffered_len(),
        }
    }

    /// Ticks until `shutdown` fires, then flushes what is left.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let ticks = run_every(Schedule::new(self.config.interval), shutdown, move || async move {
            self.tick().await;
        })
        .await;

        match self.flush() {
            Ok(count) => info!(ticks, flushed = count, "sampler stopped"),
            Err(e) => error!(ticks, error = %e, "final sample flush failed"),
        }
    }

    /// Spawns [`Sampler::run`] as a background task.
    pub fn start(self: &Arc<Self>) -> LoopHandle {
        let sampler = Arc::clone(self);
        LoopHandle::spawn("sampler", move |shutdown| async move {
            sampler.run(shutdown).await;
        })
    }
}

//! The metric source interface.
//!
//! A [`MetricSource`] produces a named set of metrics for one domain on
//! demand. The sampler polls every registered source once per tick and
//! bounds each call with a timeout. Sources that read the host through
//! synchronous system calls run the read with [`collect_blocking`], so a
//! hung call never holds up a runtime worker.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use parking_lot::RwLock;

use crate::error::{MetricsError, Result};
use crate::types::{MetricValue, Metrics};

/// The future returned by [`MetricSource::collect`].
pub type CollectFuture<'a> = Pin<Box<dyn Future<Output = Result<Metrics>> + Send + 'a>>;

/// Trait for metric sources.
///
/// Implement this trait to feed a new domain (a container runtime, a
/// sensor bus, a task-timing hook) into the sampler.
pub trait MetricSource: Send + Sync + fmt::Debug {
    /// Returns the name of this source. Used as the key of its metrics in a
    /// sample and in logs.
    fn name(&self) -> &str;

    /// Collects the current metrics.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reading fails.
    fn collect(&self) -> CollectFuture<'_>;
}

/// Runs a synchronous collector on the tokio blocking pool.
///
/// The returned future yields while the collector runs, so the sampler's
/// per-source timeout still fires if it hangs.
pub fn collect_blocking<F>(name: &str, read: F) -> CollectFuture<'static>
where
    F: FnOnce() -> Result<Metrics> + Send + 'static,
{
    let name = name.to_string();
    Box::pin(async move {
        tokio::task::spawn_blocking(read)
            .await
            .map_err(|e| MetricsError::SourceFailed {
                name,
                reason: e.to_string(),
            })?
    })
}

/// A source that reports a fixed, replaceable set of metrics.
///
/// Useful for tests, dry runs, and feeding externally computed values
/// (such as benchmark error rates) into the rule engine.
#[derive(Debug)]
pub struct StaticSource {
    name: String,
    metrics: RwLock<Metrics>,
}

impl StaticSource {
    /// Creates a source that always reports `metrics`.
    #[must_use]
    pub fn new(name: impl Into<String>, metrics: Metrics) -> Self {
        Self {
            name: name.into(),
            metrics: RwLock::new(metrics),
        }
    }

    /// Replaces all reported metrics.
    pub fn replace(&self, metrics: Metrics) {
        *self.metrics.write() = metrics;
    }

    /// Sets a single reported metric.
    pub fn set(&self, key: impl Into<String>, value: impl Into<MetricValue>) {
        self.metrics.write().insert(key.into(), value.into());
    }
}

impl MetricSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self) -> CollectFuture<'_> {
        let metrics = self.metrics.read().clone();
        Box::pin(async move { Ok(metrics) })
    }
}

//! Telemetry sampling for Vigil.
//!
//! `vigil-metrics` drives the sampling side of the monitoring pipeline:
//! it polls registered [`MetricSource`]s on a fixed, drift-compensated
//! period, assembles each tick into an immutable [`Sample`], publishes the
//! most recent samples to consumers, and flushes buffered samples to an
//! append-only, rotating JSON-lines log.
//!
//! # Features
//!
//! - **Tagged metric values**: [`MetricValue`] is a scalar, a numeric sequence, or a nested map
//! - **Fault-isolated collection**: a failing or slow source is logged and omitted, never fatal
//! - **Built-in sources**: [`SystemSource`], [`NetworkSource`], and [`ProcessSource`] via `sysinfo`
//! - **Drift-compensated scheduling**: [`Schedule`] sleeps only the remainder of each interval
//! - **Durable log**: [`SampleLog`] writes one JSON sample per line, partitioned by start time
//! - **Experiments**: [`ExperimentRun`] records measurement points and summarizes them
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use vigil_metrics::{MetricValue, Metrics, Sampler, SamplerConfig, StaticSource};
//!
//! # tokio_test_block_on(async {
//! let mut metrics = Metrics::new();
//! metrics.insert("cpu_percent_total".to_string(), MetricValue::Scalar(42.0));
//!
//! let mut sampler = Sampler::new(SamplerConfig::default(), None);
//! sampler.add_source(Arc::new(StaticSource::new("system", metrics)));
//!
//! let sample = sampler.tick().await;
//! assert!(sample.metrics.contains_key("system"));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/vigil-metrics/0.1.0")]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod clock;
pub mod error;
pub mod experiment;
pub mod log;
pub mod sampler;
pub mod schedule;
pub mod source;
pub mod system;
pub mod types;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, MonotonicTimer, SystemClock, ns_to_secs};
pub use error::{MetricsError, Result};
pub use experiment::{ExperimentRun, ExperimentSummary, MeasurementPoint};
pub use log::{DEFAULT_MAX_FILE_BYTES, LogSummary, SampleLog};
pub use sampler::{Sampler, SamplerConfig, SamplerStats, local_hostname};
pub use schedule::{LoopHandle, Schedule, run_every};
pub use source::{CollectFuture, MetricSource, StaticSource, collect_blocking};
pub use system::{InterfaceCounters, NetworkSource, ProcessSource, SystemSource};
pub use types::{MetricValue, MetricView, Metrics, Sample, SampleType, SampleWindow, retain_finite};

//! Built-in host, network, and process sources backed by `sysinfo`.
//!
//! CPU utilization and network counters are computed from the difference
//! between two refreshes, so the first sample after startup reports `0`
//! for them. Every reading runs on the blocking pool.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use sysinfo::{Disks, Networks, Pid, ProcessesToUpdate, System};
use tracing::debug;

use crate::error::{MetricsError, Result};
use crate::source::{CollectFuture, MetricSource, collect_blocking};
use crate::types::{MetricValue, Metrics};

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

/// Host-wide CPU, memory, swap, disk, and load metrics.
///
/// Reported keys:
/// - `cpu_percent_total`, `cpu_percent_per_core` (sequence), `cpu_count`
/// - `memory_total_bytes`, `memory_used_bytes`, `memory_used_percent`
/// - `swap_used_percent`
/// - `disk_free_percent` (root mount, or the largest disk when there is none)
/// - `load_1m`, `load_5m`, `load_15m`
#[derive(Debug)]
pub struct SystemSource {
    system: Arc<Mutex<System>>,
}

impl SystemSource {
    /// Creates a new system source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    fn snapshot(system: &Mutex<System>) -> Metrics {
        let mut sys = system.lock();
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let mut metrics = Metrics::new();
        metrics.insert(
            "cpu_percent_total".to_string(),
            MetricValue::Scalar(f64::from(sys.global_cpu_usage())),
        );
        metrics.insert(
            "cpu_percent_per_core".to_string(),
            MetricValue::Sequence(
                sys.cpus()
                    .iter()
                    .map(|c| f64::from(c.cpu_usage()))
                    .collect(),
            ),
        );
        metrics.insert("cpu_count".to_string(), (sys.cpus().len() as u64).into());

        let total = sys.total_memory();
        let used = sys.used_memory();
        metrics.insert("memory_total_bytes".to_string(), total.into());
        metrics.insert("memory_used_bytes".to_string(), used.into());
        metrics.insert(
            "memory_used_percent".to_string(),
            MetricValue::Scalar(percent(used, total)),
        );
        metrics.insert(
            "swap_used_percent".to_string(),
            MetricValue::Scalar(percent(sys.used_swap(), sys.total_swap())),
        );
        drop(sys);

        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .or_else(|| disks.list().iter().max_by_key(|d| d.total_space()));
        if let Some(disk) = disk {
            metrics.insert(
                "disk_free_percent".to_string(),
                MetricValue::Scalar(percent(disk.available_space(), disk.total_space())),
            );
        }

        let load = System::load_average();
        metrics.insert("load_1m".to_string(), MetricValue::Scalar(load.one));
        metrics.insert("load_5m".to_string(), MetricValue::Scalar(load.five));
        metrics.insert("load_15m".to_string(), MetricValue::Scalar(load.fifteen));

        debug!(metric_count = metrics.len(), "collected system metrics");
        metrics
    }
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for SystemSource {
    fn name(&self) -> &str {
        "system"
    }

    fn collect(&self) -> CollectFuture<'_> {
        let system = Arc::clone(&self.system);
        collect_blocking(self.name(), move || Ok(Self::snapshot(&system)))
    }
}

/// Interface counters summed over every interface for one interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    /// Interfaces seen.
    pub interfaces: u64,
    /// Bytes received.
    pub bytes_received: u64,
    /// Bytes transmitted.
    pub bytes_transmitted: u64,
    /// Packets received.
    pub packets_received: u64,
    /// Packets transmitted.
    pub packets_transmitted: u64,
    /// Receive errors.
    pub errors_received: u64,
    /// Transmit errors.
    pub errors_transmitted: u64,
}

impl InterfaceCounters {
    /// Sums the per-refresh counters of every interface.
    #[must_use]
    pub fn from_networks(networks: &Networks) -> Self {
        networks
            .list()
            .values()
            .fold(Self::default(), |acc, data| Self {
                interfaces: acc.interfaces + 1,
                bytes_received: acc.bytes_received + data.received(),
                bytes_transmitted: acc.bytes_transmitted + data.transmitted(),
                packets_received: acc.packets_received + data.packets_received(),
                packets_transmitted: acc.packets_transmitted + data.packets_transmitted(),
                errors_received: acc.errors_received + data.errors_on_received(),
                errors_transmitted: acc.errors_transmitted + data.errors_on_transmitted(),
            })
    }

    /// Percentage of packets that failed, capped at 100.
    #[must_use]
    pub fn packet_loss_percent(&self) -> f64 {
        let errors = self.errors_received + self.errors_transmitted;
        let packets = self.packets_received + self.packets_transmitted;
        percent(errors, packets).min(100.0)
    }

    /// Converts the counters into reported metrics.
    #[must_use]
    pub fn to_metrics(&self) -> Metrics {
        let mut metrics = Metrics::new();
        for (key, value) in [
            ("network_interfaces", self.interfaces),
            ("network_bytes_received", self.bytes_received),
            ("network_bytes_transmitted", self.bytes_transmitted),
            ("network_packets_received", self.packets_received),
            ("network_packets_transmitted", self.packets_transmitted),
            ("network_errors_received", self.errors_received),
            ("network_errors_transmitted", self.errors_transmitted),
        ] {
            metrics.insert(key.to_string(), value.into());
        }
        metrics.insert(
            "network_packet_loss_percent".to_string(),
            MetricValue::Scalar(self.packet_loss_percent()),
        );
        metrics
    }
}

/// Network interface traffic since the previous collection.
///
/// Reported keys: `network_interfaces`, `network_bytes_received`,
/// `network_bytes_transmitted`, `network_packets_received`,
/// `network_packets_transmitted`, `network_errors_received`,
/// `network_errors_transmitted`, and `network_packet_loss_percent`
/// (errors as a share of packets).
#[derive(Debug)]
pub struct NetworkSource {
    networks: Arc<Mutex<Networks>>,
}

impl NetworkSource {
    /// Creates a network source with the current interface list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            networks: Arc::new(Mutex::new(Networks::new_with_refreshed_list())),
        }
    }

    fn snapshot(networks: &Mutex<Networks>) -> Metrics {
        let mut networks = networks.lock();
        networks.refresh(true);
        let counters = InterfaceCounters::from_networks(&networks);
        drop(networks);

        debug!(
            interfaces = counters.interfaces,
            packet_loss_percent = counters.packet_loss_percent(),
            "collected network metrics"
        );
        counters.to_metrics()
    }
}

impl Default for NetworkSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for NetworkSource {
    fn name(&self) -> &str {
        "network"
    }

    fn collect(&self) -> CollectFuture<'_> {
        let networks = Arc::clone(&self.networks);
        collect_blocking(self.name(), move || Ok(Self::snapshot(&networks)))
    }
}

/// Resource usage of a single process (this one by default).
///
/// Reported keys: `process_cpu_percent`, `process_rss_bytes`,
/// `process_virtual_bytes`, `process_run_time_secs`.
#[derive(Debug)]
pub struct ProcessSource {
    pid: Pid,
    system: Arc<Mutex<System>>,
}

impl ProcessSource {
    /// Creates a source for the current process.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform cannot report the current PID.
    pub fn current() -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| MetricsError::SourceFailed {
            name: "process".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::for_pid(pid))
    }

    /// Creates a source for the given process.
    #[must_use]
    pub fn for_pid(pid: Pid) -> Self {
        Self {
            pid,
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    fn snapshot(pid: Pid, system: &Mutex<System>) -> Result<Metrics> {
        let mut sys = system.lock();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        let process = sys.process(pid).ok_or_else(|| MetricsError::SourceFailed {
            name: "process".to_string(),
            reason: format!("process {pid} not found"),
        })?;

        let mut metrics = Metrics::new();
        metrics.insert(
            "process_cpu_percent".to_string(),
            MetricValue::Scalar(f64::from(process.cpu_usage())),
        );
        metrics.insert("process_rss_bytes".to_string(), process.memory().into());
        metrics.insert(
            "process_virtual_bytes".to_string(),
            process.virtual_memory().into(),
        );
        metrics.insert(
            "process_run_time_secs".to_string(),
            process.run_time().into(),
        );
        Ok(metrics)
    }
}

impl MetricSource for ProcessSource {
    fn name(&self) -> &str {
        "process"
    }

    fn collect(&self) -> CollectFuture<'_> {
        let (pid, system) = (self.pid, Arc::clone(&self.system));
        collect_blocking(self.name(), move || Self::snapshot(pid, &system))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_handles_zero_total() {
        assert_eq!(percent(5, 0), 0.0);
        assert!((percent(25, 100) - 25.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn system_source_reports_memory() {
        let source = SystemSource::new();
        let metrics = source.collect().await.unwrap();

        assert!(metrics.contains_key("memory_used_percent"));
        assert!(metrics.contains_key("cpu_percent_total"));
        assert!(
            metrics
                .get("cpu_percent_per_core")
                .and_then(MetricValue::as_sequence)
                .is_some()
        );
    }

    #[test]
    fn packet_loss_from_counters() {
        let counters = InterfaceCounters {
            interfaces: 2,
            packets_received: 900,
            packets_transmitted: 100,
            errors_received: 40,
            errors_transmitted: 20,
            ..InterfaceCounters::default()
        };

        assert!((counters.packet_loss_percent() - 6.0).abs() < 1e-9);
        let metrics = counters.to_metrics();
        assert_eq!(
            metrics.get("network_packet_loss_percent"),
            Some(&MetricValue::Scalar(6.0))
        );
        assert_eq!(metrics.get("network_interfaces"), Some(&MetricValue::Scalar(2.0)));
    }

    #[test]
    fn packet_loss_without_traffic_is_zero() {
        let counters = InterfaceCounters {
            errors_received: 3,
            ..InterfaceCounters::default()
        };
        assert_eq!(counters.packet_loss_percent(), 0.0);
        assert_eq!(InterfaceCounters::default().packet_loss_percent(), 0.0);
    }

    #[tokio::test]
    async fn network_source_reports_loss() {
        let source = NetworkSource::new();
        let metrics = source.collect().await.unwrap();

        assert_eq!(source.name(), "network");
        assert!(metrics.contains_key("network_packet_loss_percent"));
    }

    #[tokio::test]
    async fn process_source_reports_self() {
        let source = ProcessSource::current().unwrap();
        let metrics = source.collect().await.unwrap();

        assert_eq!(source.name(), "process");
        let rss = metrics
            .get("process_rss_bytes")
            .and_then(MetricValue::as_scalar)
            .unwrap();
        assert!(rss > 0.0);
    }
}

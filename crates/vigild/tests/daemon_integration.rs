//! Integration tests for the daemon pipeline.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tempfile::TempDir;

use vigil_alerts::{Alert, AlertSeverity, Dispatcher, NotificationChannel, RuleSpec, SendFuture};
use vigil_metrics::{
    Clock, CollectFuture, ManualClock, MetricSource, MetricValue, Metrics, Sample, SampleLog, SampleType,
    SampleWindow, StaticSource,
};
use vigild::commands::{AlertCommand, load_store};
use vigild::{Daemon, OutputFormat, VigilConfig};

#[derive(Debug, Default)]
struct RecordingChannel {
    received: Mutex<Vec<Alert>>,
}

impl RecordingChannel {
    fn rule_names(&self) -> Vec<String> {
        self.received.lock().iter().map(|a| a.rule_name.clone()).collect()
    }
}

impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    fn send<'a>(&'a self, alert: &'a Alert) -> SendFuture<'a> {
        Box::pin(async move {
            self.received.lock().push(alert.clone());
            Ok(())
        })
    }
}

#[derive(Debug)]
struct HangingSource;

impl MetricSource for HangingSource {
    fn name(&self) -> &str {
        "network"
    }

    fn collect(&self) -> CollectFuture<'_> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Metrics::new())
        })
    }
}

fn start_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn cpu_rule(cooldown_seconds: u64) -> RuleSpec {
    RuleSpec {
        name: "cpu_high".to_string(),
        condition: r#"metrics["cpu"] > 90"#.to_string(),
        severity: AlertSeverity::Warning,
        actions: vec!["recording".to_string()],
        cooldown_seconds,
        enabled: true,
    }
}

fn test_config(dir: &TempDir, rules: Vec<RuleSpec>) -> VigilConfig {
    let mut config = VigilConfig::default();
    config.host = Some("integration-host".to_string());
    config.sampling.output_dir = dir.path().join("samples");
    config.sampling.interval_secs = 1.0;
    config.sampling.source_timeout_secs = 2.0;
    config.alerting.evaluation_interval_secs = 1.0;
    config.alerting.snapshot_path = dir.path().join("alerts.json");
    config.notifications.console.enabled = false;
    config.rules = Some(rules);
    config
}

fn cpu_metrics(cpu: f64) -> Metrics {
    let mut metrics = Metrics::new();
    metrics.insert("cpu".to_string(), MetricValue::Scalar(cpu));
    metrics
}

fn cpu_window(cpu: f64) -> SampleWindow {
    let sample = Sample::new(0, Utc::now(), "integration-host", SampleType::System)
        .metric("system", cpu_metrics(cpu));
    SampleWindow::new(vec![Arc::new(sample)])
}

struct Harness {
    daemon: Arc<Daemon>,
    channel: Arc<RecordingChannel>,
    clock: Arc<ManualClock>,
}

fn harness(config: VigilConfig, sources: Vec<Arc<dyn MetricSource>>, with_log: bool) -> Harness {
    let channel = Arc::new(RecordingChannel::default());
    let clock = Arc::new(ManualClock::new(start_time()));
    let log = with_log.then(|| {
        SampleLog::open(&config.sampling.output_dir, config.sampling.max_file_bytes)
            .expect("sample log should open")
    });
    let dispatcher = Dispatcher::new(Dispatcher::DEFAULT_TIMEOUT)
        .with_channel(Arc::clone(&channel) as Arc<dyn NotificationChannel>);

    let daemon = Daemon::with_components(config, sources, dispatcher, Arc::clone(&clock) as Arc<dyn Clock>, log)
        .expect("daemon should assemble");

    Harness {
        daemon: Arc::new(daemon),
        channel,
        clock,
    }
}

#[tokio::test(start_paused = true)]
async fn test_run_writes_samples_and_snapshot() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, vec![cpu_rule(300)]);
    let source: Arc<dyn MetricSource> = Arc::new(StaticSource::new("system", cpu_metrics(95.0)));
    let h = harness(config, vec![source], true);

    let handle = h.daemon.start();
    tokio::time::sleep(Duration::from_millis(4500)).await;
    handle.stop().await;

    // Every sample was flushed on shutdown.
    let files = SampleLog::list_files(&dir.path().join("samples")).unwrap();
    assert_eq!(files.len(), 1);
    let samples = SampleLog::read_file(&files[0]).unwrap();
    assert!(samples.len() >= 4);
    assert!(samples.iter().all(|s| s.host == "integration-host"));
    assert!(samples[0].metrics.contains_key("system"));

    // One alert, held back by cooldown afterwards, delivered and persisted.
    assert_eq!(h.channel.rule_names(), vec!["cpu_high".to_string()]);
    let stored = load_store(&dir.path().join("alerts.json")).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored.all()[0].actions, vec!["recording".to_string()]);
}

#[tokio::test]
async fn test_cooldown_end_to_end() {
    let dir = TempDir::new().unwrap();
    let h = harness(test_config(&dir, vec![cpu_rule(300)]), Vec::new(), false);
    let window = cpu_window(95.0);

    assert_eq!(h.daemon.evaluate_once(&window).alerts.len(), 1);
    h.clock.advance(Duration::from_secs(100));
    let suppressed = h.daemon.evaluate_once(&window);
    assert!(suppressed.alerts.is_empty());
    assert_eq!(suppressed.rules_suppressed, 1);
    h.clock.advance(Duration::from_secs(300));
    assert_eq!(h.daemon.evaluate_once(&window).alerts.len(), 1);

    let report = h.daemon.dispatch_pending().await;
    assert_eq!(report.alerts, 2);
    assert_eq!(report.sent, 2);
    assert_eq!(h.channel.rule_names().len(), 2);
    assert_eq!(h.daemon.store().len(), 2);

    let rule = h.daemon.engine().get_rule("cpu_high").unwrap();
    assert_eq!(
        rule.last_triggered_at,
        Some(start_time() + chrono::Duration::seconds(400))
    );
}

#[tokio::test(start_paused = true)]
async fn test_hanging_source_is_omitted() {
    let dir = TempDir::new().unwrap();
    let system: Arc<dyn MetricSource> = Arc::new(StaticSource::new("system", cpu_metrics(20.0)));
    let network: Arc<dyn MetricSource> = Arc::new(HangingSource);
    let h = harness(test_config(&dir, vec![cpu_rule(300)]), vec![system, network], false);

    let sample = h.daemon.sampler().tick().await;

    assert!(sample.metrics.contains_key("system"));
    assert!(!sample.metrics.contains_key("network"));
    assert_eq!(h.daemon.sampler().stats().source_failures, 1);
}

#[tokio::test]
async fn test_store_keeps_most_recent_after_cleanup() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir, vec![cpu_rule(0)]);
    config.alerting.max_alerts = 5;
    let h = harness(config, Vec::new(), false);

    let window = cpu_window(95.0);
    for _ in 0..8 {
        assert_eq!(h.daemon.evaluate_once(&window).alerts.len(), 1);
        h.clock.advance(Duration::from_secs(1));
    }
    h.daemon.dispatch_pending().await;

    let kept = h.daemon.store().all();
    assert_eq!(kept.len(), 5);
    assert_eq!(kept[0].timestamp, start_time() + chrono::Duration::seconds(3));
    assert_eq!(kept[4].timestamp, start_time() + chrono::Duration::seconds(7));
}

fn acknowledge_via_cli(path: &Path, id: &str) {
    let mut out = Vec::new();
    AlertCommand::new(path)
        .acknowledge(&mut out, &OutputFormat::default(), id)
        .unwrap();
}

#[tokio::test]
async fn test_cli_acknowledgement_survives_daemon_snapshot() {
    let dir = TempDir::new().unwrap();
    let h = harness(test_config(&dir, vec![cpu_rule(300)]), Vec::new(), false);
    let path = dir.path().join("alerts.json");

    h.daemon.evaluate_once(&cpu_window(95.0));
    h.daemon.dispatch_pending().await;
    assert!(h.daemon.persist_snapshot());

    let id = h.daemon.store().all()[0].id.clone();
    acknowledge_via_cli(&path, &id);

    // The daemon's next snapshot keeps the operator's flag.
    assert!(h.daemon.persist_snapshot());
    let on_disk = load_store(&path).unwrap();
    assert!(on_disk.get(&id).unwrap().acknowledged);
    assert_eq!(h.daemon.store().open_count(), 0);
}

#[tokio::test]
async fn test_restart_restores_history() {
    let dir = TempDir::new().unwrap();
    let first = harness(test_config(&dir, vec![cpu_rule(300)]), Vec::new(), false);
    first.daemon.evaluate_once(&cpu_window(95.0));
    first.daemon.dispatch_pending().await;
    assert!(first.daemon.persist_snapshot());

    let second = harness(test_config(&dir, vec![cpu_rule(300)]), Vec::new(), false);
    assert_eq!(second.daemon.store().len(), 1);
}

#[test]
fn test_invalid_rule_fails_fast() {
    let dir = TempDir::new().unwrap();
    let mut bad = cpu_rule(300);
    bad.condition = "__import__('os')".to_string();
    let config = test_config(&dir, vec![bad]);

    let result = Daemon::with_components(
        config,
        Vec::new(),
        Dispatcher::new(Dispatcher::DEFAULT_TIMEOUT),
        Arc::new(ManualClock::new(start_time())),
        None,
    );
    assert!(result.is_err());
}

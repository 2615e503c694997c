//! Daemon orchestration.
//!
//! The [`Daemon`] owns every pipeline component and runs them as
//! independent background loops:
//! - the sampler, polling metric sources on the sampling period
//! - the evaluator, which evaluates rules against the latest sample window
//!   and drains the alert queue through the dispatcher
//! - the snapshot writer, persisting the alert store periodically
//!
//! Loops exchange data only through the sampler's window channel and the
//! alert queue. Shutdown is cooperative: every loop finishes its current
//! tick, then remaining samples are flushed, pending alerts dispatched, and
//! the alert store persisted.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use vigil_alerts::{
    AlertQueue, AlertSnapshot, AlertStore, ChatWebhookChannel, ConsoleChannel, DispatchReport,
    Dispatcher, EmailChannel, EvaluationResult, RuleEngine,
};
use vigil_metrics::{
    Clock, LoopHandle, MetricSource, MetricView, NetworkSource, ProcessSource, SampleLog,
    SampleWindow, Sampler, Schedule, SystemClock, SystemSource, run_every,
};

use crate::config::VigilConfig;
use crate::error::Result;

/// Builds the dispatcher for the enabled notification channels.
///
/// # Errors
///
/// Returns an error if an enabled channel cannot be constructed.
pub fn build_dispatcher(config: &VigilConfig) -> Result<Dispatcher> {
    let timeout = config.dispatch_timeout();
    let notifications = &config.notifications;
    let mut dispatcher = Dispatcher::new(timeout);

    if notifications.console.enabled {
        dispatcher.register(Arc::new(
            ConsoleChannel::new().colored(notifications.console.colored),
        ));
    }
    if notifications.email.enabled {
        dispatcher.register(Arc::new(EmailChannel::new(
            &notifications.email.smtp,
            timeout,
        )?));
    }
    if notifications.chat.enabled {
        dispatcher.register(Arc::new(ChatWebhookChannel::new(
            notifications.chat.webhook_url.clone(),
            notifications.chat.channel.clone(),
            timeout,
        )?));
    }

    info!(channels = ?dispatcher.channel_names(), "notification channels configured");
    Ok(dispatcher)
}

/// The monitoring daemon.
#[derive(Debug)]
pub struct Daemon {
    config: VigilConfig,
    sampler: Arc<Sampler>,
    engine: RuleEngine,
    queue: AlertQueue,
    dispatcher: Dispatcher,
    store: AlertStore,
    clock: Arc<dyn Clock>,
}

impl Daemon {
    /// Creates a daemon with the built-in host and process sources and the
    /// channels enabled in `config`.
    ///
    /// This validates the configuration and opens the sample log but does
    /// not start any loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a rule fails to
    /// compile, the sample log directory cannot be created, or a channel
    /// cannot be constructed.
    pub fn new(config: VigilConfig) -> Result<Self> {
        config.validate()?;
        let log = SampleLog::open(&config.sampling.output_dir, config.sampling.max_file_bytes)?;
        let sources: Vec<Arc<dyn MetricSource>> = vec![
            Arc::new(SystemSource::new()),
            Arc::new(NetworkSource::new()),
            Arc::new(ProcessSource::current()?),
        ];
        let dispatcher = build_dispatcher(&config)?;
        Self::with_components(config, sources, dispatcher, Arc::new(SystemClock), Some(log))
    }

    /// Creates a daemon from explicit components.
    ///
    /// The configuration is validated and rules are compiled from it. The
    /// previous alert snapshot, if any, is loaded into the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a rule fails to
    /// compile, or rule names collide.
    pub fn with_components(
        config: VigilConfig,
        sources: Vec<Arc<dyn MetricSource>>,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
        log: Option<SampleLog>,
    ) -> Result<Self> {
        config.validate()?;
        let engine = RuleEngine::with_rules(config.compile_rules()?)?;

        let mut sampler = Sampler::new(config.sampler_config(), log).with_clock(Arc::clone(&clock));
        for source in sources {
            sampler.add_source(source);
        }

        let alerting = &config.alerting;
        let queue = AlertQueue::new(alerting.max_queue_size);
        let store = AlertStore::new(alerting.retention_days, alerting.max_alerts);
        match store.restore(&alerting.snapshot_path) {
            Ok(0) => {}
            Ok(count) => info!(count, path = %alerting.snapshot_path.display(), "alert history restored"),
            Err(e) => warn!(
                error = %e,
                path = %alerting.snapshot_path.display(),
                "failed to restore alert history, starting empty"
            ),
        }

        for action in engine.action_names() {
            if !dispatcher.has_channel(&action) {
                warn!(action = %action, "rules reference a channel that is not enabled");
            }
        }

        info!(
            host = %config.host(),
            rules = engine.rule_count(),
            sources = ?sampler.source_names(),
            "daemon initialized"
        );

        Ok(Self {
            config,
            sampler: Arc::new(sampler),
            engine,
            queue,
            dispatcher,
            store,
            clock,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &VigilConfig {
        &self.config
    }

    /// Returns the sampler.
    #[must_use]
    pub const fn sampler(&self) -> &Arc<Sampler> {
        &self.sampler
    }

    /// Returns the rule engine.
    #[must_use]
    pub const fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Returns the alert queue.
    #[must_use]
    pub const fn queue(&self) -> &AlertQueue {
        &self.queue
    }

    /// Returns the alert store.
    #[must_use]
    pub const fn store(&self) -> &AlertStore {
        &self.store
    }

    /// Evaluates every rule against `window` and enqueues the alerts.
    pub fn evaluate_once(&self, window: &SampleWindow) -> EvaluationResult {
        let view = MetricView::from_window(window);
        let result = self.engine.evaluate(&view, self.clock.now());
        self.queue.extend(result.alerts.iter().cloned());
        result
    }

    /// Dispatches everything queued, records it in the store, and applies
    /// retention.
    pub async fn dispatch_pending(&self) -> DispatchReport {
        let alerts = self.queue.drain();
        let report = if alerts.is_empty() {
            DispatchReport::default()
        } else {
            let report = self.dispatcher.dispatch(&alerts).await;
            self.store.extend(alerts);
            report
        };

        let removed = self.store.cleanup(self.clock.now());
        if removed > 0 {
            debug!(removed, "expired alerts removed");
        }
        report
    }

    /// Writes the alert snapshot.
    ///
    /// Acknowledge and resolve flags already in the file are merged first,
    /// so operator changes made through the CLI are kept. Failures are
    /// logged and reported as `false`.
    pub fn persist_snapshot(&self) -> bool {
        let path = &self.config.alerting.snapshot_path;
        if path.exists() {
            match AlertSnapshot::read(path) {
                Ok(existing) => {
                    let merged = self.store.merge_flags(&existing);
                    if merged > 0 {
                        info!(merged, "operator alert updates merged");
                    }
                }
                Err(e) => warn!(error = %e, path = %path.display(), "unreadable alert snapshot"),
            }
        }

        match self.store.persist(path, self.clock.now()) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, path = %path.display(), "failed to persist alert snapshot");
                false
            }
        }
    }

    fn spawn_evaluator(self: &Arc<Self>) -> LoopHandle {
        let daemon = Arc::clone(self);
        let mut windows = self.sampler.subscribe();
        let schedule = Schedule::new(self.config.evaluation_interval());

        LoopHandle::spawn("evaluator", move |shutdown| async move {
            let ticks = run_every(schedule, shutdown, move || {
                // Only a new sample is evaluated; a stale view could refire
                // a rule once its cooldown expires.
                let window = match windows.has_changed() {
                    Ok(true) => Some(Arc::clone(&windows.borrow_and_update())),
                    _ => None,
                };
                let daemon = Arc::clone(&daemon);
                async move {
                    if let Some(window) = window {
                        daemon.evaluate_once(&window);
                    }
                    daemon.dispatch_pending().await;
                }
            })
            .await;
            debug!(ticks, "evaluator finished");
        })
    }

    fn spawn_snapshots(self: &Arc<Self>) -> LoopHandle {
        let daemon = Arc::clone(self);
        let schedule = Schedule::new(self.config.snapshot_interval());

        LoopHandle::spawn("snapshots", move |shutdown| async move {
            run_every(schedule, shutdown, move || {
                let daemon = Arc::clone(&daemon);
                async move {
                    daemon.persist_snapshot();
                }
            })
            .await;
        })
    }

    /// Runs every loop until `shutdown` becomes `true`, then stops them in
    /// pipeline order and persists what is left.
    pub async fn run(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            host = %self.config.host(),
            sample_interval_ms = self.config.sampler_config().interval.as_millis() as u64,
            evaluation_interval_ms = self.config.evaluation_interval().as_millis() as u64,
            "daemon starting"
        );

        let sampler = self.sampler.start();
        let evaluator = self.spawn_evaluator();
        let snapshots = self.spawn_snapshots();

        // A dropped sender also means stop.
        let _ = shutdown.wait_for(|stop| *stop).await;
        info!("shutdown signal received, stopping daemon");

        sampler.stop().await;
        evaluator.stop().await;
        snapshots.stop().await;

        let report = self.dispatch_pending().await;
        if report.alerts > 0 {
            info!(alerts = report.alerts, "pending alerts dispatched on shutdown");
        }
        self.persist_snapshot();

        let stats = self.sampler.stats();
        info!(
            samples_taken = stats.samples_taken,
            samples_flushed = stats.samples_flushed,
            alerts = self.store.len(),
            queue_dropped = self.queue.dropped(),
            "daemon stopped"
        );
    }

    /// Spawns [`Daemon::run`] as a background task.
    pub fn start(self: &Arc<Self>) -> LoopHandle {
        let daemon = Arc::clone(self);
        LoopHandle::spawn("daemon", move |shutdown| async move {
            daemon.run(shutdown).await;
        })
    }
}

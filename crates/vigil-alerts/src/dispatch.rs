//! Delivery of alerts to their named channels.
//!
//! The [`Dispatcher`] maps action names to [`NotificationChannel`]s. For
//! every alert it calls each channel named in the alert's actions, bounded
//! by a timeout. A failing channel is logged and counted and never blocks
//! the remaining channels or alerts. Delivery is at most once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::channels::NotificationChannel;
use crate::error::AlertError;
use crate::types::Alert;

/// The outcome of one alert on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    /// The alert that was delivered.
    pub alert_id: String,
    /// The action name.
    pub channel: String,
    /// Whether delivery succeeded.
    pub success: bool,
    /// Error description on failure.
    pub message: Option<String>,
}

impl DeliveryResult {
    fn success(alert_id: &str, channel: &str) -> Self {
        Self {
            alert_id: alert_id.to_string(),
            channel: channel.to_string(),
            success: true,
            message: None,
        }
    }

    fn failure(alert_id: &str, channel: &str, message: impl Into<String>) -> Self {
        Self {
            alert_id: alert_id.to_string(),
            channel: channel.to_string(),
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Totals for one dispatch pass.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Alerts processed.
    pub alerts: usize,
    /// Successful channel deliveries.
    pub sent: usize,
    /// Failed or timed-out channel deliveries.
    pub failed: usize,
    /// Action names with no configured channel.
    pub skipped: usize,
    /// Every attempted delivery, in order.
    pub deliveries: Vec<DeliveryResult>,
}

/// Routes alerts to channels by action name.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    channels: HashMap<String, Arc<dyn NotificationChannel>>,
    timeout: Duration,
}

impl Dispatcher {
    /// Default per-call timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a dispatcher with no channels.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            channels: HashMap::new(),
            timeout,
        }
    }

    /// Registers a channel under its own name, replacing any previous one.
    pub fn register(&mut self, channel: Arc<dyn NotificationChannel>) {
        let name = channel.name().to_string();
        info!(channel = %name, "registered notification channel");
        self.channels.insert(name, channel);
    }

    /// Builder form of [`Dispatcher::register`].
    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.register(channel);
        self
    }

    /// Returns true if a channel with this name is registered.
    #[must_use]
    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Returns the registered channel names, sorted.
    #[must_use]
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the per-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delivers every alert to each channel named in its actions.
    pub async fn dispatch(&self, alerts: &[Alert]) -> DispatchReport {
        let mut report = DispatchReport {
            alerts: alerts.len(),
            ..DispatchReport::default()
        };

        for alert in alerts {
            for action in &alert.actions {
                let Some(channel) = self.channels.get(action) else {
                    report.skipped += 1;
                    warn!(alert_id = %alert.id, action = %action, "unknown notification channel, skipping");
                    continue;
                };

                let result = self.deliver(channel.as_ref(), alert).await;
                if result.success {
                    report.sent += 1;
                } else {
                    report.failed += 1;
                }
                report.deliveries.push(result);
            }
        }

        if report.alerts > 0 {
            debug!(
                alerts = report.alerts,
                sent = report.sent,
                failed = report.failed,
                skipped = report.skipped,
                "dispatch complete"
            );
        }
        report
    }

    async fn deliver(&self, channel: &dyn NotificationChannel, alert: &Alert) -> DeliveryResult {
        let name = channel.name();
        let error = match tokio::time::timeout(self.timeout, channel.send(alert)).await {
            Ok(Ok(())) => return DeliveryResult::success(&alert.id, name),
            Ok(Err(e)) => e,
            Err(_) => AlertError::ChannelTimeout {
                channel: name.to_string(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            },
        };

        warn!(channel = %name, alert_id = %alert.id, error = %error, "notification failed");
        DeliveryResult::failure(&alert.id, name, error.to_string())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::SendFuture;
    use crate::error::Result;
    use crate::expr::Condition;
    use crate::types::AlertRule;
    use chrono::Utc;
    use parking_lot::Mutex;
    use vigil_metrics::MetricView;

    #[derive(Debug, Default)]
    struct RecordingChannel {
        name: String,
        received: Mutex<Vec<String>>,
    }

    impl RecordingChannel {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                received: Mutex::new(Vec::new()),
            })
        }
    }

    impl NotificationChannel for RecordingChannel {
        fn name(&self) -> &str {
            &self.name
        }

        fn send<'a>(&'a self, alert: &'a Alert) -> SendFuture<'a> {
            Box::pin(async move {
                self.received.lock().push(alert.id.clone());
                Ok(())
            })
        }
    }

    #[derive(Debug)]
    struct FailingChannel;

    impl NotificationChannel for FailingChannel {
        fn name(&self) -> &str {
            "chat"
        }

        fn send<'a>(&'a self, _alert: &'a Alert) -> SendFuture<'a> {
            Box::pin(async { Err(AlertError::notification("chat", "connection refused")) })
        }
    }

    #[derive(Debug)]
    struct StuckChannel;

    impl NotificationChannel for StuckChannel {
        fn name(&self) -> &str {
            "email"
        }

        fn send<'a>(&'a self, _alert: &'a Alert) -> SendFuture<'a> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Result::Ok(())
            })
        }
    }

    fn alert(actions: &[&str]) -> Alert {
        let rule = AlertRule::builder("cpu_high", Condition::parse("true").unwrap())
            .actions(actions.iter().copied())
            .build()
            .unwrap();
        Alert::from_rule(&rule, &MetricView::default(), Utc::now())
    }

    #[tokio::test]
    async fn delivers_to_each_named_channel() {
        let console = RecordingChannel::new("console");
        let email = RecordingChannel::new("email");
        let dispatcher = Dispatcher::default()
            .with_channel(console.clone())
            .with_channel(email.clone());

        let a = alert(&["console", "email"]);
        let report = dispatcher.dispatch(std::slice::from_ref(&a)).await;

        assert_eq!(report.sent, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(*console.received.lock(), vec![a.id.clone()]);
        assert_eq!(*email.received.lock(), vec![a.id]);
    }

    #[tokio::test]
    async fn uses_each_alerts_own_actions() {
        let console = RecordingChannel::new("console");
        let email = RecordingChannel::new("email");
        let dispatcher = Dispatcher::default()
            .with_channel(console.clone())
            .with_channel(email.clone());

        dispatcher
            .dispatch(&[alert(&["console"]), alert(&["email"]), alert(&["email"])])
            .await;

        assert_eq!(console.received.lock().len(), 1);
        assert_eq!(email.received.lock().len(), 2);
    }

    #[tokio::test]
    async fn failure_does_not_block_other_channels() {
        let console = RecordingChannel::new("console");
        let dispatcher = Dispatcher::default()
            .with_channel(Arc::new(FailingChannel))
            .with_channel(console.clone());

        let report = dispatcher
            .dispatch(&[alert(&["chat", "console"]), alert(&["console"])])
            .await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.sent, 2);
        assert_eq!(console.received.lock().len(), 2);

        let failed = &report.deliveries[0];
        assert_eq!(failed.channel, "chat");
        assert!(failed.message.as_deref().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn unknown_action_is_skipped() {
        let console = RecordingChannel::new("console");
        let dispatcher = Dispatcher::default().with_channel(console.clone());

        let report = dispatcher.dispatch(&[alert(&["pager", "console"])]).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_channel_times_out() {
        let console = RecordingChannel::new("console");
        let dispatcher = Dispatcher::new(Duration::from_secs(5))
            .with_channel(Arc::new(StuckChannel))
            .with_channel(console.clone());

        let report = dispatcher.dispatch(&[alert(&["email", "console"])]).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.sent, 1);
        assert!(report.deliveries[0].message.as_deref().unwrap().contains("timed out"));
    }

    #[test]
    fn channel_names_sorted() {
        let dispatcher = Dispatcher::default()
            .with_channel(RecordingChannel::new("email"))
            .with_channel(RecordingChannel::new("console"));
        assert_eq!(dispatcher.channel_names(), vec!["console", "email"]);
        assert!(dispatcher.has_channel("email"));
        assert!(!dispatcher.has_channel("chat"));
    }
}

//! Core types for the alerting pipeline.
//!
//! This module provides the fundamental types used throughout the vigil-alerts crate:
//! - [`AlertSeverity`]: The severity level of an alert
//! - [`AlertRule`]: A condition, its severity and actions, and its cooldown state
//! - [`RuleSpec`]: The configuration-file form of a rule
//! - [`Alert`]: One triggered alert and its acknowledge/resolve lifecycle

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_metrics::{MetricView, Metrics};

use crate::error::{AlertError, Result};
use crate::expr::Condition;

/// The `source` recorded on alerts raised by the rule engine.
pub const ENGINE_SOURCE: &str = "rule_engine";

/// The severity level of an alert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational alert, no action required.
    Info,
    /// Warning alert, should be investigated.
    #[default]
    Warning,
    /// Critical alert, requires immediate attention.
    Critical,
}

impl AlertSeverity {
    /// All severities, least urgent first.
    pub const ALL: [Self; 3] = [Self::Info, Self::Warning, Self::Critical];

    /// Returns the severity as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    /// Returns the priority of this severity (higher = more urgent).
    #[must_use]
    pub const fn priority(&self) -> u8 {
        match self {
            Self::Info => 1,
            Self::Warning => 2,
            Self::Critical => 3,
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "critical" => Ok(Self::Critical),
            other => Err(AlertError::InvalidRule {
                reason: format!("unknown severity '{other}'"),
            }),
        }
    }
}

/// A rule that defines when and how to raise an alert.
///
/// Everything but `last_triggered_at` is fixed once configured;
/// `last_triggered_at` is only moved forward by the rule engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique rule name.
    pub name: String,
    /// The condition that triggers this rule.
    pub condition: Condition,
    /// The severity of alerts raised by this rule.
    pub severity: AlertSeverity,
    /// Channel names to notify, in order.
    pub actions: Vec<String>,
    /// Minimum seconds between two alerts from this rule.
    pub cooldown_secs: u64,
    /// When this rule last raised an alert.
    pub last_triggered_at: Option<DateTime<Utc>>,
    /// Whether this rule is evaluated.
    pub enabled: bool,
}

impl AlertRule {
    /// Maximum allowed length for rule names.
    pub const MAX_NAME_LENGTH: usize = 256;

    /// Creates a new alert rule builder.
    pub fn builder(name: impl Into<String>, condition: Condition) -> AlertRuleBuilder {
        AlertRuleBuilder::new(name, condition)
    }

    /// Returns the cooldown as a [`Duration`].
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Returns true if the rule fired less than one cooldown before `now`.
    #[must_use]
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        let Some(last) = self.last_triggered_at else {
            return false;
        };
        let cooldown = i64::try_from(self.cooldown_secs).unwrap_or(i64::MAX);
        now.signed_duration_since(last).num_seconds() < cooldown
    }

    /// Records a trigger at `now`. Never moves the timestamp backwards.
    pub fn mark_triggered(&mut self, now: DateTime<Utc>) {
        self.last_triggered_at = Some(self.last_triggered_at.map_or(now, |last| last.max(now)));
    }
}

/// Builder for creating [`AlertRule`] instances.
#[derive(Debug)]
pub struct AlertRuleBuilder {
    name: String,
    condition: Condition,
    severity: AlertSeverity,
    actions: Vec<String>,
    cooldown_secs: u64,
    enabled: bool,
}

impl AlertRuleBuilder {
    /// Creates a new builder with required fields.
    fn new(name: impl Into<String>, condition: Condition) -> Self {
        Self {
            name: name.into(),
            condition,
            severity: AlertSeverity::Warning,
            actions: vec!["console".to_string()],
            cooldown_secs: 300,
            enabled: true,
        }
    }

    /// Sets the severity level.
    #[must_use]
    pub const fn severity(mut self, severity: AlertSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Replaces the action list.
    #[must_use]
    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the cooldown in seconds.
    #[must_use]
    pub const fn cooldown_secs(mut self, secs: u64) -> Self {
        self.cooldown_secs = secs;
        self
    }

    /// Sets whether the rule is enabled.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builds the [`AlertRule`].
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if:
    /// - The name is empty
    /// - The name exceeds the maximum length
    /// - An action name is empty
    pub fn build(self) -> Result<AlertRule> {
        if self.name.is_empty() {
            return Err(AlertError::InvalidRule {
                reason: "rule name cannot be empty".to_string(),
            });
        }

        if self.name.len() > AlertRule::MAX_NAME_LENGTH {
            return Err(AlertError::InvalidRule {
                reason: format!(
                    "rule name exceeds maximum length of {} characters",
                    AlertRule::MAX_NAME_LENGTH
                ),
            });
        }

        if self.actions.iter().any(|a| a.trim().is_empty()) {
            return Err(AlertError::InvalidRule {
                reason: format!("rule '{}' has an empty action name", self.name),
            });
        }

        Ok(AlertRule {
            name: self.name,
            condition: self.condition,
            severity: self.severity,
            actions: self.actions,
            cooldown_secs: self.cooldown_secs,
            last_triggered_at: None,
            enabled: self.enabled,
        })
    }
}

fn default_actions() -> Vec<String> {
    vec!["console".to_string()]
}

const fn default_cooldown() -> u64 {
    300
}

const fn default_enabled() -> bool {
    true
}

/// A rule as written in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Unique rule name.
    pub name: String,
    /// Condition source text.
    pub condition: String,
    /// Severity of raised alerts.
    #[serde(default)]
    pub severity: AlertSeverity,
    /// Channel names to notify.
    #[serde(default = "default_actions")]
    pub actions: Vec<String>,
    /// Minimum seconds between alerts.
    #[serde(default = "default_cooldown", alias = "cooldown_secs")]
    pub cooldown_seconds: u64,
    /// Whether the rule is evaluated.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RuleSpec {
    /// Parses the condition and builds the rule.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::ParseError` if the condition does not parse, or
    /// `AlertError::InvalidRule` if the rule is otherwise malformed.
    pub fn compile(&self) -> Result<AlertRule> {
        let condition = Condition::parse(&self.condition).map_err(|e| match e {
            AlertError::ParseError { position, reason } => AlertError::ParseError {
                position,
                reason: format!("rule '{}': {reason}", self.name),
            },
            other => other,
        })?;

        AlertRule::builder(self.name.clone(), condition)
            .severity(self.severity)
            .actions(self.actions.clone())
            .cooldown_secs(self.cooldown_seconds)
            .enabled(self.enabled)
            .build()
    }
}

impl From<&AlertRule> for RuleSpec {
    fn from(rule: &AlertRule) -> Self {
        Self {
            name: rule.name.clone(),
            condition: rule.condition.source().to_string(),
            severity: rule.severity,
            actions: rule.actions.clone(),
            cooldown_seconds: rule.cooldown_secs,
            enabled: rule.enabled,
        }
    }
}

static ALERT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Returns a process-unique alert id: `"{rule}_{unix_millis}_{seq}"`.
fn next_alert_id(rule_name: &str, at: DateTime<Utc>) -> String {
    let seq = ALERT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{rule_name}_{}_{seq}", at.timestamp_millis())
}

/// `"high_cpu_usage"` -> `"High Cpu Usage"`.
fn title_case(name: &str) -> String {
    name.split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A triggered alert.
///
/// Created by the rule engine; afterwards only `acknowledged` and
/// `resolved` change, and only through the alert store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier for this alert.
    pub id: String,
    /// The rule that raised this alert.
    pub rule_name: String,
    /// The severity of the alert.
    pub severity: AlertSeverity,
    /// Short human-readable headline.
    pub title: String,
    /// Longer description.
    pub message: String,
    /// When the alert was raised.
    pub timestamp: DateTime<Utc>,
    /// The component that raised the alert.
    pub source: String,
    /// The metric values that caused the trigger.
    #[serde(default)]
    pub metrics: Metrics,
    /// Whether an operator has acknowledged the alert.
    #[serde(default)]
    pub acknowledged: bool,
    /// Whether an operator has resolved the alert.
    #[serde(default)]
    pub resolved: bool,
    /// Channel names to notify, copied from the rule.
    #[serde(default)]
    pub actions: Vec<String>,
}

impl Alert {
    /// Creates an alert for `rule`, triggered by `view` at `now`.
    #[must_use]
    pub fn from_rule(rule: &AlertRule, view: &MetricView, now: DateTime<Utc>) -> Self {
        Self {
            id: next_alert_id(&rule.name, now),
            rule_name: rule.name.clone(),
            severity: rule.severity,
            title: format!(
                "{}: {}",
                rule.severity.as_str().to_uppercase(),
                title_case(&rule.name)
            ),
            message: format!(
                "Alert triggered by rule: {}\nCondition: {}",
                rule.name, rule.condition
            ),
            timestamp: now,
            source: ENGINE_SOURCE.to_string(),
            metrics: rule.condition.snapshot(view),
            acknowledged: false,
            resolved: false,
            actions: rule.actions.clone(),
        }
    }

    /// Returns true if the alert is neither acknowledged nor resolved.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        !self.acknowledged && !self.resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use vigil_metrics::MetricValue;

    fn rule(cooldown: u64) -> AlertRule {
        AlertRule::builder("cpu_high", Condition::parse(r#"metrics["cpu"] > 90"#).unwrap())
            .severity(AlertSeverity::Warning)
            .actions(["console", "email"])
            .cooldown_secs(cooldown)
            .build()
            .unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    mod severity_tests {
        use super::*;

        #[test]
        fn severity_as_str() {
            assert_eq!(AlertSeverity::Info.as_str(), "info");
            assert_eq!(AlertSeverity::Warning.as_str(), "warning");
            assert_eq!(AlertSeverity::Critical.as_str(), "critical");
        }

        #[test]
        fn severity_priority() {
            assert!(AlertSeverity::Info.priority() < AlertSeverity::Warning.priority());
            assert!(AlertSeverity::Warning.priority() < AlertSeverity::Critical.priority());
        }

        #[test]
        fn severity_from_str() {
            assert_eq!("CRITICAL".parse::<AlertSeverity>().unwrap(), AlertSeverity::Critical);
            assert!("fatal".parse::<AlertSeverity>().is_err());
        }

        #[test]
        fn severity_serialization() {
            let json = serde_json::to_string(&AlertSeverity::Critical).unwrap();
            assert_eq!(json, "\"critical\"");
        }
    }

    mod rule_tests {
        use super::*;

        #[test]
        fn builder_defaults() {
            let rule = AlertRule::builder("r", Condition::parse("x > 1").unwrap())
                .build()
                .unwrap();
            assert_eq!(rule.severity, AlertSeverity::Warning);
            assert_eq!(rule.actions, vec!["console".to_string()]);
            assert_eq!(rule.cooldown(), Duration::from_secs(300));
            assert!(rule.enabled);
            assert!(rule.last_triggered_at.is_none());
        }

        #[test]
        fn builder_rejects_empty_name() {
            let result = AlertRule::builder("", Condition::parse("x > 1").unwrap()).build();
            assert!(matches!(result, Err(AlertError::InvalidRule { .. })));
        }

        #[test]
        fn builder_rejects_long_name() {
            let name = "r".repeat(AlertRule::MAX_NAME_LENGTH + 1);
            let result = AlertRule::builder(name, Condition::parse("x > 1").unwrap()).build();
            assert!(result.is_err());
        }

        #[test]
        fn builder_rejects_empty_action() {
            let result = AlertRule::builder("r", Condition::parse("x > 1").unwrap())
                .actions(["console", " "])
                .build();
            assert!(result.is_err());
        }

        #[test]
        fn cooldown_window() {
            let mut rule = rule(300);
            assert!(!rule.in_cooldown(at(0)));

            rule.mark_triggered(at(0));
            assert!(rule.in_cooldown(at(100)));
            assert!(rule.in_cooldown(at(299)));
            assert!(!rule.in_cooldown(at(300)));
            assert!(!rule.in_cooldown(at(400)));
        }

        #[test]
        fn zero_cooldown_never_suppresses() {
            let mut rule = rule(0);
            rule.mark_triggered(at(0));
            assert!(!rule.in_cooldown(at(0)));
        }

        #[test]
        fn mark_triggered_is_monotonic() {
            let mut rule = rule(300);
            rule.mark_triggered(at(100));
            rule.mark_triggered(at(50));
            assert_eq!(rule.last_triggered_at, Some(at(100)));
        }
    }

    mod spec_tests {
        use super::*;

        #[test]
        fn compile_from_toml_fields() {
            let spec: RuleSpec = serde_json::from_str(
                r#"{"name": "low_disk", "condition": "disk_free_percent < 10", "severity": "critical"}"#,
            )
            .unwrap();
            assert_eq!(spec.cooldown_seconds, 300);
            assert_eq!(spec.actions, vec!["console".to_string()]);

            let rule = spec.compile().unwrap();
            assert_eq!(rule.severity, AlertSeverity::Critical);
            assert_eq!(rule.condition.source(), "disk_free_percent < 10");
        }

        #[test]
        fn compile_names_rule_in_parse_error() {
            let spec = RuleSpec {
                name: "broken".to_string(),
                condition: "cpu >".to_string(),
                severity: AlertSeverity::Info,
                actions: vec![],
                cooldown_seconds: 0,
                enabled: true,
            };
            let err = spec.compile().unwrap_err();
            assert!(err.to_string().contains("rule 'broken'"));
        }

        #[test]
        fn spec_from_rule() {
            let spec = RuleSpec::from(&rule(60));
            assert_eq!(spec.condition, r#"metrics["cpu"] > 90"#);
            assert_eq!(spec.cooldown_seconds, 60);
        }
    }

    mod alert_tests {
        use super::*;

        fn view() -> MetricView {
            let mut values = Metrics::new();
            values.insert("cpu".to_string(), MetricValue::Scalar(95.0));
            values.insert("memory".to_string(), MetricValue::Scalar(40.0));
            MetricView::from_metrics(values)
        }

        #[test]
        fn alert_from_rule() {
            let alert = Alert::from_rule(&rule(300), &view(), at(0));

            assert!(alert.id.starts_with("cpu_high_1700000000000_"));
            assert_eq!(alert.rule_name, "cpu_high");
            assert_eq!(alert.severity, AlertSeverity::Warning);
            assert_eq!(alert.title, "WARNING: Cpu High");
            assert_eq!(
                alert.message,
                "Alert triggered by rule: cpu_high\nCondition: metrics[\"cpu\"] > 90"
            );
            assert_eq!(alert.source, ENGINE_SOURCE);
            assert_eq!(alert.actions, vec!["console".to_string(), "email".to_string()]);
            assert!(alert.is_open());
        }

        #[test]
        fn alert_metrics_are_the_condition_subset() {
            let alert = Alert::from_rule(&rule(300), &view(), at(0));
            assert_eq!(alert.metrics.len(), 1);
            assert_eq!(alert.metrics.get("cpu"), Some(&MetricValue::Scalar(95.0)));
        }

        #[test]
        fn alert_ids_are_unique() {
            let rule = rule(0);
            let ids: HashSet<String> = (0..100)
                .map(|_| Alert::from_rule(&rule, &view(), at(0)).id)
                .collect();
            assert_eq!(ids.len(), 100);
        }

        #[test]
        fn alert_serialization_roundtrip() {
            let alert = Alert::from_rule(&rule(300), &view(), at(0));
            let json = serde_json::to_string(&alert).unwrap();
            let parsed: Alert = serde_json::from_str(&json).unwrap();
            assert_eq!(alert, parsed);
        }

        #[test]
        fn title_case_words() {
            assert_eq!(title_case("high_cpu_usage"), "High Cpu Usage");
            assert_eq!(title_case("slow_SSH"), "Slow Ssh");
            assert_eq!(title_case("x"), "X");
        }
    }
}

//! Daemon configuration.
//!
//! Configuration for the Vigil daemon, loaded from TOML:
//! - Sampling period, flush policy, and sample log location
//! - Rule evaluation period, alert retention, and snapshotting
//! - Notification channel parameters
//! - Alert rules (the built-in set when none are given)
//!
//! Every section is optional. The defaults run offline with only the
//! console channel enabled.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vigil_alerts::{AlertRule, EmailConfig, RuleSpec, default_rule_specs};
use vigil_metrics::{DEFAULT_MAX_FILE_BYTES, SampleType, SamplerConfig, local_hostname};

use crate::error::{DaemonError, Result};

/// Longest accepted period or timeout, in seconds (one week).
const MAX_PERIOD_SECS: f64 = 604_800.0;

/// Longest accepted alert retention.
const MAX_RETENTION_DAYS: u32 = 36_500;

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

fn check_period(name: &str, value: f64) -> Result<Duration> {
    let in_range = value > 0.0 && value <= MAX_PERIOD_SECS;
    if !in_range {
        return Err(DaemonError::Config(format!(
            "{name} must be greater than 0 and at most {MAX_PERIOD_SECS} seconds"
        )));
    }
    match Duration::try_from_secs_f64(value) {
        Ok(period) if !period.is_zero() => Ok(period),
        _ => Err(DaemonError::Config(format!(
            "{name} is shorter than one nanosecond"
        ))),
    }
}

fn check_nonzero(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(DaemonError::Config(format!("{name} must be greater than 0")));
    }
    Ok(())
}

/// Sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Seconds between samples.
    pub interval_secs: f64,
    /// Buffered samples that trigger a flush.
    pub flush_threshold: usize,
    /// Time budget for one source per tick, in seconds.
    pub source_timeout_secs: f64,
    /// Directory of the sample log.
    pub output_dir: PathBuf,
    /// Size at which the sample log rotates to a new file.
    pub max_file_bytes: u64,
    /// Recent samples used for the derived window keys.
    pub window_size: usize,
    /// Sample type stamped on every combined sample.
    pub sample_type: SampleType,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 1.0,
            flush_threshold: 1000,
            source_timeout_secs: 2.0,
            output_dir: PathBuf::from("monitoring_data"),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            window_size: 10,
            sample_type: SampleType::System,
        }
    }
}

/// Alerting settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Seconds between rule evaluations.
    pub evaluation_interval_secs: f64,
    /// Days an alert is kept.
    pub retention_days: u32,
    /// Alerts kept after cleanup.
    pub max_alerts: usize,
    /// Capacity of the queue between evaluation and dispatch.
    pub max_queue_size: usize,
    /// Location of the alert snapshot.
    pub snapshot_path: PathBuf,
    /// Seconds between alert snapshots.
    pub snapshot_interval_secs: f64,
    /// Time budget for one channel delivery, in seconds.
    pub dispatch_timeout_secs: f64,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_secs: 10.0,
            retention_days: 30,
            max_alerts: 1000,
            max_queue_size: 256,
            snapshot_path: PathBuf::from("alerts.json"),
            snapshot_interval_secs: 60.0,
            dispatch_timeout_secs: 10.0,
        }
    }
}

/// Console channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSettings {
    /// Whether the channel is registered.
    pub enabled: bool,
    /// Whether ANSI colors are used.
    pub colored: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            colored: true,
        }
    }
}

/// Email channel settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    /// Whether the channel is registered.
    pub enabled: bool,
    /// SMTP parameters.
    #[serde(flatten)]
    pub smtp: EmailConfig,
}

/// Chat webhook settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Whether the channel is registered.
    pub enabled: bool,
    /// Incoming-webhook URL.
    pub webhook_url: String,
    /// Target chat channel.
    pub channel: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: String::new(),
            channel: "#alerts".to_string(),
        }
    }
}

/// Notification channel settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Console output.
    pub console: ConsoleSettings,
    /// SMTP email.
    pub email: EmailSettings,
    /// Chat webhook.
    pub chat: ChatSettings,
}

/// Main daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    /// Host identifier; the system host name when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Sampling settings.
    pub sampling: SamplingConfig,
    /// Alerting settings.
    pub alerting: AlertingConfig,
    /// Notification channels.
    pub notifications: NotificationsConfig,
    /// Alert rules; the built-in set when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<RuleSpec>>,
}

impl VigilConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            DaemonError::Config(format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Load configuration from a file, or the defaults if `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| DaemonError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| DaemonError::Format(e.to_string()))
    }

    /// Write the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Returns a configuration with the built-in rules spelled out.
    #[must_use]
    pub fn sample() -> Self {
        Self {
            rules: Some(default_rule_specs()),
            ..Self::default()
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range, a rule is invalid, or
    /// an enabled channel lacks its parameters.
    pub fn validate(&self) -> Result<()> {
        check_period("sampling.interval_secs", self.sampling.interval_secs)?;
        check_period("sampling.source_timeout_secs", self.sampling.source_timeout_secs)?;
        check_nonzero("sampling.flush_threshold", self.sampling.flush_threshold)?;
        check_nonzero("sampling.window_size", self.sampling.window_size)?;
        if self.sampling.max_file_bytes == 0 {
            return Err(DaemonError::Config(
                "sampling.max_file_bytes must be greater than 0".to_string(),
            ));
        }

        self.sampler_config().validate()?;

        check_period(
            "alerting.evaluation_interval_secs",
            self.alerting.evaluation_interval_secs,
        )?;
        check_period(
            "alerting.snapshot_interval_secs",
            self.alerting.snapshot_interval_secs,
        )?;
        check_period(
            "alerting.dispatch_timeout_secs",
            self.alerting.dispatch_timeout_secs,
        )?;
        if self.alerting.retention_days > MAX_RETENTION_DAYS {
            return Err(DaemonError::Config(format!(
                "alerting.retention_days must be at most {MAX_RETENTION_DAYS}"
            )));
        }
        check_nonzero("alerting.max_alerts", self.alerting.max_alerts)?;
        check_nonzero("alerting.max_queue_size", self.alerting.max_queue_size)?;

        if self.host.as_deref().is_some_and(str::is_empty) {
            return Err(DaemonError::Config("host cannot be empty".to_string()));
        }

        let email = &self.notifications.email;
        if email.enabled {
            if email.smtp.smtp_server.is_empty() {
                return Err(DaemonError::Config(
                    "notifications.email.smtp_server is required when email is enabled"
                        .to_string(),
                ));
            }
            if email.smtp.to_addresses.is_empty() {
                return Err(DaemonError::Config(
                    "notifications.email.to_addresses is required when email is enabled"
                        .to_string(),
                ));
            }
        }

        let chat = &self.notifications.chat;
        if chat.enabled && chat.webhook_url.is_empty() {
            return Err(DaemonError::Config(
                "notifications.chat.webhook_url is required when chat is enabled".to_string(),
            ));
        }

        self.compile_rules().map(|_| ())
    }

    /// Returns the rule specs in effect.
    #[must_use]
    pub fn rule_specs(&self) -> Vec<RuleSpec> {
        self.rules.clone().unwrap_or_else(default_rule_specs)
    }

    /// Parses every rule.
    ///
    /// # Errors
    ///
    /// Returns an error if a condition does not parse or two rules share a
    /// name.
    pub fn compile_rules(&self) -> Result<Vec<AlertRule>> {
        let specs = self.rule_specs();
        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(DaemonError::Config(format!(
                    "duplicate rule name '{}'",
                    spec.name
                )));
            }
        }

        specs
            .iter()
            .map(|spec| spec.compile().map_err(DaemonError::from))
            .collect()
    }

    /// Returns the host identifier in effect.
    #[must_use]
    pub fn host(&self) -> String {
        self.host.clone().unwrap_or_else(local_hostname)
    }

    /// Returns the sampler settings.
    #[must_use]
    pub fn sampler_config(&self) -> SamplerConfig {
        let mut config = SamplerConfig::default()
            .with_interval(secs(self.sampling.interval_secs))
            .with_flush_threshold(self.sampling.flush_threshold)
            .with_source_timeout(secs(self.sampling.source_timeout_secs))
            .with_host(self.host())
            .with_sample_type(self.sampling.sample_type);
        config.window_size = self.sampling.window_size;
        config
    }

    /// Returns the evaluation period.
    #[must_use]
    pub fn evaluation_interval(&self) -> Duration {
        secs(self.alerting.evaluation_interval_secs)
    }

    /// Returns the snapshot period.
    #[must_use]
    pub fn snapshot_interval(&self) -> Duration {
        secs(self.alerting.snapshot_interval_secs)
    }

    /// Returns the per-delivery timeout.
    #[must_use]
    pub fn dispatch_timeout(&self) -> Duration {
        secs(self.alerting.dispatch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use vigil_alerts::AlertSeverity;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("failed to write temp file");
        file
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn empty_config_uses_defaults() {
            let config = VigilConfig::from_toml("").expect("empty config should parse");

            assert_eq!(config, VigilConfig::default());
            assert_eq!(config.sampling.interval_secs, 1.0);
            assert_eq!(config.alerting.max_alerts, 1000);
            assert!(config.notifications.console.enabled);
            assert!(!config.notifications.email.enabled);
            assert!(!config.notifications.chat.enabled);
            assert_eq!(config.compile_rules().unwrap().len(), 10);
        }

        #[test]
        fn full_config() {
            let toml = r##"
                host = "bench-01"

                [sampling]
                interval_secs = 0.5
                flush_threshold = 50
                output_dir = "/tmp/vigil"

                [alerting]
                evaluation_interval_secs = 5
                retention_days = 7
                max_alerts = 100

                [notifications.console]
                colored = false

                [notifications.email]
                enabled = true
                smtp_server = "mail.internal"
                smtp_port = 2525
                to_addresses = ["ops@internal"]

                [notifications.chat]
                enabled = true
                webhook_url = "https://hooks.example.com/T000"
                channel = "#ops"

                [[rules]]
                name = "cpu_high"
                condition = 'metrics["cpu_percent_total"] > 90'
                severity = "critical"
                actions = ["console", "chat"]
                cooldown_seconds = 120
            "##;

            let config = VigilConfig::from_toml(toml).expect("full config should parse");

            assert_eq!(config.host(), "bench-01");
            assert_eq!(config.sampler_config().interval, Duration::from_millis(500));
            assert_eq!(config.sampler_config().flush_threshold, 50);
            assert_eq!(config.evaluation_interval(), Duration::from_secs(5));
            assert_eq!(config.alerting.retention_days, 7);
            assert!(!config.notifications.console.colored);
            assert_eq!(config.notifications.email.smtp.smtp_port, 2525);
            assert_eq!(config.notifications.email.smtp.from_address, "alerts@vigil.local");
            assert_eq!(config.notifications.chat.channel, "#ops");

            let rules = config.compile_rules().unwrap();
            assert_eq!(rules.len(), 1);
            assert_eq!(rules[0].severity, AlertSeverity::Critical);
            assert_eq!(rules[0].cooldown_secs, 120);
        }

        #[test]
        fn from_file() {
            let file = create_temp_config("[alerting]\nmax_alerts = 5\n");
            let config = VigilConfig::from_file(file.path()).unwrap();
            assert_eq!(config.alerting.max_alerts, 5);
        }

        #[test]
        fn missing_file() {
            let result = VigilConfig::from_file("/nonexistent/vigil.toml");
            assert!(matches!(result, Err(DaemonError::Config(_))));
        }

        #[test]
        fn invalid_toml() {
            let result = VigilConfig::from_toml("[sampling\ninterval_secs = ");
            assert!(matches!(result, Err(DaemonError::Config(_))));
        }
    }

    mod validation_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("[sampling]\ninterval_secs = 0" ; "zero sample interval")]
        #[test_case("[sampling]\ninterval_secs = -1.0" ; "negative sample interval")]
        #[test_case("[sampling]\nflush_threshold = 0" ; "zero flush threshold")]
        #[test_case("[sampling]\ninterval_secs = 1e300" ; "sample interval too long")]
        #[test_case("[sampling]\nsource_timeout_secs = nan" ; "nan source timeout")]
        #[test_case("[alerting]\nevaluation_interval_secs = 0" ; "zero evaluation interval")]
        #[test_case("[alerting]\nevaluation_interval_secs = 1e-12" ; "sub nanosecond evaluation interval")]
        #[test_case("[alerting]\nsnapshot_interval_secs = inf" ; "infinite snapshot interval")]
        #[test_case("[alerting]\nretention_days = 4294967295" ; "retention past the calendar")]
        #[test_case("[sampling]\nwindow_size = 0" ; "zero window")]
        #[test_case("[alerting]\nmax_alerts = 0" ; "zero max alerts")]
        #[test_case("[alerting]\nmax_queue_size = 0" ; "zero queue size")]
        #[test_case("host = \"\"" ; "empty host")]
        #[test_case("[notifications.chat]\nenabled = true" ; "chat without url")]
        #[test_case("[notifications.email]\nenabled = true\nsmtp_server = \"\"" ; "email without server")]
        #[test_case("[notifications.email]\nenabled = true\nto_addresses = []" ; "email without recipients")]
        fn rejects(toml: &str) {
            assert!(matches!(VigilConfig::from_toml(toml), Err(DaemonError::Config(_))));
        }

        #[test]
        fn rejects_unparsable_rule() {
            let toml = r#"
                [[rules]]
                name = "bad"
                condition = "cpu >"
            "#;
            let err = VigilConfig::from_toml(toml).unwrap_err();
            assert!(matches!(err, DaemonError::Alerts(_)));
            assert!(err.to_string().contains("bad"));
        }

        #[test]
        fn rejects_duplicate_rule_names() {
            let toml = r#"
                [[rules]]
                name = "cpu"
                condition = "cpu > 1"

                [[rules]]
                name = "cpu"
                condition = "cpu > 2"
            "#;
            let err = VigilConfig::from_toml(toml).unwrap_err();
            assert!(err.to_string().contains("duplicate rule name 'cpu'"));
        }

        #[test]
        fn accepted_periods_are_never_zero() {
            let toml = "[sampling]\ninterval_secs = 1e-9\n[alerting]\nevaluation_interval_secs = 604800";
            let config = VigilConfig::from_toml(toml).unwrap();

            assert_eq!(config.sampler_config().interval, Duration::from_nanos(1));
            assert_eq!(config.evaluation_interval(), Duration::from_secs(604_800));
        }

        #[test]
        fn sample_type_is_configurable() {
            let config = VigilConfig::from_toml("[sampling]\nsample_type = \"hardware\"").unwrap();
            assert_eq!(config.sampler_config().sample_type, SampleType::Hardware);
        }

        #[test]
        fn empty_rule_list_is_allowed() {
            let config = VigilConfig::from_toml("rules = []").unwrap();
            assert!(config.compile_rules().unwrap().is_empty());
        }
    }

    mod roundtrip_tests {
        use super::*;

        #[test]
        fn sample_config_survives_save_and_load() {
            let dir = tempfile::TempDir::new().unwrap();
            let path = dir.path().join("conf").join("vigil.toml");

            let config = VigilConfig::sample();
            config.save(&path).unwrap();
            let loaded = VigilConfig::from_file(&path).unwrap();

            assert_eq!(loaded, config);
            assert_eq!(loaded.rule_specs().len(), 10);
        }
    }
}

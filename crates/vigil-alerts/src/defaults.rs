//! The rule set used when no rules are configured.

use crate::error::Result;
use crate::types::{AlertRule, AlertSeverity, RuleSpec};

fn spec(
    name: &str,
    condition: &str,
    severity: AlertSeverity,
    actions: &[&str],
    cooldown_seconds: u64,
) -> RuleSpec {
    RuleSpec {
        name: name.to_string(),
        condition: condition.to_string(),
        severity,
        actions: actions.iter().map(|a| (*a).to_string()).collect(),
        cooldown_seconds,
        enabled: true,
    }
}

/// Returns the default rules in configuration form.
#[must_use]
pub fn default_rule_specs() -> Vec<RuleSpec> {
    use AlertSeverity::{Critical, Info, Warning};

    vec![
        spec("high_cpu_usage", "cpu_percent_total > 90", Warning, &["console", "email"], 300),
        spec("high_memory_usage", "memory_used_percent > 95", Critical, &["console", "email"], 300),
        spec("high_error_rate", "error_rate > 10", Warning, &["console", "chat"], 60),
        spec(
            "slow_connection_time",
            "connection_time_avg_ms > 2000",
            Warning,
            &["console"],
            60,
        ),
        spec(
            "unreachable_containers",
            "unreachable_containers > 0",
            Critical,
            &["console", "email", "chat"],
            30,
        ),
        // Absent disk metrics must not read as 0% free.
        spec(
            "low_disk_space",
            "count(disk_free_percent) > 0 and disk_free_percent < 10",
            Warning,
            &["console", "email"],
            3600,
        ),
        spec(
            "high_core_temperature",
            "max(temperatures.core) > 85",
            Warning,
            &["console", "email"],
            300,
        ),
        spec(
            "network_packet_loss",
            "network_packet_loss_percent > 5",
            Warning,
            &["console"],
            60,
        ),
        spec(
            "long_benchmark_duration",
            "benchmark_duration_seconds > 3600",
            Info,
            &["console"],
            3600,
        ),
        // Idle hosts swing widely in relative terms; only a busy, unstable CPU counts.
        spec(
            "high_variability",
            "cpu_percent_total_avg > 25 and cpu_percent_total_cv > 20",
            Warning,
            &["console"],
            300,
        ),
    ]
}

/// Compiles the default rules.
///
/// # Errors
///
/// Returns an error only if a built-in condition fails to parse.
pub fn default_rules() -> Result<Vec<AlertRule>> {
    default_rule_specs().iter().map(RuleSpec::compile).collect()
}

//! Rule evaluation with per-rule cooldown.
//!
//! The [`RuleEngine`] holds an ordered rule set. Each call to
//! [`RuleEngine::evaluate`] checks every enabled rule against one
//! [`MetricView`] and returns the alerts that fired. A rule whose condition
//! fails to evaluate is logged and counted, never fatal to the others.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use vigil_metrics::MetricView;

use crate::error::{AlertError, Result};
use crate::types::{Alert, AlertRule};

/// The result of one evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct EvaluationResult {
    /// Number of enabled rules evaluated.
    pub rules_evaluated: usize,
    /// Number of rules whose condition failed to evaluate.
    pub rules_errored: usize,
    /// Number of rules whose condition held but were in cooldown.
    pub rules_suppressed: usize,
    /// Alerts raised by this pass, in rule order.
    pub alerts: Vec<Alert>,
}

/// Evaluates an ordered set of alert rules.
#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: RwLock<Vec<AlertRule>>,
}

impl RuleEngine {
    /// Creates an engine with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine from a rule list.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if two rules share a name.
    pub fn with_rules(rules: impl IntoIterator<Item = AlertRule>) -> Result<Self> {
        let engine = Self::new();
        for rule in rules {
            engine.add_rule(rule)?;
        }
        Ok(engine)
    }

    // ============ Rule Management ============

    /// Appends a rule.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if a rule with the same name exists.
    pub fn add_rule(&self, rule: AlertRule) -> Result<()> {
        let mut rules = self.rules.write();

        if rules.iter().any(|r| r.name == rule.name) {
            return Err(AlertError::InvalidRule {
                reason: format!("rule '{}' already exists", rule.name),
            });
        }

        info!(rule_name = %rule.name, condition = %rule.condition, "added alert rule");
        rules.push(rule);
        Ok(())
    }

    /// Removes a rule by name. Returns `true` if it existed.
    pub fn remove_rule(&self, name: &str) -> bool {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| r.name != name);
        let removed = rules.len() != before;

        if removed {
            info!(rule_name = %name, "removed alert rule");
        }

        removed
    }

    /// Enables or disables a rule.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::RuleNotFound` if no rule has this name.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut rules = self.rules.write();
        let rule = rules
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| AlertError::RuleNotFound {
                name: name.to_string(),
            })?;
        rule.enabled = enabled;
        Ok(())
    }

    /// Gets a rule by name.
    #[must_use]
    pub fn get_rule(&self, name: &str) -> Option<AlertRule> {
        self.rules.read().iter().find(|r| r.name == name).cloned()
    }

    /// Returns all rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> Vec<AlertRule> {
        self.rules.read().clone()
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    /// Returns the action names used by any rule, sorted.
    #[must_use]
    pub fn action_names(&self) -> Vec<String> {
        let rules = self.rules.read();
        let mut names: Vec<String> = rules
            .iter()
            .flat_map(|r| r.actions.iter().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        names.sort();
        names
    }

    // ============ Evaluation ============

    /// Evaluates every enabled rule against `view` at `now`.
    ///
    /// A rule whose condition holds fires unless it is within its cooldown;
    /// a suppressed rule keeps its previous trigger time.
    pub fn evaluate(&self, view: &MetricView, now: DateTime<Utc>) -> EvaluationResult {
        let mut result = EvaluationResult::default();
        let mut rules = self.rules.write();

        for rule in rules.iter_mut().filter(|r| r.enabled) {
            result.rules_evaluated += 1;

            match rule.condition.evaluate(view) {
                Ok(false) => {}
                Ok(true) if rule.in_cooldown(now) => {
                    result.rules_suppressed += 1;
                    debug!(rule_name = %rule.name, "rule in cooldown, alert suppressed");
                }
                Ok(true) => {
                    rule.mark_triggered(now);
                    let alert = Alert::from_rule(rule, view, now);
                    info!(
                        rule_name = %rule.name,
                        alert_id = %alert.id,
                        severity = %alert.severity,
                        "rule triggered"
                    );
                    result.alerts.push(alert);
                }
                Err(e) => {
                    result.rules_errored += 1;
                    warn!(
                        rule_name = %rule.name,
                        condition = %rule.condition,
                        error = %e,
                        "failed to evaluate rule"
                    );
                }
            }
        }

        debug!(
            rules_evaluated = result.rules_evaluated,
            rules_errored = result.rules_errored,
            rules_suppressed = result.rules_suppressed,
            alerts = result.alerts.len(),
            "evaluation complete"
        );

        result
    }
}

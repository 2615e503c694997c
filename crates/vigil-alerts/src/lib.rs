//! Rule-based alerting for Vigil.
//!
//! `vigil-alerts` turns metric views into alerts and delivers them:
//! rules are evaluated with per-rule cooldown, triggered alerts pass through
//! a bounded queue to a dispatcher, and every alert is kept in a store with
//! acknowledge/resolve flags, retention, and durable snapshots.
//!
//! # Features
//!
//! - **Restricted conditions**: a small whitelisted expression language parsed into a typed tree
//! - **Cooldown**: a rule fires at most once per cooldown window
//! - **Fault isolation**: a failing rule or channel never affects the others
//! - **Channels**: console, SMTP email, and chat webhook out of the box
//! - **Retention**: age- and count-based eviction with atomic JSON snapshots
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use vigil_alerts::{AlertQueue, AlertRule, AlertSeverity, AlertStore, Condition, RuleEngine};
//! use vigil_metrics::{MetricValue, MetricView, Metrics};
//!
//! let rule = AlertRule::builder("cpu_high", Condition::parse(r#"metrics["cpu"] > 90"#).unwrap())
//!     .severity(AlertSeverity::Warning)
//!     .cooldown_secs(300)
//!     .build()
//!     .unwrap();
//! let engine = RuleEngine::with_rules([rule]).unwrap();
//!
//! let mut values = Metrics::new();
//! values.insert("cpu".to_string(), MetricValue::Scalar(95.0));
//! let result = engine.evaluate(&MetricView::from_metrics(values), Utc::now());
//! assert_eq!(result.alerts.len(), 1);
//!
//! let queue = AlertQueue::default();
//! queue.extend(result.alerts);
//!
//! let store = AlertStore::default();
//! store.extend(queue.drain());
//! assert_eq!(store.len(), 1);
//! ```

#![forbid(unsafe_code)]
#![doc(html_root_url = "https://docs.rs/vigil-alerts/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod channels;
pub mod defaults;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod expr;
pub mod queue;
pub mod store;
pub mod types;

// Re-export main types at crate root
pub use channels::{
    ChatAttachment, ChatField, ChatPayload, ChatWebhookChannel, ConsoleChannel, EmailChannel,
    EmailConfig, NotificationChannel, SendFuture,
};
pub use defaults::{default_rule_specs, default_rules};
pub use dispatch::{DeliveryResult, DispatchReport, Dispatcher};
pub use engine::{EvaluationResult, RuleEngine};
pub use error::{AlertError, Result};
pub use expr::Condition;
pub use queue::AlertQueue;
pub use store::{AlertQuery, AlertSnapshot, AlertStore, SeverityCounts};
pub use types::{Alert, AlertRule, AlertRuleBuilder, AlertSeverity, ENGINE_SOURCE, RuleSpec};

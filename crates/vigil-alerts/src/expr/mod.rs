//! The rule condition language.
//!
//! Conditions are small boolean expressions over a [`MetricView`]:
//!
//! ```text
//! metrics["cpu_percent_total"] > 90
//! disk_free_percent < 10 and not maintenance
//! max(temperatures.core) > 85 || avg(latency_ms_history) > 2 * latency_ms_avg
//! ```
//!
//! A condition is parsed once, when the rule is configured, into a typed
//! tree that is evaluated directly. Only metric keys and the helpers
//! `avg`, `max`, `min`, and `count` are reachable; anything else is a parse
//! error.

mod ast;
mod eval;
mod lexer;
mod parser;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use vigil_metrics::{MetricView, Metrics};

use crate::error::{AlertError, Result};

pub use ast::{ArithOp, CompareOp, Expr, Helper};
pub use parser::{MAX_DEPTH, MAX_SOURCE_LEN};

/// A parsed rule condition.
///
/// Keeps its source text for messages and the metric keys it reads.
#[derive(Debug, Clone)]
pub struct Condition {
    source: String,
    ast: Expr,
    referenced_keys: Vec<String>,
    reads_whole_view: bool,
}

impl Condition {
    /// Parses a condition.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::ParseError` on a syntax error, an unknown
    /// function, or a condition that is too long or too deeply nested.
    pub fn parse(source: &str) -> Result<Self> {
        let ast = parser::parse(source)?;
        let mut referenced_keys = Vec::new();
        let reads_whole_view = ast.collect_keys(&mut referenced_keys);
        Ok(Self {
            source: source.trim().to_string(),
            ast,
            referenced_keys,
            reads_whole_view,
        })
    }

    /// Returns the source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the parsed tree.
    #[must_use]
    pub const fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Returns the view keys the condition reads, in order of appearance.
    #[must_use]
    pub fn referenced_keys(&self) -> &[String] {
        &self.referenced_keys
    }

    /// Evaluates the condition.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::EvaluationError` on helper misuse, a type
    /// mismatch, or division by zero.
    pub fn evaluate(&self, view: &MetricView) -> Result<bool> {
        eval::evaluate(&self.ast, view).map(|value| value.truthy())
    }

    /// Copies the part of `view` this condition reads.
    ///
    /// The whole view is copied if the condition uses `metrics` other than
    /// through a direct index. A dotted key that is absent falls back to
    /// its first segment.
    #[must_use]
    pub fn snapshot(&self, view: &MetricView) -> Metrics {
        if self.reads_whole_view {
            return view.as_metrics().clone();
        }

        let mut snapshot = Metrics::new();
        for key in &self.referenced_keys {
            let key = if view.get(key).is_some() {
                key.as_str()
            } else {
                key.split('.').next().unwrap_or(key)
            };
            if let Some(value) = view.get(key) {
                snapshot.insert(key.to_string(), value.clone());
            }
        }
        snapshot
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Condition {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Self::parse(&source).map_err(serde::de::Error::custom)
    }
}

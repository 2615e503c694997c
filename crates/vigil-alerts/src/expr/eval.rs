//! Direct evaluation of a condition tree against a metric view.
//!
//! Only the view's keys and the four helpers are reachable. A key that is
//! absent evaluates to [`Value::Missing`], which reads as `0` in arithmetic,
//! as an empty sequence in helpers, and as `false` in boolean position.

use vigil_metrics::{MetricValue, MetricView, Metrics};

use crate::error::{AlertError, Result};
use crate::expr::ast::{ArithOp, CompareOp, Expr, Helper};

/// An intermediate value, borrowing from the tree and the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Value<'a> {
    Number(f64),
    Bool(bool),
    Str(&'a str),
    Seq(&'a [f64]),
    Map(&'a Metrics),
    Missing,
}

impl<'a> Value<'a> {
    fn from_metric(value: Option<&'a MetricValue>) -> Self {
        match value {
            Some(MetricValue::Scalar(n)) => Self::Number(*n),
            Some(MetricValue::Sequence(values)) => Self::Seq(values),
            Some(MetricValue::Map(map)) => Self::Map(map),
            None => Self::Missing,
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Bool(_) => "boolean",
            Self::Str(_) => "string",
            Self::Seq(_) => "sequence",
            Self::Map(_) => "map",
            Self::Missing => "missing",
        }
    }

    fn as_number(&self) -> Result<f64> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Self::Missing => Ok(0.0),
            other => Err(AlertError::eval(format!(
                "expected a number, found a {}",
                other.kind()
            ))),
        }
    }

    pub(crate) fn truthy(&self) -> bool {
        match self {
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Bool(b) => *b,
            Self::Str(s) => !s.is_empty(),
            Self::Seq(values) => !values.is_empty(),
            Self::Map(map) => !map.is_empty(),
            Self::Missing => false,
        }
    }
}

/// Evaluates `expr` against `view`.
pub(crate) fn evaluate<'a>(expr: &'a Expr, view: &'a MetricView) -> Result<Value<'a>> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::Str(s)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::View => Ok(Value::Map(view.as_metrics())),
        Expr::Metric(name) => Ok(lookup(view, name)),
        Expr::Index(base, key) => match evaluate(base, view)? {
            Value::Map(map) => Ok(Value::from_metric(map.get(key))),
            Value::Missing => Ok(Value::Missing),
            other => Err(AlertError::eval(format!(
                "cannot index a {} with {key:?}",
                other.kind()
            ))),
        },
        Expr::Call(helper, arg) => call(*helper, evaluate(arg, view)?),
        Expr::Neg(inner) => Ok(Value::Number(-evaluate(inner, view)?.as_number()?)),
        Expr::Not(inner) => Ok(Value::Bool(!evaluate(inner, view)?.truthy())),
        Expr::Arith(op, lhs, rhs) => {
            let lhs = evaluate(lhs, view)?.as_number()?;
            let rhs = evaluate(rhs, view)?.as_number()?;
            arith(*op, lhs, rhs).map(Value::Number)
        }
        Expr::Compare(op, lhs, rhs) => {
            let lhs = evaluate(lhs, view)?;
            let rhs = evaluate(rhs, view)?;
            compare(*op, lhs, rhs).map(Value::Bool)
        }
        Expr::And(lhs, rhs) => {
            if !evaluate(lhs, view)?.truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(evaluate(rhs, view)?.truthy()))
        }
        Expr::Or(lhs, rhs) => {
            if evaluate(lhs, view)?.truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(evaluate(rhs, view)?.truthy()))
        }
    }
}

/// Resolves a metric identifier. A dotted name that is not itself a key is
/// walked through nested maps.
fn lookup<'a>(view: &'a MetricView, name: &str) -> Value<'a> {
    if let Some(value) = view.get(name) {
        return Value::from_metric(Some(value));
    }

    let mut segments = name.split('.');
    let Some(first) = segments.next() else {
        return Value::Missing;
    };
    let mut current = view.get(first);
    for segment in segments {
        current = current
            .and_then(MetricValue::as_map)
            .and_then(|map| map.get(segment));
    }
    Value::from_metric(current)
}

fn call(helper: Helper, arg: Value<'_>) -> Result<Value<'static>> {
    let single;
    let values: &[f64] = match arg {
        Value::Seq(values) => values,
        Value::Number(n) => {
            single = [n];
            &single
        }
        Value::Missing => &[],
        other => {
            return Err(AlertError::eval(format!(
                "{}() expects a sequence, found a {}",
                helper.as_str(),
                other.kind()
            )));
        }
    };

    let result = match helper {
        Helper::Avg => vigil_stats::mean(values).unwrap_or(0.0),
        Helper::Max => vigil_stats::max(values).unwrap_or(0.0),
        Helper::Min => vigil_stats::min(values).unwrap_or(0.0),
        Helper::Count => values.len() as f64,
    };
    Ok(Value::Number(result))
}

fn arith(op: ArithOp, lhs: f64, rhs: f64) -> Result<f64> {
    match op {
        ArithOp::Add => Ok(lhs + rhs),
        ArithOp::Sub => Ok(lhs - rhs),
        ArithOp::Mul => Ok(lhs * rhs),
        ArithOp::Div | ArithOp::Rem if rhs == 0.0 => Err(AlertError::eval(format!(
            "{} by zero",
            if op == ArithOp::Div { "division" } else { "modulo" }
        ))),
        ArithOp::Div => Ok(lhs / rhs),
        ArithOp::Rem => Ok(lhs % rhs),
    }
}

fn compare(op: CompareOp, lhs: Value<'_>, rhs: Value<'_>) -> Result<bool> {
    if let (Value::Str(a), Value::Str(b)) = (lhs, rhs) {
        return Ok(match op {
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Ge => a >= b,
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
        });
    }

    // A string never equals a non-string.
    if matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_)) {
        return match op {
            CompareOp::Eq => Ok(false),
            CompareOp::Ne => Ok(true),
            _ => Err(AlertError::eval(format!(
                "cannot order a {} against a {}",
                lhs.kind(),
                rhs.kind()
            ))),
        };
    }

    let a = lhs.as_number()?;
    let b = rhs.as_number()?;
    Ok(match op {
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
        CompareOp::Eq => (a - b).abs() < f64::EPSILON,
        CompareOp::Ne => (a - b).abs() >= f64::EPSILON,
    })
}

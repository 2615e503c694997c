//! The condition syntax tree.

use std::fmt;

/// A helper function callable from a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Helper {
    /// Arithmetic mean; `0` for an empty sequence.
    Avg,
    /// Largest element; `0` for an empty sequence.
    Max,
    /// Smallest element; `0` for an empty sequence.
    Min,
    /// Number of elements.
    Count,
}

impl Helper {
    /// Looks up a helper by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "avg" => Some(Self::Avg),
            "max" => Some(Self::Max),
            "min" => Some(Self::Min),
            "count" => Some(Self::Count),
            _ => None,
        }
    }

    /// Returns the helper's name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Avg => "avg",
            Self::Max => "max",
            Self::Min => "min",
            Self::Count => "count",
        }
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
}

impl ArithOp {
    /// Returns the operator symbol.
    #[must_use]
    pub const fn as_symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

impl CompareOp {
    /// Returns the operator symbol.
    #[must_use]
    pub const fn as_symbol(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

/// A condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A numeric literal.
    Number(f64),
    /// A string literal.
    Str(String),
    /// `true` or `false`.
    Bool(bool),
    /// A metric key looked up in the view.
    Metric(String),
    /// The whole view, spelled `metrics`.
    View,
    /// `base["key"]`
    Index(Box<Expr>, String),
    /// `helper(arg)`
    Call(Helper, Box<Expr>),
    /// `-expr`
    Neg(Box<Expr>),
    /// `not expr`
    Not(Box<Expr>),
    /// `lhs op rhs` for arithmetic.
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    /// `lhs op rhs` for comparisons.
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    /// `lhs and rhs`
    And(Box<Expr>, Box<Expr>),
    /// `lhs or rhs`
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Collects the top-level view keys this expression reads.
    ///
    /// Returns `true` if the whole view is used other than through a
    /// direct `metrics["key"]` index.
    pub(crate) fn collect_keys(&self, keys: &mut Vec<String>) -> bool {
        match self {
            Self::Number(_) | Self::Str(_) | Self::Bool(_) => false,
            Self::View => true,
            Self::Metric(name) => {
                push_key(keys, name);
                false
            }
            Self::Index(base, key) => {
                if **base == Self::View {
                    push_key(keys, key);
                    false
                } else {
                    base.collect_keys(keys)
                }
            }
            Self::Call(_, inner) | Self::Neg(inner) | Self::Not(inner) => inner.collect_keys(keys),
            Self::Arith(_, lhs, rhs)
            | Self::Compare(_, lhs, rhs)
            | Self::And(lhs, rhs)
            | Self::Or(lhs, rhs) => {
                let left = lhs.collect_keys(keys);
                let right = rhs.collect_keys(keys);
                left || right
            }
        }
    }
}

fn push_key(keys: &mut Vec<String>, key: &str) {
    if !keys.iter().any(|k| k == key) {
        keys.push(key.to_string());
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Metric(name) => f.write_str(name),
            Self::View => f.write_str("metrics"),
            Self::Index(base, key) => write!(f, "{base}[{key:?}]"),
            Self::Call(helper, arg) => write!(f, "{}({arg})", helper.as_str()),
            Self::Neg(inner) => write!(f, "-{inner}"),
            Self::Not(inner) => write!(f, "not {inner}"),
            Self::Arith(op, lhs, rhs) => write!(f, "({lhs} {} {rhs})", op.as_symbol()),
            Self::Compare(op, lhs, rhs) => write!(f, "({lhs} {} {rhs})", op.as_symbol()),
            Self::And(lhs, rhs) => write!(f, "({lhs} and {rhs})"),
            Self::Or(lhs, rhs) => write!(f, "({lhs} or {rhs})"),
        }
    }
}

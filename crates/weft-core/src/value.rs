#![forbid(unsafe_code)]

//! The structural value model.
//!
//! Cells and derived nodes hold [`Value`]s: a small dynamic tree compared
//! structurally (`PartialEq`), which is what makes "setting an equal value
//! is a no-op" checkable without user-supplied equality. Records preserve
//! field insertion order so rendered output and diagnostics are
//! deterministic.
//!
//! [`Outcome`] is the per-node `ready | pending | failed` union: dependents
//! of an asynchronous or failing derivation observe an explicit state value
//! instead of a blocking call or an unwound panic.

use indexmap::IndexMap;
use std::collections::BTreeSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// A dynamically typed, structurally compared value.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Record(IndexMap<String, Value>),
}

impl Value {
    /// Build a record from `(name, value)` pairs, preserving order.
    #[must_use]
    pub fn record<I, K>(fields: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// The declared output-name set of a pattern or composed instance.
///
/// Names are kept sorted so mismatch diagnostics are stable regardless of
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Shape {
    fields: BTreeSet<String>,
}

impl Shape {
    /// Build a shape from output names.
    #[must_use]
    pub fn of<I, S>(names: I) -> Shape
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Shape {
            fields: names.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate field names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    /// Fields expected by `self` but absent from `actual`, and fields
    /// present in `actual` but not expected. Both sorted.
    #[must_use]
    pub fn diff(&self, actual: &Shape) -> (Vec<String>, Vec<String>) {
        let missing = self.fields.difference(&actual.fields).cloned().collect();
        let extra = actual.fields.difference(&self.fields).cloned().collect();
        (missing, extra)
    }
}

/// A discovery label attached to a published output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tag(pub String);

impl Tag {
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Tag {
        Tag(tag.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Tag(s.to_owned())
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a compute function produced this pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Eval {
    /// A settled value.
    Ready(Value),
    /// Work is in flight; the node stays pending until
    /// completed with a matching tick.
    Pending,
}

/// The externally observable state of a source.
///
/// This is what dependents (and watchers of derived values) see: a failing
/// or in-flight branch is an explicit state, not an exception.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Ready(Value),
    Pending,
    Failed(EvalError),
}

impl Outcome {
    #[must_use]
    pub fn ready(&self) -> Option<&Value> {
        match self {
            Outcome::Ready(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality() {
        let a = Value::record([("x", Value::Int(1)), ("y", Value::Int(2))]);
        let b = Value::record([("x", Value::Int(1)), ("y", Value::Int(2))]);
        assert_eq!(a, b);
        assert_ne!(a, Value::record([("x", Value::Int(1))]));
    }

    #[test]
    fn shape_diff_names_missing_and_extra() {
        let expected = Shape::of(["count", "label"]);
        let actual = Shape::of(["count", "legacy"]);
        let (missing, extra) = expected.diff(&actual);
        assert_eq!(missing, vec!["label".to_owned()]);
        assert_eq!(extra, vec!["legacy".to_owned()]);
    }

    #[test]
    fn shape_diff_equal_is_empty() {
        let s = Shape::of(["a", "b"]);
        let (missing, extra) = s.diff(&s.clone());
        assert!(missing.is_empty());
        assert!(extra.is_empty());
    }

    #[test]
    fn outcome_accessors() {
        assert_eq!(Outcome::Ready(Value::Int(3)).ready(), Some(&Value::Int(3)));
        assert!(Outcome::Pending.is_pending());
        assert!(Outcome::Failed(EvalError::new("boom")).is_failed());
    }
}

#[cfg(all(test, feature = "serde"))]
mod serde_tests {
    use super::*;

    #[test]
    fn record_round_trips_in_order() {
        let v = Value::record([("b", Value::Int(1)), ("a", Value::Int(2))]);
        let json = serde_json::to_string(&v).unwrap();
        // Insertion order survives serialization.
        assert!(json.find("\"b\"").unwrap() < json.find("\"a\"").unwrap());
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}

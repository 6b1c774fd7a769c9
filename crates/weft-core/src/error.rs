#![forbid(unsafe_code)]

//! Error taxonomy for the weft workspace.
//!
//! Two layers, deliberately kept apart:
//!
//! - [`WeftError`]: structural failures surfaced to the caller (detached
//!   handles, cycles, shape mismatches, timed-out wishes). These fail fast
//!   and are never retried internally.
//! - [`EvalError`]: a failure *inside* one derivation's compute function.
//!   It is captured per-node as an error-state outcome and flows to
//!   dependents as data, so one failing branch does not halt the rest of
//!   the graph.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WeftError>;

/// Structural failures of the graph, registry, or runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeftError {
    /// Operation on a cell or node whose owning instance was destroyed.
    #[error("detached handle: {label}")]
    DetachedCell { label: String },

    /// A dependency cycle was detected at construction or rewire time.
    /// `nodes` names the participating node labels in path order.
    #[error("dependency cycle: {}", nodes.join(" -> "))]
    CyclicDependency { nodes: Vec<String> },

    /// A composed instance's output set does not match the expected shape.
    #[error("output shape mismatch (missing: [{}], extra: [{}])", missing.join(", "), extra.join(", "))]
    ShapeMismatch {
        missing: Vec<String>,
        extra: Vec<String>,
    },

    /// A wish query found no match within its deadline.
    #[error("wish for tag '{tag}' found no match within {ticks} ticks")]
    ResolutionTimeout { tag: String, ticks: u64 },

    /// Operation referenced an instance that does not exist (or was
    /// destroyed).
    #[error("unknown instance")]
    UnknownInstance,

    /// Invocation of a handler the instance never registered.
    #[error("unknown handler: {name}")]
    UnknownHandler { name: String },

    /// A handler body failed.
    #[error("handler '{name}' failed: {message}")]
    Handler { name: String, message: String },
}

impl WeftError {
    #[must_use]
    pub fn detached(label: impl Into<String>) -> Self {
        Self::DetachedCell {
            label: label.into(),
        }
    }

    #[must_use]
    pub fn handler(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// A failure raised by a derivation's compute function.
///
/// Carried inside [`Outcome::Failed`](crate::Outcome::Failed); never
/// propagated as a panic or a graph-wide error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EvalError(pub String);

impl EvalError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

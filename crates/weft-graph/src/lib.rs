#![forbid(unsafe_code)]

//! Reactive cell store, derivation graph, and batched scheduler.
//!
//! # Architecture
//!
//! A [`Graph`] owns every cell and derived node in one arena pair. Handles
//! (`CellId`, `NodeId`) are generational keys, so destroyed slots turn into
//! [`DetachedCell`](weft_core::WeftError::DetachedCell) errors rather than
//! dangling references. The whole structure is single-threaded plain state:
//! no locks, no interior mutability, every operation goes through `&mut`.
//!
//! # Invariants
//!
//! 1. Derivations declare their inputs statically; there is no implicit
//!    read-tracking.
//! 2. A dependency cycle is rejected at [`rewire`](Graph::rewire) time with
//!    [`CyclicDependency`](weft_core::WeftError::CyclicDependency) naming the
//!    participating node labels; the graph never recomputes a cycle.
//! 3. Setting a cell to a structurally equal value is a no-op: no dirty
//!    mark, no notification, no recompute.
//! 4. One [`flush`](Graph::flush) recomputes each affected node at most once,
//!    in dependency order, so no node observes a stale upstream value.
//! 5. Cell watchers run at most once per changed cell per flush, in
//!    registration order.
//! 6. A failing compute poisons only its own node; dependents observe
//!    [`Outcome::Failed`](weft_core::Outcome::Failed) as a value.

mod cell;
mod flush;
mod graph;
mod node;

pub use cell::WatchId;
pub use flush::FlushStats;
pub use graph::Graph;
pub use node::{Completion, ComputeFn};

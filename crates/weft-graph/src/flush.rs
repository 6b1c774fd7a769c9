#![forbid(unsafe_code)]

//! The batched recompute pass.
//!
//! # Algorithm
//!
//! 1. Advance the tick and drain the dirty sets.
//! 2. Collect the affected subgraph: every node downstream of a changed
//!    cell or a seeded node.
//! 3. Kahn topological order restricted to the affected set, so a node
//!    never reads a stale upstream value.
//! 4. Recompute a node only if it was seeded or one of its inputs actually
//!    changed this tick; record its own change for downstream pruning.
//! 5. Deliver cell watcher callbacks, once per changed cell, in
//!    registration order.
//!
//! Every affected node is visited at most once, so one external mutation
//! batch costs exactly one pass regardless of how many paths reach a node
//! (diamonds included).

use std::collections::VecDeque;

use ahash::{AHashMap, AHashSet};
use indexmap::IndexSet;
use tracing::{debug, trace};

use weft_core::{CellId, Eval, NodeId, Outcome, Source, Tick};

use crate::graph::Graph;

/// Counters for one flush, used by callers (and tests) to assert recompute
/// behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    /// The tick this flush completed (unchanged for an empty flush).
    pub tick: Tick,
    /// Number of node recomputations performed.
    pub recomputed: usize,
    /// Number of cells whose value changed since the previous flush.
    pub changed_cells: usize,
    /// Number of watcher callbacks delivered.
    pub notified: usize,
}

impl Graph {
    /// Run one batched recompute pass over everything dirtied since the
    /// last flush. A flush with nothing to do is a no-op and does not
    /// advance the tick.
    pub fn flush(&mut self) -> FlushStats {
        if !self.has_pending_work() {
            return FlushStats {
                tick: self.tick,
                recomputed: 0,
                changed_cells: 0,
                notified: 0,
            };
        }
        self.tick = self.tick.next();

        let dirty_cells: Vec<_> = self.dirty_cells.drain(..).collect();
        let seeds: Vec<NodeId> = self.dirty_nodes.drain(..).collect();

        // A batch that ends back at its pre-batch value is net-zero: the
        // cell recomputes nothing and notifies nobody.
        let mut changed_cells: Vec<CellId> = Vec::with_capacity(dirty_cells.len());
        for cell in dirty_cells {
            let Some(slot) = self.cells.get_mut(cell) else {
                continue;
            };
            let started_at = slot.batch_prev.take();
            if started_at.as_ref() != Some(&slot.value) {
                changed_cells.push(cell);
            }
        }

        let mut stats = FlushStats {
            tick: self.tick,
            recomputed: 0,
            changed_cells: changed_cells.len(),
            notified: 0,
        };

        // Changed sources this tick.
        let mut changed: AHashSet<Source> =
            changed_cells.iter().map(|c| Source::Cell(*c)).collect();

        // Affected subgraph: seeds plus everything downstream of a changed
        // cell, transitively. IndexSet keeps discovery order deterministic.
        let mut affected: IndexSet<NodeId> = IndexSet::new();
        let mut stack: Vec<NodeId> = Vec::new();
        for cell in &changed_cells {
            if let Some(slot) = self.cells.get(*cell) {
                stack.extend(slot.dependents.iter().copied());
            }
        }
        stack.extend(seeds.iter().copied());
        while let Some(node) = stack.pop() {
            if !self.nodes.contains_key(node) {
                continue;
            }
            if affected.insert(node) {
                stack.extend(self.nodes[node].dependents.iter().copied());
            }
        }

        // In-degree restricted to affected-to-affected edges. Inputs are
        // deduplicated so a twice-declared input still counts one edge,
        // matching the deduplicated dependent lists used for decrements.
        let mut indegree: AHashMap<NodeId, usize> = AHashMap::with_capacity(affected.len());
        for &node in &affected {
            let upstream: AHashSet<NodeId> = self.nodes[node]
                .inputs
                .iter()
                .filter_map(|input| match input {
                    Source::Node(n) if affected.contains(n) => Some(*n),
                    _ => None,
                })
                .collect();
            indegree.insert(node, upstream.len());
        }

        let seeded: AHashSet<NodeId> = seeds.into_iter().collect();
        let mut queue: VecDeque<NodeId> = affected
            .iter()
            .copied()
            .filter(|n| indegree[n] == 0)
            .collect();

        let mut visited = 0usize;
        while let Some(node) = queue.pop_front() {
            visited += 1;
            let needs_recompute = seeded.contains(&node)
                || self.nodes[node]
                    .inputs
                    .iter()
                    .any(|input| changed.contains(input));
            if needs_recompute {
                let new_outcome = self.eval_node(node);
                stats.recomputed += 1;
                let slot = &mut self.nodes[node];
                if new_outcome != slot.outcome {
                    changed.insert(Source::Node(node));
                }
                slot.outcome = new_outcome;
            }
            let dependents = self.nodes[node].dependents.clone();
            for dep in dependents {
                if let Some(count) = indegree.get_mut(&dep) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(dep);
                    }
                }
            }
        }
        // Cycles are rejected at wiring time, so the topological pass must
        // cover the whole affected set.
        debug_assert_eq!(visited, affected.len());

        // Watcher delivery: after recompute, so observers see a consistent
        // graph; once per changed cell, registration order within a cell.
        for cell in changed_cells {
            let (value, mut watchers) = match self.cells.get_mut(cell) {
                Some(slot) => (slot.value.clone(), std::mem::take(&mut slot.watchers)),
                None => continue,
            };
            for (_, callback) in &mut watchers {
                callback(&value);
                stats.notified += 1;
            }
            if let Some(slot) = self.cells.get_mut(cell) {
                slot.watchers = watchers;
            }
        }

        debug!(
            tick = %stats.tick,
            recomputed = stats.recomputed,
            changed_cells = stats.changed_cells,
            "flush"
        );
        stats
    }

    /// Evaluate one node against the current outcomes of its inputs.
    /// Records pending bookkeeping; the caller stores the returned outcome.
    pub(crate) fn eval_node(&mut self, node: NodeId) -> Outcome {
        let Some(slot) = self.nodes.get(node) else {
            return Outcome::Failed(weft_core::EvalError::new("detached node"));
        };
        let inputs = slot.inputs.clone();
        let outcomes: Vec<Outcome> = inputs.iter().map(|s| self.outcome_of(*s)).collect();

        let result = {
            let slot = &self.nodes[node];
            (slot.compute)(&outcomes)
        };
        match result {
            Ok(Eval::Ready(value)) => {
                self.nodes[node].pending_since = None;
                Outcome::Ready(value)
            }
            Ok(Eval::Pending) => {
                let tick = self.tick;
                self.nodes[node].pending_since = Some(tick);
                trace!(label = %self.nodes[node].label, %tick, "evaluation pending");
                Outcome::Pending
            }
            Err(error) => {
                self.nodes[node].pending_since = None;
                trace!(label = %self.nodes[node].label, %error, "evaluation failed");
                Outcome::Failed(error)
            }
        }
    }
}

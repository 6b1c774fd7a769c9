#![forbid(unsafe_code)]

//! The arena holding cells and derived nodes, plus instance-scoped teardown.

use ahash::AHashSet;
use indexmap::IndexSet;
use slotmap::SlotMap;
use tracing::debug;

use weft_core::{CellId, EvalError, InstanceId, NodeId, Outcome, Source, Tick};

use crate::cell::CellSlot;
use crate::node::NodeSlot;

/// The reactive value graph: cell store, derivation nodes, and the dirty
/// sets consumed by [`flush`](Graph::flush).
pub struct Graph {
    pub(crate) cells: SlotMap<CellId, CellSlot>,
    pub(crate) nodes: SlotMap<NodeId, NodeSlot>,
    /// Cells whose value changed since the last flush, in mutation order.
    pub(crate) dirty_cells: IndexSet<CellId>,
    /// Nodes seeded for recompute out-of-band (rewire, invalidate, async
    /// completion), in insertion order.
    pub(crate) dirty_nodes: IndexSet<NodeId>,
    pub(crate) tick: Tick,
    pub(crate) next_watch: u64,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    #[must_use]
    pub fn new() -> Graph {
        Graph {
            cells: SlotMap::with_key(),
            nodes: SlotMap::with_key(),
            dirty_cells: IndexSet::new(),
            dirty_nodes: IndexSet::new(),
            tick: Tick::ZERO,
            next_watch: 0,
        }
    }

    /// The last completed tick. Advances once per non-empty flush.
    #[must_use]
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Advance the logical clock without a flush. Drivers call this when a
    /// step performs no graph work, so tick-denominated deadlines still see
    /// steps pass.
    pub fn advance_tick(&mut self) -> Tick {
        self.tick = self.tick.next();
        self.tick
    }

    /// Whether any mutation is waiting for the next flush.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        !self.dirty_cells.is_empty() || !self.dirty_nodes.is_empty()
    }

    /// Current observable state of a source. Detached sources read as a
    /// failed outcome so dependents degrade per-branch instead of
    /// poisoning the whole graph.
    #[must_use]
    pub fn outcome_of(&self, source: Source) -> Outcome {
        match source {
            Source::Cell(id) => match self.cells.get(id) {
                Some(slot) => Outcome::Ready(slot.value.clone()),
                None => Outcome::Failed(EvalError::new("detached input cell")),
            },
            Source::Node(id) => match self.nodes.get(id) {
                Some(slot) => slot.outcome.clone(),
                None => Outcome::Failed(EvalError::new("detached input node")),
            },
        }
    }

    /// Destroy every cell and node owned by `owner`. Returns how many slots
    /// were removed.
    ///
    /// Surviving dependents of a removed source are seeded for recompute;
    /// they will observe a failed outcome for the detached input on the
    /// next flush. External holders of removed handles get
    /// [`DetachedCell`](weft_core::WeftError::DetachedCell) from direct
    /// accessors.
    pub fn destroy_owned(&mut self, owner: InstanceId) -> usize {
        let dead_cells: Vec<CellId> = self
            .cells
            .iter()
            .filter(|(_, slot)| slot.owner == owner)
            .map(|(id, _)| id)
            .collect();
        let dead_nodes: AHashSet<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, slot)| slot.owner == owner)
            .map(|(id, _)| id)
            .collect();

        for id in &dead_cells {
            if let Some(slot) = self.cells.remove(*id) {
                self.dirty_cells.swap_remove(id);
                for dep in slot.dependents {
                    if !dead_nodes.contains(&dep) {
                        self.dirty_nodes.insert(dep);
                    }
                }
            }
        }
        for id in &dead_nodes {
            if let Some(slot) = self.nodes.remove(*id) {
                self.dirty_nodes.swap_remove(id);
                for dep in slot.dependents {
                    if !dead_nodes.contains(&dep) {
                        self.dirty_nodes.insert(dep);
                    }
                }
                // Unlink from surviving upstream dependent lists.
                for input in slot.inputs {
                    match input {
                        Source::Cell(c) => {
                            if let Some(up) = self.cells.get_mut(c) {
                                up.dependents.retain(|d| d != id);
                            }
                        }
                        Source::Node(n) => {
                            if let Some(up) = self.nodes.get_mut(n) {
                                up.dependents.retain(|d| d != id);
                            }
                        }
                    }
                }
            }
        }

        let removed = dead_cells.len() + dead_nodes.len();
        if removed > 0 {
            debug!(?owner, removed, "destroyed owned slots");
        }
        removed
    }

    pub(crate) fn source_label(&self, source: Source) -> String {
        match source {
            Source::Cell(id) => self
                .cells
                .get(id)
                .map_or_else(|| format!("{id:?}"), |slot| slot.label.clone()),
            Source::Node(id) => self
                .nodes
                .get(id)
                .map_or_else(|| format!("{id:?}"), |slot| slot.label.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::Key;
    use weft_core::Value;

    fn owner() -> InstanceId {
        // Tests that don't exercise instance lifecycle use the null owner.
        InstanceId::null()
    }

    #[test]
    fn destroy_owned_removes_only_that_owner() {
        let mut g = Graph::new();
        let mut instances: SlotMap<InstanceId, ()> = SlotMap::with_key();
        let a = instances.insert(());
        let b = instances.insert(());

        let cell_a = g.cell(a, "a.count", Value::Int(1));
        let cell_b = g.cell(b, "b.count", Value::Int(2));

        assert_eq!(g.destroy_owned(a), 1);
        assert!(g.get(cell_a).is_err());
        assert_eq!(g.get(cell_b).unwrap(), &Value::Int(2));
    }

    #[test]
    fn dependents_of_destroyed_cell_fail_per_branch() {
        let mut g = Graph::new();
        let mut instances: SlotMap<InstanceId, ()> = SlotMap::with_key();
        let a = instances.insert(());
        let b = instances.insert(());

        let source = g.cell(a, "source", Value::Int(10));
        let doubled = g
            .derive_fn(b, "doubled", vec![source.into()], |vals| {
                Ok(Value::Int(vals[0].as_int().unwrap_or(0) * 2))
            })
            .unwrap();
        let constant = g.cell(b, "constant", Value::Int(7));

        g.destroy_owned(a);
        g.flush();

        // The dependent observes a failed outcome; unrelated state is fine.
        assert!(g.outcome(doubled).unwrap().is_failed());
        assert_eq!(g.get(constant).unwrap(), &Value::Int(7));
    }

    #[test]
    fn outcome_of_detached_source_is_failed() {
        let mut g = Graph::new();
        let cell = g.cell(owner(), "x", Value::Int(1));
        g.destroy_owned(owner());
        assert!(g.outcome_of(cell.into()).is_failed());
    }
}

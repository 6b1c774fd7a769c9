#![forbid(unsafe_code)]

//! Derived nodes: construction, rewiring, cycle detection, and asynchronous
//! completion.
//!
//! # Design
//!
//! Inputs are a static, declared list of [`Source`]s; a node's dependency
//! set never changes behind the graph's back. This is what makes the cycle
//! check at [`rewire`](Graph::rewire) time complete: the only way a cycle
//! can appear after construction is an explicit rewire, and that is exactly
//! where it is rejected.
//!
//! # Failure Modes
//!
//! - **Compute returns `Err`**: the node's outcome becomes
//!   [`Outcome::Failed`]; dependents see it as a value.
//! - **Compute returns [`Eval::Pending`]**: the node records the current
//!   tick; only a [`complete`](Graph::complete) carrying that tick applies.
//!   A completion for a superseded tick is discarded ([`Completion::Stale`]).

use ahash::AHashSet;
use tracing::{debug, trace};

use weft_core::{Eval, EvalError, InstanceId, NodeId, Outcome, Result, Source, Tick, Value, WeftError};

use crate::graph::Graph;

/// A derivation body: maps input outcomes to a new evaluation.
pub type ComputeFn = Box<dyn Fn(&[Outcome]) -> std::result::Result<Eval, EvalError>>;

/// Result of applying an asynchronous completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The completion matched the node's pending tick and was applied.
    Applied,
    /// The node was superseded by a newer input change; the completion was
    /// discarded.
    Stale,
}

pub(crate) struct NodeSlot {
    pub(crate) label: String,
    pub(crate) owner: InstanceId,
    pub(crate) inputs: Vec<Source>,
    pub(crate) compute: ComputeFn,
    pub(crate) outcome: Outcome,
    /// Downstream derived nodes, in subscription order.
    pub(crate) dependents: Vec<NodeId>,
    /// Set while an async evaluation is in flight; the tick it started in.
    pub(crate) pending_since: Option<Tick>,
}

impl Graph {
    /// Create a derived node from declared inputs and evaluate it once to
    /// establish its initial outcome.
    ///
    /// Inputs must exist at construction time, so a freshly derived node can
    /// never close a cycle; cycles can only be introduced later through
    /// [`rewire`](Graph::rewire), which checks for them.
    pub fn derive(
        &mut self,
        owner: InstanceId,
        label: impl Into<String>,
        inputs: Vec<Source>,
        compute: ComputeFn,
    ) -> Result<NodeId> {
        for input in &inputs {
            self.require_source(*input)?;
        }
        let label = label.into();
        let id = self.nodes.insert(NodeSlot {
            label,
            owner,
            inputs: inputs.clone(),
            compute,
            outcome: Outcome::Pending,
            dependents: Vec::new(),
            pending_since: None,
        });
        for input in &inputs {
            self.attach_dependent(*input, id);
        }
        let initial = self.eval_node(id);
        if let Some(slot) = self.nodes.get_mut(id) {
            slot.outcome = initial;
        }
        Ok(id)
    }

    /// Convenience wrapper with strict propagation: any pending input makes
    /// the node pending, any failed input forwards the failure, otherwise
    /// the closure sees plain values.
    pub fn derive_fn<F>(
        &mut self,
        owner: InstanceId,
        label: impl Into<String>,
        inputs: Vec<Source>,
        f: F,
    ) -> Result<NodeId>
    where
        F: Fn(&[&Value]) -> std::result::Result<Value, EvalError> + 'static,
    {
        let compute: ComputeFn = Box::new(move |outcomes| {
            let mut values = Vec::with_capacity(outcomes.len());
            for outcome in outcomes {
                match outcome {
                    Outcome::Ready(v) => values.push(v),
                    Outcome::Pending => return Ok(Eval::Pending),
                    Outcome::Failed(e) => return Err(e.clone()),
                }
            }
            f(&values).map(Eval::Ready)
        });
        self.derive(owner, label, inputs, compute)
    }

    /// Replace a node's input set.
    ///
    /// Runs cycle detection first: if any proposed input transitively
    /// depends on this node, the rewire is rejected with
    /// [`WeftError::CyclicDependency`] naming the participants, and the
    /// existing wiring is left untouched.
    pub fn rewire(&mut self, node: NodeId, inputs: Vec<Source>) -> Result<()> {
        if !self.nodes.contains_key(node) {
            return Err(WeftError::detached(format!("{node:?}")));
        }
        for input in &inputs {
            self.require_source(*input)?;
        }
        if let Some(path) = self.cycle_path(node, &inputs) {
            debug!(cycle = ?path, "rewire rejected");
            return Err(WeftError::CyclicDependency { nodes: path });
        }

        let old_inputs = std::mem::take(&mut self.nodes[node].inputs);
        for input in &old_inputs {
            self.detach_dependent(*input, node);
        }
        for input in &inputs {
            self.attach_dependent(*input, node);
        }
        self.nodes[node].inputs = inputs;
        self.dirty_nodes.insert(node);
        Ok(())
    }

    /// Force recomputation on the next flush even if no input changed.
    pub fn invalidate(&mut self, node: NodeId) -> Result<()> {
        if !self.nodes.contains_key(node) {
            return Err(WeftError::detached(format!("{node:?}")));
        }
        self.dirty_nodes.insert(node);
        Ok(())
    }

    /// Poison a node's outcome out-of-band. Dependents are seeded for
    /// recompute on the next flush.
    pub fn fail_node(&mut self, node: NodeId, error: EvalError) -> Result<()> {
        let slot = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| WeftError::detached(format!("{node:?}")))?;
        slot.outcome = Outcome::Failed(error);
        slot.pending_since = None;
        let dependents = slot.dependents.clone();
        for dep in dependents {
            self.dirty_nodes.insert(dep);
        }
        Ok(())
    }

    /// Current outcome of a node.
    pub fn outcome(&self, node: NodeId) -> Result<&Outcome> {
        self.nodes
            .get(node)
            .map(|slot| &slot.outcome)
            .ok_or_else(|| WeftError::detached(format!("{node:?}")))
    }

    /// Apply the result of an asynchronous evaluation started in `tick`.
    ///
    /// Last-write-wins by tick: if the node has been re-evaluated (or
    /// settled) since, the completion is stale and discarded so results
    /// never apply out of order.
    pub fn complete(
        &mut self,
        node: NodeId,
        tick: Tick,
        result: std::result::Result<Value, EvalError>,
    ) -> Result<Completion> {
        let slot = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| WeftError::detached(format!("{node:?}")))?;
        if slot.pending_since != Some(tick) {
            trace!(label = %slot.label, ?tick, "stale completion discarded");
            return Ok(Completion::Stale);
        }
        slot.outcome = match result {
            Ok(value) => Outcome::Ready(value),
            Err(e) => Outcome::Failed(e),
        };
        slot.pending_since = None;
        let dependents = slot.dependents.clone();
        for dep in dependents {
            self.dirty_nodes.insert(dep);
        }
        Ok(Completion::Applied)
    }

    /// A node's declared inputs.
    pub fn node_inputs(&self, node: NodeId) -> Result<&[Source]> {
        self.nodes
            .get(node)
            .map(|slot| slot.inputs.as_slice())
            .ok_or_else(|| WeftError::detached(format!("{node:?}")))
    }

    /// The owning instance of a node.
    pub fn node_owner(&self, node: NodeId) -> Result<InstanceId> {
        self.nodes
            .get(node)
            .map(|slot| slot.owner)
            .ok_or_else(|| WeftError::detached(format!("{node:?}")))
    }

    // ── wiring helpers ───────────────────────────────────────────────────

    fn require_source(&self, source: Source) -> Result<()> {
        let present = match source {
            Source::Cell(id) => self.cells.contains_key(id),
            Source::Node(id) => self.nodes.contains_key(id),
        };
        if present {
            Ok(())
        } else {
            Err(WeftError::detached(self.source_label(source)))
        }
    }

    fn attach_dependent(&mut self, source: Source, node: NodeId) {
        match source {
            Source::Cell(id) => {
                if let Some(slot) = self.cells.get_mut(id) {
                    if !slot.dependents.contains(&node) {
                        slot.dependents.push(node);
                    }
                }
            }
            Source::Node(id) => {
                if let Some(slot) = self.nodes.get_mut(id) {
                    if !slot.dependents.contains(&node) {
                        slot.dependents.push(node);
                    }
                }
            }
        }
    }

    fn detach_dependent(&mut self, source: Source, node: NodeId) {
        match source {
            Source::Cell(id) => {
                if let Some(slot) = self.cells.get_mut(id) {
                    slot.dependents.retain(|d| *d != node);
                }
            }
            Source::Node(id) => {
                if let Some(slot) = self.nodes.get_mut(id) {
                    slot.dependents.retain(|d| *d != node);
                }
            }
        }
    }

    /// If wiring `inputs` into `target` would close a cycle, return the
    /// participating labels in path order (`target` appears first and last).
    fn cycle_path(&self, target: NodeId, inputs: &[Source]) -> Option<Vec<String>> {
        let mut visited = AHashSet::new();
        let mut path = Vec::new();
        for input in inputs {
            if let Source::Node(n) = input {
                if self.reaches_upstream(*n, target, &mut path, &mut visited) {
                    let mut labels = Vec::with_capacity(path.len() + 1);
                    labels.push(self.source_label(Source::Node(target)));
                    labels.extend(path.iter().map(|n| self.source_label(Source::Node(*n))));
                    return Some(labels);
                }
            }
        }
        None
    }

    /// Depth-first walk from `from` through declared inputs, looking for
    /// `target`. `path` holds the current chain for diagnostics.
    fn reaches_upstream(
        &self,
        from: NodeId,
        target: NodeId,
        path: &mut Vec<NodeId>,
        visited: &mut AHashSet<NodeId>,
    ) -> bool {
        if from == target {
            path.push(from);
            return true;
        }
        if !visited.insert(from) {
            return false;
        }
        path.push(from);
        if let Some(slot) = self.nodes.get(from) {
            for input in &slot.inputs {
                if let Source::Node(n) = input {
                    if self.reaches_upstream(*n, target, path, visited) {
                        return true;
                    }
                }
            }
        }
        path.pop();
        false
    }
}

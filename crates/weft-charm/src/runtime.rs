#![forbid(unsafe_code)]

//! The runtime: owns the graph, the registry, and every live instance, and
//! drives the tick loop.
//!
//! # Step semantics
//!
//! One [`step`](Runtime::step) is one tick from the outside: flush batched
//! mutations, re-resolve wishes whose tags changed, rewire their result
//! nodes, and flush again until quiescent. Rewiring is the only way a
//! composition-induced cycle can form, and the graph rejects it there, so
//! the round loop is bounded by construction — the cap is a backstop, not
//! a correctness mechanism.

use ahash::AHashSet;
use indexmap::{IndexMap, IndexSet};
use slotmap::SlotMap;
use tracing::{debug, warn};

use weft_core::{
    CellId, EvalError, InstanceId, NodeId, Outcome, PublicationId, Result, Shape, Source, Tag,
    Value, WeftError, WishId,
};
use weft_graph::{FlushStats, Graph};
use weft_wish::{Registry, Wish, WishState, resolve};

use crate::builder::InstanceBuilder;
use crate::pattern::Pattern;

type HandlerFn = Box<dyn Fn(&mut Graph, &Value) -> std::result::Result<(), EvalError>>;

pub(crate) struct InstanceRec {
    pub(crate) name: String,
    pub(crate) children: Vec<InstanceId>,
    pub(crate) outputs: IndexMap<String, Source>,
    pub(crate) handlers: IndexMap<String, HandlerFn>,
    pub(crate) publications: Vec<PublicationId>,
    pub(crate) wishes: Vec<WishId>,
}

impl InstanceRec {
    fn new(name: String) -> InstanceRec {
        InstanceRec {
            name,
            children: Vec::new(),
            outputs: IndexMap::new(),
            handlers: IndexMap::new(),
            publications: Vec::new(),
            wishes: Vec::new(),
        }
    }
}

/// Counters for one step.
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    /// Flush statistics for each recompute pass the step ran.
    pub flushes: Vec<FlushStats>,
    /// Wish resolutions performed (including re-resolutions).
    pub resolved_wishes: usize,
    /// Wishes that hit their deadline this step.
    pub timed_out: usize,
}

/// Rounds per step before giving up; see the module docs.
const MAX_STEP_ROUNDS: usize = 8;

#[derive(Default)]
pub struct Runtime {
    pub(crate) graph: Graph,
    pub(crate) registry: Registry,
    pub(crate) instances: SlotMap<InstanceId, InstanceRec>,
    pub(crate) wishes: SlotMap<WishId, Wish>,
    /// Wishes the step loop still considers, in creation order. Disposed
    /// wishes leave this set at teardown and are never scanned again; the
    /// slotmap entry stays behind so their terminal state remains readable.
    pub(crate) active_wishes: IndexSet<WishId>,
}

impl Runtime {
    #[must_use]
    pub fn new() -> Runtime {
        Runtime::default()
    }

    /// Instantiate a pattern. Runs its build function, then checks the
    /// produced outputs against the declared shape; on any failure the
    /// partial instance is rolled back.
    pub fn instantiate(&mut self, pattern: &Pattern) -> Result<InstanceId> {
        let id = self
            .instances
            .insert(InstanceRec::new(pattern.name().to_owned()));
        let built = {
            let mut builder = InstanceBuilder {
                runtime: self,
                instance: id,
            };
            pattern.run(&mut builder)
        };
        if let Err(e) = built {
            let _ = self.destroy(id);
            return Err(e);
        }

        let produced = Shape::of(self.instances[id].outputs.keys().cloned());
        let (missing, extra) = pattern.shape().diff(&produced);
        if !missing.is_empty() || !extra.is_empty() {
            let _ = self.destroy(id);
            return Err(WeftError::ShapeMismatch { missing, extra });
        }
        debug!(name = pattern.name(), "instantiated");
        Ok(id)
    }

    /// Tear down an instance and everything it composes: publications are
    /// retracted (dirtying their tags), wishes disposed, owned cells and
    /// nodes destroyed. External holders of destroyed handles observe
    /// [`DetachedCell`](WeftError::DetachedCell).
    pub fn destroy(&mut self, instance: InstanceId) -> Result<()> {
        if !self.instances.contains_key(instance) {
            return Err(WeftError::UnknownInstance);
        }
        let mut subtree = vec![instance];
        let mut i = 0;
        while i < subtree.len() {
            if let Some(rec) = self.instances.get(subtree[i]) {
                subtree.extend(rec.children.iter().copied());
            }
            i += 1;
        }
        for id in subtree.into_iter().rev() {
            if let Some(rec) = self.instances.remove(id) {
                for wish_id in rec.wishes {
                    self.active_wishes.swap_remove(&wish_id);
                    if let Some(wish) = self.wishes.get_mut(wish_id) {
                        wish.dispose();
                    }
                }
                self.registry.retract_instance(id);
                self.graph.destroy_owned(id);
                debug!(name = %rec.name, "destroyed");
            }
        }
        Ok(())
    }

    /// Composite identity: the instance plus all transitively composed
    /// children. This is the exclusion set for its wishes.
    #[must_use]
    pub fn identity(&self, instance: InstanceId) -> weft_wish::Identity {
        let mut identity = weft_wish::Identity::default();
        let mut stack = vec![instance];
        while let Some(current) = stack.pop() {
            identity.insert(current);
            if let Some(rec) = self.instances.get(current) {
                stack.extend(rec.children.iter().copied());
            }
        }
        identity
    }

    /// Invoke a named handler registered by the instance. Mutations it
    /// makes are batched until the next [`step`](Runtime::step).
    pub fn invoke(&mut self, instance: InstanceId, handler: &str, payload: &Value) -> Result<()> {
        let rec = self
            .instances
            .get(instance)
            .ok_or(WeftError::UnknownInstance)?;
        let f = rec
            .handlers
            .get(handler)
            .ok_or_else(|| WeftError::UnknownHandler {
                name: handler.to_owned(),
            })?;
        f(&mut self.graph, payload).map_err(|e| WeftError::handler(handler, e.0))
    }

    /// One tick: flush, re-resolve wishes on dirtied tags, rewire, repeat
    /// until quiescent, then apply wish deadlines.
    pub fn step(&mut self) -> StepReport {
        let mut report = StepReport::default();
        let mut rounds = 0;
        loop {
            let mut did_work = false;
            if self.graph.has_pending_work() {
                report.flushes.push(self.graph.flush());
                did_work = true;
            }

            let dirty: AHashSet<Tag> = self.registry.take_dirty().into_iter().collect();
            let due: Vec<WishId> = self
                .active_wishes
                .iter()
                .copied()
                .filter(|id| {
                    self.wishes.get(*id).is_some_and(|w| {
                        matches!(w.state(), WishState::Unresolved) || dirty.contains(&w.tag)
                    })
                })
                .collect();
            for wish_id in due {
                self.resolve_wish(wish_id);
                report.resolved_wishes += 1;
                did_work = true;
            }

            if !did_work {
                break;
            }
            rounds += 1;
            if rounds >= MAX_STEP_ROUNDS {
                warn!(rounds, "step did not quiesce; giving up this tick");
                break;
            }
        }

        // A step with no flush still counts as a tick, otherwise deadlines
        // on a quiescent runtime would never elapse.
        if report.flushes.is_empty() {
            self.graph.advance_tick();
        }

        // Deadlines are judged after resolution has had its chance.
        let now = self.graph.tick();
        for wish_id in &self.active_wishes {
            let Some(wish) = self.wishes.get_mut(*wish_id) else {
                continue;
            };
            if wish.timeout_error().is_some() {
                continue;
            }
            if let Some(deadline) = wish.deadline_ticks {
                if wish.matches().is_empty() && now.since(wish.opened_at) >= deadline {
                    wish.mark_timed_out(deadline);
                    report.timed_out += 1;
                }
            }
        }
        report
    }

    fn resolve_wish(&mut self, wish_id: WishId) {
        let Some(wish) = self.wishes.get(wish_id) else {
            return;
        };
        let (owner, node) = (wish.owner, wish.node);
        let identity = self.identity(owner);

        let Some(wish) = self.wishes.get_mut(wish_id) else {
            return;
        };
        if !wish.begin_resolve() {
            return;
        }
        let matches = resolve(&self.registry, wish, &identity);
        let sources: Vec<Source> = matches
            .iter()
            .filter_map(|id| self.registry.get(*id).map(|p| p.source))
            .collect();

        // Skip the rewire when the match set is unchanged; per-tag dirt is
        // coarser than per-wish relevance.
        let unchanged = self
            .graph
            .node_inputs(node)
            .map(|current| current == sources.as_slice())
            .unwrap_or(false);
        if !unchanged {
            if let Err(e) = self.graph.rewire(node, sources) {
                // Composition-induced cycle (or a detached source): poison
                // the wish's result node, leave the rest of the graph alone.
                warn!(error = %e, "wish rewire rejected");
                let _ = self.graph.fail_node(node, EvalError::new(e.to_string()));
            }
        }
        if let Some(wish) = self.wishes.get_mut(wish_id) {
            wish.complete_resolve(matches);
        }
    }

    // ── accessors and proxies ────────────────────────────────────────────

    pub fn set(&mut self, cell: CellId, value: Value) -> Result<bool> {
        self.graph.set(cell, value)
    }

    pub fn get(&self, cell: CellId) -> Result<&Value> {
        self.graph.get(cell)
    }

    /// Outcome of any source (cell or derived node).
    #[must_use]
    pub fn outcome_of(&self, source: Source) -> Outcome {
        self.graph.outcome_of(source)
    }

    /// Publish a declared output after construction.
    pub fn publish(&mut self, instance: InstanceId, output: &str, tag: &str) -> Result<PublicationId> {
        let rec = self
            .instances
            .get(instance)
            .ok_or(WeftError::UnknownInstance)?;
        let source = rec
            .outputs
            .get(output)
            .copied()
            .ok_or_else(|| WeftError::ShapeMismatch {
                missing: vec![output.to_owned()],
                extra: Vec::new(),
            })?;
        let id = self
            .registry
            .publish(instance, output, source, Tag::new(tag));
        self.instances[instance].publications.push(id);
        Ok(id)
    }

    /// Retract a publication made by `publish`.
    pub fn retract(&mut self, publication: PublicationId) -> bool {
        let retracted = self.registry.retract(publication);
        if retracted {
            for (_, rec) in self.instances.iter_mut() {
                rec.publications.retain(|p| *p != publication);
            }
        }
        retracted
    }

    /// A declared output of an instance.
    pub fn output(&self, instance: InstanceId, name: &str) -> Result<Source> {
        let rec = self
            .instances
            .get(instance)
            .ok_or(WeftError::UnknownInstance)?;
        rec.outputs
            .get(name)
            .copied()
            .ok_or_else(|| WeftError::ShapeMismatch {
                missing: vec![name.to_owned()],
                extra: Vec::new(),
            })
    }

    pub(crate) fn instance_name(&self, instance: InstanceId) -> Option<&str> {
        self.instances.get(instance).map(|rec| rec.name.as_str())
    }

    pub fn wish_state(&self, wish: WishId) -> Result<&WishState> {
        self.wishes
            .get(wish)
            .map(Wish::state)
            .ok_or(WeftError::UnknownInstance)
    }

    /// The wish's result node: a list of matched values, in registration
    /// order.
    pub fn wish_node(&self, wish: WishId) -> Result<NodeId> {
        self.wishes
            .get(wish)
            .map(|w| w.node)
            .ok_or(WeftError::UnknownInstance)
    }

    pub fn wish_matches(&self, wish: WishId) -> Result<&[PublicationId]> {
        self.wishes
            .get(wish)
            .map(Wish::matches)
            .ok_or(WeftError::UnknownInstance)
    }

    /// The timeout recorded for a wish whose deadline elapsed, if any.
    pub fn wish_timeout(&self, wish: WishId) -> Result<Option<&WeftError>> {
        self.wishes
            .get(wish)
            .map(Wish::timeout_error)
            .ok_or(WeftError::UnknownInstance)
    }

    /// Direct graph access, for asynchronous completions and watchers.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

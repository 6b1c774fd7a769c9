#![forbid(unsafe_code)]

//! The build-time API a pattern sees while its instance is constructed.

use indexmap::IndexMap;
use tracing::trace;

use weft_core::{
    CellId, Eval, EvalError, InstanceId, NodeId, Outcome, PublicationId, Result, Shape, Source,
    Tag, Value, WeftError, WishId,
};
use weft_wish::{MatchPolicy, Wish};

use crate::pattern::Pattern;
use crate::runtime::Runtime;

/// Handle to a composed child: its instance id plus its outputs, readable
/// as ordinary graph sources.
#[derive(Debug, Clone)]
pub struct Composed {
    pub instance: InstanceId,
    outputs: IndexMap<String, Source>,
}

impl Composed {
    pub(crate) fn new(instance: InstanceId, outputs: IndexMap<String, Source>) -> Composed {
        Composed { instance, outputs }
    }

    /// Look up a child output by name.
    pub fn output(&self, name: &str) -> Result<Source> {
        self.outputs
            .get(name)
            .copied()
            .ok_or_else(|| WeftError::ShapeMismatch {
                missing: vec![name.to_owned()],
                extra: Vec::new(),
            })
    }
}

/// Build-time view of the runtime, scoped to the instance under
/// construction. Everything created through it is owned by that instance
/// and torn down with it.
pub struct InstanceBuilder<'rt> {
    pub(crate) runtime: &'rt mut Runtime,
    pub(crate) instance: InstanceId,
}

impl InstanceBuilder<'_> {
    /// The instance being built.
    #[must_use]
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    fn scoped(&self, label: &str) -> String {
        let name = self
            .runtime
            .instance_name(self.instance)
            .unwrap_or("instance");
        format!("{name}.{label}")
    }

    /// Create a cell owned by this instance.
    pub fn cell(&mut self, label: &str, initial: Value) -> CellId {
        let label = self.scoped(label);
        self.runtime.graph.cell(self.instance, label, initial)
    }

    /// Create a derivation with strict propagation over declared inputs.
    pub fn derive<F>(&mut self, label: &str, inputs: Vec<Source>, f: F) -> Result<NodeId>
    where
        F: Fn(&[&Value]) -> std::result::Result<Value, EvalError> + 'static,
    {
        let label = self.scoped(label);
        self.runtime.graph.derive_fn(self.instance, label, inputs, f)
    }

    /// Create a derivation with full control over pending and failed
    /// inputs (asynchronous work returns [`Eval::Pending`]).
    pub fn derive_raw(
        &mut self,
        label: &str,
        inputs: Vec<Source>,
        compute: impl Fn(&[Outcome]) -> std::result::Result<Eval, EvalError> + 'static,
    ) -> Result<NodeId> {
        let label = self.scoped(label);
        self.runtime
            .graph
            .derive(self.instance, label, inputs, Box::new(compute))
    }

    /// Declare a named output. The full set is checked against the
    /// pattern's shape when the build finishes.
    pub fn output(&mut self, name: &str, source: impl Into<Source>) {
        self.runtime.instances[self.instance]
            .outputs
            .insert(name.to_owned(), source.into());
    }

    /// Publish ("favorite") a declared output under a tag.
    pub fn publish(&mut self, output: &str, tag: &str) -> Result<PublicationId> {
        let source = self.runtime.instances[self.instance]
            .outputs
            .get(output)
            .copied()
            .ok_or_else(|| WeftError::ShapeMismatch {
                missing: vec![output.to_owned()],
                extra: Vec::new(),
            })?;
        let id = self
            .runtime
            .registry
            .publish(self.instance, output, source, Tag::new(tag));
        self.runtime.instances[self.instance].publications.push(id);
        Ok(id)
    }

    /// Register a named mutation entry point, invoked through
    /// [`Runtime::invoke`].
    pub fn handler(
        &mut self,
        name: &str,
        f: impl Fn(&mut weft_graph::Graph, &Value) -> std::result::Result<(), EvalError> + 'static,
    ) {
        self.runtime.instances[self.instance]
            .handlers
            .insert(name.to_owned(), Box::new(f));
    }

    /// Open a wish for every publication under `tag` (self-excluding,
    /// no deadline). The result node carries the matched values as a
    /// list, in registration order.
    pub fn wish(&mut self, tag: &str) -> Result<WishId> {
        self.wish_with(tag, MatchPolicy::All, None, false)
    }

    /// Open a wish with an explicit policy, optional deadline in ticks,
    /// and optional self-match permission.
    pub fn wish_with(
        &mut self,
        tag: &str,
        policy: MatchPolicy,
        deadline_ticks: Option<u64>,
        allow_self: bool,
    ) -> Result<WishId> {
        let label = self.scoped(&format!("wish[{tag}]"));
        let node = self.runtime.graph.derive(
            self.instance,
            label,
            Vec::new(),
            Box::new(|outcomes: &[Outcome]| {
                let mut items = Vec::with_capacity(outcomes.len());
                for outcome in outcomes {
                    match outcome {
                        Outcome::Ready(v) => items.push(v.clone()),
                        Outcome::Pending => return Ok(Eval::Pending),
                        Outcome::Failed(e) => return Err(e.clone()),
                    }
                }
                Ok(Eval::Ready(Value::List(items)))
            }),
        )?;
        let mut wish = Wish::new(
            Tag::new(tag),
            self.instance,
            policy,
            node,
            self.runtime.graph.tick(),
        );
        wish.deadline_ticks = deadline_ticks;
        wish.allow_self = allow_self;
        let id = self.runtime.wishes.insert(wish);
        self.runtime.active_wishes.insert(id);
        self.runtime.instances[self.instance].wishes.push(id);
        trace!(tag, "wish opened");
        Ok(id)
    }

    /// Instantiate a child pattern inside this instance. The child joins
    /// this instance's composite identity.
    pub fn compose(&mut self, child: &Pattern) -> Result<Composed> {
        let child_id = self.runtime.instantiate(child)?;
        self.runtime.instances[self.instance].children.push(child_id);
        let outputs = self.runtime.instances[child_id].outputs.clone();
        Ok(Composed::new(child_id, outputs))
    }

    /// Like [`compose`](Self::compose), but first check the child's
    /// declared shape against what this parent was authored to expect.
    /// Detects schema drift at composition time with a
    /// [`ShapeMismatch`](WeftError::ShapeMismatch) naming the fields.
    pub fn compose_expecting(&mut self, child: &Pattern, expected: &Shape) -> Result<Composed> {
        let (missing, extra) = expected.diff(child.shape());
        if !missing.is_empty() || !extra.is_empty() {
            return Err(WeftError::ShapeMismatch { missing, extra });
        }
        self.compose(child)
    }
}

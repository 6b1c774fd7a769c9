#![forbid(unsafe_code)]

//! Instances ("charms"), patterns, composition, and the runtime that drives
//! ticks.
//!
//! A [`Pattern`] is a reusable recipe with a declared output [`Shape`]
//! (weft_core::Shape). [`Runtime::instantiate`] runs the recipe, checks the
//! produced outputs against the declaration, and rolls back on mismatch —
//! shape errors surface at construction time, never deep inside a later
//! recompute.
//!
//! Composition embeds one instance inside another: the child's outputs
//! become ordinary [`Source`](weft_core::Source)s usable as derivation
//! inputs, and the child joins the parent's composite identity so the
//! parent's wishes never match the child's publications.

mod builder;
mod pattern;
mod runtime;

pub use builder::{Composed, InstanceBuilder};
pub use pattern::Pattern;
pub use runtime::{Runtime, StepReport};

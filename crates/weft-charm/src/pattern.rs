#![forbid(unsafe_code)]

//! Pattern definitions.

use weft_core::{Result, Shape};

use crate::builder::InstanceBuilder;

type BuildFn = Box<dyn Fn(&mut InstanceBuilder<'_>) -> Result<()>>;

/// A reusable instance recipe: a name, a declared output shape, and a build
/// function that wires cells, derivations, outputs, handlers, wishes, and
/// composed children.
///
/// The declared shape is the pattern's contract: instantiation verifies the
/// build produced exactly these outputs.
pub struct Pattern {
    name: String,
    shape: Shape,
    build: BuildFn,
}

impl Pattern {
    pub fn new<I, S>(
        name: impl Into<String>,
        outputs: I,
        build: impl Fn(&mut InstanceBuilder<'_>) -> Result<()> + 'static,
    ) -> Pattern
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Pattern {
            name: name.into(),
            shape: Shape::of(outputs),
            build: Box::new(build),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared output shape.
    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub(crate) fn run(&self, builder: &mut InstanceBuilder<'_>) -> Result<()> {
        (self.build)(builder)
    }
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

#![forbid(unsafe_code)]

//! Core types shared across the weft workspace: the structural value model,
//! output shapes, arena key types, tick counters, and the error taxonomy.

pub mod error;
pub mod id;
pub mod tick;
pub mod value;

pub use error::{EvalError, Result, WeftError};
pub use id::{CellId, InstanceId, NodeId, PublicationId, Source, WishId};
pub use tick::Tick;
pub use value::{Eval, Outcome, Shape, Tag, Value};

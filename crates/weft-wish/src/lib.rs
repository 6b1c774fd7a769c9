#![forbid(unsafe_code)]

//! Publication registry and tag-based wish resolution.
//!
//! Instances publish ("favorite") named outputs under a [`Tag`]; a wish is
//! a standing query against those publications. Resolution is order-stable
//! (first registered wins, ties by registration order) and self-excluding:
//! a wish never matches a publication made by any instance in the querying
//! instance's composite identity, unless explicitly permitted.
//!
//! Re-resolution granularity is **per tag**: any publish or retract marks
//! the tag dirty, and every wish on that tag re-resolves on the next step.

mod identity;
mod registry;
mod resolve;
mod wish;

pub use identity::Identity;
pub use registry::{Publication, Registry};
pub use resolve::resolve;
pub use wish::{MatchPolicy, Wish, WishState};

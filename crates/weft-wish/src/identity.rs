#![forbid(unsafe_code)]

//! Composite identity of an instance.
//!
//! Self-exclusion has to apply to the composite, not just the querying
//! instance: when A composes B, a tag published by B is still "A's own"
//! from A's point of view, otherwise a wish in A can loop through its own
//! child one level of indirection away.

use ahash::AHashSet;

use weft_core::InstanceId;

/// An instance plus all transitively composed children.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    members: AHashSet<InstanceId>,
}

impl Identity {
    /// Identity covering exactly the given instances.
    #[must_use]
    pub fn of(members: impl IntoIterator<Item = InstanceId>) -> Identity {
        Identity {
            members: members.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, member: InstanceId) {
        self.members.insert(member);
    }

    #[must_use]
    pub fn contains(&self, instance: InstanceId) -> bool {
        self.members.contains(&instance)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

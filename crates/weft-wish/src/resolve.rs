#![forbid(unsafe_code)]

//! Resolution: match a wish against the registry.

use tracing::trace;

use weft_core::PublicationId;

use crate::identity::Identity;
use crate::registry::Registry;
use crate::wish::{MatchPolicy, Wish};

/// Resolve a wish against the current registry contents.
///
/// Matches are the publications under the wish's tag, in registration
/// order, minus anything published by the querying instance's composite
/// `identity` (unless the wish explicitly allows self-matches).
/// `MatchPolicy::First` keeps only the first-registered survivor.
///
/// Pure with respect to its inputs: resolving twice against an unchanged
/// registry yields the same ordered list.
#[must_use]
pub fn resolve(registry: &Registry, wish: &Wish, identity: &Identity) -> Vec<PublicationId> {
    let mut matches: Vec<PublicationId> = registry
        .published(&wish.tag)
        .iter()
        .copied()
        .filter(|id| {
            registry.get(*id).is_some_and(|publication| {
                wish.allow_self || !identity.contains(publication.instance)
            })
        })
        .collect();
    if wish.policy == MatchPolicy::First {
        matches.truncate(1);
    }
    trace!(tag = %wish.tag, matched = matches.len(), "resolve");
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::{Key, SlotMap};
    use weft_core::{CellId, InstanceId, NodeId, Source, Tag, Tick};

    fn instances(n: usize) -> Vec<InstanceId> {
        let mut ids: SlotMap<InstanceId, ()> = SlotMap::with_key();
        (0..n).map(|_| ids.insert(())).collect()
    }

    fn source() -> Source {
        Source::Cell(CellId::null())
    }

    fn wish_for(owner: InstanceId, tag: &str, policy: MatchPolicy) -> Wish {
        let mut w = Wish::new(Tag::new(tag), owner, policy, NodeId::null(), Tick::ZERO);
        w.begin_resolve();
        w
    }

    #[test]
    fn first_registered_wins_under_first_policy() {
        let ids = instances(3);
        let mut reg = Registry::new();
        let early = reg.publish(ids[0], "out", source(), Tag::new("#x"));
        reg.publish(ids[1], "out", source(), Tag::new("#x"));

        let wish = wish_for(ids[2], "#x", MatchPolicy::First);
        let matches = resolve(&reg, &wish, &Identity::of([ids[2]]));
        assert_eq!(matches, vec![early]);
    }

    #[test]
    fn own_publication_is_excluded() {
        let ids = instances(2);
        let mut reg = Registry::new();
        reg.publish(ids[0], "out", source(), Tag::new("#x"));
        let other = reg.publish(ids[1], "out", source(), Tag::new("#x"));

        let wish = wish_for(ids[0], "#x", MatchPolicy::All);
        let matches = resolve(&reg, &wish, &Identity::of([ids[0]]));
        assert_eq!(matches, vec![other]);
    }

    #[test]
    fn composite_identity_excludes_composed_children() {
        let ids = instances(3);
        let (parent, child, stranger) = (ids[0], ids[1], ids[2]);
        let mut reg = Registry::new();
        reg.publish(child, "out", source(), Tag::new("#x"));
        let independent = reg.publish(stranger, "out", source(), Tag::new("#x"));

        // Parent's identity covers the child it composes.
        let wish = wish_for(parent, "#x", MatchPolicy::All);
        let matches = resolve(&reg, &wish, &Identity::of([parent, child]));
        assert_eq!(matches, vec![independent]);
    }

    #[test]
    fn allow_self_opts_back_in() {
        let ids = instances(1);
        let mut reg = Registry::new();
        let own = reg.publish(ids[0], "out", source(), Tag::new("#x"));

        let mut wish = wish_for(ids[0], "#x", MatchPolicy::All);
        wish.allow_self = true;
        let matches = resolve(&reg, &wish, &Identity::of([ids[0]]));
        assert_eq!(matches, vec![own]);
    }

    #[test]
    fn resolution_is_idempotent_and_order_stable() {
        let ids = instances(4);
        let mut reg = Registry::new();
        for publisher in &ids[..3] {
            reg.publish(*publisher, "out", source(), Tag::new("#x"));
        }
        let wish = wish_for(ids[3], "#x", MatchPolicy::All);
        let identity = Identity::of([ids[3]]);
        let first = resolve(&reg, &wish, &identity);
        let second = resolve(&reg, &wish, &identity);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn no_publishers_resolves_empty() {
        let ids = instances(1);
        let reg = Registry::new();
        let wish = wish_for(ids[0], "#missing", MatchPolicy::All);
        assert!(resolve(&reg, &wish, &Identity::of([ids[0]])).is_empty());
    }
}

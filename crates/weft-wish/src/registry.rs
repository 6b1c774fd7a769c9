#![forbid(unsafe_code)]

//! The publication registry.
//!
//! A process-wide (per-runtime) mapping from tag to the outputs currently
//! published under it. Entries are added when an instance publishes an
//! output and removed when it retracts or is destroyed. Per-tag order is
//! registration order, which is what makes resolution deterministic and
//! "first registered wins" well-defined.

use indexmap::{IndexMap, IndexSet};
use slotmap::SlotMap;
use tracing::debug;

use weft_core::{InstanceId, PublicationId, Source, Tag};

/// One published output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    /// The publishing instance.
    pub instance: InstanceId,
    /// The output name within that instance.
    pub output: String,
    /// Where the value lives in the graph.
    pub source: Source,
    /// The discovery tag.
    pub tag: Tag,
}

/// Registry of published outputs, with a per-tag dirty set driving
/// re-resolution.
#[derive(Default)]
pub struct Registry {
    publications: SlotMap<PublicationId, Publication>,
    /// Tag to publications, each list in registration order.
    by_tag: IndexMap<Tag, Vec<PublicationId>>,
    /// Tags whose publication set changed since the last drain.
    dirty: IndexSet<Tag>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Publish an output under a tag. Marks the tag dirty.
    pub fn publish(
        &mut self,
        instance: InstanceId,
        output: impl Into<String>,
        source: Source,
        tag: Tag,
    ) -> PublicationId {
        let output = output.into();
        debug!(%tag, output = %output, "publish");
        let id = self.publications.insert(Publication {
            instance,
            output,
            source,
            tag: tag.clone(),
        });
        self.by_tag.entry(tag.clone()).or_default().push(id);
        self.dirty.insert(tag);
        id
    }

    /// Remove one publication. Returns `false` if it was already gone.
    pub fn retract(&mut self, id: PublicationId) -> bool {
        let Some(publication) = self.publications.remove(id) else {
            return false;
        };
        if let Some(list) = self.by_tag.get_mut(&publication.tag) {
            list.retain(|p| *p != id);
            if list.is_empty() {
                self.by_tag.swap_remove(&publication.tag);
            }
        }
        debug!(tag = %publication.tag, output = %publication.output, "retract");
        self.dirty.insert(publication.tag);
        true
    }

    /// Remove every publication made by `instance` (instance teardown).
    pub fn retract_instance(&mut self, instance: InstanceId) {
        let ids: Vec<PublicationId> = self
            .publications
            .iter()
            .filter(|(_, p)| p.instance == instance)
            .map(|(id, _)| id)
            .collect();
        for id in ids {
            self.retract(id);
        }
    }

    /// Publications under a tag, in registration order.
    #[must_use]
    pub fn published(&self, tag: &Tag) -> &[PublicationId] {
        self.by_tag.get(tag).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn get(&self, id: PublicationId) -> Option<&Publication> {
        self.publications.get(id)
    }

    /// Drain the tags whose publication set changed, in change order.
    pub fn take_dirty(&mut self) -> Vec<Tag> {
        self.dirty.drain(..).collect()
    }

    #[must_use]
    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.publications.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.publications.is_empty()
    }
}

#![forbid(unsafe_code)]

//! Arena key types for cells, derived nodes, instances, publications, and
//! wishes.
//!
//! All handles are generational `slotmap` keys: cheap to copy, and stale
//! after the slot is removed, which is what turns "operate on a destroyed
//! cell" into a constructible [`DetachedCell`](crate::WeftError::DetachedCell)
//! error instead of undefined reuse.

use slotmap::new_key_type;

new_key_type! {
    /// Handle to a mutable cell in the graph.
    pub struct CellId;
    /// Handle to a derived (computed) node in the graph.
    pub struct NodeId;
    /// Handle to a running instance ("charm").
    pub struct InstanceId;
    /// Handle to a published output in the registry.
    pub struct PublicationId;
    /// Handle to a wish query.
    pub struct WishId;
}

/// A readable location in the graph: either a cell or a derived node.
///
/// Derivation inputs, instance outputs, and publications all refer to
/// sources, so a derived value can feed another derivation or be published
/// exactly like a plain cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// A mutable cell.
    Cell(CellId),
    /// A derived node.
    Node(NodeId),
}

impl From<CellId> for Source {
    fn from(id: CellId) -> Self {
        Source::Cell(id)
    }
}

impl From<NodeId> for Source {
    fn from(id: NodeId) -> Self {
        Source::Node(id)
    }
}

#![forbid(unsafe_code)]

//! Cell operations: create, read, write, watch.
//!
//! `set` is synchronous from the caller's perspective but delivery to
//! dependents and watchers is deferred to the next flush, so multiple
//! writes before a flush coalesce into one recompute pass.

use tracing::trace;

use weft_core::{CellId, InstanceId, NodeId, Result, Value, WeftError};

use crate::graph::Graph;

/// Callback invoked with the cell's new value after a flush in which it
/// changed.
pub(crate) type WatcherFn = Box<dyn FnMut(&Value)>;

/// Handle returned by [`Graph::subscribe`]; pass it back to
/// [`Graph::unsubscribe`] to remove the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub(crate) u64);

pub(crate) struct CellSlot {
    pub(crate) label: String,
    pub(crate) owner: InstanceId,
    pub(crate) value: Value,
    /// Value at the start of the current write batch; `Some` while the cell
    /// sits in the dirty set. Lets the flush drop net-zero batches.
    pub(crate) batch_prev: Option<Value>,
    /// Derived nodes reading this cell, in subscription order.
    pub(crate) dependents: Vec<NodeId>,
    /// External observers, in registration order.
    pub(crate) watchers: Vec<(WatchId, WatcherFn)>,
}

impl Graph {
    /// Create a cell owned by `owner`. The label is used in diagnostics and
    /// cycle reports.
    pub fn cell(&mut self, owner: InstanceId, label: impl Into<String>, initial: Value) -> CellId {
        self.cells.insert(CellSlot {
            label: label.into(),
            owner,
            value: initial,
            batch_prev: None,
            dependents: Vec::new(),
            watchers: Vec::new(),
        })
    }

    /// Read a cell's current value.
    pub fn get(&self, cell: CellId) -> Result<&Value> {
        self.cells
            .get(cell)
            .map(|slot| &slot.value)
            .ok_or_else(|| WeftError::detached(format!("{cell:?}")))
    }

    /// Write a cell. Returns `true` if the value actually changed.
    ///
    /// Structural equality gates the write: setting an equal value marks
    /// nothing dirty and notifies nobody. A second write before the next
    /// flush overwrites the first (coalescing); dependents will observe
    /// only the final value. A batch that ends back at its starting value
    /// is dropped entirely at flush time.
    pub fn set(&mut self, cell: CellId, value: Value) -> Result<bool> {
        let slot = self
            .cells
            .get_mut(cell)
            .ok_or_else(|| WeftError::detached(format!("{cell:?}")))?;
        if slot.value == value {
            return Ok(false);
        }
        let old = std::mem::replace(&mut slot.value, value);
        trace!(label = %slot.label, "cell set");
        if self.dirty_cells.insert(cell) {
            // First write of the batch; remember where it started.
            self.cells[cell].batch_prev = Some(old);
        }
        Ok(true)
    }

    /// Register a watcher called with the new value after each flush in
    /// which the cell changed. Watchers run in registration order.
    pub fn subscribe(
        &mut self,
        cell: CellId,
        callback: impl FnMut(&Value) + 'static,
    ) -> Result<WatchId> {
        let id = WatchId(self.next_watch);
        self.next_watch += 1;
        let slot = self
            .cells
            .get_mut(cell)
            .ok_or_else(|| WeftError::detached(format!("{cell:?}")))?;
        slot.watchers.push((id, Box::new(callback)));
        Ok(id)
    }

    /// Remove a watcher. Returns `true` if it was still registered.
    pub fn unsubscribe(&mut self, cell: CellId, watch: WatchId) -> Result<bool> {
        let slot = self
            .cells
            .get_mut(cell)
            .ok_or_else(|| WeftError::detached(format!("{cell:?}")))?;
        let before = slot.watchers.len();
        slot.watchers.retain(|(id, _)| *id != watch);
        Ok(slot.watchers.len() != before)
    }

    /// The owning instance of a cell.
    pub fn cell_owner(&self, cell: CellId) -> Result<InstanceId> {
        self.cells
            .get(cell)
            .map(|slot| slot.owner)
            .ok_or_else(|| WeftError::detached(format!("{cell:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::Key;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn owner() -> InstanceId {
        InstanceId::null()
    }

    #[test]
    fn set_equal_value_is_noop() {
        let mut g = Graph::new();
        let c = g.cell(owner(), "n", Value::Int(42));
        assert!(!g.set(c, Value::Int(42)).unwrap());
        assert!(!g.has_pending_work());
        assert!(g.set(c, Value::Int(43)).unwrap());
        assert!(g.has_pending_work());
    }

    #[test]
    fn get_after_destroy_is_detached() {
        let mut g = Graph::new();
        let c = g.cell(owner(), "n", Value::Int(0));
        g.destroy_owned(owner());
        assert!(matches!(g.get(c), Err(WeftError::DetachedCell { .. })));
        assert!(matches!(
            g.set(c, Value::Int(1)),
            Err(WeftError::DetachedCell { .. })
        ));
    }

    #[test]
    fn watchers_fire_once_per_flush_in_order() {
        let mut g = Graph::new();
        let c = g.cell(owner(), "n", Value::Int(0));
        let seen: Rc<RefCell<Vec<(u8, i64)>>> = Rc::default();

        let s1 = Rc::clone(&seen);
        g.subscribe(c, move |v| s1.borrow_mut().push((1, v.as_int().unwrap())))
            .unwrap();
        let s2 = Rc::clone(&seen);
        g.subscribe(c, move |v| s2.borrow_mut().push((2, v.as_int().unwrap())))
            .unwrap();

        // Coalesced: both watchers see only the final value, once.
        g.set(c, Value::Int(1)).unwrap();
        g.set(c, Value::Int(2)).unwrap();
        g.flush();

        assert_eq!(seen.borrow().as_slice(), &[(1, 2), (2, 2)]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut g = Graph::new();
        let c = g.cell(owner(), "n", Value::Int(0));
        let seen: Rc<RefCell<Vec<i64>>> = Rc::default();

        let s = Rc::clone(&seen);
        let watch = g
            .subscribe(c, move |v| s.borrow_mut().push(v.as_int().unwrap()))
            .unwrap();

        g.set(c, Value::Int(1)).unwrap();
        g.flush();
        assert!(g.unsubscribe(c, watch).unwrap());
        g.set(c, Value::Int(2)).unwrap();
        g.flush();

        assert_eq!(seen.borrow().as_slice(), &[1]);
    }
}

//! Cell Arena
//!
//! All cells of one runtime live in a single generational arena. Dependency
//! edges are stored as [`CellId`]s in both directions, so they imply no
//! ownership: removing a slot bumps its generation and every handle that
//! still points at it resolves to nothing instead of dangling.

use super::node::{CellId, CellNode};

struct Slot {
    generation: u32,
    node: Option<CellNode>,
}

/// Generational storage for cell nodes.
#[derive(Default)]
pub(crate) struct CellArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl CellArena {
    /// Create an empty arena.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning its handle.
    pub(crate) fn insert(&mut self, node: CellNode) -> CellId {
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return CellId::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        CellId::new(index, 0)
    }

    /// Remove a node.
    ///
    /// Also removes every edge involving this node from its neighbours.
    pub(crate) fn remove(&mut self, id: CellId) -> Option<CellNode> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.len -= 1;

        for dep in node.calls.iter() {
            if let Some(dep_node) = self.get_mut(*dep) {
                dep_node.called_by.shift_remove(&id);
            }
        }
        for dependent in node.called_by.iter() {
            if let Some(dependent_node) = self.get_mut(*dependent) {
                dependent_node.calls.shift_remove(&id);
            }
        }

        Some(node)
    }

    /// Get a reference to a node.
    pub(crate) fn get(&self, id: CellId) -> Option<&CellNode> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_ref())
    }

    /// Get a mutable reference to a node.
    pub(crate) fn get_mut(&mut self, id: CellId) -> Option<&mut CellNode> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_mut())
    }

    pub(crate) fn contains(&self, id: CellId) -> bool {
        self.get(id).is_some()
    }

    /// Record that `dependent`'s rule read `dependency`.
    pub(crate) fn link(&mut self, dependency: CellId, dependent: CellId) {
        if let Some(node) = self.get_mut(dependent) {
            node.calls.insert(dependency);
        }
        if let Some(node) = self.get_mut(dependency) {
            node.called_by.insert(dependent);
        }
    }

    /// Drop all outgoing edges of `dependent`, along with the matching
    /// back-links on the cells it used to call.
    pub(crate) fn sever_calls(&mut self, dependent: CellId) {
        let calls = match self.get_mut(dependent) {
            Some(node) => std::mem::take(&mut node.calls),
            None => return,
        };
        for dep in calls {
            if let Some(node) = self.get_mut(dep) {
                node.called_by.shift_remove(&dependent);
            }
        }
    }

    /// Iterate over all live nodes in slot order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (CellId, &CellNode)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.node
                .as_ref()
                .map(|node| (CellId::new(index as u32, slot.generation), node))
        })
    }

    /// Number of live nodes.
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{CellKind, ValueType};
    use std::any::Any;
    use std::rc::Rc;

    fn node(name: &str) -> CellNode {
        CellNode::new(
            name.to_string(),
            CellKind::Rule,
            ValueType::of::<i32>(),
            Rc::new(|_: &dyn Any, _: &dyn Any| false),
        )
    }

    #[test]
    fn insert_and_remove() {
        let mut arena = CellArena::new();
        let a = arena.insert(node("a"));
        let b = arena.insert(node("b"));
        assert_eq!(arena.len(), 2);

        assert!(arena.remove(a).is_some());
        assert_eq!(arena.len(), 1);
        assert!(arena.get(a).is_none());
        assert!(arena.get(b).is_some());
    }

    #[test]
    fn reused_slot_invalidates_old_handle() {
        let mut arena = CellArena::new();
        let a = arena.insert(node("a"));
        arena.remove(a);

        let c = arena.insert(node("c"));
        assert_eq!(a.index(), c.index());
        assert_ne!(a, c);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(c).map(|n| n.name.as_str()), Some("c"));
        assert!(arena.remove(a).is_none());
    }

    #[test]
    fn link_and_sever() {
        let mut arena = CellArena::new();
        let x = arena.insert(node("x"));
        let a = arena.insert(node("a"));

        arena.link(x, a);
        assert!(arena.get(a).unwrap().calls.contains(&x));
        assert!(arena.get(x).unwrap().called_by.contains(&a));

        arena.sever_calls(a);
        assert!(arena.get(a).unwrap().calls.is_empty());
        assert!(arena.get(x).unwrap().called_by.is_empty());
    }

    #[test]
    fn remove_scrubs_edges() {
        let mut arena = CellArena::new();
        let x = arena.insert(node("x"));
        let a = arena.insert(node("a"));
        let b = arena.insert(node("b"));
        arena.link(x, a);
        arena.link(a, b);

        arena.remove(a);
        assert!(arena.get(x).unwrap().called_by.is_empty());
        assert!(arena.get(b).unwrap().calls.is_empty());
    }

    #[test]
    fn iter_skips_removed() {
        let mut arena = CellArena::new();
        let a = arena.insert(node("a"));
        arena.insert(node("b"));
        arena.remove(a);

        let names: Vec<_> = arena.iter().map(|(_, n)| n.name.clone()).collect();
        assert_eq!(names, vec!["b".to_string()]);
    }
}

//! Arena-backed doubly-linked list.
//!
//! Nodes live in a slot vector owned by the list and refer to their neighbors by index, so
//! insertion and removal next to a known node are O(1) without any raw pointer aliasing.
//! A [`NodeId`] stays valid until its node is removed; vacated slots are recycled through an
//! internal free list.

use alloc::collections::TryReserveError;
use alloc::vec::Vec;
use core::mem;
use core::ops::{Index, IndexMut};

/// Stable handle to a node of a [`List`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

struct Node<T> {
    value: T,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

enum Slot<T> {
    Occupied(Node<T>),
    Vacant { next_free: Option<usize> },
}

/// An ordered sequence of values with O(1) insert/remove given a [`NodeId`].
pub struct List<T> {
    slots: Vec<Slot<T>>,
    free: Option<usize>,
    free_count: usize,
    first: Option<NodeId>,
    last: Option<NodeId>,
    len: usize,
}

impl<T> List<T> {
    /// Creates an empty list.
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: None,
            free_count: 0,
            first: None,
            last: None,
            len: 0,
        }
    }

    /// Returns the number of nodes in the list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the list has no nodes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the first node.
    pub fn first(&self) -> Option<NodeId> {
        self.first
    }

    /// Returns the last node.
    pub fn last(&self) -> Option<NodeId> {
        self.last
    }

    /// Returns the node following `id`.
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next
    }

    /// Returns the node preceding `id`.
    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev
    }

    /// Returns the value stored at `id`, or `None` if the node was removed.
    pub fn get(&self, id: NodeId) -> Option<&T> {
        match self.slots.get(id.0) {
            Some(Slot::Occupied(node)) => Some(&node.value),
            _ => None,
        }
    }

    /// Returns the value stored at `id` mutably, or `None` if the node was removed.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        match self.slots.get_mut(id.0) {
            Some(Slot::Occupied(node)) => Some(&mut node.value),
            _ => None,
        }
    }

    /// Makes room for `additional` insertions that will then not allocate.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        let needed = additional.saturating_sub(self.free_count);
        self.slots.try_reserve(needed)
    }

    /// Inserts `value` after `prev`, or at the front if `prev` is `None`.
    pub fn insert_after(&mut self, prev: Option<NodeId>, value: T) -> NodeId {
        let next = match prev {
            Some(prev) => self.node(prev).next,
            None => self.first,
        };
        self.link(prev, next, value)
    }

    /// Inserts `value` before `next`, or at the back if `next` is `None`.
    pub fn insert_before(&mut self, next: Option<NodeId>, value: T) -> NodeId {
        let prev = match next {
            Some(next) => self.node(next).prev,
            None => self.last,
        };
        self.link(prev, next, value)
    }

    /// Appends `value` at the back.
    pub fn push_back(&mut self, value: T) -> NodeId {
        self.insert_before(None, value)
    }

    /// Unlinks the node `id` and returns its value.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not refer to a node of this list.
    pub fn remove(&mut self, id: NodeId) -> T {
        let vacant = Slot::Vacant {
            next_free: self.free,
        };
        let Slot::Occupied(node) = mem::replace(&mut self.slots[id.0], vacant) else {
            panic!("list node {:?} is not linked", id);
        };

        match node.prev {
            Some(prev) => self.node_mut(prev).next = node.next,
            None => self.first = node.next,
        }
        match node.next {
            Some(next) => self.node_mut(next).prev = node.prev,
            None => self.last = node.prev,
        }

        self.free = Some(id.0);
        self.free_count += 1;
        self.len -= 1;
        node.value
    }

    /// Removes every node, dropping the values front to back.
    pub fn clear(&mut self) {
        while let Some(first) = self.first {
            self.remove(first);
        }
        self.slots.clear();
        self.free = None;
        self.free_count = 0;
    }

    /// Returns the first node whose value satisfies `predicate`.
    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<NodeId> {
        self.iter()
            .find(|(_, value)| predicate(value))
            .map(|(id, _)| id)
    }

    /// Iterates the list front to back.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.first,
        }
    }

    fn link(&mut self, prev: Option<NodeId>, next: Option<NodeId>, value: T) -> NodeId {
        let node = Slot::Occupied(Node { value, prev, next });
        let id = match self.free {
            Some(index) => {
                let Slot::Vacant { next_free } = mem::replace(&mut self.slots[index], node) else {
                    unreachable!("free list points at an occupied slot");
                };
                self.free = next_free;
                self.free_count -= 1;
                NodeId(index)
            }
            None => {
                self.slots.push(node);
                NodeId(self.slots.len() - 1)
            }
        };

        match prev {
            Some(prev) => self.node_mut(prev).next = Some(id),
            None => self.first = Some(id),
        }
        match next {
            Some(next) => self.node_mut(next).prev = Some(id),
            None => self.last = Some(id),
        }

        self.len += 1;
        id
    }

    fn node(&self, id: NodeId) -> &Node<T> {
        match &self.slots[id.0] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => panic!("list node {:?} is not linked", id),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        match &mut self.slots[id.0] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => panic!("list node {:?} is not linked", id),
        }
    }
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<NodeId> for List<T> {
    type Output = T;

    /// # Panics
    ///
    /// Panics if `id` does not refer to a node of this list.
    fn index(&self, id: NodeId) -> &T {
        &self.node(id).value
    }
}

impl<T> IndexMut<NodeId> for List<T> {
    fn index_mut(&mut self, id: NodeId) -> &mut T {
        &mut self.node_mut(id).value
    }
}

/// Front-to-back iterator over a [`List`], yielding each node's handle and value.
pub struct Iter<'a, T> {
    list: &'a List<T>,
    cursor: Option<NodeId>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = self.list.node(id);
        self.cursor = node.next;
        Some((id, &node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(list: &List<u32>) -> Vec<u32> {
        list.iter().map(|(_, v)| *v).collect()
    }

    fn values_reversed(list: &List<u32>) -> Vec<u32> {
        let mut out = Vec::new();
        let mut cursor = list.last();
        while let Some(id) = cursor {
            out.push(*list.get(id).unwrap());
            cursor = list.prev(id);
        }
        out
    }

    #[test]
    fn empty_list() {
        let list: List<u32> = List::new();
        assert!(list.is_empty());
        assert_eq!(list.first(), None);
        assert_eq!(list.last(), None);
        assert_eq!(list.iter().count(), 0);
    }

    #[test]
    fn insert_after_and_before() {
        let mut list = List::new();
        let b = list.push_back(2);
        list.insert_after(None, 1);
        let d = list.push_back(4);
        list.insert_before(Some(d), 3);
        list.insert_after(Some(b), 5);

        assert_eq!(values(&list), vec![1, 2, 5, 3, 4]);
        assert_eq!(values_reversed(&list), vec![4, 3, 5, 2, 1]);
        assert_eq!(list.len(), 5);
    }

    #[test]
    fn remove_relinks_neighbors() {
        let mut list = List::new();
        let a = list.push_back(1);
        let b = list.push_back(2);
        let c = list.push_back(3);

        assert_eq!(list.remove(b), 2);
        assert_eq!(list.next(a), Some(c));
        assert_eq!(list.prev(c), Some(a));

        assert_eq!(list.remove(a), 1);
        assert_eq!(list.first(), Some(c));
        assert_eq!(list.remove(c), 3);
        assert!(list.is_empty());
        assert_eq!(list.last(), None);
    }

    #[test]
    fn removed_slots_are_reused() {
        let mut list = List::new();
        let a = list.push_back(1);
        list.push_back(2);
        list.remove(a);
        let c = list.push_back(3);

        assert_eq!(c, a);
        assert_eq!(list.get(c), Some(&3));
        assert_eq!(values(&list), vec![2, 3]);
    }

    #[test]
    fn stale_handle_reads_none() {
        let mut list = List::new();
        let a = list.push_back(1);
        list.remove(a);
        assert_eq!(list.get(a), None);
    }

    #[test]
    #[should_panic(expected = "is not linked")]
    fn double_remove_panics() {
        let mut list = List::new();
        let a = list.push_back(1);
        list.push_back(2);
        list.remove(a);
        list.remove(a);
    }

    #[test]
    fn find_returns_first_match() {
        let mut list = List::new();
        list.push_back(1);
        let b = list.push_back(4);
        list.push_back(6);
        assert_eq!(list.find(|v| v % 2 == 0), Some(b));
        assert_eq!(list.find(|v| *v > 10), None);
    }

    #[test]
    fn clear_drops_everything() {
        let mut list = List::new();
        for i in 0..8 {
            list.push_back(i);
        }
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.push_back(9), NodeId(0));
    }

    #[test]
    fn reserve_counts_free_slots() {
        let mut list = List::new();
        let a = list.push_back(1);
        list.remove(a);
        list.try_reserve(1).unwrap();
        let capacity = list.slots.capacity();
        list.push_back(2);
        assert_eq!(list.slots.capacity(), capacity);
    }
}

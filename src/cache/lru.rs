//! LRU ordering for idle cache entries.
//!
//! Only entries nobody references sit in the list; the table cache pushes an
//! entry when its last reference is released and removes it when the entry
//! is handed out again, so eviction never has to skip pinned entries.

use std::collections::HashMap;
use std::hash::Hash;

/// A node in the LRU linked list.
struct LruNode<K> {
    key: K,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Recency-ordered set of keys.
///
/// Nodes live in a vector and link by index; freed slots are reused.
pub(crate) struct IdleList<K> {
    /// Map from key to node index.
    map: HashMap<K, usize>,
    /// Node storage.
    nodes: Vec<Option<LruNode<K>>>,
    /// Free list of node indices.
    free_list: Vec<usize>,
    /// Most recently used.
    head: Option<usize>,
    /// Least recently used.
    tail: Option<usize>,
}

impl<K: Hash + Eq + Clone> IdleList<K> {
    pub(crate) fn new() -> Self {
        Self {
            map: HashMap::new(),
            nodes: Vec::new(),
            free_list: Vec::new(),
            head: None,
            tail: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    /// Insert `key` as most recently used, moving it if already present.
    pub(crate) fn touch(&mut self, key: K) {
        if let Some(&idx) = self.map.get(&key) {
            self.unlink(idx);
            self.link_front(idx);
            return;
        }

        let idx = match self.free_list.pop() {
            Some(idx) => idx,
            None => {
                self.nodes.push(None);
                self.nodes.len() - 1
            }
        };
        self.nodes[idx] = Some(LruNode {
            key: key.clone(),
            prev: None,
            next: None,
        });
        self.link_front(idx);
        self.map.insert(key, idx);
    }

    /// Remove `key`, returning whether it was present.
    pub(crate) fn remove(&mut self, key: &K) -> bool {
        match self.map.remove(key) {
            Some(idx) => {
                self.unlink(idx);
                self.nodes[idx] = None;
                self.free_list.push(idx);
                true
            }
            None => false,
        }
    }

    /// Remove and return the least recently used key.
    pub(crate) fn pop_lru(&mut self) -> Option<K> {
        let idx = self.tail?;
        let key = self.nodes[idx].as_ref()?.key.clone();
        self.remove(&key);
        Some(key)
    }

    /// Remove every key, least recently used first.
    pub(crate) fn drain(&mut self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.len());
        while let Some(key) = self.pop_lru() {
            keys.push(key);
        }
        keys
    }

    fn link_front(&mut self, idx: usize) {
        if let Some(ref mut node) = self.nodes[idx] {
            node.prev = None;
            node.next = self.head;
        }

        if let Some(head_idx) = self.head {
            if let Some(ref mut head_node) = self.nodes[head_idx] {
                head_node.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match self.nodes[idx] {
            Some(ref node) => (node.prev, node.next),
            None => return,
        };

        if let Some(prev_idx) = prev {
            if let Some(ref mut prev_node) = self.nodes[prev_idx] {
                prev_node.next = next;
            }
        } else {
            self.head = next;
        }

        if let Some(next_idx) = next {
            if let Some(ref mut next_node) = self.nodes[next_idx] {
                next_node.prev = prev;
            }
        } else {
            self.tail = prev;
        }
    }
}

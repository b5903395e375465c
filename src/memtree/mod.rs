//! # In-Memory B-Tree
//!
//! A generic B-tree over any totally ordered key type, parameterized by
//! its minimum degree `t`:
//!
//! - every node holds at most `2t - 1` keys;
//! - every node except the root holds at least `t - 1` keys, the root at
//!   least 1;
//! - all leaves sit at the same depth;
//! - keys within a node are sorted, and a child between keys `k1` and
//!   `k2` holds only keys in that range.
//!
//! The ordering capability is the `Ord` bound supplied at construction
//! time, so every key in a tree is comparable with every other by
//! construction. [`TotalF64`] adapts floats to that bound via their IEEE
//! total order.
//!
//! ## Insertion
//!
//! Proactive split-on-descent: a full root is split before anything
//! else, growing the tree by one level; on the way down every full child
//! is split before entering it, so the leaf reached always has room.
//! Duplicate keys are admitted and placed before their equals.
//!
//! ## Deletion
//!
//! The CLRS three-case scheme. A key found in a leaf is removed in
//! place. A key found in an internal node is replaced by its in-order
//! predecessor (or successor) when the adjacent child can spare a key,
//! otherwise the two children merge around the key and deletion recurses
//! into the merged child. Descending toward a key, any child at `t - 1`
//! keys is refilled first by borrowing through the parent from a rich
//! sibling or merging with a poor one. An emptied internal root is
//! replaced by its single child; an emptied leaf root empties the tree.

use std::cmp::Ordering;

use eyre::{ensure, Result};

/// `f64` wrapped in its IEEE-754 total order, usable as a tree key.
#[derive(Debug, Clone, Copy)]
pub struct TotalF64(pub f64);

impl PartialEq for TotalF64 {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for TotalF64 {}

impl PartialOrd for TotalF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TotalF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug)]
pub struct Node<K> {
    keys: Vec<K>,
    children: Vec<Box<Node<K>>>,
    leaf: bool,
}

#[derive(Debug)]
pub struct BTree<K: Ord> {
    root: Option<Box<Node<K>>>,
    degree: usize,
}

impl<K: Ord> BTree<K> {
    /// Creates a tree with minimum degree `degree` (at least 2).
    pub fn new(degree: usize) -> Result<Self> {
        ensure!(degree >= 2, "minimum degree must be at least 2");

        Ok(Self { root: None, degree })
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// The node currently holding a key equal to `key`, if any.
    pub fn search(&self, key: &K) -> Option<&Node<K>> {
        self.root.as_deref()?.search(key)
    }

    /// Admits `key`; duplicates land before their equals.
    pub fn insert(&mut self, key: K) {
        let t = self.degree;

        match self.root.take() {
            None => {
                self.root = Some(Box::new(Node {
                    keys: vec![key],
                    children: Vec::new(),
                    leaf: true,
                }));
            }
            Some(root) => {
                if root.is_full(t) {
                    let mut new_root = Box::new(Node {
                        keys: Vec::new(),
                        children: vec![root],
                        leaf: false,
                    });
                    new_root.split_child(0, t);

                    let idx = usize::from(key > new_root.keys[0]);
                    new_root.children[idx].insert_non_full(key, t);
                    self.root = Some(new_root);
                } else {
                    let mut root = root;
                    root.insert_non_full(key, t);
                    self.root = Some(root);
                }
            }
        }
    }

    /// Removes one occurrence of `key`, reporting whether one was found.
    pub fn delete(&mut self, key: &K) -> bool {
        let Some(mut root) = self.root.take() else {
            return false;
        };

        let deleted = root.delete(key, self.degree);

        self.root = if root.keys.is_empty() {
            if root.leaf {
                None
            } else {
                // the tree shrinks by one level
                Some(root.children.remove(0))
            }
        } else {
            Some(root)
        };

        deleted
    }
}

impl<K: Ord> Node<K> {
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn is_leaf(&self) -> bool {
        self.leaf
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    pub fn child(&self, idx: usize) -> &Node<K> {
        &self.children[idx]
    }

    /// First index whose key is greater than or equal to `key`.
    fn find_key(&self, key: &K) -> usize {
        self.keys.partition_point(|k| k < key)
    }

    fn is_full(&self, t: usize) -> bool {
        self.keys.len() == 2 * t - 1
    }

    fn search(&self, key: &K) -> Option<&Node<K>> {
        let idx = self.find_key(key);

        if idx < self.keys.len() && self.keys[idx] == *key {
            return Some(self);
        }
        if self.leaf {
            return None;
        }
        self.children[idx].search(key)
    }

    fn insert_non_full(&mut self, key: K, t: usize) {
        let mut idx = self.find_key(&key);

        if self.leaf {
            self.keys.insert(idx, key);
            return;
        }

        if self.children[idx].is_full(t) {
            self.split_child(idx, t);
            if key > self.keys[idx] {
                idx += 1;
            }
        }
        self.children[idx].insert_non_full(key, t);
    }

    /// Splits the full child at `idx` around its median, which rises
    /// into this node at the same index.
    fn split_child(&mut self, idx: usize, t: usize) {
        debug_assert!(self.children[idx].is_full(t), "splitting a non-full node");
        debug_assert!(!self.is_full(t), "inserting into a full parent");

        let child = &mut self.children[idx];
        let mid = t - 1;

        let right_keys = child.keys.split_off(mid + 1);
        let median = child.keys.pop().expect("a full node has a median"); // INVARIANT: 2t-1 >= 3 keys
        let right_children = if child.leaf {
            Vec::new()
        } else {
            child.children.split_off(mid + 1)
        };

        let right = Box::new(Node {
            keys: right_keys,
            children: right_children,
            leaf: child.leaf,
        });
        self.keys.insert(idx, median);
        self.children.insert(idx + 1, right);
    }

    fn delete(&mut self, key: &K, t: usize) -> bool {
        let idx = self.find_key(key);

        if idx < self.keys.len() && self.keys[idx] == *key {
            if self.leaf {
                self.keys.remove(idx);
                true
            } else {
                self.delete_internal(idx, key, t)
            }
        } else if self.leaf {
            false
        } else {
            // refill a minimal child before descending into it
            let idx = if self.children[idx].keys.len() < t {
                self.fill(idx, t)
            } else {
                idx
            };
            self.children[idx].delete(key, t)
        }
    }

    /// Deletes the key at `idx` of this internal node.
    fn delete_internal(&mut self, idx: usize, key: &K, t: usize) -> bool {
        if self.children[idx].keys.len() >= t {
            // replace with the in-order predecessor pulled out of the
            // left subtree
            let predecessor = self.children[idx].remove_max(t);
            self.keys[idx] = predecessor;
            true
        } else if self.children[idx + 1].keys.len() >= t {
            let successor = self.children[idx + 1].remove_min(t);
            self.keys[idx] = successor;
            true
        } else {
            // both neighbours are minimal: merge around the key, then
            // delete it from the merged child
            self.merge(idx);
            self.children[idx].delete(key, t)
        }
    }

    /// Removes and returns the largest key of this subtree, refilling
    /// minimal nodes on the way down.
    fn remove_max(&mut self, t: usize) -> K {
        if self.leaf {
            return self.keys.pop().expect("subtree holds at least one key"); // INVARIANT: callers guarantee >= t keys
        }

        let mut idx = self.children.len() - 1;
        if self.children[idx].keys.len() < t {
            idx = self.fill(idx, t);
        }
        self.children[idx].remove_max(t)
    }

    /// Removes and returns the smallest key of this subtree.
    fn remove_min(&mut self, t: usize) -> K {
        if self.leaf {
            return self.keys.remove(0);
        }

        let idx = if self.children[0].keys.len() < t {
            self.fill(0, t)
        } else {
            0
        };
        debug_assert_eq!(idx, 0);
        self.children[idx].remove_min(t)
    }

    /// Brings the child at `idx` up to at least `t` keys by borrowing
    /// from a sibling or merging with one. Returns the index now
    /// covering that child's key range.
    fn fill(&mut self, idx: usize, t: usize) -> usize {
        if idx > 0 && self.children[idx - 1].keys.len() >= t {
            self.borrow_prev(idx);
            idx
        } else if idx < self.keys.len() && self.children[idx + 1].keys.len() >= t {
            self.borrow_next(idx);
            idx
        } else if idx < self.keys.len() {
            self.merge(idx);
            idx
        } else {
            // rightmost child merges leftward
            self.merge(idx - 1);
            idx - 1
        }
    }

    /// Rotates the left sibling's last key through the parent into the
    /// front of the child at `idx`.
    fn borrow_prev(&mut self, idx: usize) {
        let (left, right) = self.children.split_at_mut(idx);
        let sibling = left[idx - 1].as_mut();
        let child = right[0].as_mut();

        let sibling_last = sibling.keys.pop().expect("borrowing from a rich sibling");
        let separator = std::mem::replace(&mut self.keys[idx - 1], sibling_last);
        child.keys.insert(0, separator);

        if !child.leaf {
            let moved = sibling
                .children
                .pop()
                .expect("internal sibling has children");
            child.children.insert(0, moved);
        }
    }

    /// Rotates the right sibling's first key through the parent onto the
    /// back of the child at `idx`.
    fn borrow_next(&mut self, idx: usize) {
        let (left, right) = self.children.split_at_mut(idx + 1);
        let child = left[idx].as_mut();
        let sibling = right[0].as_mut();

        let sibling_first = sibling.keys.remove(0);
        let separator = std::mem::replace(&mut self.keys[idx], sibling_first);
        child.keys.push(separator);

        if !child.leaf {
            child.children.push(sibling.children.remove(0));
        }
    }

    /// Merges the child at `idx`, the separator above it and the right
    /// sibling into a single node.
    fn merge(&mut self, idx: usize) {
        let separator = self.keys.remove(idx);
        let sibling = *self.children.remove(idx + 1);
        let child = self.children[idx].as_mut();

        child.keys.push(separator);
        child.keys.extend(sibling.keys);
        if !child.leaf {
            child.children.extend(sibling.children);
        }
    }
}

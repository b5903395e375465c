//! # Disk B+Tree
//!
//! A B+tree over slotted node pages stored in a paged file. Internal
//! nodes hold separator cells pointing at child pages; leaf nodes hold
//! the records themselves. All nodes fit a single page data region; the
//! root is pinned at page 1.
//!
//! ## Module Organization
//!
//! - `cell`: binary codec for internal and leaf cells
//! - `node`: slotted page layout, lookup and insertion within one node
//! - `tree`: descent, split propagation, persistence

mod cell;
mod node;
mod tree;

pub use cell::{Cell, CellPointer, InternalCell, LeafCell, CELL_HEADER_SIZE, CELL_POINTER_SIZE};
pub use node::{BTreePage, InternalNode, LeafNode, NodePage, LEAF_FLAG, NODE_HEADER_SIZE};
pub use tree::{BTree, ROOT_PAGE};

//! # Slotted Node Pages
//!
//! A node of the disk B+tree occupies the data region of one paged-file
//! page, laid out as a slotted page:
//!
//! ```text
//! +---------------------------+
//! | Node Header (12 bytes)    |
//! +---------------------------+
//! | Slot Directory            |  <- grows upward from `lower`
//! | (4-byte cell pointers)    |
//! +---------------------------+
//! | Free Space [lower, upper) |
//! +---------------------------+
//! | Cell Bodies               |  <- packed downward from `upper`
//! +---------------------------+
//! ```
//!
//! ## Node Header Layout (12 bytes, big-endian on read and write)
//!
//! ```text
//! Offset  Size  Field      Description
//! ------  ----  ---------  -------------------------------------------
//! 0       2     flags      bit 0 set = leaf node
//! 2       2     lower      end of the slot directory
//! 4       2     upper      start of the packed cell bodies
//! 6       2     num_cells  number of cells in the directory
//! 8       4     left       leftmost child page (internal nodes)
//! ```
//!
//! A cell fits iff its size plus one slot pointer does not exceed
//! `upper - lower`. Cells are kept ordered by key; lookup is a binary
//! search. An internal node's `find_child` returns the child of the
//! largest cell key at or below the probe, falling back to the `left`
//! pointer when every cell key is larger, so a non-empty internal node
//! always yields a child.

use eyre::{bail, ensure, Result};
use zerocopy::big_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::cell::{Cell, CellPointer, InternalCell, LeafCell, CELL_POINTER_SIZE};

pub const NODE_HEADER_SIZE: usize = 12;

/// Flag bit distinguishing leaf nodes from internal nodes.
pub const LEAF_FLAG: u16 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct NodeHeader {
    flags: U16,
    lower: U16,
    upper: U16,
    num_cells: U16,
    left: U32,
}

const _: () = assert!(size_of::<NodeHeader>() == NODE_HEADER_SIZE);

/// A slotted page of cells, generic over the cell variant.
#[derive(Debug, Clone)]
pub struct BTreePage<C> {
    flags: u16,
    lower: usize,
    upper: usize,
    capacity: usize,
    left: u32,
    cells: Vec<C>,
}

pub type InternalNode = BTreePage<InternalCell>;
pub type LeafNode = BTreePage<LeafCell>;

impl<C: Cell> BTreePage<C> {
    fn with_flags(flags: u16, capacity: usize) -> Self {
        debug_assert!(capacity >= NODE_HEADER_SIZE && capacity <= u16::MAX as usize);
        Self {
            flags,
            lower: NODE_HEADER_SIZE,
            upper: capacity,
            capacity,
            left: 0,
            cells: Vec::new(),
        }
    }

    pub fn free_space(&self) -> usize {
        self.upper - self.lower
    }

    pub fn fits(&self, cell_size: usize) -> bool {
        cell_size + CELL_POINTER_SIZE <= self.free_space()
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[C] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<C> {
        self.cells
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn lower(&self) -> usize {
        self.lower
    }

    pub fn upper(&self) -> usize {
        self.upper
    }

    /// Places `cell` into the page, keeping cells ordered by key.
    pub fn insert_cell(&mut self, mut cell: C) -> Result<()> {
        let size = cell.size();
        ensure!(
            self.fits(size),
            "cell of {} bytes does not fit in {} free bytes",
            size,
            self.free_space()
        );

        self.upper -= size;
        cell.set_pointer(CellPointer {
            offset: self.upper as u16,
            length: size as u16,
        });
        self.lower += CELL_POINTER_SIZE;

        let at = match self.cells.binary_search_by(|c| c.compare(cell.key())) {
            Ok(i) => i,
            Err(i) => i,
        };
        self.cells.insert(at, cell);

        Ok(())
    }

    /// Reassigns every cell's window after a removal left a hole.
    fn repack(&mut self) {
        self.lower = NODE_HEADER_SIZE;
        self.upper = self.capacity;

        for cell in &mut self.cells {
            let size = cell.size();
            self.upper -= size;
            cell.set_pointer(CellPointer {
                offset: self.upper as u16,
                length: size as u16,
            });
            self.lower += CELL_POINTER_SIZE;
        }
    }

    /// Serializes the node into a buffer of exactly `capacity` bytes.
    pub fn write_to(&self, buf: &mut [u8]) -> Result<()> {
        ensure!(
            buf.len() == self.capacity,
            "node buffer of {} bytes does not match capacity {}",
            buf.len(),
            self.capacity
        );

        buf.fill(0);
        let header = NodeHeader {
            flags: U16::new(self.flags),
            lower: U16::new(self.lower as u16),
            upper: U16::new(self.upper as u16),
            num_cells: U16::new(self.cells.len() as u16),
            left: U32::new(self.left),
        };
        buf[..NODE_HEADER_SIZE].copy_from_slice(header.as_bytes());

        for (i, cell) in self.cells.iter().enumerate() {
            let pointer = cell.pointer();
            let slot = NODE_HEADER_SIZE + i * CELL_POINTER_SIZE;
            buf[slot..slot + 2].copy_from_slice(&pointer.offset.to_be_bytes());
            buf[slot + 2..slot + 4].copy_from_slice(&pointer.length.to_be_bytes());

            let (offset, length) = (pointer.offset as usize, pointer.length as usize);
            cell.write(&mut buf[offset..offset + length]);
        }

        Ok(())
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let header = parse_header(buf)?;
        let capacity = buf.len();
        let lower = header.lower.get() as usize;
        let upper = header.upper.get() as usize;
        let num_cells = header.num_cells.get() as usize;

        ensure!(
            lower >= NODE_HEADER_SIZE && lower <= upper && upper <= capacity,
            "node bounds out of order: lower={}, upper={}, capacity={}",
            lower,
            upper,
            capacity
        );
        ensure!(
            NODE_HEADER_SIZE + num_cells * CELL_POINTER_SIZE == lower,
            "slot directory of {} cells disagrees with lower bound {}",
            num_cells,
            lower
        );

        let mut cells = Vec::with_capacity(num_cells);
        for i in 0..num_cells {
            let slot = NODE_HEADER_SIZE + i * CELL_POINTER_SIZE;
            let offset = u16::from_be_bytes(buf[slot..slot + 2].try_into().unwrap()) as usize;
            let length = u16::from_be_bytes(buf[slot + 2..slot + 4].try_into().unwrap()) as usize;
            ensure!(
                offset >= upper && offset + length <= capacity,
                "cell window [{}, {}) escapes the body region [{}, {})",
                offset,
                offset + length,
                upper,
                capacity
            );

            let mut cell = C::read(&buf[offset..offset + length])?;
            cell.set_pointer(CellPointer {
                offset: offset as u16,
                length: length as u16,
            });
            cells.push(cell);
        }

        Ok(Self {
            flags: header.flags.get(),
            lower,
            upper,
            capacity,
            left: header.left.get(),
            cells,
        })
    }
}

impl InternalNode {
    pub fn new_internal(capacity: usize) -> Self {
        Self::with_flags(0, capacity)
    }

    pub fn left(&self) -> u32 {
        self.left
    }

    pub fn set_left(&mut self, child_page: u32) {
        self.left = child_page;
    }

    /// The child covering `key`: the child of the largest cell key at or
    /// below `key`, or the leftmost child when every cell key is larger.
    pub fn find_child(&self, key: &[u8]) -> u32 {
        match self.cells.binary_search_by(|c| c.compare(key)) {
            Ok(i) => self.cells[i].child_page(),
            Err(0) => self.left,
            Err(i) => self.cells[i - 1].child_page(),
        }
    }
}

impl LeafNode {
    pub fn new_leaf(capacity: usize) -> Self {
        Self::with_flags(LEAF_FLAG, capacity)
    }

    /// The cell holding exactly `key`, if present.
    pub fn find(&self, key: &[u8]) -> Option<&LeafCell> {
        self.cells
            .binary_search_by(|c| c.compare(key))
            .ok()
            .map(|i| &self.cells[i])
    }

    /// Removes and returns the cell holding exactly `key`.
    pub fn remove(&mut self, key: &[u8]) -> Option<LeafCell> {
        let at = self.cells.binary_search_by(|c| c.compare(key)).ok()?;
        let cell = self.cells.remove(at);
        self.repack();
        Some(cell)
    }
}

/// A deserialized node page, tagged by variant.
#[derive(Debug, Clone)]
pub enum NodePage {
    Internal(InternalNode),
    Leaf(LeafNode),
}

impl NodePage {
    /// Deserializes a node, dispatching on the leaf flag bit.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let header = parse_header(buf)?;

        if header.flags.get() & LEAF_FLAG != 0 {
            Ok(NodePage::Leaf(LeafNode::from_bytes(buf)?))
        } else {
            Ok(NodePage::Internal(InternalNode::from_bytes(buf)?))
        }
    }

    pub fn write_to(&self, buf: &mut [u8]) -> Result<()> {
        match self {
            NodePage::Internal(node) => node.write_to(buf),
            NodePage::Leaf(node) => node.write_to(buf),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, NodePage::Leaf(_))
    }
}

fn parse_header(buf: &[u8]) -> Result<NodeHeader> {
    if buf.len() < NODE_HEADER_SIZE {
        bail!(
            "buffer too small for NodeHeader: {} < {}",
            buf.len(),
            NODE_HEADER_SIZE
        );
    }

    NodeHeader::read_from_bytes(&buf[..NODE_HEADER_SIZE])
        .map_err(|e| eyre::eyre!("failed to parse NodeHeader: {:?}", e))
}

//! # Disk B+Tree
//!
//! [`BTree`] stores byte keys and byte records in slotted node pages laid
//! over a [`Paged`] file. The root node lives at page 1 for the lifetime
//! of the file; page 0 is reserved at creation.
//!
//! ## Find
//!
//! Descend from the root: each internal node's `find_child` picks the
//! child covering the key; the leaf either holds the key's cell or the
//! key is absent.
//!
//! ## Insert
//!
//! The descent pushes `(page_number, node)` breadcrumbs onto a stack.
//! Every modified node is written back to the page number it was read
//! from. A full leaf splits around its median: the upper half moves to a
//! freshly allocated page and the right sibling's first key is promoted
//! into the parent. A full internal node splits around its median cell:
//! the median key is promoted and the median's child becomes the right
//! sibling's leftmost pointer. Promotion walks back up the breadcrumbs;
//! when the stack runs out the old root's content is relocated to a
//! fresh page and page 1 is rewritten as a new internal root, so the
//! tree grows by one level while the root page number stays fixed.
//!
//! Inserting a key that already exists replaces its record.
//!
//! Node pages are allocated from the paged file's free list, and the
//! file header's record count tracks the number of distinct keys.
//!
//! Deletion is not implemented on the disk tree.

use std::path::Path;

use eyre::{ensure, Result};
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::cell::{Cell, InternalCell, LeafCell, CELL_HEADER_SIZE, CELL_POINTER_SIZE};
use super::node::{InternalNode, LeafNode, NodePage, NODE_HEADER_SIZE};
use crate::config::Config;
use crate::storage::{Paged, PAGE_STATUS_USED};

/// The root node's fixed page number.
pub const ROOT_PAGE: i64 = 1;

/// Breadcrumbs pushed during descent, unwound to propagate splits.
type Breadcrumbs = SmallVec<[(i64, InternalNode); 8]>;

pub struct BTree {
    paged: Paged,
}

impl BTree {
    /// Opens the tree at `filename`, creating the file with an empty
    /// leaf root when absent.
    pub fn open(filename: impl AsRef<Path>, config: Config) -> Result<Self> {
        let mut paged = Paged::new(filename, config)?;
        paged.open()?;

        let mut tree = Self { paged };
        if tree.paged.header().total_count() == 0 {
            let reserved = tree.paged.get_free_page()?;
            ensure!(
                reserved.lock().page_number() == 0,
                "fresh file did not hand out page 0 first"
            );

            let root = tree.paged.get_free_page()?;
            ensure!(
                root.lock().page_number() == ROOT_PAGE,
                "fresh file did not seat the root at page {}",
                ROOT_PAGE
            );

            let leaf = LeafNode::new_leaf(tree.node_capacity());
            tree.write_node(ROOT_PAGE, &NodePage::Leaf(leaf))?;
            debug!("created tree with empty leaf root");
        } else {
            ensure!(
                tree.paged.header().total_count() > ROOT_PAGE as u64,
                "file holds no root page"
            );
        }

        // Separator cells for the largest admissible key must stay within
        // the per-cell budget, or an internal split could produce a half
        // that does not fit its page.
        let max_separator = CELL_HEADER_SIZE
            + tree.paged.header().max_key_size() as usize
            + CELL_POINTER_SIZE;
        ensure!(
            max_separator <= tree.cell_budget(),
            "max key size {} exceeds the {}-byte cell budget of node pages",
            tree.paged.header().max_key_size(),
            tree.cell_budget()
        );

        Ok(tree)
    }

    pub fn close(&mut self) -> Result<()> {
        self.paged.close()
    }

    /// Number of distinct keys stored.
    pub fn record_count(&self) -> u64 {
        self.paged.header().record_count()
    }

    /// Looks up `key`, returning its record bytes.
    pub fn find(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut page_number = ROOT_PAGE;

        loop {
            match self.read_node(page_number)? {
                NodePage::Internal(node) => {
                    page_number = node.find_child(key) as i64;
                }
                NodePage::Leaf(leaf) => {
                    return Ok(leaf.find(key).map(|cell| cell.data().to_vec()));
                }
            }
        }
    }

    /// Inserts `data` under `key`, replacing any existing record.
    pub fn insert(&mut self, key: &[u8], data: &[u8]) -> Result<()> {
        ensure!(
            key.len() <= self.paged.header().max_key_size() as usize,
            "key of {} bytes exceeds the maximum key size {}",
            key.len(),
            self.paged.header().max_key_size()
        );
        ensure!(
            CELL_HEADER_SIZE + key.len() + data.len() + CELL_POINTER_SIZE <= self.cell_budget(),
            "record of {} bytes exceeds the {}-byte cell budget of node pages",
            key.len() + data.len(),
            self.cell_budget()
        );

        let mut breadcrumbs = Breadcrumbs::new();
        let mut page_number = ROOT_PAGE;
        let mut leaf = loop {
            match self.read_node(page_number)? {
                NodePage::Internal(node) => {
                    let child = node.find_child(key) as i64;
                    breadcrumbs.push((page_number, node));
                    page_number = child;
                }
                NodePage::Leaf(leaf) => break leaf,
            }
        };

        let replaced = leaf.remove(key).is_some();

        let cell = LeafCell::new(key.to_vec(), data.to_vec());
        if leaf.fits(cell.size()) {
            leaf.insert_cell(cell)?;
            self.write_node(page_number, &NodePage::Leaf(leaf))?;
        } else {
            let (separator, right_page) = self.split_leaf(page_number, leaf, cell)?;
            self.propagate_split(breadcrumbs, separator, right_page)?;
        }

        if !replaced {
            self.paged.increment_record_count();
            self.paged.flush()?;
        }

        Ok(())
    }

    fn node_capacity(&self) -> usize {
        self.paged.header().work_size()
    }

    /// Largest slot-directory-inclusive cell size a node admits. Keeping
    /// every cell within a third of the slotted region guarantees that a
    /// byte-balanced split always yields two fitting halves.
    fn cell_budget(&self) -> usize {
        (self.node_capacity() - NODE_HEADER_SIZE) / 3
    }

    fn read_node(&mut self, page_number: i64) -> Result<NodePage> {
        let capacity = self.node_capacity();
        let page = self.paged.get_page(page_number)?;
        let p = page.lock();

        ensure!(
            p.data().len() == capacity,
            "page {} holds no initialized node",
            page_number
        );
        NodePage::from_bytes(p.data())
    }

    fn write_node(&mut self, page_number: i64, node: &NodePage) -> Result<()> {
        let capacity = self.node_capacity();
        let page = self.paged.get_page(page_number)?;
        {
            let mut p = page.lock();
            p.data.resize(capacity, 0);
            node.write_to(&mut p.data)?;

            let header = p.header_mut();
            header.set_status(PAGE_STATUS_USED);
            header.set_data_length(capacity as u32);
        }

        self.paged.write_page(&page)
    }

    /// Allocates a page for a new node and returns its number.
    fn allocate_node_page(&mut self) -> Result<i64> {
        let page = self.paged.get_free_page()?;
        let number = page.lock().page_number();
        ensure!(
            u32::try_from(number).is_ok(),
            "page number {} does not fit a child pointer",
            number
        );
        Ok(number)
    }

    /// Splits `leaf` around its median after admitting `cell`. The lower
    /// half stays at `page_number`; the upper half moves to a new page
    /// whose first key is returned as the separator to promote.
    fn split_leaf(
        &mut self,
        page_number: i64,
        leaf: LeafNode,
        cell: LeafCell,
    ) -> Result<(Vec<u8>, i64)> {
        let capacity = leaf.capacity();
        let mut cells = leaf.into_cells();
        let at = match cells.binary_search_by(|c| c.compare(cell.key())) {
            Ok(i) => i,
            Err(i) => i,
        };
        cells.insert(at, cell);

        let mid = split_point(&cells);
        let right_cells = cells.split_off(mid);
        let separator = right_cells[0].key().to_vec();

        let right_page = self.allocate_node_page()?;
        trace!(
            left = page_number,
            right = right_page,
            "split leaf node"
        );

        let mut left = LeafNode::new_leaf(capacity);
        for c in cells {
            left.insert_cell(c)?;
        }
        let mut right = LeafNode::new_leaf(capacity);
        for c in right_cells {
            right.insert_cell(c)?;
        }

        self.write_node(page_number, &NodePage::Leaf(left))?;
        self.write_node(right_page, &NodePage::Leaf(right))?;

        Ok((separator, right_page))
    }

    /// Splits an internal node around its median cell after admitting
    /// `cell`. The median key is promoted; its child becomes the right
    /// sibling's leftmost pointer.
    fn split_internal(
        &mut self,
        page_number: i64,
        node: InternalNode,
        cell: InternalCell,
    ) -> Result<(Vec<u8>, i64)> {
        let capacity = node.capacity();
        let left_pointer = node.left();
        let mut cells = node.into_cells();
        let at = match cells.binary_search_by(|c| c.compare(cell.key())) {
            Ok(i) => i,
            Err(i) => i,
        };
        cells.insert(at, cell);

        let mid = split_point(&cells);
        let mut right_cells = cells.split_off(mid);
        let median = right_cells.remove(0);
        let promoted = median.key().to_vec();

        let right_page = self.allocate_node_page()?;
        trace!(
            left = page_number,
            right = right_page,
            "split internal node"
        );

        let mut left = InternalNode::new_internal(capacity);
        left.set_left(left_pointer);
        for c in cells {
            left.insert_cell(c)?;
        }
        let mut right = InternalNode::new_internal(capacity);
        right.set_left(median.child_page());
        for c in right_cells {
            right.insert_cell(c)?;
        }

        self.write_node(page_number, &NodePage::Internal(left))?;
        self.write_node(right_page, &NodePage::Internal(right))?;

        Ok((promoted, right_page))
    }

    /// Walks the breadcrumbs upward, inserting the promoted separator
    /// into each parent and splitting further as needed.
    fn propagate_split(
        &mut self,
        mut breadcrumbs: Breadcrumbs,
        separator: Vec<u8>,
        right_page: i64,
    ) -> Result<()> {
        let mut separator = separator;
        let mut right_page = right_page;

        while let Some((page_number, mut parent)) = breadcrumbs.pop() {
            let child = u32::try_from(right_page)?;
            let cell = InternalCell::new(separator, child);

            if parent.fits(cell.size()) {
                parent.insert_cell(cell)?;
                return self.write_node(page_number, &NodePage::Internal(parent));
            }

            let (promoted, new_right) = self.split_internal(page_number, parent, cell)?;
            separator = promoted;
            right_page = new_right;
        }

        self.grow_root(separator, right_page)
    }

    /// Grows the tree by one level. The old root's content moves to a
    /// fresh page; page 1 becomes a new internal root over the two
    /// halves.
    fn grow_root(&mut self, separator: Vec<u8>, right_page: i64) -> Result<()> {
        let relocated = self.allocate_node_page()?;
        let old_root = self.read_node(ROOT_PAGE)?;
        self.write_node(relocated, &old_root)?;

        let mut root = InternalNode::new_internal(self.node_capacity());
        root.set_left(u32::try_from(relocated)?);
        root.insert_cell(InternalCell::new(separator, u32::try_from(right_page)?))?;
        self.write_node(ROOT_PAGE, &NodePage::Internal(root))?;

        debug!(left = relocated, right = right_page, "grew tree by one level");
        Ok(())
    }
}

/// Index splitting `cells` into two halves of roughly equal byte weight,
/// keeping at least one cell on each side. With every cell inside the
/// node's cell budget, both halves are guaranteed to fit their pages.
fn split_point<C: Cell>(cells: &[C]) -> usize {
    debug_assert!(cells.len() >= 2);

    let total: usize = cells.iter().map(|c| c.size() + CELL_POINTER_SIZE).sum();
    let mut acc = 0;

    for (i, cell) in cells.iter().enumerate().take(cells.len() - 1) {
        acc += cell.size() + CELL_POINTER_SIZE;
        if acc * 2 >= total {
            return i + 1;
        }
    }

    cells.len() - 1
}

//! # Cell Codec
//!
//! Cells are the records of a slotted node page. Two variants exist,
//! both with fixed big-endian headers and no other framing:
//!
//! ```text
//! Internal Cell
//! +--------------+--------------+------------------+
//! | key_size (4) | child (4)    | key (key_size)   |
//! +--------------+--------------+------------------+
//!
//! Leaf Cell
//! +--------------+--------------+-----------------+-----------------+
//! | key_size (4) | data_size (4)| key (key_size)  | data (data_size)|
//! +--------------+--------------+-----------------+-----------------+
//! ```
//!
//! The codec is pure: `write` fills a caller-supplied window of exactly
//! `size()` bytes, and `read` consumes a window of exactly the cell's
//! recorded length. Keys compare byte-wise.

use std::cmp::Ordering;

use eyre::{ensure, Result};

/// Bytes per slot directory entry: offset (2) + length (2).
pub const CELL_POINTER_SIZE: usize = 4;

/// Fixed header bytes preceding the key in either cell variant.
pub const CELL_HEADER_SIZE: usize = 8;

/// Location of a cell body within its node page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellPointer {
    pub offset: u16,
    pub length: u16,
}

pub trait Cell: Sized {
    /// Total encoded size in bytes.
    fn size(&self) -> usize;

    /// Encodes into a window of exactly `size()` bytes.
    fn write(&self, buf: &mut [u8]);

    /// Decodes from a window of exactly the cell's length.
    fn read(buf: &[u8]) -> Result<Self>;

    fn key(&self) -> &[u8];

    /// Three-way byte-wise comparison of the cell key against `key`.
    fn compare(&self, key: &[u8]) -> Ordering {
        self.key().cmp(key)
    }

    fn pointer(&self) -> CellPointer;

    fn set_pointer(&mut self, pointer: CellPointer);
}

/// Separator cell of an internal node: keys at or above `key` descend
/// into `child_page`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalCell {
    pointer: CellPointer,
    key: Vec<u8>,
    child_page: u32,
}

impl InternalCell {
    pub fn new(key: Vec<u8>, child_page: u32) -> Self {
        Self {
            pointer: CellPointer::default(),
            key,
            child_page,
        }
    }

    pub fn child_page(&self) -> u32 {
        self.child_page
    }
}

impl Cell for InternalCell {
    fn size(&self) -> usize {
        CELL_HEADER_SIZE + self.key.len()
    }

    fn write(&self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), self.size());

        buf[0..4].copy_from_slice(&(self.key.len() as u32).to_be_bytes());
        buf[4..8].copy_from_slice(&self.child_page.to_be_bytes());
        buf[8..].copy_from_slice(&self.key);
    }

    fn read(buf: &[u8]) -> Result<Self> {
        ensure!(
            buf.len() >= CELL_HEADER_SIZE,
            "cell window of {} bytes is shorter than the {}-byte header",
            buf.len(),
            CELL_HEADER_SIZE
        );

        let key_size = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
        let child_page = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        ensure!(
            buf.len() == CELL_HEADER_SIZE + key_size,
            "internal cell window of {} bytes disagrees with key size {}",
            buf.len(),
            key_size
        );

        Ok(Self {
            pointer: CellPointer::default(),
            key: buf[8..].to_vec(),
            child_page,
        })
    }

    fn key(&self) -> &[u8] {
        &self.key
    }

    fn pointer(&self) -> CellPointer {
        self.pointer
    }

    fn set_pointer(&mut self, pointer: CellPointer) {
        self.pointer = pointer;
    }
}

/// Record cell of a leaf node: a key and its data bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafCell {
    pointer: CellPointer,
    key: Vec<u8>,
    data: Vec<u8>,
}

impl LeafCell {
    pub fn new(key: Vec<u8>, data: Vec<u8>) -> Self {
        Self {
            pointer: CellPointer::default(),
            key,
            data,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Cell for LeafCell {
    fn size(&self) -> usize {
        CELL_HEADER_SIZE + self.key.len() + self.data.len()
    }

    fn write(&self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), self.size());

        buf[0..4].copy_from_slice(&(self.key.len() as u32).to_be_bytes());
        buf[4..8].copy_from_slice(&(self.data.len() as u32).to_be_bytes());
        buf[8..8 + self.key.len()].copy_from_slice(&self.key);
        buf[8 + self.key.len()..].copy_from_slice(&self.data);
    }

    fn read(buf: &[u8]) -> Result<Self> {
        ensure!(
            buf.len() >= CELL_HEADER_SIZE,
            "cell window of {} bytes is shorter than the {}-byte header",
            buf.len(),
            CELL_HEADER_SIZE
        );

        let key_size = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
        let data_size = u32::from_be_bytes(buf[4..8].try_into().unwrap()) as usize;
        ensure!(
            buf.len() == CELL_HEADER_SIZE + key_size + data_size,
            "leaf cell window of {} bytes disagrees with key size {} + data size {}",
            buf.len(),
            key_size,
            data_size
        );

        Ok(Self {
            pointer: CellPointer::default(),
            key: buf[8..8 + key_size].to_vec(),
            data: buf[8 + key_size..].to_vec(),
        })
    }

    fn key(&self) -> &[u8] {
        &self.key
    }

    fn pointer(&self) -> CellPointer {
        self.pointer
    }

    fn set_pointer(&mut self, pointer: CellPointer) {
        self.pointer = pointer;
    }
}

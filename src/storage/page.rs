//! # Pages and Page Headers
//!
//! A page is a fixed-width span of the file: an on-disk page header
//! followed by the data region. Header fields are big-endian.
//!
//! ## Page Header Layout (23 bytes, padded to `page_header_size` on disk)
//!
//! ```text
//! Offset  Size  Field          Description
//! ------  ----  -------------  ----------------------------------------
//! 0       1     status         0 = unused, nonzero = used
//! 1       2     key_length     bytes of key prefix in the data region
//! 3       4     key_hash       32-bit hash of the key
//! 7       4     data_length    bytes of data stored in this page
//! 11      4     record_length  total size of the record this page
//!                              belongs to (head page of a chain)
//! 15      8     next_page      next page in the chain (-1 = none)
//! ```
//!
//! The in-memory [`Page`] pairs the header with its page number, the data
//! bytes read so far, and a dirty flag. Pages are shared between the
//! cache and in-flight callers as [`SharedPage`]; a mutation must set the
//! dirty flag or a later write-back will skip the page.

use std::sync::Arc;

use eyre::{ensure, Result};
use parking_lot::Mutex;
use zerocopy::big_endian::{I64, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::NO_PAGE;

pub const PAGE_HEADER_BYTES: usize = 23;

/// Page status byte: no record occupies this page.
pub const PAGE_STATUS_UNUSED: u8 = 0;

/// Page status byte: the page carries live data.
pub const PAGE_STATUS_USED: u8 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct PageHeader {
    status: u8,
    key_length: U16,
    key_hash: U32,
    data_length: U32,
    record_length: U32,
    next_page: I64,
}

const _: () = assert!(size_of::<PageHeader>() == PAGE_HEADER_BYTES);

impl PageHeader {
    pub fn new() -> Self {
        Self {
            status: PAGE_STATUS_UNUSED,
            key_length: U16::new(0),
            key_hash: U32::new(0),
            data_length: U32::new(0),
            record_length: U32::new(0),
            next_page: I64::new(NO_PAGE),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= PAGE_HEADER_BYTES,
            "buffer too small for PageHeader: {} < {}",
            bytes.len(),
            PAGE_HEADER_BYTES
        );

        Self::read_from_bytes(&bytes[..PAGE_HEADER_BYTES])
            .map_err(|e| eyre::eyre!("failed to parse PageHeader: {:?}", e))
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn set_status(&mut self, status: u8) {
        self.status = status;
    }

    pub fn key_length(&self) -> u16 {
        self.key_length.get()
    }

    pub fn set_key_length(&mut self, length: u16) {
        self.key_length = U16::new(length);
    }

    pub fn key_hash(&self) -> u32 {
        self.key_hash.get()
    }

    pub fn set_key_hash(&mut self, hash: u32) {
        self.key_hash = U32::new(hash);
    }

    pub fn data_length(&self) -> u32 {
        self.data_length.get()
    }

    pub fn set_data_length(&mut self, length: u32) {
        self.data_length = U32::new(length);
    }

    pub fn record_length(&self) -> u32 {
        self.record_length.get()
    }

    pub fn set_record_length(&mut self, length: u32) {
        self.record_length = U32::new(length);
    }

    pub fn next_page(&self) -> i64 {
        self.next_page.get()
    }

    pub fn set_next_page(&mut self, page_number: i64) {
        self.next_page = I64::new(page_number);
    }
}

impl Default for PageHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// A page shared between the cache and in-flight callers.
pub type SharedPage = Arc<Mutex<Page>>;

#[derive(Debug)]
pub struct Page {
    pub(crate) page_number: i64,
    pub(crate) header: PageHeader,
    pub(crate) data: Vec<u8>,
    pub(crate) dirty: bool,
}

impl Page {
    pub fn new(page_number: i64) -> Self {
        Self {
            page_number,
            header: PageHeader::new(),
            data: Vec::new(),
            dirty: false,
        }
    }

    pub fn into_shared(self) -> SharedPage {
        Arc::new(Mutex::new(self))
    }

    pub fn page_number(&self) -> i64 {
        self.page_number
    }

    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    /// Mutable header access; the page is marked dirty.
    pub fn header_mut(&mut self) -> &mut PageHeader {
        self.dirty = true;
        &mut self.header
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The record bytes held by this page: everything in the data region
    /// past the key prefix.
    pub fn record_bytes(&self) -> &[u8] {
        let key_length = (self.header.key_length() as usize).min(self.data.len());
        &self.data[key_length..]
    }

    /// Replaces this page's record bytes, keeping any key prefix, and
    /// updates `data_length`. Returns the number of bytes taken.
    pub fn fill_record_bytes(&mut self, bytes: &[u8], work_size: usize) -> usize {
        let key_length = self.header.key_length() as usize;
        let take = bytes.len().min(work_size.saturating_sub(key_length));

        self.data.resize(key_length + take, 0);
        self.data[key_length..key_length + take].copy_from_slice(&bytes[..take]);
        self.header.set_data_length((key_length + take) as u32);
        self.dirty = true;

        take
    }
}

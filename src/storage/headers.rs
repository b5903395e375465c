//! # File Header
//!
//! Every paged file begins with a fixed-layout header at offset 0. All
//! multi-byte fields are big-endian: the most significant byte sits at
//! the lowest address.
//!
//! ## Layout (49 bytes)
//!
//! ```text
//! Offset  Size  Field             Description
//! ------  ----  ----------------  --------------------------------------
//! 0       2     header_size       bytes reserved for this header region
//! 2       4     page_size         bytes per page
//! 6       8     page_count        initial page count hint
//! 14      8     total_count       pages handed out so far
//! 22      8     first_free_page   head of the free list (-1 = none)
//! 30      8     last_free_page    tail of the free list (-1 = none)
//! 38      1     page_header_size  bytes reserved per page header
//! 39      2     max_key_size      longest admissible key
//! 41      8     record_count      records stored in this file
//! ```
//!
//! Only these 49 bytes are written; the rest of the `header_size` region
//! stays sparse and pages begin at offset `header_size`.
//!
//! The dirty flag that decides whether a flush rewrites the header is
//! transient state and lives in the pager, not here.

use eyre::{ensure, Result};
use zerocopy::big_endian::{I64, U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::page::PAGE_HEADER_BYTES;
use super::NO_PAGE;
use crate::config::Config;

pub const FILE_HEADER_BYTES: usize = 49;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FileHeader {
    header_size: U16,
    page_size: U32,
    page_count: U64,
    total_count: U64,
    first_free_page: I64,
    last_free_page: I64,
    page_header_size: u8,
    max_key_size: U16,
    record_count: U64,
}

const _: () = assert!(size_of::<FileHeader>() == FILE_HEADER_BYTES);

impl FileHeader {
    pub fn new(config: Config) -> Self {
        Self {
            header_size: U16::new(config.header_size),
            page_size: U32::new(config.page_size),
            page_count: U64::new(config.page_count),
            total_count: U64::new(0),
            first_free_page: I64::new(NO_PAGE),
            last_free_page: I64::new(NO_PAGE),
            page_header_size: config.page_header_size,
            max_key_size: U16::new(config.max_key_size),
            record_count: U64::new(0),
        }
    }

    /// Parses and validates a header read back from disk.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= FILE_HEADER_BYTES,
            "buffer too small for FileHeader: {} < {}",
            bytes.len(),
            FILE_HEADER_BYTES
        );

        let header = Self::read_from_bytes(&bytes[..FILE_HEADER_BYTES])
            .map_err(|e| eyre::eyre!("failed to parse FileHeader: {:?}", e))?;

        ensure!(
            header.header_size.get() as usize >= FILE_HEADER_BYTES,
            "header region of {} bytes cannot hold the {}-byte header",
            header.header_size.get(),
            FILE_HEADER_BYTES
        );
        ensure!(
            header.page_header_size as usize >= PAGE_HEADER_BYTES,
            "page header region of {} bytes cannot hold the {}-byte header",
            header.page_header_size,
            PAGE_HEADER_BYTES
        );
        ensure!(
            header.page_size.get() as usize > header.page_header_size as usize,
            "page size {} leaves no data region after a {}-byte page header",
            header.page_size.get(),
            header.page_header_size
        );

        Ok(header)
    }

    pub fn header_size(&self) -> u16 {
        self.header_size.get()
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.get()
    }

    pub fn page_count(&self) -> u64 {
        self.page_count.get()
    }

    pub fn total_count(&self) -> u64 {
        self.total_count.get()
    }

    /// Hands out the next fresh page number, growing the file logically.
    pub fn increment_total_count(&mut self) -> u64 {
        let previous = self.total_count.get();
        self.total_count = U64::new(previous + 1);
        previous
    }

    pub fn first_free_page(&self) -> i64 {
        self.first_free_page.get()
    }

    pub fn set_first_free_page(&mut self, page_number: i64) {
        self.first_free_page = I64::new(page_number);
    }

    pub fn last_free_page(&self) -> i64 {
        self.last_free_page.get()
    }

    pub fn set_last_free_page(&mut self, page_number: i64) {
        self.last_free_page = I64::new(page_number);
    }

    pub fn page_header_size(&self) -> u8 {
        self.page_header_size
    }

    pub fn max_key_size(&self) -> u16 {
        self.max_key_size.get()
    }

    pub fn record_count(&self) -> u64 {
        self.record_count.get()
    }

    pub fn set_record_count(&mut self, count: u64) {
        self.record_count = U64::new(count);
    }

    /// Size of a page's data region.
    pub fn work_size(&self) -> usize {
        self.page_size.get() as usize - self.page_header_size as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_header_is_49_bytes() {
        assert_eq!(size_of::<FileHeader>(), 49);
    }

    #[test]
    fn new_header_carries_config_and_empty_free_list() {
        let header = FileHeader::new(Config::default());

        assert_eq!(header.header_size(), 4096);
        assert_eq!(header.page_size(), 4096);
        assert_eq!(header.page_count(), 1024);
        assert_eq!(header.total_count(), 0);
        assert_eq!(header.first_free_page(), NO_PAGE);
        assert_eq!(header.last_free_page(), NO_PAGE);
        assert_eq!(header.page_header_size(), 64);
        assert_eq!(header.max_key_size(), 256);
        assert_eq!(header.record_count(), 0);
    }

    #[test]
    fn header_serializes_big_endian() {
        let header = FileHeader::new(Config::default());
        let bytes = header.as_bytes();

        assert_eq!(&bytes[0..2], &4096u16.to_be_bytes());
        assert_eq!(&bytes[2..6], &4096u32.to_be_bytes());
        assert_eq!(&bytes[22..30], &(-1i64).to_be_bytes());
        assert_eq!(bytes[38], 64);
        assert_eq!(&bytes[39..41], &256u16.to_be_bytes());
    }

    #[test]
    fn header_round_trips_through_bytes() {
        let mut header = FileHeader::new(Config::default());
        header.set_first_free_page(7);
        header.set_last_free_page(12);
        header.set_record_count(99);
        header.increment_total_count();

        let parsed = FileHeader::from_bytes(header.as_bytes()).unwrap();

        assert_eq!(parsed.first_free_page(), 7);
        assert_eq!(parsed.last_free_page(), 12);
        assert_eq!(parsed.record_count(), 99);
        assert_eq!(parsed.total_count(), 1);
    }

    #[test]
    fn from_bytes_rejects_short_buffer() {
        let result = FileHeader::from_bytes(&[0u8; 10]);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("too small"));
    }

    #[test]
    fn from_bytes_rejects_zeroed_header() {
        let result = FileHeader::from_bytes(&[0u8; FILE_HEADER_BYTES]);

        assert!(result.is_err());
    }

    #[test]
    fn increment_total_count_returns_previous_value() {
        let mut header = FileHeader::new(Config::default());

        assert_eq!(header.increment_total_count(), 0);
        assert_eq!(header.increment_total_count(), 1);
        assert_eq!(header.total_count(), 2);
    }
}

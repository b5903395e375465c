//! # Storage Module
//!
//! The storage layer presents a random-access array of fixed-size pages
//! on top of a single host file, together with the machinery a record
//! store needs around it: a persistent file header, a free-page list,
//! per-record overflow chaining, and an LRU page cache.
//!
//! ## File Layout
//!
//! ```text
//! Offset            Content
//! ---------------   ----------------------------------------------
//! 0                 file header (49 bytes, big-endian)
//! 49..header_size   sparse, reserved
//! header_size       page 0
//! + page_size       page 1
//! + 2*page_size     page 2
//! ...
//! ```
//!
//! Page `n` lives at byte offset `header_size + n * page_size`. Page
//! numbers are zero-based and non-negative; `-1` is the sentinel for "no
//! page". A page number addressing beyond end-of-file is not an error:
//! the page simply is not backed yet and materializes zero-fresh on read.
//!
//! ## Overflow Chains
//!
//! A record longer than one page's data region spills into subsequent
//! pages linked through each page header's `next_page` field. Chains cut
//! loose by a shorter rewrite are appended to the free-page list, an
//! intrusive singly-linked list through the same `next_page` field,
//! anchored by `first_free_page`/`last_free_page` in the file header.
//!
//! ## Sharing Model
//!
//! Cached pages are handed out as [`SharedPage`] (`Arc<Mutex<Page>>`).
//! The cache and any in-flight caller reference the same page object;
//! mutations set the page dirty and only dirty pages are written back.
//! Eviction never writes: a caller holding a dirty page keeps it alive
//! through its `Arc` until an explicit [`Paged::write_page`].
//!
//! ## Module Organization
//!
//! - `headers`: the on-disk file header
//! - `page`: page object and page header
//! - `value`: record value with its hash and byte window
//! - `cache`: generic LRU cache
//! - `pager`: the paged file itself

mod cache;
mod headers;
mod page;
mod pager;
mod value;

pub use cache::LruCache;
pub use headers::{FileHeader, FILE_HEADER_BYTES};
pub use page::{
    Page, PageHeader, SharedPage, PAGE_HEADER_BYTES, PAGE_STATUS_UNUSED, PAGE_STATUS_USED,
};
pub use pager::Paged;
pub use value::Value;

/// Sentinel page number meaning "no such page".
pub const NO_PAGE: i64 = -1;

//! # Coffer - Paged Key/Value Store
//!
//! Coffer is a prototype on-disk key/value store built from two related
//! cores: a generic in-memory B-tree and a disk-resident B+tree layered on
//! a paged binary file.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │      Disk B+tree (find/insert)       │
//! ├─────────────────────────────────────┤
//! │  Slotted Node Pages │ Cell Codec     │
//! ├─────────────────────────────────────┤
//! │   Paged File (header, free list,     │
//! │   overflow chains, LRU page cache)   │
//! ├─────────────────────────────────────┤
//! │        Positioned File I/O           │
//! └─────────────────────────────────────┘
//!
//!        In-memory B-tree (standalone)
//! ```
//!
//! ## File Layout
//!
//! A coffer file begins with a big-endian file header at offset 0; the
//! remainder of the reserved header region is left sparse. Fixed-size
//! pages follow, each with its own big-endian page header and a data
//! region. Records longer than one page's data region overflow into a
//! chain of linked pages; reclaimed chains are parked on an intrusive
//! free-page list anchored in the file header.
//!
//! The disk B+tree stores its nodes inside page data regions using a
//! slotted layout: a directory of cell pointers grows down from the node
//! header while cell bodies grow up from the end of the region.
//!
//! ## Module Overview
//!
//! - [`memtree`]: generic in-memory B-tree with insert/search/delete
//! - [`storage`]: paged file, page cache, free list, overflow chains
//! - [`btree`]: disk B+tree over slotted node pages
//! - [`config`]: file and cache geometry
//!
//! ## Concurrency
//!
//! A single logical owner drives each store. Mutating operations take
//! `&mut self`, so exclusive access to the file header and free list is
//! enforced by the borrow checker at compile time. Cached pages are
//! shared between the cache and in-flight callers behind a mutex, which
//! keeps a dirty page reachable until it is flushed even if the cache
//! evicts it.

pub mod btree;
pub mod config;
pub mod memtree;
pub mod storage;

pub use btree::BTree;
pub use config::Config;
pub use storage::{Paged, Value};

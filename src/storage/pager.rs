//! # Paged File
//!
//! [`Paged`] presents a random-access array of fixed-size pages atop a
//! single host file, with a persistent header and a free-page list.
//!
//! ## Lifecycle
//!
//! `open` either reads and validates the header of an existing file or
//! creates the file and writes a header populated from the configuration.
//! `flush` rewrites the header iff it changed; `close` flushes and drops
//! the file handle. Opening an open file or closing a closed one is an
//! error.
//!
//! ## Read and Write Paths
//!
//! `get_page` reads through the LRU cache. On a miss the page header and
//! exactly `data_length` data bytes are read from disk; a page whose
//! header region is still all zeroes (never written, or past end-of-file)
//! materializes fresh with `next_page = -1`. `write_page` is a no-op for
//! clean pages; for dirty pages it writes the header padded to
//! `page_header_size`, then the data region.
//!
//! ## Values and Overflow
//!
//! `write_value` streams a record across as many pages as it needs,
//! chaining fresh pages from the free list and returning any residual
//! tail of a previous, longer chain to the free list. `read_value` walks
//! the chain back into one buffer, skipping each page's key prefix.
//!
//! ## Free-Page List
//!
//! An intrusive singly-linked list through `next_page`, anchored by
//! `first_free_page`/`last_free_page` in the file header. Allocation pops
//! the head; reclamation appends a whole chain at the tail. The header is
//! written back after every mutation that allocates or reclaims pages, so
//! the list anchors never trail the data they describe. When a chain is
//! appended, the header is updated before the old tail page is patched.
//!
//! ## Exclusion
//!
//! Every mutating operation takes `&mut self`: the free-list and header
//! updates inside `get_free_page` are serialized by the borrow checker
//! rather than a runtime lock.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{ensure, Result, WrapErr};
use tracing::{debug, trace};
use zerocopy::IntoBytes;

use super::cache::LruCache;
use super::headers::{FileHeader, FILE_HEADER_BYTES};
use super::page::{Page, PageHeader, SharedPage, PAGE_HEADER_BYTES, PAGE_STATUS_UNUSED};
use super::value::Value;
use super::NO_PAGE;
use crate::config::Config;

pub struct Paged {
    filename: PathBuf,
    config: Config,
    header: FileHeader,
    header_dirty: bool,
    cache: LruCache<i64, SharedPage>,
    file: Option<File>,
}

impl Paged {
    pub fn new(filename: impl AsRef<Path>, config: Config) -> Result<Self> {
        ensure!(
            config.page_header_size as usize >= PAGE_HEADER_BYTES,
            "page header region of {} bytes cannot hold the {}-byte header",
            config.page_header_size,
            PAGE_HEADER_BYTES
        );
        ensure!(
            config.page_size as usize > config.page_header_size as usize,
            "page size {} leaves no data region after a {}-byte page header",
            config.page_size,
            config.page_header_size
        );

        Ok(Self {
            filename: filename.as_ref().to_path_buf(),
            config,
            header: FileHeader::new(config),
            header_dirty: true,
            cache: LruCache::new(config.page_cache_size)?,
            file: None,
        })
    }

    /// Opens the paged file, creating it if absent.
    ///
    /// For an existing file the header read from disk replaces the one
    /// built from the configuration. A second `open` without an
    /// intervening `close` is an error.
    pub fn open(&mut self) -> Result<()> {
        ensure!(
            self.file.is_none(),
            "paged file already open: {}",
            self.filename.display()
        );

        match OpenOptions::new().read(true).write(true).open(&self.filename) {
            Ok(file) => {
                self.file = Some(file);
                if let Err(e) = self.read_header() {
                    self.file = None;
                    return Err(e)
                        .wrap_err_with(|| format!("failed to read {}", self.filename.display()));
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&self.filename)
                    .wrap_err_with(|| {
                        format!("failed to create {}", self.filename.display())
                    })?;
                self.file = Some(file);
                self.header = FileHeader::new(self.config);
                self.header_dirty = true;
                self.write_header()?;
                debug!(file = %self.filename.display(), "created paged file");
            }
            Err(e) => {
                return Err(e)
                    .wrap_err_with(|| format!("failed to open {}", self.filename.display()));
            }
        }

        Ok(())
    }

    /// Flushes the header and closes the file. Double-close is an error.
    pub fn close(&mut self) -> Result<()> {
        ensure!(self.file.is_some(), "file is not open");

        self.flush()?;
        self.file = None;
        self.cache = LruCache::new(self.config.page_cache_size)?;

        Ok(())
    }

    /// Writes the file header back iff it changed.
    pub fn flush(&mut self) -> Result<()> {
        if self.header_dirty {
            self.write_header()?;
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn increment_record_count(&mut self) {
        let count = self.header.record_count();
        self.header.set_record_count(count + 1);
        self.header_dirty = true;
    }

    /// Fetches page `page_number` through the cache.
    pub fn get_page(&mut self, page_number: i64) -> Result<SharedPage> {
        ensure!(page_number >= 0, "negative page number {}", page_number);

        if let Some(page) = self.cache.get(&page_number) {
            return Ok(Arc::clone(page));
        }

        let page = self.read_page(page_number)?.into_shared();
        self.cache.put(page_number, Arc::clone(&page));

        Ok(page)
    }

    /// Writes a page back to disk. Clean pages are skipped.
    pub fn write_page(&mut self, page: &SharedPage) -> Result<()> {
        let mut p = page.lock();
        if !p.dirty {
            return Ok(());
        }

        debug_assert_eq!(p.header().data_length() as usize, p.data().len());

        let offset = self.page_offset(p.page_number());
        let page_header_size = self.header.page_header_size() as usize;

        let mut header_buf = vec![0u8; page_header_size];
        header_buf[..PAGE_HEADER_BYTES].copy_from_slice(p.header().as_bytes());

        let file = self.file()?;
        write_at(file, offset, &header_buf)?;
        if !p.data().is_empty() {
            write_at(file, offset + page_header_size as u64, p.data())?;
        }
        p.dirty = false;

        Ok(())
    }

    /// Reads the record that starts at `page`, following the overflow
    /// chain until its end.
    pub fn read_value(&mut self, page: &SharedPage) -> Result<Value> {
        let mut buffer = Vec::new();
        let mut current = Arc::clone(page);

        loop {
            let next = {
                let p = current.lock();
                buffer.extend_from_slice(p.record_bytes());
                p.header().next_page()
            };

            if next == NO_PAGE {
                break;
            }
            current = self.get_page(next)?;
        }

        Ok(Value::from_bytes(buffer))
    }

    /// Writes `value` starting at `page`, chaining overflow pages as
    /// needed and returning any leftover tail of a previous chain to the
    /// free list.
    pub fn write_value(&mut self, page: &SharedPage, value: &Value) -> Result<()> {
        {
            let mut head = page.lock();
            head.header_mut().set_record_length(value.len() as u32);
        }

        let work_size = self.header.work_size();
        let mut remaining = value.bytes();
        let mut current = Arc::clone(page);

        loop {
            let next = {
                let mut p = current.lock();
                let taken = p.fill_record_bytes(remaining, work_size);
                remaining = &remaining[taken..];
                p.header().next_page()
            };

            if remaining.is_empty() {
                {
                    let mut p = current.lock();
                    p.header_mut().set_next_page(NO_PAGE);
                }
                self.write_page(&current)?;

                if next != NO_PAGE {
                    let residual = self.get_page(next)?;
                    self.unlink_pages(&residual)?;
                }
                break;
            }

            let successor = if next == NO_PAGE {
                let free = self.get_free_page()?;
                let free_number = free.lock().page_number();
                let mut p = current.lock();
                p.header_mut().set_next_page(free_number);
                free
            } else {
                self.get_page(next)?
            };

            self.write_page(&current)?;
            current = successor;
        }

        self.flush()
    }

    /// Hands out an unused page: the head of the free list if one exists,
    /// otherwise a page extending the file. The returned page always has
    /// `next_page = -1`, status unused and an empty data region.
    pub fn get_free_page(&mut self) -> Result<SharedPage> {
        let free = if self.header.first_free_page() != NO_PAGE {
            let page = self.get_page(self.header.first_free_page())?;
            let next = page.lock().header().next_page();

            self.header.set_first_free_page(next);
            if next == NO_PAGE {
                self.header.set_last_free_page(NO_PAGE);
            }
            self.header_dirty = true;
            trace!(page = page.lock().page_number(), "recycled free page");
            page
        } else {
            let number = self.header.increment_total_count() as i64;
            self.header_dirty = true;
            trace!(page = number, "extended file with fresh page");
            self.get_page(number)?
        };

        {
            let mut p = free.lock();
            let header = p.header_mut();
            header.set_status(PAGE_STATUS_UNUSED);
            header.set_next_page(NO_PAGE);
            header.set_key_length(0);
            header.set_key_hash(0);
            header.set_data_length(0);
            header.set_record_length(0);
            p.data.clear();
        }

        self.write_header()?;
        Ok(free)
    }

    /// Appends the chain rooted at `page` to the tail of the free list.
    ///
    /// The header anchors are updated and written before the previous
    /// tail page is patched, so a failed tail write can duplicate a link
    /// but never lose the chain.
    pub fn unlink_pages(&mut self, page: &SharedPage) -> Result<()> {
        let first_number = page.lock().page_number();

        let mut last = Arc::clone(page);
        loop {
            let next = last.lock().header().next_page();
            if next == NO_PAGE {
                break;
            }
            last = self.get_page(next)?;
        }
        let last_number = last.lock().page_number();

        let old_tail = self.header.last_free_page();
        if self.header.first_free_page() == NO_PAGE {
            self.header.set_first_free_page(first_number);
        }
        self.header.set_last_free_page(last_number);
        self.header_dirty = true;
        self.write_header()?;

        if old_tail != NO_PAGE {
            let tail = self.get_page(old_tail)?;
            {
                let mut t = tail.lock();
                t.header_mut().set_next_page(first_number);
            }
            self.write_page(&tail)?;
        }

        debug!(first = first_number, last = last_number, "unlinked page chain");
        Ok(())
    }

    fn file(&self) -> Result<&File> {
        self.file.as_ref().ok_or_else(|| eyre::eyre!("file is not open"))
    }

    fn page_offset(&self, page_number: i64) -> u64 {
        self.header.header_size() as u64 + page_number as u64 * self.header.page_size() as u64
    }

    fn read_header(&mut self) -> Result<()> {
        let mut buf = [0u8; FILE_HEADER_BYTES];
        read_at(self.file()?, 0, &mut buf)?;

        self.header = FileHeader::from_bytes(&buf)?;
        self.header_dirty = false;
        debug!(
            page_size = self.header.page_size(),
            total_count = self.header.total_count(),
            "read file header"
        );

        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        write_at(self.file()?, 0, self.header.as_bytes())?;
        self.header_dirty = false;

        Ok(())
    }

    fn read_page(&self, page_number: i64) -> Result<Page> {
        let offset = self.page_offset(page_number);
        let mut page = Page::new(page_number);

        let mut header_buf = [0u8; PAGE_HEADER_BYTES];
        read_at(self.file()?, offset, &mut header_buf)?;

        // An all-zero header region means the page was never written (or
        // lies past end-of-file); it materializes fresh with defaults.
        if header_buf.iter().any(|&b| b != 0) {
            page.header = PageHeader::from_bytes(&header_buf)?;

            let data_length = page.header.data_length() as usize;
            ensure!(
                data_length <= self.header.work_size(),
                "page {} declares {} data bytes but the data region holds {}",
                page_number,
                data_length,
                self.header.work_size()
            );

            page.data = vec![0u8; data_length];
            let page_header_size = self.header.page_header_size() as u64;
            read_at(self.file()?, offset + page_header_size, &mut page.data)?;
        }

        Ok(page)
    }
}

/// Reads `buf.len()` bytes at `offset`, tolerating end-of-file: bytes
/// past the end stay zero.
fn read_at(file: &File, offset: u64, buf: &mut [u8]) -> Result<()> {
    let mut f = file;
    f.seek(SeekFrom::Start(offset))
        .wrap_err_with(|| format!("seek to {offset} failed"))?;

    let mut filled = 0;
    while filled < buf.len() {
        let n = f
            .read(&mut buf[filled..])
            .wrap_err_with(|| format!("read of {} bytes at {offset} failed", buf.len()))?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    Ok(())
}

fn write_at(file: &File, offset: u64, buf: &[u8]) -> Result<()> {
    let mut f = file;
    f.seek(SeekFrom::Start(offset))
        .wrap_err_with(|| format!("seek to {offset} failed"))?;
    f.write_all(buf)
        .wrap_err_with(|| format!("write of {} bytes at {offset} failed", buf.len()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_paged(dir: &tempfile::TempDir, config: Config) -> Paged {
        let mut paged = Paged::new(dir.path().join("test.dat"), config).unwrap();
        paged.open().unwrap();
        paged
    }

    #[test]
    fn open_creates_file_holding_only_the_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dat");

        let mut paged = Paged::new(&path, Config::default()).unwrap();
        paged.open().unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 49);
        paged.close().unwrap();
    }

    #[test]
    fn double_open_fails() {
        let dir = tempdir().unwrap();
        let mut paged = open_paged(&dir, Config::default());

        let result = paged.open();

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("already open"));
    }

    #[test]
    fn double_close_fails() {
        let dir = tempdir().unwrap();
        let mut paged = open_paged(&dir, Config::default());

        paged.close().unwrap();
        let result = paged.close();

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not open"));
    }

    #[test]
    fn header_of_existing_file_overrides_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dat");

        let custom = Config {
            header_size: 1000,
            page_size: 1001,
            page_count: 1002,
            max_key_size: 1003,
            page_header_size: 32,
            ..Config::default()
        };
        let mut first = Paged::new(&path, custom).unwrap();
        first.open().unwrap();
        first.close().unwrap();

        let mut second = Paged::new(&path, Config::default()).unwrap();
        second.open().unwrap();

        assert_eq!(second.header().header_size(), 1000);
        assert_eq!(second.header().page_size(), 1001);
        assert_eq!(second.header().page_count(), 1002);
        assert_eq!(second.header().max_key_size(), 1003);
        assert_eq!(second.header().page_header_size(), 32);
        second.close().unwrap();
    }

    #[test]
    fn get_page_rejects_negative_page_number() {
        let dir = tempdir().unwrap();
        let mut paged = open_paged(&dir, Config::default());

        let result = paged.get_page(-1);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("negative"));
    }

    #[test]
    fn unbacked_page_materializes_fresh() {
        let dir = tempdir().unwrap();
        let mut paged = open_paged(&dir, Config::default());

        let page = paged.get_page(7).unwrap();
        let p = page.lock();

        assert_eq!(p.page_number(), 7);
        assert_eq!(p.header().status(), PAGE_STATUS_UNUSED);
        assert_eq!(p.header().next_page(), NO_PAGE);
        assert_eq!(p.header().data_length(), 0);
        assert!(p.data().is_empty());
    }

    #[test]
    fn get_page_returns_cached_object_on_second_fetch() {
        let dir = tempdir().unwrap();
        let mut paged = open_paged(&dir, Config::default());

        let first = paged.get_page(3).unwrap();
        let second = paged.get_page(3).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    fn allocate_number(paged: &mut Paged) -> i64 {
        let page = paged.get_free_page().unwrap();
        let number = page.lock().page_number();
        number
    }

    #[test]
    fn get_free_page_extends_file_with_sequential_numbers() {
        let dir = tempdir().unwrap();
        let mut paged = open_paged(&dir, Config::default());

        for expected in 0..4 {
            assert_eq!(allocate_number(&mut paged), expected);
        }
        assert_eq!(paged.header().total_count(), 4);
    }

    #[test]
    fn unlinked_chain_is_recycled_in_order() {
        let dir = tempdir().unwrap();
        let mut paged = open_paged(&dir, Config::default());

        let pages: Vec<SharedPage> = (0..3).map(|_| paged.get_free_page().unwrap()).collect();

        // Link 0 -> 1 -> 2 and park the chain on the free list.
        for i in 0..2 {
            let next = pages[i + 1].lock().page_number();
            pages[i].lock().header_mut().set_next_page(next);
        }
        for page in &pages {
            paged.write_page(page).unwrap();
        }
        paged.unlink_pages(&pages[0]).unwrap();

        assert_eq!(paged.header().first_free_page(), 0);
        assert_eq!(paged.header().last_free_page(), 2);

        // Allocation drains the list head-first before extending the file.
        let recycled: Vec<i64> = (0..4).map(|_| allocate_number(&mut paged)).collect();
        assert_eq!(recycled, vec![0, 1, 2, 3]);
        assert_eq!(paged.header().first_free_page(), NO_PAGE);
        assert_eq!(paged.header().last_free_page(), NO_PAGE);
    }

    #[test]
    fn unlink_appends_to_existing_free_list_tail() {
        let dir = tempdir().unwrap();
        let mut paged = open_paged(&dir, Config::default());

        let a = paged.get_free_page().unwrap();
        let b = paged.get_free_page().unwrap();
        paged.write_page(&a).unwrap();
        paged.write_page(&b).unwrap();

        paged.unlink_pages(&a).unwrap();
        paged.unlink_pages(&b).unwrap();

        assert_eq!(paged.header().first_free_page(), 0);
        assert_eq!(paged.header().last_free_page(), 1);
        assert_eq!(a.lock().header().next_page(), 1);
    }

    #[test]
    fn value_round_trips_within_one_page() {
        let dir = tempdir().unwrap();
        let mut paged = open_paged(&dir, Config::default());

        let page = paged.get_free_page().unwrap();
        let value = Value::from_bytes(vec![1, 2, 3]);
        paged.write_value(&page, &value).unwrap();

        let read = paged.read_value(&page).unwrap();

        assert_eq!(read.bytes(), &[1, 2, 3]);
        assert_eq!(page.lock().header().record_length(), 3);
        assert_eq!(page.lock().header().next_page(), NO_PAGE);
    }

    #[test]
    fn empty_value_round_trips() {
        let dir = tempdir().unwrap();
        let mut paged = open_paged(&dir, Config::default());

        let page = paged.get_free_page().unwrap();
        paged.write_value(&page, &Value::from_bytes(Vec::new())).unwrap();

        let read = paged.read_value(&page).unwrap();

        assert!(read.is_empty());
        assert_eq!(page.lock().header().record_length(), 0);
    }

    #[test]
    fn oversized_value_chains_across_pages() {
        let dir = tempdir().unwrap();
        let mut paged = open_paged(&dir, Config::default());
        let work_size = paged.header().work_size();

        let bytes: Vec<u8> = (0..work_size * 2 + 100).map(|i| (i % 251) as u8).collect();
        let page = paged.get_free_page().unwrap();
        paged.write_value(&page, &Value::from_bytes(bytes.clone())).unwrap();

        assert_ne!(page.lock().header().next_page(), NO_PAGE);
        assert_eq!(page.lock().header().record_length() as usize, bytes.len());

        let read = paged.read_value(&page).unwrap();
        assert_eq!(read.bytes(), bytes.as_slice());
    }

    #[test]
    fn shrinking_rewrite_returns_tail_pages_to_free_list() {
        let dir = tempdir().unwrap();
        let mut paged = open_paged(&dir, Config::default());
        let work_size = paged.header().work_size();

        let page = paged.get_free_page().unwrap();
        let big: Vec<u8> = vec![7; work_size * 3];
        paged.write_value(&page, &Value::from_bytes(big)).unwrap();
        assert_eq!(paged.header().total_count(), 3);

        paged.write_value(&page, &Value::from_bytes(vec![1])).unwrap();

        assert_eq!(page.lock().header().next_page(), NO_PAGE);
        assert_ne!(paged.header().first_free_page(), NO_PAGE);

        let read = paged.read_value(&page).unwrap();
        assert_eq!(read.bytes(), &[1]);

        // The two tail pages are recycled before the file grows again.
        let recycled_a = allocate_number(&mut paged);
        let recycled_b = allocate_number(&mut paged);
        let mut recycled = vec![recycled_a, recycled_b];
        recycled.sort_unstable();
        assert_eq!(recycled, vec![1, 2]);
        assert_eq!(paged.header().total_count(), 3);
    }

    #[test]
    fn flush_is_a_noop_when_header_is_clean() {
        let dir = tempdir().unwrap();
        let mut paged = open_paged(&dir, Config::default());

        paged.flush().unwrap();
        assert!(!paged.header_dirty);

        paged.increment_record_count();
        assert!(paged.header_dirty);
        paged.flush().unwrap();
        assert!(!paged.header_dirty);

        paged.close().unwrap();
    }
}

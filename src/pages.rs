//! A fixed pool of byte pages passed from producers to consumers.
//!
//! `PagePool` pairs two [`FastResourceContainer`]s over the same index space:
//!
//! -   **free:** pages available to be filled. Starts with every page free.
//! -   **filled:** pages written and pending consumption. Starts with every
//!     page taken.
//!
//! A producer takes an index from `free`, fills the page and releases the index
//! into `filled`. A consumer takes it from `filled`, reads the page and releases
//! it back into `free`. Holding an index in either container is what grants
//! exclusive access to the page bytes, so no page is ever touched by two
//! threads at once. All page memory is allocated when the pool is built.
//!
//! # Examples
//!
//! ```
//! # use fastslot::PagePool;
//! # use std::io::Write;
//! let pool = PagePool::builder().page_count(4).page_size(64).build().unwrap();
//!
//! let mut page = pool.try_write().unwrap();
//! write!(page, "hello").unwrap();
//! page.commit();
//!
//! let page = pool.try_read().unwrap();
//! assert_eq!(&*page, b"hello");
//! ```

use crate::error::PoolError;
use crate::metrics as keys;
use crate::FastResourceContainer;
use ::metrics::{Counter, Gauge};
use crossbeam_utils::Backoff;
use serde::{Deserialize, Serialize};
use std::cell::UnsafeCell;
use std::fmt;
use std::io;
use std::ops::Deref;

const DEFAULT_NAME: &str = "pages";
const DEFAULT_PAGE_COUNT: usize = 64;
const DEFAULT_PAGE_SIZE: usize = 4096;
const DEFAULT_ACQUIRE_RETRIES: u32 = 16;

/// Options for configuring a [`PagePool`].
///
/// Missing fields take their defaults when deserialized, so a configuration
/// file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagePoolOptions {
    /// The pool name, used as the `pool` label on every metric.
    pub name: String,
    /// The number of pages in the pool.
    pub page_count: usize,
    /// The capacity of each page in bytes.
    pub page_size: usize,
    /// How many extra attempts [`PagePool::write`] makes before giving up.
    pub acquire_retries: u32,
}

impl Default for PagePoolOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            page_count: DEFAULT_PAGE_COUNT,
            page_size: DEFAULT_PAGE_SIZE,
            acquire_retries: DEFAULT_ACQUIRE_RETRIES,
        }
    }
}

/// A builder for creating a [`PagePool`] instance with custom configurations.
///
/// # Examples
/// ```
/// # use fastslot::PagePool;
/// let pool = PagePool::builder()
///     .name("trace")
///     .page_count(128)
///     .page_size(512)
///     .acquire_retries(4)
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.free_pages(), 128);
/// ```
#[derive(Debug, Default)]
pub struct PagePoolBuilder {
    options: PagePoolOptions,
}

impl PagePoolBuilder {
    /// Sets the pool name used to label metrics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = name.into();
        self
    }

    /// Sets the number of pages.
    pub fn page_count(mut self, count: usize) -> Self {
        self.options.page_count = count;
        self
    }

    /// Sets the capacity of each page in bytes.
    pub fn page_size(mut self, bytes: usize) -> Self {
        self.options.page_size = bytes;
        self
    }

    /// Sets how many extra attempts [`PagePool::write`] makes before failing.
    pub fn acquire_retries(mut self, retries: u32) -> Self {
        self.options.acquire_retries = retries;
        self
    }

    /// Builds the `PagePool` instance with the specified configurations.
    pub fn build(self) -> Result<PagePool, PoolError> {
        PagePool::with_options(self.options)
    }
}

/// Backing storage of one page.
struct Page {
    bytes: UnsafeCell<Vec<u8>>,
}

// SAFETY: The bytes of a page are only accessed through a `PageWriter` or
// `PageReader`, and each of those exists only while its thread holds the page
// index in the free or filled container. The containers guarantee a single
// holder per index, and the claim/release orderings publish the bytes to the
// next holder.
unsafe impl Sync for Page {}

impl Page {
    fn new(page_size: usize) -> Option<Self> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(page_size).ok()?;
        Some(Page {
            bytes: UnsafeCell::new(bytes),
        })
    }
}

/// Metric handles registered once when the pool is built.
struct PoolMetrics {
    written: Counter,
    discarded: Counter,
    read: Counter,
    write_failures: Counter,
    read_failures: Counter,
    free_pages: Gauge,
}

impl PoolMetrics {
    fn register(name: &str) -> Self {
        let pool = name.to_string();
        Self {
            written: ::metrics::counter!(keys::PAGES_WRITTEN_TOTAL, keys::LABEL_POOL => pool.clone()),
            discarded: ::metrics::counter!(keys::PAGES_DISCARDED_TOTAL, keys::LABEL_POOL => pool.clone()),
            read: ::metrics::counter!(keys::PAGES_READ_TOTAL, keys::LABEL_POOL => pool.clone()),
            write_failures: ::metrics::counter!(
                keys::ACQUIRE_FAILURES_TOTAL,
                keys::LABEL_POOL => pool.clone(),
                keys::LABEL_STAGE => keys::STAGE_WRITE
            ),
            read_failures: ::metrics::counter!(
                keys::ACQUIRE_FAILURES_TOTAL,
                keys::LABEL_POOL => pool.clone(),
                keys::LABEL_STAGE => keys::STAGE_READ
            ),
            free_pages: ::metrics::gauge!(keys::FREE_PAGES, keys::LABEL_POOL => pool),
        }
    }
}

/// A point-in-time view of where the pages of a pool are.
///
/// Like [`FastResourceContainer::free_count`], this is only exact when no
/// page is changing hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Pages available to producers.
    pub free: usize,
    /// Pages committed and waiting for a consumer.
    pub filled: usize,
    /// Pages currently held by a producer or a consumer.
    pub in_flight: usize,
}

/// A fixed pool of byte pages shared between producers and consumers.
///
/// `PagePool` is `Sync` and is typically shared behind an `Arc`. Neither side
/// ever blocks: `try_write` and `try_read` make one attempt, `write` retries a
/// bounded number of times with a spinning backoff.
pub struct PagePool {
    name: String,
    page_size: usize,
    acquire_retries: u32,
    pages: Box<[Page]>,
    free: FastResourceContainer,
    filled: FastResourceContainer,
    metrics: PoolMetrics,
}

impl PagePool {
    /// Creates a new `PagePoolBuilder` to configure and build a `PagePool`.
    pub fn builder() -> PagePoolBuilder {
        PagePoolBuilder::default()
    }

    /// Builds a pool from a complete set of options.
    pub fn with_options(options: PagePoolOptions) -> Result<Self, PoolError> {
        if options.page_count == 0 {
            return Err(PoolError::Configuration(
                "a page pool needs at least one page".to_string(),
            ));
        }
        if options.page_size == 0 {
            return Err(PoolError::Configuration(
                "page size must be at least one byte".to_string(),
            ));
        }

        let mut pages = Vec::new();
        pages
            .try_reserve_exact(options.page_count)
            .map_err(|_| PoolError::Allocation {
                slots: options.page_count,
            })?;
        for _ in 0..options.page_count {
            let page = Page::new(options.page_size).ok_or(PoolError::Allocation {
                slots: options.page_count,
            })?;
            pages.push(page);
        }

        let free = FastResourceContainer::new(options.page_count, false)?;
        let filled = FastResourceContainer::new(options.page_count, true)?;
        let metrics = PoolMetrics::register(&options.name);
        metrics.free_pages.set(options.page_count as f64);

        log::debug!(
            "built page pool {:?} with {} pages of {} bytes",
            options.name,
            options.page_count,
            options.page_size
        );

        Ok(PagePool {
            name: options.name,
            page_size: options.page_size,
            acquire_retries: options.acquire_retries,
            pages: pages.into_boxed_slice(),
            free,
            filled,
            metrics,
        })
    }

    /// Returns the pool name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of pages in the pool.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Returns the capacity of each page in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the number of pages available to producers.
    pub fn free_pages(&self) -> usize {
        self.free.free_count()
    }

    /// Returns the number of committed pages waiting for a consumer.
    pub fn filled_pages(&self) -> usize {
        self.filled.free_count()
    }

    /// Returns where the pages of the pool currently are.
    pub fn stats(&self) -> PoolStats {
        let free = self.free_pages();
        let filled = self.filled_pages();
        PoolStats {
            free,
            filled,
            in_flight: self.page_count().saturating_sub(free + filled),
        }
    }

    /// Makes one attempt to claim an empty page for writing.
    pub fn try_write(&self) -> Option<PageWriter<'_>> {
        let writer = self.claim_free();
        if writer.is_none() {
            self.metrics.write_failures.increment(1);
        }
        writer
    }

    /// Claims an empty page for writing, retrying with a backoff while the
    /// pool is exhausted.
    ///
    /// Fails with [`PoolError::Exhausted`] after `acquire_retries` extra
    /// attempts.
    pub fn write(&self) -> Result<PageWriter<'_>, PoolError> {
        let backoff = Backoff::new();
        for _ in 0..=self.acquire_retries {
            if let Some(writer) = self.claim_free() {
                return Ok(writer);
            }
            backoff.snooze();
        }

        self.metrics.write_failures.increment(1);
        log::warn!(
            "page pool {:?} exhausted after {} attempts",
            self.name,
            self.acquire_retries + 1
        );
        Err(PoolError::Exhausted)
    }

    /// Makes one attempt to claim the next committed page for reading.
    ///
    /// Pages are not handed out in commit order.
    pub fn try_read(&self) -> Option<PageReader<'_>> {
        let reader = self.claim_filled();
        if reader.is_none() {
            self.metrics.read_failures.increment(1);
        }
        reader
    }

    /// Claims a committed page without counting an empty pool as a failure.
    pub(crate) fn claim_filled(&self) -> Option<PageReader<'_>> {
        let index = self.filled.take()?;
        self.metrics.read.increment(1);
        Some(PageReader { pool: self, index })
    }

    fn claim_free(&self) -> Option<PageWriter<'_>> {
        let index = self.free.take()?;
        // SAFETY: `index` was just claimed from the free container, so this
        // thread is the page's only holder.
        unsafe { (*self.pages[index].bytes.get()).clear() };
        self.update_free_gauge();
        Some(PageWriter {
            pool: self,
            index,
            committed: false,
        })
    }

    fn update_free_gauge(&self) {
        self.metrics.free_pages.set(self.free.free_count() as f64);
    }
}

impl fmt::Debug for PagePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagePool")
            .field("name", &self.name)
            .field("page_size", &self.page_size)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Exclusive write access to one page.
///
/// Call [`commit`](Self::commit) to hand the page to consumers. Dropping the
/// writer without committing discards the contents and returns the page to
/// the free set.
pub struct PageWriter<'a> {
    pool: &'a PagePool,
    index: usize,
    committed: bool,
}

impl PageWriter<'_> {
    /// Returns the page index within the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns how many more bytes fit in the page.
    pub fn remaining(&self) -> usize {
        self.pool.page_size.saturating_sub(self.bytes().len())
    }

    /// Appends as much of `data` as fits and returns the number of bytes taken.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let n = self.remaining().min(data.len());
        self.bytes_mut().extend_from_slice(&data[..n]);
        n
    }

    /// Shortens the page to `len` bytes. Has no effect if the page is
    /// already shorter.
    pub fn truncate(&mut self, len: usize) {
        self.bytes_mut().truncate(len);
    }

    /// Publishes the page to consumers.
    pub fn commit(mut self) {
        self.committed = true;
        self.pool.filled.release(self.index);
        self.pool.metrics.written.increment(1);
    }

    fn bytes(&self) -> &Vec<u8> {
        // SAFETY: see `Page`; this writer holds the index.
        unsafe { &*self.pool.pages[self.index].bytes.get() }
    }

    fn bytes_mut(&mut self) -> &mut Vec<u8> {
        // SAFETY: see `Page`; this writer holds the index and `&mut self`
        // prevents aliasing through it.
        unsafe { &mut *self.pool.pages[self.index].bytes.get() }
    }
}

impl fmt::Debug for PageWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageWriter")
            .field("pool", &self.pool.name)
            .field("index", &self.index)
            .field("len", &self.bytes().len())
            .finish()
    }
}

impl Deref for PageWriter<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes()
    }
}

impl io::Write for PageWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.push(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PageWriter<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.pool.free.release(self.index);
            self.pool.metrics.discarded.increment(1);
            self.pool.update_free_gauge();
        }
    }
}

/// Exclusive read access to one committed page.
///
/// The page returns to the free set when the reader is dropped.
pub struct PageReader<'a> {
    pool: &'a PagePool,
    index: usize,
}

impl PageReader<'_> {
    /// Returns the page index within the pool.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Debug for PageReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageReader")
            .field("pool", &self.pool.name)
            .field("index", &self.index)
            .field("len", &self.len())
            .finish()
    }
}

impl Deref for PageReader<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: see `Page`; this reader holds the index.
        unsafe { &*self.pool.pages[self.index].bytes.get() }
    }
}

impl Drop for PageReader<'_> {
    fn drop(&mut self) {
        self.pool.free.release(self.index);
        self.pool.update_free_gauge();
    }
}

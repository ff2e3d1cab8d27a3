//! A non-blocking logger that formats records into pool pages.
//!
//! `PageLogger` is the producer side of a [`PagePool`]: every enabled record is
//! written into one free page and committed. A consumer, usually a dedicated
//! thread, periodically calls [`PageLogger::drain`] to move filled pages to
//! their final destination. When producers outpace the consumer and no page is
//! free, records are dropped and counted instead of blocking the caller.

use crate::metrics as keys;
use crate::pages::{PagePool, PageWriter};
use ::metrics::Counter;
use log::{LevelFilter, Log, Metadata, Record};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};

/// A `log::Log` implementation backed by a [`PagePool`].
///
/// The logger is an ordinary value: it can be used directly, shared behind an
/// `Arc`, or installed as the process-wide logger with [`install`](Self::install).
///
/// # Examples
///
/// ```
/// # use fastslot::{PageLogger, PagePool};
/// # use log::{Level, LevelFilter, Log, Record};
/// let pool = PagePool::builder().page_count(8).page_size(128).build().unwrap();
/// let logger = PageLogger::new(pool, LevelFilter::Info);
///
/// logger.log(
///     &Record::builder()
///         .level(Level::Info)
///         .target("app")
///         .args(format_args!("started"))
///         .build(),
/// );
///
/// let mut out = Vec::new();
/// assert_eq!(logger.drain(&mut out).unwrap(), 1);
/// assert_eq!(out, b"INFO app: started\n");
/// ```
pub struct PageLogger {
    pool: PagePool,
    level: LevelFilter,
    dropped: AtomicU64,
    dropped_counter: Counter,
}

impl PageLogger {
    /// Creates a logger that keeps records at or above `level`.
    pub fn new(pool: PagePool, level: LevelFilter) -> Self {
        let dropped_counter = ::metrics::counter!(
            keys::LOG_RECORDS_DROPPED_TOTAL,
            keys::LABEL_POOL => pool.name().to_string()
        );
        PageLogger {
            pool,
            level,
            dropped: AtomicU64::new(0),
            dropped_counter,
        }
    }

    /// Installs the logger as the global `log` backend and returns a handle
    /// that stays valid for the rest of the process, for draining.
    pub fn install(self) -> Result<&'static PageLogger, log::SetLoggerError> {
        let level = self.level;
        let logger: &'static PageLogger = Box::leak(Box::new(self));
        log::set_logger(logger)?;
        log::set_max_level(level);
        Ok(logger)
    }

    /// Returns the underlying page pool.
    pub fn pool(&self) -> &PagePool {
        &self.pool
    }

    /// Returns the number of records dropped because no page was free.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Writes every page committed so far to `out` and recycles it.
    ///
    /// Returns the number of pages consumed. Pages are not drained in the
    /// order they were committed. On an I/O error the page being written is
    /// still recycled and the error is returned.
    pub fn drain<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<usize> {
        let mut pages = 0;
        // Running out of filled pages is how a drain ends, not a failed read.
        while let Some(page) = self.pool.claim_filled() {
            out.write_all(&page)?;
            pages += 1;
        }
        Ok(pages)
    }
}

impl Log for PageLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        match self.pool.try_write() {
            Some(mut page) => {
                write_record(&mut page, record);
                page.commit();
            }
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                self.dropped_counter.increment(1);
            }
        }
    }

    fn flush(&self) {}
}

/// Formats `record` as one line into `page`.
///
/// A record longer than the page keeps the prefix that fits and still ends in
/// a newline, so drained output always splits into one line per record.
fn write_record(page: &mut PageWriter<'_>, record: &Record<'_>) {
    let formatted = write!(page, "{} {}: {}", record.level(), record.target(), record.args());
    // Pushing into a page never fails; `WriteZero` only signals a full page.
    let full = match formatted {
        Ok(()) => page.remaining() == 0,
        Err(e) => {
            debug_assert_eq!(e.kind(), io::ErrorKind::WriteZero);
            true
        }
    };
    if full {
        let keep = page.len().saturating_sub(1);
        page.truncate(keep);
    }
    page.push(b"\n");
}

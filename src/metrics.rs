//! Defines the metric keys and labels used throughout fastslot.
//!
//! Using a central module for these constants helps prevent typos and ensures
//! consistency across the codebase. The container itself emits nothing; these
//! are recorded by the page pool and the page logger.

// --- Metric Keys ---

/// Tracks pages committed by a producer and handed to consumers.
///
/// Labels:
/// - `pool`: the pool name
pub const PAGES_WRITTEN_TOTAL: &str = "fastslot_pages_written_total";

/// Tracks pages a producer dropped without committing.
///
/// Labels:
/// - `pool`: the pool name
pub const PAGES_DISCARDED_TOTAL: &str = "fastslot_pages_discarded_total";

/// Tracks pages handed to a consumer.
///
/// Labels:
/// - `pool`: the pool name
pub const PAGES_READ_TOTAL: &str = "fastslot_pages_read_total";

/// Tracks attempts that found no page available. `PageLogger::drain` stops
/// on an empty pool and does not count here.
///
/// Labels:
/// - `pool`: the pool name
/// - `stage`: "write", "read"
pub const ACQUIRE_FAILURES_TOTAL: &str = "fastslot_acquire_failures_total";

/// A gauge holding the number of pages available to producers.
///
/// Labels:
/// - `pool`: the pool name
pub const FREE_PAGES: &str = "fastslot_free_pages";

/// Tracks log records dropped by the page logger because no page was free.
///
/// Labels:
/// - `pool`: the pool name
pub const LOG_RECORDS_DROPPED_TOTAL: &str = "fastslot_log_records_dropped_total";

// --- Label Keys ---

pub const LABEL_POOL: &str = "pool";
pub const LABEL_STAGE: &str = "stage";

pub const STAGE_WRITE: &str = "write";
pub const STAGE_READ: &str = "read";

//! Defines the error types used throughout fastslot.
use std::fmt;

/// The primary error enum for all fallible operations in fastslot.
///
/// The allocator itself only fails at construction. Running out of slots is a
/// normal outcome and is reported as `None` by [`FastResourceContainer::take`],
/// not as an error.
///
/// [`FastResourceContainer::take`]: crate::FastResourceContainer::take
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The slot array could not be allocated.
    Allocation {
        /// The number of slots that was requested.
        slots: usize,
    },
    /// The requested slot count does not fit the 32-bit signed free counters.
    CapacityOverflow(usize),
    /// Represents an error in the pool configuration.
    Configuration(String),
    /// No page became available within the configured number of attempts.
    Exhausted,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Allocation { slots } => {
                write!(f, "Allocation error: could not reserve {} slots", slots)
            }
            PoolError::CapacityOverflow(n) => {
                write!(f, "Capacity overflow: {} slots exceed the counter range", n)
            }
            PoolError::Configuration(e) => write!(f, "Configuration error: {}", e),
            PoolError::Exhausted => write!(f, "Pool exhausted: no free page available"),
        }
    }
}

impl std::error::Error for PoolError {}

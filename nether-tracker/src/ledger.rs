//! Allocation accounting for instrument and sample storage
//!
//! A [`ResourceLedger`] counts every instrument and sample payload created
//! while it is attached to a load. Each counted allocation carries a
//! [`LedgerToken`]; dropping the token records the release. When every
//! module, builder, and discarded draft from a set of loads is gone the two
//! counters are equal.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Counters {
    allocated: AtomicU64,
    released: AtomicU64,
}

/// Shared allocation/release counters
#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    counters: Arc<Counters>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one allocation and return the token that will release it
    pub fn register(&self) -> LedgerToken {
        self.counters.allocated.fetch_add(1, Ordering::Relaxed);
        LedgerToken {
            counters: Arc::clone(&self.counters),
        }
    }

    /// Total allocations recorded so far
    pub fn allocated(&self) -> u64 {
        self.counters.allocated.load(Ordering::Relaxed)
    }

    /// Total releases recorded so far
    pub fn released(&self) -> u64 {
        self.counters.released.load(Ordering::Relaxed)
    }

    /// Allocations not yet released
    pub fn live(&self) -> u64 {
        self.allocated().saturating_sub(self.released())
    }

    /// True when every recorded allocation has been released exactly once
    pub fn is_balanced(&self) -> bool {
        self.allocated() == self.released()
    }
}

/// Proof of one counted allocation
///
/// Cloning counts as a fresh allocation, so a cloned payload is a distinct
/// owner rather than an alias of the original.
#[derive(Debug)]
pub struct LedgerToken {
    counters: Arc<Counters>,
}

impl Clone for LedgerToken {
    fn clone(&self) -> Self {
        self.counters.allocated.fetch_add(1, Ordering::Relaxed);
        Self {
            counters: Arc::clone(&self.counters),
        }
    }
}

impl Drop for LedgerToken {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::Relaxed);
    }
}

//! Serial number allocation for a single issuer.
//!
//! Serials must never repeat for one issuer. Allocated serials start from a
//! random 62-bit seed and increase atomically, so two issuers (or two runs)
//! are very unlikely to overlap and one issuer never does. Explicit serials are
//! claimed through the same allocator and refused when already used.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rand_core::RngCore;

use crate::error::{PkiError, Result};

const SEED_MASK: u64 = (1 << 62) - 1;

#[derive(Debug)]
pub struct SerialNumberAllocator {
    next: AtomicU64,
    issued: Mutex<BTreeSet<u64>>,
}

impl Default for SerialNumberAllocator {
    fn default() -> Self {
        Self::random()
    }
}

impl SerialNumberAllocator {
    /// Seeds the allocator from the OS random source.
    pub fn random() -> Self {
        let seed = rand_core::OsRng.next_u64() & SEED_MASK;
        Self::starting_at(seed.max(1))
    }

    /// Starts allocating at `first`; zero is bumped to one.
    pub fn starting_at(first: u64) -> Self {
        SerialNumberAllocator {
            next: AtomicU64::new(first.max(1)),
            issued: Mutex::new(BTreeSet::new()),
        }
    }

    /// Returns a serial that this allocator has not handed out before.
    pub fn allocate(&self) -> Result<u64> {
        loop {
            let candidate = self.next.fetch_add(1, Ordering::Relaxed);
            if candidate == 0 || candidate == u64::MAX {
                return Err(PkiError::IssuanceError(
                    "serial number space exhausted".to_string(),
                ));
            }
            if self.issued.lock().insert(candidate) {
                return Ok(candidate);
            }
        }
    }

    /// Records an explicitly requested serial, failing if it was already used.
    pub fn claim(&self, serial: u64) -> Result<u64> {
        if serial == 0 {
            return Err(PkiError::IssuanceError(
                "serial number must be positive".to_string(),
            ));
        }
        if !self.issued.lock().insert(serial) {
            return Err(PkiError::IssuanceError(format!(
                "serial number {serial} was already issued by this issuer"
            )));
        }
        Ok(serial)
    }

    /// Number of serials handed out so far.
    pub fn issued_count(&self) -> usize {
        self.issued.lock().len()
    }
}

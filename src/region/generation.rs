//! Generation-pair seqlock over the mapped region header
//!
//! Two counters bracket the region. The writer bumps the first counter to
//! an odd value before a multi-byte write sequence and brings the second
//! back to match afterwards; both equal and even means the snapshot is
//! consistent. Readers never block the writer, they detect torn reads and
//! retry.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, ShmStatsError};

/// Consistency state observed by a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationSnapshot {
    pub g1: u64,
    pub g2: u64,
}

impl GenerationSnapshot {
    /// True when the pair indicates no write was in progress
    pub fn is_consistent(&self) -> bool {
        self.g1 == self.g2 && self.g1 % 2 == 0
    }
}

/// Seqlock counters living inside the mapped region
///
/// Holds raw pointers into the mapping, so the mapping must outlive this
/// value; the owning region type guarantees that.
#[derive(Debug)]
pub struct GenerationPair {
    g1: *const AtomicU64,
    g2: *const AtomicU64,
}

// The counters are plain atomics; the mapping's lifetime is managed by the
// owner which also upholds single-writer discipline.
unsafe impl Send for GenerationPair {}
unsafe impl Sync for GenerationPair {}

impl GenerationPair {
    /// Wrap the two counter words of a mapped header
    ///
    /// # Safety
    /// Both pointers must be 8-byte aligned, point into memory valid for
    /// the lifetime of the returned value, and be the only atomics used
    /// for this region's generation protocol.
    pub unsafe fn from_raw(g1: *const u64, g2: *const u64) -> Self {
        Self {
            g1: g1 as *const AtomicU64,
            g2: g2 as *const AtomicU64,
        }
    }

    fn first(&self) -> &AtomicU64 {
        unsafe { &*self.g1 }
    }

    fn second(&self) -> &AtomicU64 {
        unsafe { &*self.g2 }
    }

    /// Writer: open a critical section, leaving the first counter odd
    ///
    /// Payload writes must not be reordered before this bump; the AcqRel
    /// read-modify-write provides that edge.
    pub fn begin_write(&self) -> u64 {
        let odd = self.first().fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert!(odd % 2 == 1, "nested or unserialized generation bump");
        odd
    }

    /// Writer: close the critical section, making the pair equal and even
    pub fn end_write(&self) {
        // Release ordering keeps payload writes before both counter stores
        let even = self.first().fetch_add(1, Ordering::Release) + 1;
        debug_assert!(even % 2 == 0, "end_write without begin_write");
        self.second().store(even, Ordering::Release);
    }

    /// Reader: observe the current counter pair
    pub fn observe(&self) -> GenerationSnapshot {
        GenerationSnapshot {
            g1: self.first().load(Ordering::Acquire),
            g2: self.second().load(Ordering::Acquire),
        }
    }

    /// Reader: run `copy` until it executes inside a consistent snapshot
    ///
    /// Retries up to `max_retries` times, then reports staleness. There is
    /// no guarantee any particular write is observed, only that no torn
    /// one is.
    pub fn read_consistent<T, F>(&self, mut copy: F, max_retries: usize) -> Result<T>
    where
        F: FnMut() -> T,
    {
        for _ in 0..max_retries {
            let before = self.observe();
            if !before.is_consistent() {
                std::hint::spin_loop();
                continue;
            }
            let data = copy();
            let after = self.observe();
            if after == before {
                return Ok(data);
            }
        }
        Err(ShmStatsError::Staleness {
            retries: max_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PairBox {
        g1: Box<AtomicU64>,
        g2: Box<AtomicU64>,
    }

    impl PairBox {
        fn new() -> Self {
            Self {
                g1: Box::new(AtomicU64::new(0)),
                g2: Box::new(AtomicU64::new(0)),
            }
        }

        fn pair(&self) -> GenerationPair {
            unsafe {
                GenerationPair::from_raw(
                    &*self.g1 as *const AtomicU64 as *const u64,
                    &*self.g2 as *const AtomicU64 as *const u64,
                )
            }
        }
    }

    #[test]
    fn test_write_cycle_leaves_pair_even_and_equal() {
        let mem = PairBox::new();
        let pair = mem.pair();
        assert!(pair.observe().is_consistent());
        let odd = pair.begin_write();
        assert_eq!(odd % 2, 1);
        assert!(!pair.observe().is_consistent());
        pair.end_write();
        let snap = pair.observe();
        assert!(snap.is_consistent());
        assert_eq!(snap.g1, 2);
        assert_eq!(snap.g2, 2);
    }

    #[test]
    fn test_reader_retries_through_interleaved_write() {
        let mem = PairBox::new();
        let pair = mem.pair();
        let mut payload = 0u64;
        // Simulate a torn observation: first copy attempt lands inside a
        // write, the second one after it completed.
        let mut attempt = 0;
        let writer = mem.pair();
        let result = pair.read_consistent(
            || {
                attempt += 1;
                if attempt == 1 {
                    writer.begin_write();
                    payload = 41;
                    let torn = payload;
                    payload = 42;
                    writer.end_write();
                    torn
                } else {
                    payload
                }
            },
            8,
        );
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_reader_gives_up_on_permanently_odd_pair() {
        let mem = PairBox::new();
        let pair = mem.pair();
        pair.begin_write();
        let err = pair.read_consistent(|| (), 4).unwrap_err();
        assert!(matches!(err, ShmStatsError::Staleness { retries: 4 }));
    }

    #[test]
    fn test_mismatched_pair_is_inconsistent() {
        let snap = GenerationSnapshot { g1: 4, g2: 2 };
        assert!(!snap.is_consistent());
        let snap = GenerationSnapshot { g1: 3, g2: 3 };
        assert!(!snap.is_consistent());
        let snap = GenerationSnapshot { g1: 6, g2: 6 };
        assert!(snap.is_consistent());
    }
}

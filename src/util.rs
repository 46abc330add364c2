use std::sync::atomic::{AtomicU64, Ordering};

/// Cheap unique ids: a random 128-bit seed XOR a monotonically increasing
/// sequence number.
pub(crate) struct IdGenerator {
    seed: u128,
    counter: AtomicU64,
}

impl IdGenerator {
    #[must_use]
    pub(crate) fn new() -> Self {
        let seed_hi = u128::from(fastrand::u64(..));
        let seed_lo = u128::from(fastrand::u64(..));
        Self {
            seed: (seed_hi << 64) | seed_lo,
            counter: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    #[must_use]
    pub(crate) fn uuid_for(&self, seq: u64) -> uuid::Uuid {
        uuid::Uuid::from_u128(self.seed ^ u128::from(seq))
    }

    pub(crate) fn next_uuid(&self) -> uuid::Uuid {
        self.uuid_for(self.next_seq())
    }
}

//! Lightweight, read-only-by-dump diagnostic counters.
//!
//! These are purely observational (§7: "no error is logged or printed by
//! the allocator itself" beyond `dump`, and stats never gate control
//! flow). The counting pattern (a running total plus a peak) mirrors the
//! teacher's `StatCount`/`_stat_update`; unlike the teacher, `fetch_max`
//! is used directly since it has been a stable `AtomicI64` method since
//! Rust 1.45 — the teacher's own comment flags this as a TODO it was
//! written before that stabilized.

use core::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

/// A running count with a high-water mark.
#[derive(Default)]
pub struct StatCount {
    pub current: AtomicI64,
    pub peak: AtomicI64,
}

impl StatCount {
    pub const fn new() -> Self {
        StatCount {
            current: AtomicI64::new(0),
            peak: AtomicI64::new(0),
        }
    }

    pub fn increase(&self, amount: i64) {
        if amount == 0 {
            return;
        }
        let current = self.current.fetch_add(amount, Ordering::Relaxed) + amount;
        self.peak.fetch_max(current, Ordering::Relaxed);
    }

    pub fn decrease(&self, amount: i64) {
        self.current.fetch_sub(amount, Ordering::Relaxed);
    }
}

/// A simple call counter (no magnitude), used for things like "how many
/// times did the big-tier rotation search run".
#[derive(Default)]
pub struct Counter(AtomicUsize);

impl Counter {
    pub const fn new() -> Self {
        Counter(AtomicUsize::new(0))
    }

    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Process-wide allocator diagnostics. None of these fields participate
/// in any invariant; they exist to make `log::trace!`/`log::debug!`
/// output and ad-hoc introspection possible.
#[derive(Default)]
pub struct Stats {
    pub mapped_bytes: StatCount,
    pub chunks_created: Counter,
    pub huge_blocks_live: StatCount,
    pub big_rotation_searches: Counter,
    pub big_rotation_exhausted: Counter,
}

impl Stats {
    pub const fn new() -> Self {
        Stats {
            mapped_bytes: StatCount::new(),
            chunks_created: Counter::new(),
            huge_blocks_live: StatCount::new(),
            big_rotation_searches: Counter::new(),
            big_rotation_exhausted: Counter::new(),
        }
    }
}

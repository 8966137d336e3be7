//! The process-wide singleton manager (§3: "Global manager. Singleton
//! process-wide state...") and its lazy bootstrap.
//!
//! The teacher crate's `init.rs` lazily constructs a static `heap_main`
//! and guards it with a `process_is_initialized` flag, bootstrapped from
//! `malloc_generic`/`thread_init` on first use rather than at program
//! start (macOS's dynamic loader can call `malloc` before `main` runs,
//! so eager static initialization is unsafe there too). This crate keeps
//! that lazy-bootstrap shape but drops the thread-local heap machinery
//! entirely: spec.md §5 fixes a single-threaded contract, so there is
//! exactly one `Manager`, not one per thread.

use crate::stats::Stats;
use crate::types::{ChunkHeader, HugeHeader, S};

/// All process-wide allocator state. §3: "the manager owns all chunks
/// and the huge-list sentinel."
///
/// Pinning note: the huge sentinel's ring pointers are self-referential
/// once initialized (`huge.rs::ensure_init`), so a `Manager` must never
/// move after its first huge-tier operation. In practice there is
/// exactly one `Manager`, held in a `static` (see `lib.rs`'s `CORE`),
/// which never moves for the lifetime of the process — the same
/// guarantee the teacher leans on for its statically allocated
/// `heap_main`.
pub struct Manager {
    pub small_free: [*mut crate::types::SmallNode; S],
    pub chunk_head: *mut ChunkHeader,
    pub chunk_tail: *mut ChunkHeader,
    pub big_head: *mut crate::types::BigHeader,
    pub big_tail: *mut crate::types::BigHeader,
    huge_sentinel: HugeHeader,
    pub stats: Stats,
}

impl Manager {
    pub const fn new() -> Self {
        Manager {
            small_free: [core::ptr::null_mut(); S],
            chunk_head: core::ptr::null_mut(),
            chunk_tail: core::ptr::null_mut(),
            big_head: core::ptr::null_mut(),
            big_tail: core::ptr::null_mut(),
            huge_sentinel: HugeHeader {
                size: 0,
                prev: core::ptr::null_mut(),
                next: core::ptr::null_mut(),
            },
            stats: Stats::new(),
        }
    }

    /// Address of the sentinel node, stable for the lifetime of this
    /// `Manager` (see the pinning note above).
    pub fn huge_sentinel_ptr(&mut self) -> *mut HugeHeader {
        &mut self.huge_sentinel as *mut HugeHeader
    }
}

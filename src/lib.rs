//! A three-tier (small/big/huge) anonymous-mapping-backed memory
//! allocator: a size-segregated free-list cache for small blocks, a
//! coalescing-free best-effort-fit list for big blocks, and a
//! directly-mapped doubly-linked registry for huge blocks.
//!
//! The three public operations are [`allocate`], [`free`] and
//! [`reallocate`], plus the diagnostic [`dump`]. A [`GlobalAlloc`]
//! adapter (`Tiertrove`) lets the crate back `#[global_allocator]`
//! directly; enable the `sync` feature for a [`Locked`] wrapper usable
//! from more than one thread.
#![cfg_attr(not(test), no_std)]

use core::alloc::{GlobalAlloc, Layout};
use core::fmt::Write;
use core::ptr::NonNull;

mod big;
mod chunk;
mod huge;
mod manager;
mod os;
mod small;
mod stats;
mod types;

use manager::Manager;
use types::{HUGE_THRESHOLD, SMALL_SIZE_MAX, U};

/// The single process-wide instance backing the free-function API.
/// Never moves for the life of the process (see `Manager`'s pinning
/// note); `core_mut` is the only way to reach it.
static mut CORE: Manager = Manager::new();

/// # Safety
/// Caller must ensure no other `&mut Manager` is concurrently live —
/// i.e. either single-threaded use, or the caller has already taken an
/// external lock (see `sync::Locked`). This is the single-threaded
/// contract spec.md §5 fixes for the whole crate.
#[inline]
unsafe fn core_mut() -> &'static mut Manager {
    &mut CORE
}

/// Classifies `n` into a tier and dispatches. `n == 0` returns `None`
/// without touching any state (§4.6, §7 "Zero-size request").
unsafe fn allocate_in(mgr: &mut Manager, n: usize) -> Option<NonNull<u8>> {
    if n == 0 {
        return None;
    }
    if n <= SMALL_SIZE_MAX {
        small::alloc(mgr, small::classify(n))
    } else if n <= HUGE_THRESHOLD {
        big::alloc(mgr, n)
    } else {
        huge::alloc(mgr, n)
    }
}

unsafe fn free_in(mgr: &mut Manager, p: NonNull<u8>, osize: usize) {
    if osize == 0 {
        return;
    }
    if osize <= SMALL_SIZE_MAX {
        small::free(mgr, p, small::classify(osize));
    } else if osize <= HUGE_THRESHOLD {
        big::free(mgr, p);
    } else {
        huge::free(mgr, p, osize);
    }
}

unsafe fn reallocate_in(
    mgr: &mut Manager,
    p: NonNull<u8>,
    osize: usize,
    nsize: usize,
) -> Option<NonNull<u8>> {
    if osize > HUGE_THRESHOLD && nsize > HUGE_THRESHOLD {
        return huge::realloc(mgr, p, osize, nsize);
    }
    if nsize <= osize {
        return Some(p);
    }
    let new_p = allocate_in(mgr, nsize)?;
    core::ptr::copy_nonoverlapping(p.as_ptr(), new_p.as_ptr(), osize);
    free_in(mgr, p, osize);
    Some(new_p)
}

/// Allocates `n` bytes, dispatching to the small, big or huge tier by
/// size (§4.6). `n == 0` returns `None`. `_tag` is an advisory
/// call-site hint reserved for future instrumentation (spec.md §9); it
/// is accepted and ignored, exactly as the core leaves it unread.
pub fn allocate(n: usize, _tag: Option<&str>) -> Option<NonNull<u8>> {
    unsafe { allocate_in(core_mut(), n) }
}

/// Frees a block previously returned by [`allocate`]. `osize` must be
/// exactly the size passed to that `allocate` call; passing a different
/// value is a caller contract violation and is not detected (spec.md
/// §7, error taxonomy item 3).
///
/// # Safety
/// `p` must be a still-live pointer returned by [`allocate`] (or
/// [`reallocate`]) and not previously freed.
pub unsafe fn free(p: NonNull<u8>, osize: usize) {
    free_in(core_mut(), p, osize)
}

/// Grows or shrinks a block in place where possible, or allocates a new
/// one and copies the overlap (§4.6). Returns `None` on allocation
/// failure, in which case `p` remains valid and unchanged.
///
/// # Safety
/// `p` must be a still-live pointer returned by [`allocate`] (or a
/// prior [`reallocate`]) with original size `osize`.
pub unsafe fn reallocate(p: NonNull<u8>, osize: usize, nsize: usize) -> Option<NonNull<u8>> {
    reallocate_in(core_mut(), p, osize, nsize)
}

/// Writes diagnostic lines to `sink`: each non-empty small class as
/// `(index, count)`, and each chunk as `chunk_used`. Read-only; never
/// perturbs allocator state (§4.6).
pub fn dump<W: Write>(sink: &mut W) -> core::fmt::Result {
    unsafe {
        let mgr = core_mut();
        for idx in 0..types::S {
            let mut count = 0usize;
            let mut node = mgr.small_free[idx];
            while !node.is_null() {
                count += 1;
                node = (*node).next;
            }
            if count > 0 {
                writeln!(sink, "small[{}]: {}", idx, count)?;
            }
        }
        let mut chunk_result = Ok(());
        chunk::for_each_used(mgr, |used| {
            if chunk_result.is_ok() {
                chunk_result = writeln!(sink, "chunk: used={}", used);
            }
        });
        chunk_result?;
    }
    Ok(())
}

#[inline]
fn layout_to_size(layout: Layout) -> usize {
    layout.size().max(1)
}

/// Whether `layout` must be routed to the huge tier to honor its
/// alignment rather than its size. Alignments up to `U` are free: every
/// tier already hands out `U`-aligned storage (small blocks are
/// `U`-sized, big/huge headers are machine-word sized and `U == WORD`
/// by default). Beyond `U` and up to the page size, route to the huge
/// tier regardless of `n` since huge blocks are page-aligned OS
/// mappings; beyond the page size nothing in this allocator can
/// satisfy the request (an Open Question decision recorded in
/// DESIGN.md — `alloc` returns null in that case).
///
/// `dealloc`/`realloc` must derive the same answer from the same
/// `Layout` they were handed at `alloc` time, or they would dispatch a
/// huge-backed block through the small/big tiers' size-only thresholds.
#[inline]
fn needs_huge_tier(layout: Layout) -> bool {
    layout.align() > U
}

/// `GlobalAlloc` adapter over the free-function API (§6: "the
/// `GlobalAlloc` adaptation is additive, not a change to the core three
/// operations"). Single-threaded; wrap in [`Locked`] (via the `sync`
/// feature) to use as `#[global_allocator]` from more than one thread.
pub struct Tiertrove;

unsafe impl GlobalAlloc for Tiertrove {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > os_page_align_ceiling() {
            return core::ptr::null_mut();
        }
        let n = layout_to_size(layout);
        let mgr = core_mut();
        let p = if needs_huge_tier(layout) {
            huge::alloc(mgr, n)
        } else {
            allocate_in(mgr, n)
        };
        p.map_or(core::ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let n = layout_to_size(layout);
        let p = NonNull::new_unchecked(ptr);
        let mgr = core_mut();
        if needs_huge_tier(layout) {
            huge::free(mgr, p, n);
        } else {
            free_in(mgr, p, n);
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let osize = layout_to_size(layout);
        let nsize = new_size.max(1);
        let p = NonNull::new_unchecked(ptr);
        let mgr = core_mut();
        let result = if needs_huge_tier(layout) {
            huge::realloc(mgr, p, osize, nsize)
        } else {
            reallocate_in(mgr, p, osize, nsize)
        };
        result.map_or(core::ptr::null_mut(), NonNull::as_ptr)
    }
}

/// Page size ceiling for the `GlobalAlloc` alignment shim: alignments
/// beyond this cannot be satisfied by any tier and `alloc` returns
/// null. 4 KiB is the smallest page size across the platforms this
/// crate targets; a larger host page size only makes more alignments
/// satisfiable, never fewer, so a fixed floor is sound everywhere.
#[inline]
fn os_page_align_ceiling() -> usize {
    4096
}

#[cfg(feature = "sync")]
pub mod sync {
    //! Embedder-supplied synchronization (spec.md §5: "concurrent
    //! callers from multiple threads must serialize their calls through
    //! an external mutual-exclusion device provided by the embedder").
    //! `Locked` is that device, grounded on `shilei-massclouds-score`'s
    //! `spin::Mutex<PmmNode>` kernel allocator state, which wraps
    //! allocator-internal state in exactly `spin::Mutex` for the same
    //! reason: a `no_std` context where `std::sync::Mutex` isn't
    //! available. It adds no invariants beyond "one mutator inside the
    //! lock at a time."

    use super::Tiertrove;
    use core::alloc::{GlobalAlloc, Layout};
    use spin::Mutex;

    /// Wraps an allocator core in a spinlock so it can be exposed as a
    /// `#[global_allocator]` usable from more than one thread. This
    /// crate's core free functions always operate on the single
    /// process-wide `Manager`, so `Locked` here is a thin `GlobalAlloc`
    /// forwarder that serializes access to that same singleton rather
    /// than owning a second one.
    pub struct Locked(Mutex<()>);

    impl Locked {
        pub const fn new() -> Self {
            Locked(Mutex::new(()))
        }
    }

    impl Default for Locked {
        fn default() -> Self {
            Self::new()
        }
    }

    unsafe impl GlobalAlloc for Locked {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            let _guard = self.0.lock();
            Tiertrove.alloc(layout)
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            let _guard = self.0.lock();
            Tiertrove.dealloc(ptr, layout)
        }

        unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
            let _guard = self.0.lock();
            Tiertrove.realloc(ptr, layout, new_size)
        }
    }
}

#[cfg(test)]
mod tests;

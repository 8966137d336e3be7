//! Huge tier: directly-mapped blocks tracked in a doubly linked ring
//! anchored at a sentinel node embedded in the `Manager`.
//!
//! The sentinel starts with null `prev`/`next` and is lazily wired to
//! point to itself on first use (`ensure_init`), mirroring the teacher's
//! `process_is_initialized` bootstrap in `init.rs`. This requires the
//! `Manager` that owns the sentinel to never move once any huge
//! operation has run — see the pinning note on `Manager`.

use core::ptr::NonNull;

use crate::manager::Manager;
use crate::os;
use crate::types::{HugeHeader, HUGE_HEADER_SIZE};

#[inline]
unsafe fn payload_of(h: *mut HugeHeader) -> NonNull<u8> {
    NonNull::new_unchecked((h as *mut u8).add(HUGE_HEADER_SIZE))
}

#[inline]
unsafe fn header_of(payload: NonNull<u8>) -> *mut HugeHeader {
    payload.as_ptr().sub(HUGE_HEADER_SIZE) as *mut HugeHeader
}

/// Ensures the sentinel's ring pointers point to itself. Idempotent;
/// cheap enough to call unconditionally at the top of every huge-tier
/// operation.
pub unsafe fn ensure_init(mgr: &mut Manager) {
    let sentinel = mgr.huge_sentinel_ptr();
    if (*sentinel).next.is_null() {
        (*sentinel).prev = sentinel;
        (*sentinel).next = sentinel;
    }
}

/// Allocates a huge block of `n` payload bytes as its own OS mapping,
/// splicing it in directly after the sentinel (so the most recently
/// allocated huge block is found first), matching the insertion order
/// `original_source`'s `alloc_huge_memory` uses.
pub unsafe fn alloc(mgr: &mut Manager, n: usize) -> Option<NonNull<u8>> {
    ensure_init(mgr);
    let sentinel = mgr.huge_sentinel_ptr();

    let base = os::map(n + HUGE_HEADER_SIZE)?;
    let h = base.as_ptr() as *mut HugeHeader;
    (*h).size = n;

    let old_next = (*sentinel).next;
    (*h).prev = sentinel;
    (*h).next = old_next;
    (*old_next).prev = h;
    (*sentinel).next = h;

    mgr.stats.huge_blocks_live.increase(1);
    log::debug!("huge: allocated {} bytes at {:p}", n, h);

    Some(payload_of(h))
}

/// Splices a huge block out of the ring and releases its mapping.
pub unsafe fn free(mgr: &mut Manager, ptr: NonNull<u8>, _osize: usize) {
    let h = header_of(ptr);
    (*(*h).prev).next = (*h).next;
    (*(*h).next).prev = (*h).prev;

    let mapped = (*h).size + HUGE_HEADER_SIZE;
    os::unmap(NonNull::new_unchecked(h as *mut u8), mapped);
    mgr.stats.huge_blocks_live.decrease(1);
}

/// Grows or shrinks a huge block's backing mapping in place where
/// possible. If the mapping moved, re-splices the node at the same
/// logical ring position by rewriting its neighbors' links.
pub unsafe fn realloc(mgr: &mut Manager, ptr: NonNull<u8>, osize: usize, nsize: usize) -> Option<NonNull<u8>> {
    let _ = mgr;
    let h = header_of(ptr);
    let old_mapped = osize + HUGE_HEADER_SIZE;
    let new_mapped = nsize + HUGE_HEADER_SIZE;

    let new_base = os::remap(NonNull::new_unchecked(h as *mut u8), old_mapped, new_mapped)?;
    let nh = new_base.as_ptr() as *mut HugeHeader;
    (*nh).size = nsize;

    if nh as *mut u8 == h as *mut u8 {
        return Some(payload_of(nh));
    }

    (*(*nh).prev).next = nh;
    (*(*nh).next).prev = nh;
    Some(payload_of(nh))
}

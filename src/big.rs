//! Big tier: a coalescing-free, best-effort-fit free list for blocks
//! bigger than the largest small class and up to `HUGE_THRESHOLD`.
//!
//! The free-list "next" pointer is not a struct field (see
//! `types::BigHeader`'s doc comment) — it overlaps the first word of the
//! block's own payload, exactly the in-band trick `original_source`'s
//! `struct bigblock` relies on. `next_slot`/`payload_of` are the only two
//! functions that know this.

use core::ptr::NonNull;

use crate::chunk;
use crate::manager::Manager;
use crate::small;
use crate::types::{BigHeader, BIG_HEADER_SIZE, BIG_SEARCH_DEPTH, S, U, WORD};

/// Rounds `n + WORD` (the header) up to a multiple of 8, giving the
/// on-heap size stored in the header.
#[inline]
fn normalize(n: usize) -> usize {
    (n + WORD + 7) & !7
}

/// Address of the free-list "next" pointer slot, which is also the
/// payload start address. Only valid to read while the block is free.
#[inline]
unsafe fn next_slot(h: *mut BigHeader) -> *mut *mut BigHeader {
    (h as *mut u8).add(BIG_HEADER_SIZE) as *mut *mut BigHeader
}

#[inline]
unsafe fn next(h: *mut BigHeader) -> *mut BigHeader {
    *next_slot(h)
}

#[inline]
unsafe fn set_next(h: *mut BigHeader, n: *mut BigHeader) {
    *next_slot(h) = n;
}

/// Payload address for a header at `h`, valid whether the block is free
/// or in use (it is simply `h + BIG_HEADER_SIZE`, same address as
/// `next_slot` produces — the two views of the same bytes never
/// disagree because only one is live at a time).
#[inline]
unsafe fn payload_of(h: *mut BigHeader) -> NonNull<u8> {
    NonNull::new_unchecked((h as *mut u8).add(BIG_HEADER_SIZE))
}

#[inline]
unsafe fn header_of(payload: NonNull<u8>) -> *mut BigHeader {
    payload.as_ptr().sub(BIG_HEADER_SIZE) as *mut BigHeader
}

/// Routes a split's leftover bytes to whichever tier can hold them:
/// small if the leftover (minus the word it would need as its own big
/// header) fits a small class, otherwise it stays a big block of
/// `left` bytes. Returns `Some` only when the leftover became a new big
/// block (the small case is handled entirely inside this call).
unsafe fn redistribute_leftover(mgr: &mut Manager, ptr: *mut u8, left: usize) -> Option<*mut BigHeader> {
    let idx = (left - 1) / U;
    if idx < S {
        small::free(mgr, NonNull::new_unchecked(ptr), idx);
        None
    } else {
        let left_block = ptr as *mut BigHeader;
        (*left_block).size = left - BIG_HEADER_SIZE;
        Some(left_block)
    }
}

/// The rotating bounded first-fit search over the big free list (§4.4).
unsafe fn lookup(mgr: &mut Manager, sz: usize) -> Option<*mut BigHeader> {
    if mgr.big_head.is_null() {
        return None;
    }

    if mgr.big_head == mgr.big_tail {
        let b = mgr.big_head;
        if (*b).size < sz {
            return None;
        }
        let left = (*b).size - sz;
        (*b).size = sz;
        if left == 0 {
            mgr.big_head = core::ptr::null_mut();
            mgr.big_tail = core::ptr::null_mut();
            return Some(b);
        }
        let tail_ptr = (b as *mut u8).add(sz);
        match redistribute_leftover(mgr, tail_ptr, left) {
            Some(left_block) => {
                // The C reference leaves this node's `next` uninitialized,
                // which is fine only as long as it never becomes a
                // non-tail element. `free` can still prepend in front of
                // it without updating `big_tail`, so initialize `next`
                // explicitly to avoid reading garbage on a later rotation.
                set_next(left_block, core::ptr::null_mut());
                mgr.big_head = left_block;
                mgr.big_tail = left_block;
            }
            None => {
                mgr.big_head = core::ptr::null_mut();
                mgr.big_tail = core::ptr::null_mut();
            }
        }
        return Some(b);
    }

    mgr.stats.big_rotation_searches.bump();
    let term = mgr.big_head;
    let mut n = 0usize;
    loop {
        let b = mgr.big_head;
        mgr.big_head = next(b);
        if (*b).size >= sz {
            if (*b).size == sz {
                return Some(b);
            }
            let left = (*b).size - sz;
            (*b).size = sz;
            let tail_ptr = (b as *mut u8).add(sz);
            if let Some(left_block) = redistribute_leftover(mgr, tail_ptr, left) {
                if left > sz {
                    // fresher, bigger block: future searches see it first
                    set_next(left_block, mgr.big_head);
                    mgr.big_head = left_block;
                } else {
                    // push the remainder behind the current search frontier
                    set_next(left_block, core::ptr::null_mut());
                    set_next(mgr.big_tail, left_block);
                    mgr.big_tail = left_block;
                }
            }
            return Some(b);
        }
        // doesn't fit: rotate it to the tail and keep looking
        set_next(b, core::ptr::null_mut());
        set_next(mgr.big_tail, b);
        mgr.big_tail = b;

        n += 1;
        if mgr.big_head == term || n >= BIG_SEARCH_DEPTH {
            if n >= BIG_SEARCH_DEPTH {
                mgr.stats.big_rotation_exhausted.bump();
            }
            return None;
        }
    }
}

/// Allocates `n` payload bytes from the big tier.
pub unsafe fn alloc(mgr: &mut Manager, n: usize) -> Option<NonNull<u8>> {
    let sz = normalize(n);

    if let Some(addr) = chunk::bump_tail(mgr, sz) {
        let h = addr.as_ptr() as *mut BigHeader;
        (*h).size = sz;
        return Some(payload_of(h));
    }

    if let Some(h) = lookup(mgr, sz) {
        return Some(payload_of(h));
    }

    let addr = chunk::create(mgr, sz)?;
    let h = addr.as_ptr() as *mut BigHeader;
    (*h).size = sz;
    Some(payload_of(h))
}

/// Counts the nodes reachable from `big_head`, for tests that need to
/// confirm a bounded search rotated the list without consuming any of
/// it.
#[cfg(test)]
pub(crate) unsafe fn list_len(mgr: &Manager) -> usize {
    let mut n = 0;
    let mut node = mgr.big_head;
    while !node.is_null() {
        n += 1;
        node = next(node);
    }
    n
}

/// Prepends a freed block to the big free list (no coalescing).
pub unsafe fn free(mgr: &mut Manager, ptr: NonNull<u8>) {
    let h = header_of(ptr);
    if mgr.big_head.is_null() {
        set_next(h, core::ptr::null_mut());
        mgr.big_head = h;
        mgr.big_tail = h;
    } else {
        set_next(h, mgr.big_head);
        mgr.big_head = h;
    }
}

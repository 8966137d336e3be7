//! Small tier: a size-segregated free-list cache for blocks of
//! `(idx + 1) * U` bytes, `idx` in `0..S`.

use core::ptr::NonNull;

use crate::chunk;
use crate::manager::Manager;
use crate::types::{SmallNode, S, U};

/// Maps a request of `n` bytes in `(0, S*U]` to its class index.
#[inline]
pub fn classify(n: usize) -> usize {
    debug_assert!(n > 0 && n <= S * U);
    (n - 1) / U
}

/// Byte size physically handed out for class `idx`.
#[inline]
fn class_size(idx: usize) -> usize {
    (idx + 1) * U
}

/// Pops the free-list head for class `idx`, if any.
unsafe fn pop_free(mgr: &mut Manager, idx: usize) -> Option<NonNull<u8>> {
    let head = mgr.small_free[idx];
    if head.is_null() {
        return None;
    }
    mgr.small_free[idx] = (*head).next;
    NonNull::new(head as *mut u8)
}

/// Pushes `ptr` (a block of exactly `class_size(idx)` bytes) onto class
/// `idx`'s free list.
unsafe fn push_free(mgr: &mut Manager, idx: usize, ptr: *mut u8) {
    let node = ptr as *mut SmallNode;
    (*node).next = mgr.small_free[idx];
    mgr.small_free[idx] = node;
}

/// Carves a surplus region into small blocks and files each onto its
/// class list, per §4.3's split policy. `remaining` is always a
/// positive multiple of `U` coming in, so the last iteration consumes it
/// exactly.
unsafe fn split(mgr: &mut Manager, mut ptr: *mut u8, mut remaining: usize) {
    while remaining > 0 {
        let j = classify(remaining.min(S * U));
        let blk = class_size(j);
        push_free(mgr, j, ptr);
        ptr = ptr.add(blk);
        remaining -= blk;
    }
}

/// Allocates a class-`idx` block, trying (in order) the class's own free
/// list, any chunk with tail room, a larger class to split, and finally a
/// fresh chunk.
pub unsafe fn alloc(mgr: &mut Manager, idx: usize) -> Option<NonNull<u8>> {
    if let Some(p) = pop_free(mgr, idx) {
        return Some(p);
    }

    let sz = class_size(idx);

    if let Some(p) = chunk::bump_any(mgr, sz) {
        return Some(p);
    }

    for i in (idx + 1)..S {
        if !mgr.small_free[i].is_null() {
            let node = mgr.small_free[i];
            mgr.small_free[i] = (*node).next;
            let ptr = node as *mut u8;
            let surplus = class_size(i) - sz;
            if surplus > 0 {
                split(mgr, ptr.add(sz), surplus);
            }
            return NonNull::new(ptr);
        }
    }

    chunk::create(mgr, sz)
}

/// Pushes a freed class-`idx` block back onto its free list. No
/// coalescing — freed small blocks are cached forever (§3 lifecycles).
pub unsafe fn free(mgr: &mut Manager, ptr: NonNull<u8>, idx: usize) {
    push_free(mgr, idx, ptr.as_ptr());
}

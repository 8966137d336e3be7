//! Chunk arena: a singly linked list of fixed-size chunks backing the
//! small and big tiers. Chunks are created on demand from the page
//! source and never returned to the OS (§3: "Chunks are created on
//! demand and live until process teardown").

use core::ptr::NonNull;

use crate::manager::Manager;
use crate::os;
use crate::types::{ChunkHeader, CHUNK_HEADER_SIZE, C};

/// Allocates a fresh chunk, reserving `reserve` bytes off its tail, links
/// it onto the tail of the chunk list, and returns the address of the
/// reserved region (i.e. the first byte after the header). `reserve` is
/// claimed immediately by whichever tier asked for the chunk — this is
/// the single place a fresh chunk is ever produced, used both to seed a
/// single small/big block and (with `reserve == 0`) to seed an otherwise
/// empty chunk.
pub unsafe fn create(mgr: &mut Manager, reserve: usize) -> Option<NonNull<u8>> {
    debug_assert!(CHUNK_HEADER_SIZE + reserve <= C);
    let base = os::map(C)?;
    let header = base.as_ptr() as *mut ChunkHeader;
    (*header).next = core::ptr::null_mut();
    (*header).chunk_used = CHUNK_HEADER_SIZE + reserve;

    if mgr.chunk_tail.is_null() {
        mgr.chunk_head = header;
    } else {
        (*mgr.chunk_tail).next = header;
    }
    mgr.chunk_tail = header;

    mgr.stats.mapped_bytes.increase(C as i64);
    mgr.stats.chunks_created.bump();
    log::trace!("chunk: new chunk at {:p}, reserve {}", header, reserve);

    NonNull::new(base.as_ptr().add(CHUNK_HEADER_SIZE))
}

/// Advances a specific chunk's bump offset by `n` bytes and returns the
/// old boundary, or `None` if it doesn't have enough tail space.
unsafe fn bump(chunk: *mut ChunkHeader, n: usize) -> Option<NonNull<u8>> {
    if (*chunk).chunk_used + n > C {
        return None;
    }
    let addr = (chunk as *mut u8).add((*chunk).chunk_used);
    (*chunk).chunk_used += n;
    NonNull::new(addr)
}

/// Bumps from the tail chunk only, if it has room. This is the fast path
/// big-tier allocation and small-chunk-creation rely on.
pub unsafe fn bump_tail(mgr: &mut Manager, n: usize) -> Option<NonNull<u8>> {
    if mgr.chunk_tail.is_null() {
        return None;
    }
    bump(mgr.chunk_tail, n)
}

/// Walks the chunk list head-to-tail looking for *any* chunk with enough
/// tail space and bumps the first one found. Deliberately not
/// tail-only: earlier chunks can still have capacity left over from
/// requests that skipped them (§4.3 small-tier allocation policy, step
/// 2).
pub unsafe fn bump_any(mgr: &mut Manager, n: usize) -> Option<NonNull<u8>> {
    let mut chunk = mgr.chunk_head;
    while !chunk.is_null() {
        if let Some(addr) = bump(chunk, n) {
            return Some(addr);
        }
        chunk = (*chunk).next;
    }
    None
}

/// Read-only traversal for `dump`: calls `f(chunk_used)` for every chunk
/// in list order. Never mutates allocator state.
pub unsafe fn for_each_used<F: FnMut(usize)>(mgr: &Manager, mut f: F) {
    let mut chunk = mgr.chunk_head;
    while !chunk.is_null() {
        f((*chunk).chunk_used);
        chunk = (*chunk).next;
    }
}

//! Compile-time constants and the in-band metadata layouts for each tier.
//!
//! The four tuning constants (`U`, `S`, `C`, `BIG_SEARCH_DEPTH`) are the
//! ones a downstream fork would change; everything else here is derived.

use core::mem::size_of;

/// Machine word size in bytes.
pub const WORD: usize = size_of::<usize>();

/// Small-unit granularity. Must be a power of two and at least `WORD`.
pub const U: usize = 8;

/// Number of small size classes, in `[1, 256]`. Class `i` serves exactly
/// `(i + 1) * U` bytes.
pub const S: usize = 32;

/// Byte size of an arena chunk.
pub const C: usize = 32 * 1024;

/// Requests strictly above this go to the huge tier. The subtracted 16
/// bytes is the chunk header size on a 64-bit target (a next pointer plus
/// the `chunk_used` counter, both machine words); see DESIGN.md for why
/// this is pinned to a literal rather than derived from `size_of`.
pub const HUGE_THRESHOLD: usize = C - 16;

/// Maximum nodes visited in one big-tier free-list scan.
pub const BIG_SEARCH_DEPTH: usize = 128;

/// Largest request size served by the small tier.
pub const SMALL_SIZE_MAX: usize = S * U;

/// Chunk header: a next pointer plus a bump offset into the chunk.
///
/// Invariant: `CHUNK_HEADER_SIZE <= chunk_used <= C`. The range
/// `[chunk_base + chunk_used, chunk_base + C)` is the chunk's unallocated
/// tail.
#[repr(C)]
pub struct ChunkHeader {
    pub next: *mut ChunkHeader,
    pub chunk_used: usize,
}

pub const CHUNK_HEADER_SIZE: usize = size_of::<ChunkHeader>();

/// Free small block: a single link to the next free node of the same
/// class. The block's size is implicit in the class index, so no size
/// field is stored.
#[repr(C)]
pub struct SmallNode {
    pub next: *mut SmallNode,
}

/// Big block header. Only the `size` word is reserved storage; `size` is
/// the on-heap size (header included) rounded up to a multiple of 8. A
/// free block's "next" pointer is *not* a struct field — it physically
/// overlaps the first word of the payload, the same trick the C
/// reference uses (an in-use block never reads it, so there is nothing
/// to corrupt). See `big::next_slot`/`big::payload_of` for the single
/// place that encodes this.
#[repr(C)]
pub struct BigHeader {
    pub size: usize,
}

pub const BIG_HEADER_SIZE: usize = size_of::<BigHeader>();

/// Huge block header: payload size plus the doubly linked ring pointers.
/// Always fully reserved (no overlap trick) since huge blocks are never
/// cheap enough in count to bother shaving a word off.
#[repr(C)]
pub struct HugeHeader {
    pub size: usize,
    pub prev: *mut HugeHeader,
    pub next: *mut HugeHeader,
}

pub const HUGE_HEADER_SIZE: usize = size_of::<HugeHeader>();

const _: () = {
    // `ChunkHeader` sizing underwrites `HUGE_THRESHOLD` above; if this
    // ever trips, the literal `16` needs revisiting alongside it.
    assert!(CHUNK_HEADER_SIZE == 2 * WORD);
    assert!(BIG_HEADER_SIZE == WORD);
    assert!(U.is_power_of_two());
    assert!(U >= WORD);
    assert!(S >= 1 && S <= 256);
};

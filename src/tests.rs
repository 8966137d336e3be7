//! Whitebox unit tests plus `proptest` properties for every bullet and
//! numbered scenario in spec §8. Most tests construct a fresh, local
//! `Manager` and drive the tier modules (or the crate-private
//! `allocate_in`/`free_in`/`reallocate_in` helpers) directly — this
//! sidesteps the process-wide `CORE` singleton entirely, so tests run
//! fully isolated from one another under `cargo test`'s default
//! parallel execution. The handful of tests that exercise the public
//! facade (which does share `CORE`) serialize through `FACADE_LOCK`.

use std::sync::Mutex;
use std::vec::Vec;

use proptest::collection::vec as prop_vec;
use proptest::prelude::*;

use crate::manager::Manager;
use crate::types::*;
use crate::{big, chunk, huge, small};
use crate::{allocate_in, free_in, reallocate_in};

/// Serializes the handful of tests that touch the shared `CORE`
/// singleton (the public `allocate`/`free`/`reallocate`/`dump`/
/// `Tiertrove` surface) so they don't race each other across threads.
static FACADE_LOCK: Mutex<()> = Mutex::new(());

fn fresh() -> Manager {
    Manager::new()
}

// ---------------------------------------------------------------------
// §8 concrete scenarios (defaults: U=8, S=32, C=32768)
// ---------------------------------------------------------------------

#[test]
fn scenario_small_hit_then_reuse() {
    let mut mgr = fresh();
    let idx = small::classify(24);
    assert_eq!(idx, 2);

    let p1 = unsafe { small::alloc(&mut mgr, idx) }.unwrap();

    let mut used = 0;
    unsafe { chunk::for_each_used(&mgr, |u| used = u) };
    assert_eq!(used, CHUNK_HEADER_SIZE + 24);

    unsafe { small::free(&mut mgr, p1, idx) };
    assert!(!mgr.small_free[idx].is_null());

    let p2 = unsafe { small::alloc(&mut mgr, idx) }.unwrap();
    assert_eq!(p1, p2);
    assert!(mgr.small_free[idx].is_null());

    // chunk_used didn't move on the reuse — the block came from the
    // free list, not a fresh bump.
    let mut used2 = 0;
    unsafe { chunk::for_each_used(&mgr, |u| used2 = u) };
    assert_eq!(used2, used);
}

#[test]
fn scenario_cross_class_split() {
    let mut mgr = fresh();

    // Seed class 5 (48-byte blocks) with one free block; classes 3 and
    // 4 stay empty (a fresh `Manager` never touched them).
    let idx5 = small::classify(48);
    assert_eq!(idx5, 5);
    let seed = unsafe { small::alloc(&mut mgr, idx5) }.unwrap();
    unsafe { small::free(&mut mgr, seed, idx5) };

    let idx2 = small::classify(24);
    assert_eq!(idx2, 2);
    assert!(mgr.small_free[3].is_null());
    assert!(mgr.small_free[4].is_null());

    let first = unsafe { small::alloc(&mut mgr, idx2) }.unwrap();
    assert_eq!(first, seed, "pops the class-5 block and returns its first 24 bytes");

    // The 24-byte surplus was redistributed into class 2.
    assert!(!mgr.small_free[idx2].is_null());

    let second = unsafe { small::alloc(&mut mgr, idx2) }.unwrap();
    assert_eq!(
        second.as_ptr(),
        unsafe { seed.as_ptr().add(24) },
        "second allocation is the tail half of the former class-5 block"
    );
}

#[test]
fn scenario_big_tail_bump() {
    let mut mgr = fresh();
    let p = unsafe { big::alloc(&mut mgr, 1000) }.unwrap();

    let mut used = 0;
    unsafe { chunk::for_each_used(&mgr, |u| used = u) };
    assert_eq!(used, CHUNK_HEADER_SIZE + 1008);

    // The very first big block in a fresh chunk sits right after both
    // the chunk header and this block's own header.
    let chunk_base = mgr.chunk_head as *mut u8;
    let offset = p.as_ptr() as usize - chunk_base as usize;
    assert_eq!(offset, CHUNK_HEADER_SIZE + BIG_HEADER_SIZE);
}

#[test]
fn scenario_big_split_with_small_remainder() {
    let mut mgr = fresh();

    // Build a one-element big free list with on-heap size 2048.
    let seed = unsafe { big::alloc(&mut mgr, 2040) }.unwrap(); // normalize(2040) == 2048
    unsafe { big::free(&mut mgr, seed) };

    // Exhaust the tail chunk so the next allocate is forced through
    // the big free-list search instead of the bump fast path.
    let mut used = 0;
    unsafe { chunk::for_each_used(&mgr, |u| used = u) };
    unsafe { chunk::bump_tail(&mut mgr, C - used) }.unwrap();

    let satisfied = unsafe { big::alloc(&mut mgr, 2032) }.unwrap(); // normalize(2032) == 2040
    assert_eq!(satisfied, seed);

    // left = 2048 - 2040 = 8, which is one word: too small to seat a
    // big-block header, so it is pushed as a size-8 small block.
    assert!(mgr.big_head.is_null());
    assert!(mgr.big_tail.is_null());
    assert!(!mgr.small_free[0].is_null());
}

#[test]
fn scenario_huge_round_trip() {
    let mut mgr = fresh();
    let n = HUGE_THRESHOLD + 1;

    let p = unsafe { huge::alloc(&mut mgr, n) }.unwrap();
    unsafe {
        let sentinel = mgr.huge_sentinel_ptr();
        assert_ne!((*sentinel).next, sentinel);
        assert_eq!((*(*sentinel).next).size, n);
    }

    unsafe { huge::free(&mut mgr, p, n) };
    unsafe {
        let sentinel = mgr.huge_sentinel_ptr();
        assert_eq!((*sentinel).next, sentinel);
        assert_eq!((*sentinel).prev, sentinel);
    }
}

#[test]
fn scenario_huge_remap_preserves_pattern() {
    let mut mgr = fresh();
    let n = HUGE_THRESHOLD + 1;

    let p = unsafe { huge::alloc(&mut mgr, n) }.unwrap();
    unsafe {
        for i in 0..n {
            *p.as_ptr().add(i) = (i % 256) as u8;
        }
    }

    let new_p = unsafe { huge::realloc(&mut mgr, p, n, n * 4) }.unwrap();
    unsafe {
        for i in 0..n {
            assert_eq!(*new_p.as_ptr().add(i), (i % 256) as u8);
        }
    }

    unsafe { huge::free(&mut mgr, new_p, n * 4) };
}

// ---------------------------------------------------------------------
// §8 quantified invariants
// ---------------------------------------------------------------------

#[test]
fn big_tier_rotation_is_bounded() {
    let mut mgr = fresh();

    // Build a big free list of more entries than BIG_SEARCH_DEPTH, all
    // too small to satisfy a subsequent large request. Each iteration's
    // `free` prepends a fresh block because the chunk tail still has
    // room, so the alloc never recycles one.
    let small_big_payload = SMALL_SIZE_MAX + 8;
    let count = BIG_SEARCH_DEPTH + 20;
    for _ in 0..count {
        let p = unsafe { big::alloc(&mut mgr, small_big_payload) }.unwrap();
        unsafe { big::free(&mut mgr, p) };
    }
    assert_eq!(unsafe { big::list_len(&mgr) }, count);

    let mut used = 0;
    unsafe { chunk::for_each_used(&mgr, |u| used = u) };
    unsafe { chunk::bump_tail(&mut mgr, C - used) }.unwrap();

    let before = mgr.stats.big_rotation_exhausted.get();
    let result = unsafe { big::alloc(&mut mgr, HUGE_THRESHOLD - 1000) };
    assert!(result.is_some(), "falls back to a fresh chunk when the list has no fit");
    assert_eq!(mgr.stats.big_rotation_exhausted.get(), before + 1);

    // None of the too-small blocks were consumed, only rotated.
    assert_eq!(unsafe { big::list_len(&mgr) }, count);
}

proptest! {
    #[test]
    fn size_sufficiency(n in 1usize..=20_000) {
        let mut mgr = fresh();
        let p = unsafe { allocate_in(&mut mgr, n) };
        let p = match p {
            Some(p) => p,
            None => return Ok(()), // OOM is an allowed outcome, just not corruption
        };
        unsafe {
            for i in 0..n {
                *p.as_ptr().add(i) = 0xAA;
            }
            for i in 0..n {
                prop_assert_eq!(*p.as_ptr().add(i), 0xAA);
            }
        }
        unsafe { free_in(&mut mgr, p, n) };
    }

    #[test]
    fn class_round_trip(n in 1usize..=SMALL_SIZE_MAX) {
        let mut mgr = fresh();
        let p1 = unsafe { allocate_in(&mut mgr, n) }.unwrap();
        unsafe { free_in(&mut mgr, p1, n) };
        let p2 = unsafe { allocate_in(&mut mgr, n) }.unwrap();
        prop_assert_eq!(p1, p2);
    }

    #[test]
    fn shrink_is_free(
        osize in (SMALL_SIZE_MAX + 1)..=(HUGE_THRESHOLD),
        shrink in 0usize..=4096,
    ) {
        let mut mgr = fresh();
        let p = unsafe { allocate_in(&mut mgr, osize) }.unwrap();
        let nsize = osize.saturating_sub(shrink).max(1);

        let before = (
            mgr.chunk_head, mgr.chunk_tail, mgr.big_head, mgr.big_tail,
            mgr.small_free,
        );
        let result = unsafe { reallocate_in(&mut mgr, p, osize, nsize) };
        let after = (
            mgr.chunk_head, mgr.chunk_tail, mgr.big_head, mgr.big_tail,
            mgr.small_free,
        );

        prop_assert_eq!(result, Some(p));
        prop_assert!(before == after);
    }

    #[test]
    fn realloc_fallback_preserves_prefix(
        osize in 1usize..=4096,
        growth in 1usize..=4096,
    ) {
        let mut mgr = fresh();
        let p = unsafe { allocate_in(&mut mgr, osize) }.unwrap();
        unsafe {
            for i in 0..osize {
                *p.as_ptr().add(i) = (i % 256) as u8;
            }
        }

        let nsize = osize + growth;
        let new_p = unsafe { reallocate_in(&mut mgr, p, osize, nsize) }.unwrap();
        unsafe {
            for i in 0..osize {
                prop_assert_eq!(*new_p.as_ptr().add(i), (i % 256) as u8);
            }
        }
        unsafe { free_in(&mut mgr, new_p, nsize) };
    }

    #[test]
    fn huge_remap_stability(
        osize_mult in 1usize..=3,
        nsize_mult in 1usize..=6,
    ) {
        let mut mgr = fresh();
        let osize = HUGE_THRESHOLD + osize_mult * 4096;
        let nsize = HUGE_THRESHOLD + nsize_mult * 4096;

        let p = unsafe { huge::alloc(&mut mgr, osize) }.unwrap();
        let keep = osize.min(nsize);
        unsafe {
            for i in 0..keep {
                *p.as_ptr().add(i) = (i % 251) as u8;
            }
        }

        let new_p = unsafe { huge::realloc(&mut mgr, p, osize, nsize) }.unwrap();
        unsafe {
            for i in 0..keep {
                prop_assert_eq!(*new_p.as_ptr().add(i), (i % 251) as u8);
            }
        }
        unsafe { huge::free(&mut mgr, new_p, nsize) };
    }

    #[test]
    fn non_aliasing(
        ops in prop_vec(1usize..=5000, 1..60)
    ) {
        let mut mgr = fresh();
        let mut live: Vec<(usize, usize)> = Vec::new(); // (addr, len)

        for n in ops {
            // Occasionally free something already live to exercise
            // interleaving, otherwise allocate a fresh block.
            if n % 7 == 0 {
                if let Some((addr, len)) = live.pop() {
                    unsafe { free_in(&mut mgr, core::ptr::NonNull::new(addr as *mut u8).unwrap(), len) };
                    continue;
                }
            }
            if let Some(p) = unsafe { allocate_in(&mut mgr, n) } {
                let addr = p.as_ptr() as usize;
                for &(other_addr, other_len) in &live {
                    let disjoint = addr + n <= other_addr || other_addr + other_len <= addr;
                    prop_assert!(disjoint);
                }
                live.push((addr, n));
            }
        }
    }
}

// ---------------------------------------------------------------------
// Facade-level tests (share the `CORE` singleton; serialized)
// ---------------------------------------------------------------------

#[test]
fn facade_round_trips_every_tier() {
    let _guard = FACADE_LOCK.lock().unwrap();

    for &n in &[16usize, 2000, HUGE_THRESHOLD + 1] {
        let p = crate::allocate(n, None).unwrap();
        unsafe {
            for i in 0..n.min(64) {
                *p.as_ptr().add(i) = 0x42;
            }
            for i in 0..n.min(64) {
                assert_eq!(*p.as_ptr().add(i), 0x42);
            }
            crate::free(p, n);
        }
    }
}

#[test]
fn dump_is_idempotent() {
    let _guard = FACADE_LOCK.lock().unwrap();

    let p = crate::allocate(32, None).unwrap();

    let mut first = std::string::String::new();
    let mut second = std::string::String::new();
    crate::dump(&mut first).unwrap();
    crate::dump(&mut second).unwrap();
    assert_eq!(first, second);

    unsafe { crate::free(p, 32) };
}

#[test]
fn global_alloc_honors_small_alignment() {
    use core::alloc::{GlobalAlloc, Layout};
    let _guard = FACADE_LOCK.lock().unwrap();

    let layout = Layout::from_size_align(40, 8).unwrap();
    unsafe {
        let p = crate::Tiertrove.alloc(layout);
        assert!(!p.is_null());
        assert_eq!(p as usize % 8, 0);
        core::ptr::write_bytes(p, 0xCD, 40);
        crate::Tiertrove.dealloc(p, layout);
    }
}

#[test]
fn global_alloc_routes_large_alignment_to_huge_tier() {
    use core::alloc::{GlobalAlloc, Layout};
    let _guard = FACADE_LOCK.lock().unwrap();

    let layout = Layout::from_size_align(64, 4096).unwrap();
    unsafe {
        let p = crate::Tiertrove.alloc(layout);
        assert!(!p.is_null());
        assert_eq!(p as usize % 4096, 0);
        crate::Tiertrove.dealloc(p, layout);
    }
}

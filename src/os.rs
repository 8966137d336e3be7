//! Page source: the thin wrapper over the OS anonymous-mapping primitive.
//!
//! `map`/`unmap`/`remap` are the only three operations the rest of the
//! allocator needs from the host. Failure here is never fatal to the
//! allocator — it is forwarded to the caller as an allocation failure,
//! logged at `warn` level the way the teacher crate logs `munmap`/
//! `mprotect` failures in its own `os.rs`.

use core::ptr::NonNull;

use log::warn;

#[cfg(not(windows))]
mod imp {
    use super::*;

    pub unsafe fn map(n: usize) -> Option<NonNull<u8>> {
        let p = libc::mmap(
            core::ptr::null_mut(),
            n,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        );
        if p == libc::MAP_FAILED {
            warn!("mmap failed: {}, size {}", errno::errno(), n);
            return None;
        }
        NonNull::new(p as *mut u8)
    }

    pub unsafe fn unmap(base: NonNull<u8>, n: usize) {
        if libc::munmap(base.as_ptr() as *mut libc::c_void, n) != 0 {
            warn!(
                "munmap failed: {}, addr {:p}, size {}",
                errno::errno(),
                base.as_ptr(),
                n
            );
        }
    }

    #[cfg(target_os = "linux")]
    pub unsafe fn remap(base: NonNull<u8>, old_n: usize, new_n: usize) -> Option<NonNull<u8>> {
        let p = libc::mremap(
            base.as_ptr() as *mut libc::c_void,
            old_n,
            new_n,
            libc::MREMAP_MAYMOVE,
        );
        if p == libc::MAP_FAILED {
            warn!(
                "mremap failed: {}, addr {:p}, old {} new {}",
                errno::errno(),
                base.as_ptr(),
                old_n,
                new_n
            );
            return None;
        }
        NonNull::new(p as *mut u8)
    }

    /// No native in-place remap on non-Linux unixes; emulate it with a
    /// fresh mapping, a copy, and a free of the old one. This always
    /// "moves" in the sense §4.1 permits, which is documented as a known
    /// platform gap in DESIGN.md.
    #[cfg(not(target_os = "linux"))]
    pub unsafe fn remap(base: NonNull<u8>, old_n: usize, new_n: usize) -> Option<NonNull<u8>> {
        let new_base = map(new_n)?;
        let copy_n = old_n.min(new_n);
        core::ptr::copy_nonoverlapping(base.as_ptr(), new_base.as_ptr(), copy_n);
        unmap(base, old_n);
        Some(new_base)
    }
}

#[cfg(windows)]
mod imp {
    use super::*;
    use winapi::shared::minwindef::LPVOID;
    use winapi::um::errhandlingapi::GetLastError;
    use winapi::um::memoryapi::{VirtualAlloc, VirtualFree};
    use winapi::um::winnt::{MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE};

    pub unsafe fn map(n: usize) -> Option<NonNull<u8>> {
        let p = VirtualAlloc(
            core::ptr::null_mut(),
            n,
            MEM_RESERVE | MEM_COMMIT,
            PAGE_READWRITE,
        );
        if p.is_null() {
            warn!("VirtualAlloc failed: {}, size {}", GetLastError(), n);
            return None;
        }
        NonNull::new(p as *mut u8)
    }

    pub unsafe fn unmap(base: NonNull<u8>, _n: usize) {
        if VirtualFree(base.as_ptr() as LPVOID, 0, MEM_RELEASE) == 0 {
            warn!(
                "VirtualFree failed: {}, addr {:p}",
                GetLastError(),
                base.as_ptr()
            );
        }
    }

    /// Windows has no VM primitive that grows/shrinks an existing mapping
    /// in place; every remap relocates.
    pub unsafe fn remap(base: NonNull<u8>, old_n: usize, new_n: usize) -> Option<NonNull<u8>> {
        let new_base = map(new_n)?;
        let copy_n = old_n.min(new_n);
        core::ptr::copy_nonoverlapping(base.as_ptr(), new_base.as_ptr(), copy_n);
        unmap(base, old_n);
        Some(new_base)
    }
}

/// Returns a fresh, zero-filled, anonymous, private mapping of exactly
/// `n` bytes, or `None` on OS failure.
pub unsafe fn map(n: usize) -> Option<NonNull<u8>> {
    if n == 0 {
        return None;
    }
    imp::map(n)
}

/// Releases a mapping previously returned by `map`.
pub unsafe fn unmap(base: NonNull<u8>, n: usize) {
    if n == 0 {
        return;
    }
    imp::unmap(base, n)
}

/// Grows or shrinks an existing mapping, possibly relocating it. On
/// success the caller must treat `base` as invalid and use the returned
/// address instead, even if the two compare equal.
pub unsafe fn remap(base: NonNull<u8>, old_n: usize, new_n: usize) -> Option<NonNull<u8>> {
    if new_n == 0 {
        unmap(base, old_n);
        return None;
    }
    imp::remap(base, old_n, new_n)
}

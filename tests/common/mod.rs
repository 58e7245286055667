// Shared helpers for integration tests.
//
// The native error status, error handler and memory manager are process-wide,
// so every test that calls into the library takes `serial()` first.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use cv_interop::redirect::NativeAllocator;
use libc::c_void;

static SERIAL: Mutex<()> = Mutex::new(());

/// Hold for the duration of a test that touches native state.
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

/// `malloc`/`free` allocator that counts calls and remembers freed addresses.
#[derive(Default)]
pub struct CountingAllocator {
    allocs: AtomicUsize,
    frees: AtomicUsize,
    live: Mutex<HashSet<usize>>,
    freed: Mutex<Vec<usize>>,
}

impl CountingAllocator {
    pub fn allocs(&self) -> usize {
        self.allocs.load(Ordering::SeqCst)
    }

    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }

    /// Allocations not yet freed.
    pub fn outstanding(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    pub fn was_freed(&self, ptr: *const u8) -> bool {
        self.freed.lock().unwrap().contains(&(ptr as usize))
    }
}

impl NativeAllocator for CountingAllocator {
    fn allocate(&self, size: usize) -> *mut c_void {
        let ptr = unsafe { libc::malloc(size.max(1)) };
        if !ptr.is_null() {
            self.allocs.fetch_add(1, Ordering::SeqCst);
            self.live.lock().unwrap().insert(ptr as usize);
        }
        ptr
    }

    unsafe fn free(&self, ptr: *mut c_void) {
        self.frees.fetch_add(1, Ordering::SeqCst);
        self.live.lock().unwrap().remove(&(ptr as usize));
        self.freed.lock().unwrap().push(ptr as usize);
        unsafe { libc::free(ptr) };
    }
}

//! Call-scoped staging of nested array arguments.
//!
//! Native entry points that take several point lists expect an array of raw
//! addresses, one per inner sequence, plus a parallel array of lengths. Those
//! layouts do not exist in Rust memory, so they are built just before the call
//! and torn down right after it:
//!
//! 1. every inner sequence is pinned (borrowed for the duration of the call),
//! 2. the address array and `c_int` length array are assembled,
//! 3. the native call runs,
//! 4. every pin is released, on every exit path including unwinding,
//! 5. only then is the native status inspected.
//!
//! Entry points that take several arrays at once get the same treatment through
//! [`with_arrays`]: each wrapper is pinned and its header address collected.
//!
//! Pins are never reused across calls. Bookkeeping is per thread because a
//! staged call is confined to the thread that made it.

use std::cell::Cell;
use std::marker::PhantomData;

use libc::{c_int, c_void};

use crate::error::{CvError, Result};
use crate::resource::array::NativeArray;

thread_local! {
    static PIN_STATS: Cell<PinStats> = const { Cell::new(PinStats { pinned: 0, unpinned: 0 }) };
}

/// Pin counters for the current thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinStats {
    pub pinned: u64,
    pub unpinned: u64,
}

impl PinStats {
    /// Pins currently held on this thread.
    pub fn live(&self) -> u64 {
        self.pinned - self.unpinned
    }
}

pub fn pin_stats() -> PinStats {
    PIN_STATS.with(Cell::get)
}

fn bump(pinned: u64, unpinned: u64) {
    PIN_STATS.with(|stats| {
        let mut s = stats.get();
        s.pinned += pinned;
        s.unpinned += unpinned;
        stats.set(s);
    });
}

/// One pinned region: a borrowed slice whose address is stable until drop.
pub struct Pinned<'a, T> {
    slice: &'a [T],
}

impl<'a, T> Pinned<'a, T> {
    pub fn pin(slice: &'a [T]) -> Self {
        bump(1, 0);
        Pinned { slice }
    }

    pub fn addr(&self) -> *const T {
        self.slice.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.slice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slice.is_empty()
    }
}

impl<T> Drop for Pinned<'_, T> {
    fn drop(&mut self) {
        bump(0, 1);
    }
}

/// Native-shaped view of a staged jagged argument, valid only inside the call.
#[derive(Clone, Copy)]
pub struct JaggedArgs<'s, T> {
    pub addrs: *mut *mut T,
    pub counts: *const c_int,
    pub count: c_int,
    _scope: PhantomData<&'s ()>,
}

/// Staged buffer for one call: pins plus the address and length arrays.
pub struct StagedJagged<'a, T> {
    pins: Vec<Pinned<'a, T>>,
    addrs: Vec<*mut T>,
    counts: Vec<c_int>,
}

impl<'a, T> StagedJagged<'a, T> {
    /// Pin every inner sequence and build the argument arrays.
    ///
    /// Fails before anything is handed to native code if a length or the
    /// sequence count does not fit in `c_int`; pins taken so far are released.
    pub fn stage<S: AsRef<[T]>>(seqs: &'a [S]) -> Result<Self> {
        if c_int::try_from(seqs.len()).is_err() {
            return Err(CvError::invalid_argument(format!(
                "too many sequences for a native call: {}",
                seqs.len()
            )));
        }

        let mut staged = StagedJagged {
            pins: Vec::with_capacity(seqs.len()),
            addrs: Vec::with_capacity(seqs.len()),
            counts: Vec::with_capacity(seqs.len()),
        };
        for seq in seqs {
            let pin = Pinned::pin(seq.as_ref());
            let count = c_int::try_from(pin.len()).map_err(|_| {
                CvError::invalid_argument(format!(
                    "sequence of {} elements exceeds the native length limit",
                    pin.len()
                ))
            })?;
            // Native signatures take `T**` even for read-only point lists.
            staged.addrs.push(pin.addr() as *mut T);
            staged.counts.push(count);
            staged.pins.push(pin);
        }
        Ok(staged)
    }

    pub fn args(&mut self) -> JaggedArgs<'_, T> {
        JaggedArgs {
            addrs: self.addrs.as_mut_ptr(),
            counts: self.counts.as_ptr(),
            count: self.counts.len() as c_int,
            _scope: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn counts(&self) -> &[c_int] {
        &self.counts
    }
}

/// Stage `seqs`, run `call` with the native-shaped arguments, then unpin.
///
/// Unpinning happens before this function returns, whether `call` returns
/// normally or unwinds.
pub fn with_jagged<T, S, R, F>(seqs: &[S], call: F) -> Result<R>
where
    S: AsRef<[T]>,
    F: FnOnce(JaggedArgs<'_, T>) -> R,
{
    let mut staged = StagedJagged::stage(seqs)?;
    let result = call(staged.args());
    drop(staged);
    Ok(result)
}

/// Native-shaped view of a staged array list (`CvArr**` plus count).
#[derive(Clone, Copy)]
pub struct ArrayListArgs<'s> {
    pub arrs: *mut *mut c_void,
    pub count: c_int,
    _scope: PhantomData<&'s ()>,
}

/// Staged header addresses of several array wrappers for one call.
pub struct StagedArrays<'a> {
    pins: Vec<Pinned<'a, &'a dyn NativeArray>>,
    ptrs: Vec<*mut c_void>,
}

impl<'a> StagedArrays<'a> {
    /// Pin every wrapper and collect its header address.
    ///
    /// A released wrapper fails the whole stage; nothing reaches native code.
    pub fn stage(arrays: &'a [&'a dyn NativeArray]) -> Result<Self> {
        if c_int::try_from(arrays.len()).is_err() {
            return Err(CvError::invalid_argument(format!(
                "too many arrays for a native call: {}",
                arrays.len()
            )));
        }

        let mut staged = StagedArrays {
            pins: Vec::with_capacity(arrays.len()),
            ptrs: Vec::with_capacity(arrays.len()),
        };
        for array in arrays {
            let pin = Pinned::pin(std::slice::from_ref(array));
            staged.ptrs.push(array.as_arr_ptr()?);
            staged.pins.push(pin);
        }
        Ok(staged)
    }

    pub fn args(&mut self) -> ArrayListArgs<'_> {
        ArrayListArgs {
            arrs: self.ptrs.as_mut_ptr(),
            count: self.ptrs.len() as c_int,
            _scope: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

/// Stage `arrays`, run `call` with the native pointer array, then unpin.
pub fn with_arrays<R, F>(arrays: &[&dyn NativeArray], call: F) -> Result<R>
where
    F: FnOnce(ArrayListArgs<'_>) -> R,
{
    let mut staged = StagedArrays::stage(arrays)?;
    let result = call(staged.args());
    drop(staged);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_builds_addresses_and_counts() {
        let seqs = vec![vec![1u32, 2, 3], vec![4], vec![5, 6]];
        let before = pin_stats();
        let mut staged = StagedJagged::stage(&seqs).unwrap();
        assert_eq!(pin_stats().live() - before.live(), 3);
        assert_eq!(staged.counts(), &[3, 1, 2]);

        let args = staged.args();
        assert_eq!(args.count, 3);
        unsafe {
            assert_eq!(*args.addrs.add(0) as *const u32, seqs[0].as_ptr());
            assert_eq!(**args.addrs.add(2), 5);
            assert_eq!(*args.counts.add(1), 1);
        }
        drop(staged);
        assert_eq!(pin_stats().live(), before.live());
    }

    #[test]
    fn test_with_jagged_unpins_after_call() {
        let seqs: [&[i32]; 2] = [&[1, 2], &[3]];
        let before = pin_stats();
        let seen = with_jagged(&seqs, |args| {
            let live = pin_stats().live() - before.live();
            (live, args.count)
        })
        .unwrap();
        assert_eq!(seen, (2, 2));
        let after = pin_stats();
        assert_eq!(after.pinned - before.pinned, 2);
        assert_eq!(after.unpinned - before.unpinned, 2);
    }

    #[test]
    fn test_with_jagged_unpins_on_unwind() {
        let seqs = vec![vec![0u8; 4], vec![0u8; 8], vec![0u8; 1]];
        let before = pin_stats();
        let outcome = std::panic::catch_unwind(|| {
            with_jagged(&seqs, |_args| -> () { panic!("native side failed hard") })
        });
        assert!(outcome.is_err());
        let after = pin_stats();
        assert_eq!(after.pinned - before.pinned, 3);
        assert_eq!(after.unpinned - before.unpinned, 3);
    }

    #[test]
    fn test_empty_outer_sequence() {
        let seqs: Vec<Vec<u16>> = Vec::new();
        let count = with_jagged(&seqs, |args| args.count).unwrap();
        assert_eq!(count, 0);
    }
}

// Exactly-once release of native handles, observed through the memory manager hook.

#![cfg(feature = "reference-backend")]

mod common;

use std::sync::Arc;

use cv_interop::ffi::cxcore_sys::{CV_StsBadArg, CV_StsNullPtr, CV_StsOk};
use cv_interop::redirect::install_allocator;
use cv_interop::{CvContext, CvError, Mat, MatDepth, MatND, MemStorage};
use rayon::prelude::*;

use common::{CountingAllocator, serial};

#[test]
fn test_double_release_frees_once() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let alloc = Arc::new(CountingAllocator::default());
    let _guard = unsafe { install_allocator(&ctx, alloc.clone()) };

    let mut mat = MatND::new(&ctx, &[4, 4], MatDepth::U8, 1).expect("create");
    // header + refcounted data block
    assert_eq!(alloc.allocs(), 2);

    assert!(mat.release());
    assert_eq!(alloc.frees(), 2);
    assert!(mat.is_invalid());

    assert!(mat.release(), "second release must be a silent no-op");
    assert_eq!(alloc.frees(), 2);

    drop(mat);
    assert_eq!(alloc.frees(), 2, "drop after release must not free again");
    assert_eq!(alloc.outstanding(), 0);
}

#[test]
fn test_drop_releases_owning_handles() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let alloc = Arc::new(CountingAllocator::default());
    let _guard = unsafe { install_allocator(&ctx, alloc.clone()) };

    {
        let _nd = MatND::new(&ctx, &[2, 3, 4], MatDepth::F32, 2).expect("create nd");
        let _mat = Mat::new(&ctx, 5, 6, MatDepth::S16, 1).expect("create mat");
        let _storage = MemStorage::new(&ctx, 0).expect("create storage");
        assert_eq!(alloc.allocs(), 5);
        assert_eq!(alloc.frees(), 0);
    }
    assert_eq!(alloc.frees(), 5);
    assert_eq!(alloc.outstanding(), 0);
}

#[test]
fn test_mem_storage_release_is_idempotent() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let mut storage = MemStorage::new(&ctx, 4096).expect("create storage");
    assert_eq!(storage.block_size(), 4096);
    assert!(storage.release());
    assert!(storage.release());
}

#[test]
fn test_concurrent_release_of_distinct_handles() {
    let _lock = serial();
    let ctx = CvContext::reference();

    let arrays: Vec<MatND> = (1..=64)
        .map(|n| MatND::new(&ctx, &[n, 8], MatDepth::U8, 3).expect("create"))
        .collect();
    let expected: u64 = (1..=64u64).map(|n| n * 8 * 3).sum();
    assert_eq!(ctx.pressure().current(), expected);

    let outcomes: Vec<bool> = arrays
        .into_par_iter()
        .map(|mut mat| mat.release())
        .collect();

    assert!(outcomes.iter().all(|&ok| ok));
    assert_eq!(ctx.pressure().current(), 0);
    assert_eq!(ctx.pressure().peak(), expected);
}

#[test]
fn test_release_ignores_unrelated_pending_status() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let mut mat = MatND::new(&ctx, &[3, 3], MatDepth::U8, 1).expect("create");
    let mut storage = MemStorage::new(&ctx, 0).expect("create storage");

    // A failure left behind by some other call, not yet surfaced.
    unsafe { (ctx.api().cvSetErrStatus)(CV_StsBadArg) };

    assert!(mat.release(), "a clean release must not inherit the pending failure");
    assert!(storage.release());
    assert_eq!(ctx.status(), CV_StsBadArg, "the pending failure stays with its owner");
    assert_eq!(ctx.pressure().current(), 0);

    unsafe { (ctx.api().cvSetErrStatus)(CV_StsOk) };
}

#[test]
fn test_status_change_during_call_is_reported() {
    let _lock = serial();
    let ctx = CvContext::reference();

    unsafe { (ctx.api().cvSetErrStatus)(CV_StsBadArg) };
    let before = ctx.status();
    unsafe { (ctx.api().cvRelease)(std::ptr::null_mut()) };

    let err = ctx.check_status_since("cvRelease", before).unwrap_err();
    assert!(
        matches!(err, CvError::Native { op: "cvRelease", status: CV_StsNullPtr, .. }),
        "got {err:?}"
    );
    assert_eq!(ctx.status(), CV_StsBadArg);
    assert!(ctx.check_status_since("cvRelease", before).is_ok());

    unsafe { (ctx.api().cvSetErrStatus)(CV_StsOk) };
}

// Save/load through file storage and the typed construction table.

#![cfg(feature = "reference-backend")]

mod common;

use std::sync::Arc;

use cv_interop::ffi::cxcore_sys::CV_StsObjectNotFound;
use cv_interop::persistence::{AnyArray, NativeKind, load, load_any, save};
use cv_interop::redirect::install_allocator;
use cv_interop::{CvContext, CvError, Mat, MatDepth, MatND, MemStorage};

use common::{CountingAllocator, serial};

#[test]
fn test_round_trip_preserves_attributes_and_data() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("arrays.yml");

    let mut original = MatND::new(&ctx, &[2, 3, 4], MatDepth::F32, 2).expect("create");
    for (i, b) in original.as_bytes_mut().expect("data").iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }
    save(&path, &original, Some("foo"), Some("test data")).expect("save");

    let loaded = load::<MatND>(&ctx, &path, None, Some("foo")).expect("load");
    assert_eq!(loaded.real_name, "foo");
    let mat = loaded.value;
    assert_eq!(mat.sizes(), original.sizes());
    assert_eq!(mat.depth(), original.depth());
    assert_eq!(mat.channels(), original.channels());
    assert_eq!(mat.as_bytes(), original.as_bytes());
    assert!(mat.owns_data());
    assert_eq!(ctx.pressure().current(), 2 * original.bytes_allocated().unwrap());
}

#[test]
fn test_missing_name_produces_no_wrapper() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("one.yml");

    let mat = MatND::new(&ctx, &[2, 2], MatDepth::U8, 1).expect("create");
    save(&path, &mat, Some("foo"), None).expect("save");
    let before = ctx.pressure().current();

    let err = load::<MatND>(&ctx, &path, None, Some("bar")).unwrap_err();
    assert_eq!(err.status(), Some(CV_StsObjectNotFound), "got {err:?}");
    assert_eq!(ctx.pressure().current(), before);
    assert_eq!(ctx.status(), 0);
}

#[test]
fn test_unreadable_source_reports_failure() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let dir = tempfile::tempdir().unwrap();

    let missing = load::<MatND>(&ctx, &dir.path().join("absent.yml"), None, None);
    assert!(matches!(missing, Err(CvError::Native { op: "cvLoad", .. })));

    let garbage = dir.path().join("garbage.yml");
    std::fs::write(&garbage, "nodes: [1, 2").unwrap();
    let parsed = load::<MatND>(&ctx, &garbage, None, None);
    assert!(matches!(parsed, Err(CvError::Native { op: "cvLoad", .. })));
}

#[test]
fn test_kind_mismatch_is_rejected_and_released() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("matrix.yml");

    let mat = Mat::new(&ctx, 3, 3, MatDepth::F64, 1).expect("create");
    save(&path, &mat, Some("m"), None).expect("save");
    drop(mat);

    let alloc = Arc::new(CountingAllocator::default());
    let _guard = unsafe { install_allocator(&ctx, alloc.clone()) };

    let err = load::<MatND>(&ctx, &path, None, Some("m")).unwrap_err();
    match err {
        CvError::KindMismatch { expected, found } => {
            assert_eq!(expected, NativeKind::MatND.name());
            assert_eq!(found, NativeKind::Mat.name());
        }
        other => panic!("expected kind mismatch, got {other:?}"),
    }
    assert_eq!(alloc.outstanding(), 0, "the loaded object and its name are freed");
    assert_eq!(ctx.pressure().current(), 0);

    let ok = load::<Mat>(&ctx, &path, None, Some("m")).expect("load as Mat");
    assert_eq!((ok.value.rows(), ok.value.cols()), (3, 3));
}

#[test]
fn test_default_name_and_first_node() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calibration.yml");

    let mat = Mat::new(&ctx, 1, 4, MatDepth::U16, 2).expect("create");
    save(&path, &mat, None, None).expect("save");

    let loaded = load::<Mat>(&ctx, &path, None, None).expect("load");
    assert_eq!(loaded.real_name, "calibration");
    assert_eq!(loaded.value.depth(), MatDepth::U16);
    assert_eq!(loaded.value.channels(), 2);
}

#[test]
fn test_load_any_picks_kind() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let dir = tempfile::tempdir().unwrap();
    let nd_path = dir.path().join("nd.yml");
    let mat_path = dir.path().join("mat.yml");

    save(&nd_path, &MatND::new(&ctx, &[2, 2, 2], MatDepth::S8, 1).unwrap(), None, None).unwrap();
    save(&mat_path, &Mat::new(&ctx, 2, 5, MatDepth::S32, 1).unwrap(), None, None).unwrap();

    let nd = load_any(&ctx, &nd_path, None, None).expect("load nd");
    assert_eq!(nd.value.kind(), NativeKind::MatND);
    assert!(matches!(&nd.value, AnyArray::MatND(m) if m.sizes() == vec![2, 2, 2]));

    let mat = load_any(&ctx, &mat_path, None, None).expect("load mat");
    assert!(matches!(&mat.value, AnyArray::Mat(m) if m.cols() == 5));
}

#[test]
fn test_load_with_storage_context() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stored.yml");
    let storage = MemStorage::new(&ctx, 0).expect("storage");

    save(&path, &MatND::new(&ctx, &[3], MatDepth::F64, 4).unwrap(), Some("v"), None).unwrap();
    let loaded = load::<MatND>(&ctx, &path, Some(&storage), Some("v")).expect("load");
    assert_eq!(loaded.value.element_size(), 32);
}

#[test]
fn test_save_rejects_interior_nul() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let dir = tempfile::tempdir().unwrap();
    let mat = MatND::new(&ctx, &[1], MatDepth::U8, 1).unwrap();

    let err = save(&dir.path().join("x.yml"), &mat, Some("a\0b"), None).unwrap_err();
    assert!(matches!(err, CvError::PersistenceError(_)));
}

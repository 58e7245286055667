// Call-scoped pinning of jagged point lists around the polygon entry points.

#![cfg(feature = "reference-backend")]

mod common;

use cv_interop::drawing::{LineType, Point, Scalar, fill_poly, poly_line};
use cv_interop::ffi::cxcore_sys::CV_StsBadArg;
use cv_interop::marshal::{pin_stats, with_arrays, with_jagged};
use cv_interop::resource::array::NativeArray;
use cv_interop::{CvContext, CvError, Mat, MatDepth, MatND};
use libc::c_void;

use common::serial;

fn square(x: i32, y: i32, side: i32) -> Vec<Point> {
    vec![
        Point::new(x, y),
        Point::new(x + side, y),
        Point::new(x + side, y + side),
        Point::new(x, y + side),
    ]
}

#[test]
fn test_pins_balanced_after_success() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let mut img = Mat::new(&ctx, 16, 16, MatDepth::U8, 1).expect("image");

    let contours = vec![square(1, 1, 3), square(8, 8, 4), vec![Point::new(15, 0)]];
    let before = pin_stats();
    fill_poly(&mut img, &contours, Scalar::all(255.0), LineType::default(), 0).expect("fill");
    let after = pin_stats();

    assert_eq!(after.pinned - before.pinned, 3);
    assert_eq!(after.unpinned - before.unpinned, 3);
    assert_eq!(after.live(), before.live());
}

#[test]
fn test_pins_balanced_after_native_failure() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let mut img = Mat::new(&ctx, 8, 8, MatDepth::U8, 1).expect("image");
    img.as_bytes_mut().expect("data").fill(0);

    // An empty contour is rejected by the native side after all pins are taken.
    let contours: Vec<Vec<Point>> = vec![square(0, 0, 2), Vec::new()];
    let before = pin_stats();
    let err = fill_poly(&mut img, &contours, Scalar::all(1.0), LineType::Connected8, 0)
        .unwrap_err();
    let after = pin_stats();

    assert!(matches!(err, CvError::Native { op: "cvFillPoly", .. }), "got {err:?}");
    assert_eq!(err.status(), Some(CV_StsBadArg));
    assert_eq!(after.pinned - before.pinned, 2);
    assert_eq!(after.unpinned - before.unpinned, 2);
    assert!(
        img.as_bytes().expect("data").iter().all(|&b| b == 0),
        "a rejected call must not draw"
    );
    assert_eq!(ctx.status(), 0);
}

#[test]
fn test_pins_live_only_during_call() {
    let contours = vec![square(0, 0, 1), square(2, 2, 1)];
    let before = pin_stats();
    let during = with_jagged::<Point, _, _, _>(&contours, |args| {
        let live = pin_stats().live() - before.live();
        let first = unsafe { *(*args.addrs) };
        (live, args.count, first)
    })
    .expect("staged");

    assert_eq!(during.0, 2);
    assert_eq!(during.1, 2);
    assert_eq!(during.2, Point::new(0, 0));
    assert_eq!(pin_stats().live(), before.live());
}

#[test]
fn test_fill_poly_plots_vertices() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let mut img = MatND::new(&ctx, &[10, 10], MatDepth::U8, 3).expect("image");
    img.as_bytes_mut().expect("data").fill(0);

    let contours = [[Point::new(2, 3), Point::new(7, 3), Point::new(7, 9)]];
    fill_poly(&mut img, &contours, Scalar::new(10.0, 20.0, 300.0, 0.0), LineType::AntiAliased, 0)
        .expect("fill");

    let data = img.as_bytes().expect("data");
    let at = |x: usize, y: usize| &data[(y * 10 + x) * 3..(y * 10 + x) * 3 + 3];
    assert_eq!(at(2, 3), &[10, 20, 255]);
    assert_eq!(at(7, 9), &[10, 20, 255]);
    assert_eq!(at(0, 0), &[0, 0, 0]);
}

#[test]
fn test_poly_line_rejects_bad_thickness_after_unpinning() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let mut img = Mat::new(&ctx, 4, 4, MatDepth::U8, 1).expect("image");

    let contours = [square(0, 0, 1)];
    let before = pin_stats();
    let err = poly_line(&mut img, &contours, true, Scalar::all(1.0), 0, LineType::Connected4, 0)
        .unwrap_err();
    assert!(matches!(err, CvError::Native { op: "cvPolyLine", .. }), "got {err:?}");
    assert_eq!(pin_stats().live(), before.live());

    poly_line(&mut img, &contours, false, Scalar::all(9.0), 1, LineType::Connected4, 0)
        .expect("draw");
    assert_eq!(img.as_bytes().expect("data")[0], 9);
}

#[test]
fn test_pins_released_when_call_unwinds() {
    let contours = vec![square(0, 0, 1); 4];
    let before = pin_stats();
    let outcome = std::panic::catch_unwind(|| {
        with_jagged::<Point, _, _, _>(&contours, |_args| -> () { panic!("callee aborted") })
    });

    assert!(outcome.is_err());
    let after = pin_stats();
    assert_eq!(after.pinned - before.pinned, 4);
    assert_eq!(after.unpinned - before.unpinned, 4);
}

#[test]
fn test_array_list_staged_for_one_call() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let a = Mat::new(&ctx, 1, 3, MatDepth::F64, 1).expect("a");
    let b = MatND::new(&ctx, &[3], MatDepth::F64, 1).expect("b");

    let arrays: [&dyn NativeArray; 2] = [&a, &b];
    let before = pin_stats();
    let (live, count, first, second) = with_arrays(&arrays, |args| {
        let live = pin_stats().live() - before.live();
        let (first, second) = unsafe { (*args.arrs, *args.arrs.add(1)) };
        (live, args.count, first, second)
    })
    .expect("staged");

    assert_eq!((live, count), (2, 2));
    assert_eq!(first, a.as_ptr() as *mut c_void);
    assert_eq!(second, b.as_ptr() as *mut c_void);
    assert_eq!(pin_stats().live(), before.live());
}

#[test]
fn test_array_list_with_released_member_never_calls() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let a = Mat::new(&ctx, 1, 3, MatDepth::F64, 1).expect("a");
    let mut b = Mat::new(&ctx, 1, 3, MatDepth::F64, 1).expect("b");
    assert!(b.release());

    let arrays: [&dyn NativeArray; 2] = [&a, &b];
    let before = pin_stats();
    let mut called = false;
    let err = with_arrays(&arrays, |_| called = true).unwrap_err();

    assert!(matches!(err, CvError::InvalidArgument(_)), "got {err:?}");
    assert!(!called);
    let after = pin_stats();
    assert_eq!(after.pinned - before.pinned, 2);
    assert_eq!(after.live(), before.live());
}

#[test]
fn test_sub_slice_limits_points_passed_to_native() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let mut img = Mat::new(&ctx, 8, 8, MatDepth::U8, 1).expect("image");
    img.as_bytes_mut().expect("data").fill(0);

    let outline = square(1, 1, 5);
    let contours: [&[Point]; 1] = [&outline[..2]];
    let counts = with_jagged::<Point, _, _, _>(&contours, |args| unsafe { *args.counts })
        .expect("staged");
    assert_eq!(counts, 2);

    fill_poly(&mut img, &contours, Scalar::all(7.0), LineType::Connected8, 0).expect("fill");
    let data = img.as_bytes().expect("data");
    assert_eq!(data[8 + 1], 7);
    assert_eq!(data[8 + 6], 7);
    assert_eq!(data[6 * 8 + 6], 0, "points past the sub-slice are not passed");
}

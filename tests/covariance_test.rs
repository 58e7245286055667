// Covariance over a list of array wrappers passed as one native argument.

#![cfg(feature = "reference-backend")]

mod common;

use cv_interop::covariance::{CovarFlags, calc_covar_matrix};
use cv_interop::ffi::cxcore_sys::CV_StsUnmatchedSizes;
use cv_interop::marshal::pin_stats;
use cv_interop::resource::array::NativeArray;
use cv_interop::{CvContext, CvError, Mat, MatDepth};

use common::serial;

fn row(ctx: &CvContext, values: &[f64]) -> Mat {
    let mut mat = Mat::new(ctx, 1, values.len() as i32, MatDepth::F64, 1).expect("vector");
    let bytes = mat.as_bytes_mut().expect("data");
    for (chunk, v) in bytes.chunks_exact_mut(8).zip(values) {
        chunk.copy_from_slice(&v.to_ne_bytes());
    }
    mat
}

fn values(mat: &Mat) -> Vec<f64> {
    mat.as_bytes()
        .expect("data")
        .chunks_exact(8)
        .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
        .collect()
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-9, "got {actual:?}, expected {expected:?}");
    }
}

// ============================================================
// 1. Normal and scrambled layouts
// ============================================================

#[test]
fn test_normal_covariance_and_average() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let vects = [row(&ctx, &[1.0, 2.0]), row(&ctx, &[3.0, 4.0]), row(&ctx, &[5.0, 6.0])];
    let inputs: Vec<&dyn NativeArray> = vects.iter().map(|v| v as &dyn NativeArray).collect();
    let mut cov = Mat::new(&ctx, 2, 2, MatDepth::F64, 1).expect("cov");
    let mut avg = row(&ctx, &[0.0, 0.0]);

    let before = pin_stats();
    calc_covar_matrix(&inputs, &mut cov, &mut avg, CovarFlags::NORMAL).expect("covariance");
    assert_eq!(pin_stats().pinned - before.pinned, 3);
    assert_eq!(pin_stats().live(), before.live());

    assert_close(&values(&avg), &[3.0, 4.0]);
    assert_close(&values(&cov), &[8.0, 8.0, 8.0, 8.0]);

    calc_covar_matrix(&inputs, &mut cov, &mut avg, CovarFlags::NORMAL | CovarFlags::SCALE)
        .expect("scaled");
    let third = 8.0 / 3.0;
    assert_close(&values(&cov), &[third, third, third, third]);
}

#[test]
fn test_scrambled_covariance_with_given_average() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let vects = [row(&ctx, &[1.0, 2.0]), row(&ctx, &[3.0, 4.0]), row(&ctx, &[5.0, 6.0])];
    let inputs: Vec<&dyn NativeArray> = vects.iter().map(|v| v as &dyn NativeArray).collect();
    let mut cov = Mat::new(&ctx, 3, 3, MatDepth::F64, 1).expect("cov");
    let mut avg = row(&ctx, &[3.0, 4.0]);

    calc_covar_matrix(
        &inputs,
        &mut cov,
        &mut avg,
        CovarFlags::SCRAMBLED | CovarFlags::USE_AVG,
    )
    .expect("covariance");

    assert_close(
        &values(&cov),
        &[8.0, 0.0, -8.0, 0.0, 0.0, 0.0, -8.0, 0.0, 8.0],
    );
    assert_close(&values(&avg), &[3.0, 4.0]);
}

// ============================================================
// 2. Rejected arguments
// ============================================================

#[test]
fn test_mismatched_vectors_leave_outputs_untouched() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let vects = [row(&ctx, &[1.0, 2.0]), row(&ctx, &[3.0, 4.0, 5.0])];
    let inputs: Vec<&dyn NativeArray> = vects.iter().map(|v| v as &dyn NativeArray).collect();
    let mut cov = row(&ctx, &[-1.0, -1.0, -1.0, -1.0]);
    let mut avg = row(&ctx, &[-1.0, -1.0]);

    let before = pin_stats();
    let err = calc_covar_matrix(&inputs, &mut cov, &mut avg, CovarFlags::NORMAL).unwrap_err();

    assert!(
        matches!(err, CvError::Native { op: "cvCalcCovarMatrix", status: CV_StsUnmatchedSizes, .. }),
        "got {err:?}"
    );
    assert_eq!(pin_stats().live(), before.live());
    assert_close(&values(&avg), &[-1.0, -1.0]);
    assert_close(&values(&cov), &[-1.0, -1.0, -1.0, -1.0]);
    assert_eq!(ctx.status(), 0);
}

#[test]
fn test_arrays_from_another_binding_are_rejected() {
    let _lock = serial();
    let ctx = CvContext::reference();
    let other = CvContext::reference();
    let vects = [row(&ctx, &[1.0]), row(&other, &[2.0])];
    let inputs: Vec<&dyn NativeArray> = vects.iter().map(|v| v as &dyn NativeArray).collect();
    let mut cov = Mat::new(&ctx, 1, 1, MatDepth::F64, 1).expect("cov");
    let mut avg = row(&ctx, &[0.0]);

    let err = calc_covar_matrix(&inputs, &mut cov, &mut avg, CovarFlags::NORMAL).unwrap_err();
    assert!(matches!(err, CvError::InvalidArgument(_)), "got {err:?}");
}

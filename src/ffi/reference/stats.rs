// Covariance of a set of vectors passed as an array of array headers.
//
// Only the array-of-vectors form is implemented: every input is a continuous
// single-channel float array, and the row/column sample layouts are rejected.
// All arguments are validated before the outputs are written.

use std::ffi::CStr;

use libc::{c_int, c_void};

use super::raise;
use crate::ffi::cxcore_sys::*;

const FUNC: &CStr = c"cvCalcCovarMatrix";

/// Continuous single-channel float array viewed as `rows x cols` values.
struct Dense {
    data: *mut u8,
    depth: c_int,
    rows: usize,
    cols: usize,
}

impl Dense {
    fn len(&self) -> usize {
        self.rows * self.cols
    }

    unsafe fn get(&self, i: usize) -> f64 {
        unsafe {
            match self.depth {
                5 => (self.data as *const f32).add(i).read_unaligned() as f64,
                _ => (self.data as *const f64).add(i).read_unaligned(),
            }
        }
    }

    unsafe fn set(&self, i: usize, v: f64) {
        unsafe {
            match self.depth {
                5 => (self.data as *mut f32).add(i).write_unaligned(v as f32),
                _ => (self.data as *mut f64).add(i).write_unaligned(v),
            }
        }
    }
}

unsafe fn dense_of(arr: *const c_void, what: &str) -> Option<Dense> {
    if arr.is_null() {
        raise(CV_StsNullPtr, FUNC, &format!("NULL {what}"), line!());
        return None;
    }
    let (type_, data, rows, cols) = match unsafe { header_magic(arr) } {
        CV_MAT_MAGIC_VAL => {
            let mat = unsafe { &*(arr as *const CvMat) };
            (mat.type_, mat.data, mat.rows as usize, mat.cols as usize)
        }
        CV_MATND_MAGIC_VAL => {
            let mat = unsafe { &*(arr as *const CvMatND) };
            let dims = (mat.dims.max(1) as usize).min(CV_MAX_DIM);
            let cols: usize = mat.dim[1..dims]
                .iter()
                .map(|d| d.size.max(0) as usize)
                .product();
            (mat.type_, mat.data, mat.dim[0].size.max(0) as usize, cols)
        }
        _ => {
            raise(CV_StsBadArg, FUNC, &format!("Unknown array type of {what}"), line!());
            return None;
        }
    };
    if data.is_null() {
        raise(CV_StsNullPtr, FUNC, &format!("The {what} has no data"), line!());
        return None;
    }
    let depth = CV_MAT_DEPTH(type_);
    if CV_MAT_CN(type_) != 1 || !(depth == 5 || depth == 6) || !CV_IS_MAT_CONT(type_) {
        raise(
            CV_StsUnsupportedFormat,
            FUNC,
            &format!("The {what} must be a continuous single-channel 32f or 64f array"),
            line!(),
        );
        return None;
    }
    Some(Dense {
        data,
        depth,
        rows,
        cols,
    })
}

pub(super) unsafe extern "C" fn calc_covar_matrix(
    vects: *mut *const c_void,
    count: c_int,
    cov_mat: *mut c_void,
    avg: *mut c_void,
    flags: c_int,
) {
    if vects.is_null() {
        raise(CV_StsNullPtr, FUNC, "NULL vector list", line!());
        return;
    }
    if count <= 0 {
        raise(CV_StsBadArg, FUNC, "The number of vectors must be positive", line!());
        return;
    }
    if flags & (CV_COVAR_ROWS | CV_COVAR_COLS) != 0 {
        raise(
            CV_StsUnsupportedFormat,
            FUNC,
            "Row and column sample layouts are not supported",
            line!(),
        );
        return;
    }

    let heads = unsafe { std::slice::from_raw_parts(vects, count as usize) };
    let mut inputs = Vec::with_capacity(heads.len());
    for &head in heads {
        let Some(v) = (unsafe { dense_of(head, "input vector") }) else {
            return;
        };
        inputs.push(v);
    }
    let n = inputs[0].len();
    if inputs.iter().any(|v| v.len() != n) {
        raise(CV_StsUnmatchedSizes, FUNC, "All the input vectors must have the same size", line!());
        return;
    }

    let Some(avg) = (unsafe { dense_of(avg, "average vector") }) else {
        return;
    };
    if avg.len() != n {
        raise(CV_StsUnmatchedSizes, FUNC, "The average vector size does not match", line!());
        return;
    }

    let normal = flags & CV_COVAR_NORMAL != 0;
    let side = if normal { n } else { inputs.len() };
    let Some(cov) = (unsafe { dense_of(cov_mat, "covariance matrix") }) else {
        return;
    };
    if cov.rows != side || cov.cols != side {
        raise(
            CV_StsUnmatchedSizes,
            FUNC,
            &format!("The covariance matrix must be {side}x{side}"),
            line!(),
        );
        return;
    }

    let m = inputs.len() as f64;
    let mean: Vec<f64> = if flags & CV_COVAR_USE_AVG != 0 {
        (0..n).map(|i| unsafe { avg.get(i) }).collect()
    } else {
        (0..n)
            .map(|i| inputs.iter().map(|v| unsafe { v.get(i) }).sum::<f64>() / m)
            .collect()
    };
    let centered: Vec<Vec<f64>> = inputs
        .iter()
        .map(|v| (0..n).map(|i| unsafe { v.get(i) } - mean[i]).collect())
        .collect();
    let scale = if flags & CV_COVAR_SCALE != 0 { 1.0 / m } else { 1.0 };

    for r in 0..side {
        for c in 0..side {
            let value = if normal {
                centered.iter().map(|d| d[r] * d[c]).sum::<f64>()
            } else {
                centered[r].iter().zip(&centered[c]).map(|(a, b)| a * b).sum::<f64>()
            };
            unsafe { cov.set(r * side + c, value * scale) };
        }
    }
    if flags & CV_COVAR_USE_AVG == 0 {
        for (i, &v) in mean.iter().enumerate() {
            unsafe { avg.set(i, v) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_reads_and_writes_both_float_depths() {
        let mut f32s = [0f32; 3];
        let view = Dense {
            data: f32s.as_mut_ptr() as *mut u8,
            depth: 5,
            rows: 1,
            cols: 3,
        };
        unsafe {
            view.set(1, 2.5);
            assert_eq!(view.get(1), 2.5);
        }
        assert_eq!(f32s, [0.0, 2.5, 0.0]);

        let mut f64s = [1f64, 2.0];
        let view = Dense {
            data: f64s.as_mut_ptr() as *mut u8,
            depth: 6,
            rows: 2,
            cols: 1,
        };
        assert_eq!(view.len(), 2);
        unsafe { view.set(0, -4.0) };
        assert_eq!(f64s, [-4.0, 2.0]);
    }
}

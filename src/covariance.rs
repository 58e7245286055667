// Covariance of a set of vectors, the array-of-arrays native call.

use std::ops::BitOr;

use libc::{c_int, c_void};

use crate::error::{CvError, Result};
use crate::ffi::cxcore_sys::{
    CV_COVAR_NORMAL, CV_COVAR_SCALE, CV_COVAR_SCRAMBLED, CV_COVAR_USE_AVG,
};
use crate::marshal::with_arrays;
use crate::resource::array::NativeArray;

/// Flags for [`calc_covar_matrix`]. Combine with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CovarFlags(c_int);

impl CovarFlags {
    /// `count x count` matrix of pairwise products of the centred vectors.
    pub const SCRAMBLED: CovarFlags = CovarFlags(CV_COVAR_SCRAMBLED);
    /// `n x n` matrix, `n` being the vector length.
    pub const NORMAL: CovarFlags = CovarFlags(CV_COVAR_NORMAL);
    /// Centre on the caller's average instead of computing it.
    pub const USE_AVG: CovarFlags = CovarFlags(CV_COVAR_USE_AVG);
    /// Divide the result by the number of vectors.
    pub const SCALE: CovarFlags = CovarFlags(CV_COVAR_SCALE);

    pub fn raw(self) -> c_int {
        self.0
    }

    pub fn contains(self, other: CovarFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CovarFlags {
    type Output = CovarFlags;

    fn bitor(self, rhs: CovarFlags) -> CovarFlags {
        CovarFlags(self.0 | rhs.0)
    }
}

/// Compute the covariance matrix of `vects` into `cov`.
///
/// `avg` receives the mean vector, or supplies it with [`CovarFlags::USE_AVG`].
/// Every array must come from the same binding. The vector headers are staged
/// for the duration of the native call only.
pub fn calc_covar_matrix<C, A>(
    vects: &[&dyn NativeArray],
    cov: &mut C,
    avg: &mut A,
    flags: CovarFlags,
) -> Result<()>
where
    C: NativeArray + ?Sized,
    A: NativeArray + ?Sized,
{
    let ctx = cov.context();
    let foreign = vects
        .iter()
        .map(|v| v.context())
        .chain(std::iter::once(avg.context()))
        .any(|other| !other.same_binding(ctx));
    if foreign {
        return Err(CvError::invalid_argument(
            "covariance inputs come from different native bindings",
        ));
    }

    let cov_ptr = cov.as_arr_ptr()?;
    let avg_ptr = avg.as_arr_ptr()?;
    let api = ctx.api();
    with_arrays(vects, |args| unsafe {
        (api.cvCalcCovarMatrix)(
            args.arrs as *mut *const c_void,
            args.count,
            cov_ptr,
            avg_ptr,
            flags.raw(),
        )
    })?;
    ctx.check_status("cvCalcCovarMatrix")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_combine() {
        let flags = CovarFlags::NORMAL | CovarFlags::SCALE;
        assert_eq!(flags.raw(), CV_COVAR_NORMAL | CV_COVAR_SCALE);
        assert!(flags.contains(CovarFlags::SCALE));
        assert!(!flags.contains(CovarFlags::USE_AVG));
        assert_eq!(CovarFlags::default(), CovarFlags::SCRAMBLED);
    }
}

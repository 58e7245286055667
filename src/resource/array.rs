use std::marker::PhantomData;

use libc::c_void;

use crate::error::{CvError, Result};
use crate::ffi::cxcore_sys::CvMat;
use crate::resource::context::CvContext;
use crate::resource::handle::ReleaseHandle;

/// Anything that can be passed where the native API takes an array (`CvArr*`).
pub trait NativeArray {
    /// Raw header address, valid while `self` is alive and not released.
    ///
    /// Fails with [`CvError::InvalidArgument`] once the array has been released,
    /// so a stale wrapper never reaches native code.
    fn as_arr_ptr(&self) -> Result<*mut c_void>;

    fn context(&self) -> &CvContext;
}

pub(crate) fn released_error() -> CvError {
    CvError::invalid_argument("array used after release")
}

/// Release state shared by `CvMat` and `CvMatND` headers.
///
/// `bytes_allocated` is the exact amount registered with the context's
/// pressure gauge at construction; it is reversed as-is, never recomputed.
pub struct ArrayRelease<T> {
    owns_data: bool,
    bytes_allocated: u64,
    _kind: PhantomData<fn() -> T>,
}

impl<T> ArrayRelease<T> {
    /// Header owned, data not owned (or not yet accounted for).
    pub(crate) fn header_only() -> Self {
        ArrayRelease {
            owns_data: false,
            bytes_allocated: 0,
            _kind: PhantomData,
        }
    }

    pub(crate) fn owns_data(&self) -> bool {
        self.owns_data
    }

    pub(crate) fn bytes_allocated(&self) -> Option<u64> {
        self.owns_data.then_some(self.bytes_allocated)
    }

    /// Record ownership of the backing buffer and register its size.
    pub(crate) fn register(&mut self, ctx: &CvContext, bytes: u64) {
        debug_assert!(!self.owns_data, "pressure registered twice");
        self.owns_data = true;
        self.bytes_allocated = bytes;
        ctx.pressure().add(bytes);
    }
}

impl<T> ReleaseHandle for ArrayRelease<T> {
    type Raw = T;

    fn release_handle(&mut self, ctx: &CvContext, ptr: *mut T) -> bool {
        // Unregister before the native free so a failing free cannot leave
        // pressure registered against memory that is already gone.
        if self.owns_data {
            ctx.pressure().remove(self.bytes_allocated);
            self.owns_data = false;
        }

        let before = ctx.status();
        let mut raw = ptr as *mut CvMat;
        unsafe { (ctx.api().cvReleaseMat)(&mut raw) };
        ctx.check_status_since("cvReleaseMat", before).is_ok()
    }
}

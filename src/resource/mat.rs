use libc::c_void;

use crate::error::{CvError, Result};
use crate::ffi::cxcore_sys::{CV_IS_MAT_CONT, CvMat};
use crate::resource::array::{ArrayRelease, NativeArray, released_error};
use crate::resource::context::CvContext;
use crate::resource::handle::SafeHandle;
use crate::resource::mat_type::{MatDepth, MatType, total_bytes};

/// Two-dimensional matrix backed by a native `CvMat`. Same ownership and
/// pressure rules as [`crate::resource::mat_nd::MatND`].
pub struct Mat {
    handle: SafeHandle<ArrayRelease<CvMat>>,
}

fn header_bytes(header: &CvMat) -> u64 {
    total_bytes(
        MatType::from_flags(header.type_).elem_size(),
        &[header.rows, header.cols],
    )
    .unwrap_or(0)
}

impl Mat {
    pub fn new(ctx: &CvContext, rows: i32, cols: i32, depth: MatDepth, channels: i32) -> Result<Self> {
        let ty = MatType::new(depth, channels)?;
        if rows < 0 || cols < 0 {
            return Err(CvError::invalid_argument(format!(
                "matrix extents must be non-negative, got {rows}x{cols}"
            )));
        }
        let handle = SafeHandle::acquire(ctx, "cvCreateMat", ArrayRelease::header_only(), |api| unsafe {
            (api.cvCreateMat)(rows, cols, ty.raw())
        })?;
        Ok(Self::owning(handle))
    }

    /// Take ownership of a matrix returned by another native call.
    ///
    /// # Safety
    /// `ptr` must be a live `CvMat` allocated by the library bound to `ctx`
    /// with no other owner.
    pub unsafe fn from_raw(ctx: &CvContext, ptr: *mut CvMat) -> Result<Self> {
        let handle = unsafe { SafeHandle::from_raw_owned(ctx, ptr, ArrayRelease::header_only())? };
        Ok(Self::owning(handle))
    }

    fn owning(mut handle: SafeHandle<ArrayRelease<CvMat>>) -> Self {
        let bytes = header_bytes(unsafe { &*handle.as_ptr() });
        let ctx = handle.context().clone();
        handle.releaser_mut().register(&ctx, bytes);
        Mat { handle }
    }

    pub fn try_clone(&self) -> Result<Mat> {
        let src = self.live_header()? as *const CvMat;
        let handle = SafeHandle::acquire(
            self.handle.context(),
            "cvCloneMat",
            ArrayRelease::header_only(),
            |api| unsafe { (api.cvCloneMat)(src) },
        )?;
        Ok(Self::owning(handle))
    }

    pub fn release(&mut self) -> bool {
        self.handle.release()
    }

    fn live_header(&self) -> Result<&CvMat> {
        let ptr = self.handle.as_ptr();
        if ptr.is_null() {
            return Err(released_error());
        }
        Ok(unsafe { &*ptr })
    }

    fn header(&self) -> &CvMat {
        let ptr = self.handle.as_ptr();
        assert!(!ptr.is_null(), "Mat used after release");
        unsafe { &*ptr }
    }

    pub fn rows(&self) -> i32 {
        self.header().rows
    }

    pub fn cols(&self) -> i32 {
        self.header().cols
    }

    pub fn mat_type(&self) -> MatType {
        MatType::from_flags(self.header().type_)
    }

    pub fn depth(&self) -> MatDepth {
        self.mat_type().depth()
    }

    pub fn channels(&self) -> i32 {
        self.mat_type().channels()
    }

    pub fn element_size(&self) -> usize {
        self.mat_type().elem_size()
    }

    pub fn owns_data(&self) -> bool {
        self.handle.releaser().owns_data()
    }

    pub fn bytes_allocated(&self) -> Option<u64> {
        self.handle.releaser().bytes_allocated()
    }

    pub fn is_invalid(&self) -> bool {
        self.handle.is_invalid()
    }

    pub fn as_ptr(&self) -> *mut CvMat {
        self.handle.as_ptr()
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        let header = self.header();
        if header.data.is_null() || !CV_IS_MAT_CONT(header.type_) {
            return None;
        }
        Some(unsafe { std::slice::from_raw_parts(header.data, header_bytes(header) as usize) })
    }

    pub fn as_bytes_mut(&mut self) -> Option<&mut [u8]> {
        let header = self.header();
        if header.data.is_null() || !CV_IS_MAT_CONT(header.type_) {
            return None;
        }
        let (data, len) = (header.data, header_bytes(header) as usize);
        Some(unsafe { std::slice::from_raw_parts_mut(data, len) })
    }
}

impl NativeArray for Mat {
    fn as_arr_ptr(&self) -> Result<*mut c_void> {
        self.live_header()
            .map(|header| header as *const CvMat as *mut c_void)
    }

    fn context(&self) -> &CvContext {
        self.handle.context()
    }
}

impl std::fmt::Debug for Mat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.handle.is_invalid() {
            return f.write_str("Mat(released)");
        }
        f.debug_struct("Mat")
            .field("rows", &self.rows())
            .field("cols", &self.cols())
            .field("depth", &self.depth())
            .field("channels", &self.channels())
            .finish()
    }
}

// Safe wrapper around CvMatND: owning or aliasing N-dimensional dense arrays.

use std::marker::PhantomData;
use std::ops::Deref;

use libc::{c_int, c_void};

use crate::error::{CvError, Result};
use crate::ffi::cxcore_sys::{CV_IS_MAT_CONT, CV_MAX_DIM, CvMatND};
use crate::resource::array::{ArrayRelease, NativeArray, released_error};
use crate::resource::context::CvContext;
use crate::resource::handle::SafeHandle;
use crate::resource::mat_type::{MatDepth, MatType, total_bytes};

/// Multi-dimensional dense multi-channel array backed by a native `CvMatND`.
///
/// Arrays created by [`MatND::new`], [`MatND::try_clone`] or [`MatND::from_raw`]
/// own their buffer and register its size with the context's memory pressure.
/// Arrays over caller memory own only the header.
pub struct MatND {
    handle: SafeHandle<ArrayRelease<CvMatND>>,
}

fn dims_arg(sizes: &[i32]) -> Result<c_int> {
    if sizes.is_empty() || sizes.len() > CV_MAX_DIM {
        return Err(CvError::invalid_argument(format!(
            "dimension count must be in 1..={CV_MAX_DIM}, got {}",
            sizes.len()
        )));
    }
    Ok(sizes.len() as c_int)
}

/// Backing-buffer size described by a live header.
fn header_bytes(header: &CvMatND) -> u64 {
    let dims = (header.dims.max(0) as usize).min(CV_MAX_DIM);
    let sizes: Vec<c_int> = header.dim[..dims].iter().map(|d| d.size).collect();
    let elem = MatType::from_flags(header.type_).elem_size();
    total_bytes(elem, &sizes).unwrap_or(0)
}

impl MatND {
    /// Allocate a header and buffer with the given extents and element type.
    pub fn new(ctx: &CvContext, sizes: &[i32], depth: MatDepth, channels: i32) -> Result<Self> {
        let ty = MatType::new(depth, channels)?;
        let dims = dims_arg(sizes)?;
        let handle = SafeHandle::acquire(
            ctx,
            "cvCreateMatND",
            ArrayRelease::header_only(),
            |api| unsafe { (api.cvCreateMatND)(dims, sizes.as_ptr(), ty.raw()) },
        )?;
        Ok(Self::owning(handle))
    }

    /// Allocate only a header that aliases caller memory at `data`.
    ///
    /// The buffer is never freed by this array and no pressure is registered.
    ///
    /// # Safety
    /// `data` must point at least `element size x product(sizes)` writable bytes
    /// that stay valid, and are not freed, until this array is released.
    pub unsafe fn with_data(
        ctx: &CvContext,
        sizes: &[i32],
        depth: MatDepth,
        channels: i32,
        data: *mut c_void,
    ) -> Result<Self> {
        let ty = MatType::new(depth, channels)?;
        let dims = dims_arg(sizes)?;
        let handle = SafeHandle::acquire(
            ctx,
            "cvCreateMatNDHeader",
            ArrayRelease::header_only(),
            |api| unsafe { (api.cvCreateMatNDHeader)(dims, sizes.as_ptr(), ty.raw()) },
        )?;

        // A failure here drops `handle`, which frees the header.
        unsafe {
            (ctx.api().cvInitMatNDHeader)(handle.as_ptr(), dims, sizes.as_ptr(), ty.raw(), data)
        };
        ctx.check_status("cvInitMatNDHeader")?;

        Ok(MatND { handle })
    }

    /// Safe form of [`MatND::with_data`] over a borrowed byte buffer.
    pub fn with_buffer<'a>(
        ctx: &CvContext,
        sizes: &[i32],
        depth: MatDepth,
        channels: i32,
        buffer: &'a mut [u8],
    ) -> Result<BorrowedMatND<'a>> {
        let ty = MatType::new(depth, channels)?;
        let required = total_bytes(ty.elem_size(), sizes)
            .ok_or_else(|| CvError::invalid_argument("invalid or overflowing extents"))?;
        if (buffer.len() as u64) < required {
            return Err(CvError::invalid_argument(format!(
                "buffer holds {} bytes, array needs {required}",
                buffer.len()
            )));
        }

        let mat = unsafe {
            Self::with_data(ctx, sizes, depth, channels, buffer.as_mut_ptr() as *mut c_void)?
        };
        Ok(BorrowedMatND {
            mat,
            _buffer: PhantomData,
        })
    }

    /// Take ownership of a header (and its buffer) returned by another native call.
    ///
    /// The buffer size is read back from the header and registered as pressure.
    ///
    /// # Safety
    /// `ptr` must be a live `CvMatND` allocated by the library bound to `ctx`
    /// with no other owner.
    pub unsafe fn from_raw(ctx: &CvContext, ptr: *mut CvMatND) -> Result<Self> {
        let handle = unsafe { SafeHandle::from_raw_owned(ctx, ptr, ArrayRelease::header_only())? };
        Ok(Self::owning(handle))
    }

    /// View a header owned elsewhere. Releasing the view never frees anything.
    ///
    /// # Safety
    /// `ptr` must be a live `CvMatND` that outlives the returned view.
    pub unsafe fn wrap_borrowed(ctx: &CvContext, ptr: *mut CvMatND) -> Self {
        MatND {
            handle: SafeHandle::wrap_non_owning(ctx, ptr, ArrayRelease::header_only()),
        }
    }

    fn owning(mut handle: SafeHandle<ArrayRelease<CvMatND>>) -> Self {
        let bytes = header_bytes(unsafe { &*handle.as_ptr() });
        let ctx = handle.context().clone();
        handle.releaser_mut().register(&ctx, bytes);
        MatND { handle }
    }

    /// Native deep copy of header and buffer into a new owning array.
    pub fn try_clone(&self) -> Result<MatND> {
        let src = self.live_header()? as *const CvMatND;
        let handle = SafeHandle::acquire(
            self.handle.context(),
            "cvCloneMatND",
            ArrayRelease::header_only(),
            |api| unsafe { (api.cvCloneMatND)(src) },
        )?;
        Ok(Self::owning(handle))
    }

    /// Release the native array now. Idempotent; see [`SafeHandle::release`].
    pub fn release(&mut self) -> bool {
        self.handle.release()
    }

    fn live_header(&self) -> Result<&CvMatND> {
        let ptr = self.handle.as_ptr();
        if ptr.is_null() {
            return Err(released_error());
        }
        Ok(unsafe { &*ptr })
    }

    // Accessors below panic after release; fallible paths use `live_header`.
    fn header(&self) -> &CvMatND {
        let ptr = self.handle.as_ptr();
        assert!(!ptr.is_null(), "MatND used after release");
        unsafe { &*ptr }
    }

    pub fn dims(&self) -> usize {
        self.header().dims as usize
    }

    /// Extent of each dimension, read from the header.
    pub fn sizes(&self) -> Vec<i32> {
        let header = self.header();
        header.dim[..header.dims as usize]
            .iter()
            .map(|d| d.size)
            .collect()
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

    /// Bytes per element, all channels included.
    pub fn element_size(&self) -> usize {
        self.mat_type().elem_size()
    }

    pub fn is_continuous(&self) -> bool {
        CV_IS_MAT_CONT(self.header().type_)
    }

    /// True if this array frees its backing buffer on release.
    pub fn owns_data(&self) -> bool {
        self.handle.releaser().owns_data()
    }

    /// Bytes registered as memory pressure, `None` when the buffer is not owned.
    pub fn bytes_allocated(&self) -> Option<u64> {
        self.handle.releaser().bytes_allocated()
    }

    pub fn is_invalid(&self) -> bool {
        self.handle.is_invalid()
    }

    pub fn as_ptr(&self) -> *mut CvMatND {
        self.handle.as_ptr()
    }

    /// Element bytes of a continuous array with data.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        let header = self.header();
        if header.data.is_null() || !self.is_continuous() {
            return None;
        }
        let len = header_bytes(header) as usize;
        Some(unsafe { std::slice::from_raw_parts(header.data, len) })
    }

    pub fn as_bytes_mut(&mut self) -> Option<&mut [u8]> {
        let header = self.header();
        if header.data.is_null() || !self.is_continuous() {
            return None;
        }
        let (data, len) = (header.data, header_bytes(header) as usize);
        Some(unsafe { std::slice::from_raw_parts_mut(data, len) })
    }
}

impl NativeArray for MatND {
    fn as_arr_ptr(&self) -> Result<*mut c_void> {
        self.live_header()
            .map(|header| header as *const CvMatND as *mut c_void)
    }

    fn context(&self) -> &CvContext {
        self.handle.context()
    }
}

impl std::fmt::Debug for MatND {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.handle.is_invalid() {
            return f.write_str("MatND(released)");
        }
        f.debug_struct("MatND")
            .field("sizes", &self.sizes())
            .field("depth", &self.depth())
            .field("channels", &self.channels())
            .field("owns_data", &self.owns_data())
            .finish()
    }
}

/// A [`MatND`] whose header aliases a borrowed buffer.
///
/// Derefs to `MatND` for reading; the borrow keeps the buffer alive and
/// unmoved for as long as the header exists.
#[derive(Debug)]
pub struct BorrowedMatND<'a> {
    mat: MatND,
    _buffer: PhantomData<&'a mut [u8]>,
}

impl BorrowedMatND<'_> {
    /// Release the header now. The buffer is never freed.
    pub fn release(&mut self) -> bool {
        self.mat.release()
    }

    pub fn as_bytes_mut(&mut self) -> Option<&mut [u8]> {
        self.mat.as_bytes_mut()
    }
}

impl Deref for BorrowedMatND<'_> {
    type Target = MatND;

    fn deref(&self) -> &MatND {
        &self.mat
    }
}

impl NativeArray for BorrowedMatND<'_> {
    fn as_arr_ptr(&self) -> Result<*mut c_void> {
        self.mat.as_arr_ptr()
    }

    fn context(&self) -> &CvContext {
        self.mat.context()
    }
}

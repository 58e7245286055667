use crate::error::Result;
use crate::ffi::cxcore_sys::CvMemStorage;
use crate::resource::context::CvContext;
use crate::resource::handle::{ReleaseHandle, SafeHandle};

/// Growable native memory storage, passed to loads as the storage context.
pub struct MemStorage {
    handle: SafeHandle<StorageRelease>,
}

pub struct StorageRelease;

impl ReleaseHandle for StorageRelease {
    type Raw = CvMemStorage;

    fn release_handle(&mut self, ctx: &CvContext, ptr: *mut CvMemStorage) -> bool {
        let before = ctx.status();
        let mut raw = ptr;
        unsafe { (ctx.api().cvReleaseMemStorage)(&mut raw) };
        ctx.check_status_since("cvReleaseMemStorage", before).is_ok()
    }
}

impl MemStorage {
    /// Create a storage; `block_size <= 0` selects the native default.
    pub fn new(ctx: &CvContext, block_size: i32) -> Result<Self> {
        let handle = SafeHandle::acquire(ctx, "cvCreateMemStorage", StorageRelease, |api| unsafe {
            (api.cvCreateMemStorage)(block_size)
        })?;
        Ok(MemStorage { handle })
    }

    /// # Panics
    /// If the storage has been released.
    pub fn block_size(&self) -> i32 {
        let ptr = self.handle.as_ptr();
        assert!(!ptr.is_null(), "MemStorage used after release");
        unsafe { (*ptr).block_size }
    }

    pub fn release(&mut self) -> bool {
        self.handle.release()
    }

    pub fn is_invalid(&self) -> bool {
        self.handle.is_invalid()
    }

    pub fn as_ptr(&self) -> *mut CvMemStorage {
        self.handle.as_ptr()
    }

    pub fn context(&self) -> &CvContext {
        self.handle.context()
    }
}

// Exclusive-ownership wrapper around one native pointer with exactly-once release.

use std::panic::{self, AssertUnwindSafe};

use crate::error::{CvError, Result};
use crate::ffi::cxcore_sys::CxCore;
use crate::resource::context::CvContext;

/// Native teardown for one resource kind.
///
/// Implementors carry whatever per-instance state teardown needs (for arrays,
/// the memory-pressure registration to reverse).
pub trait ReleaseHandle {
    type Raw;

    /// Free the native resource at `ptr`.
    ///
    /// Called at most once per handle and only when the handle owns `ptr`.
    /// Returns `false` on a catastrophic failure; must not be relied on to panic.
    fn release_handle(&mut self, ctx: &CvContext, ptr: *mut Self::Raw) -> bool;
}

/// Owning (or explicitly non-owning) handle to one native resource.
///
/// An owning handle performs exactly one native release, either through
/// [`SafeHandle::release`] or on drop. Handles are not `Clone`; the only way to
/// a second owner is a native duplicate.
pub struct SafeHandle<R: ReleaseHandle> {
    ptr: *mut R::Raw,
    owns_handle: bool,
    released: bool,
    releaser: R,
    ctx: CvContext,
}

// A handle may move to another thread; release of one handle must still be
// serialised by its owner, which `&mut self` on `release` enforces.
unsafe impl<R: ReleaseHandle + Send> Send for SafeHandle<R> {}

impl<R: ReleaseHandle> SafeHandle<R> {
    /// Run a native constructor and take ownership of whatever it returns.
    ///
    /// The status cell is checked after the call. On failure nothing is
    /// returned; a non-null partial result is released through `releaser`
    /// before the error propagates.
    pub fn acquire<F>(ctx: &CvContext, op: &'static str, releaser: R, construct: F) -> Result<Self>
    where
        F: FnOnce(&CxCore) -> *mut R::Raw,
    {
        let ptr = construct(ctx.api());
        let handle = SafeHandle {
            ptr,
            owns_handle: true,
            released: ptr.is_null(),
            releaser,
            ctx: ctx.clone(),
        };

        ctx.check_status(op)?;
        if handle.ptr.is_null() {
            return Err(CvError::construction(format!("{op} returned a null handle")));
        }

        tracing::debug!(op, ptr = ?handle.ptr, "acquired native handle");
        Ok(handle)
    }

    /// Wrap an address owned elsewhere. Releasing this handle never touches the
    /// native resource.
    pub fn wrap_non_owning(ctx: &CvContext, ptr: *mut R::Raw, releaser: R) -> Self {
        SafeHandle {
            ptr,
            owns_handle: false,
            released: false,
            releaser,
            ctx: ctx.clone(),
        }
    }

    /// Take ownership of an address produced by another native call.
    ///
    /// # Safety
    /// `ptr` must be a live resource of kind `R::Raw` allocated by the library
    /// bound to `ctx`, and no other owner may release it.
    pub unsafe fn from_raw_owned(ctx: &CvContext, ptr: *mut R::Raw, releaser: R) -> Result<Self> {
        if ptr.is_null() {
            return Err(CvError::construction("cannot take ownership of a null handle"));
        }
        Ok(SafeHandle {
            ptr,
            owns_handle: true,
            released: false,
            releaser,
            ctx: ctx.clone(),
        })
    }

    /// Release the native resource.
    ///
    /// Idempotent: only the first call on an owning handle reaches native code;
    /// later calls return `true` without side effects. A panic or reported
    /// failure inside teardown yields `false` and never propagates.
    pub fn release(&mut self) -> bool {
        if self.released {
            return true;
        }
        self.released = true;

        let ptr = std::mem::replace(&mut self.ptr, std::ptr::null_mut());
        if !self.owns_handle || ptr.is_null() {
            return true;
        }

        let releaser = &mut self.releaser;
        let ctx = &self.ctx;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| releaser.release_handle(ctx, ptr)));
        match outcome {
            Ok(true) => {
                tracing::debug!(ptr = ?ptr, "released native handle");
                true
            }
            Ok(false) => {
                tracing::error!(ptr = ?ptr, "native release reported failure");
                false
            }
            Err(_) => {
                tracing::error!(ptr = ?ptr, "native release panicked");
                false
            }
        }
    }

    /// True once the handle has been released or gave up its pointer.
    pub fn is_invalid(&self) -> bool {
        self.released || self.ptr.is_null()
    }

    pub fn owns_handle(&self) -> bool {
        self.owns_handle
    }

    /// Raw address, null after release.
    pub fn as_ptr(&self) -> *mut R::Raw {
        self.ptr
    }

    pub fn context(&self) -> &CvContext {
        &self.ctx
    }

    pub fn releaser(&self) -> &R {
        &self.releaser
    }

    pub fn releaser_mut(&mut self) -> &mut R {
        &mut self.releaser
    }

    /// Give up ownership and return the raw address. The handle becomes invalid
    /// and dropping it performs no native call.
    pub fn into_raw(mut self) -> *mut R::Raw {
        self.released = true;
        std::mem::replace(&mut self.ptr, std::ptr::null_mut())
    }
}

impl<R: ReleaseHandle> Drop for SafeHandle<R> {
    fn drop(&mut self) {
        if !self.release() {
            tracing::error!("native handle leaked: release failed during drop");
        }
    }
}

impl<R: ReleaseHandle> std::fmt::Debug for SafeHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeHandle")
            .field("ptr", &self.ptr)
            .field("owns_handle", &self.owns_handle)
            .field("released", &self.released)
            .finish()
    }
}

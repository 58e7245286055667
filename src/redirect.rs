//! Process-wide error and allocator hooks, and the native error mode.
//!
//! Both hooks are single global installation points inside the native library.
//! Installing one returns a guard that puts the previously active hook back when
//! it is restored or dropped, so installations compose as a stack. This module
//! does not serialise installation across threads; callers that install hooks
//! concurrently must coordinate themselves.

use std::ffi::{CStr, CString};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;
use std::sync::{Arc, Mutex, TryLockError};

use libc::{c_char, c_int, c_void, size_t};

use crate::error::{CvError, Result};
use crate::ffi::cxcore_sys::{
    CV_ErrModeLeaf, CV_ErrModeParent, CV_ErrModeSilent, CvAllocFunc, CvErrorCallback, CvFreeFunc,
};
use crate::resource::context::CvContext;

/// One failure as reported to an error handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub status: i32,
    pub func_name: String,
    pub message: String,
    pub file_name: String,
    pub line: i32,
}

fn lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

fn c_text(text: &str) -> CString {
    CString::new(text.replace('\0', " ")).unwrap_or_default()
}

/// A native error handler as installed in the library: callback plus userdata.
#[derive(Debug, Clone, Copy)]
pub struct RawErrorHandler {
    pub callback: Option<CvErrorCallback>,
    pub userdata: *mut c_void,
}

impl RawErrorHandler {
    pub const NONE: RawErrorHandler = RawErrorHandler {
        callback: None,
        userdata: ptr::null_mut(),
    };

    pub fn is_set(&self) -> bool {
        self.callback.is_some()
    }

    /// Forward `report` to this handler. Returns 0 when no callback is set.
    ///
    /// # Safety
    /// The handler must still be valid, i.e. whatever owns its userdata has not
    /// been torn down.
    pub unsafe fn invoke(&self, report: &ErrorReport) -> i32 {
        let Some(callback) = self.callback else {
            return 0;
        };
        let func = c_text(&report.func_name);
        let msg = c_text(&report.message);
        let file = c_text(&report.file_name);
        unsafe {
            callback(
                report.status,
                func.as_ptr(),
                msg.as_ptr(),
                file.as_ptr(),
                report.line,
                self.userdata,
            )
        }
    }
}

/// Swap the native error handler, returning the one that was active.
///
/// # Safety
/// `handler` must stay valid for as long as it is installed.
pub unsafe fn redirect_error_raw(ctx: &CvContext, handler: RawErrorHandler) -> RawErrorHandler {
    let mut prev_userdata: *mut c_void = ptr::null_mut();
    let prev = unsafe {
        (ctx.api().cvRedirectError)(handler.callback, handler.userdata, &mut prev_userdata)
    };
    RawErrorHandler {
        callback: prev,
        userdata: prev_userdata,
    }
}

type HandlerFn = dyn FnMut(&ErrorReport) -> i32 + Send;

struct HandlerState {
    callback: Mutex<Box<HandlerFn>>,
}

unsafe extern "C" fn error_trampoline(
    status: c_int,
    func_name: *const c_char,
    err_msg: *const c_char,
    file_name: *const c_char,
    line: c_int,
    userdata: *mut c_void,
) -> c_int {
    if userdata.is_null() {
        return 0;
    }
    let state = unsafe { &*(userdata as *const HandlerState) };
    let report = ErrorReport {
        status,
        func_name: lossy(func_name),
        message: lossy(err_msg),
        file_name: lossy(file_name),
        line,
    };

    // A handler that itself triggers a native error would re-enter here.
    let mut callback = match state.callback.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::Poisoned(e)) => e.into_inner(),
        Err(TryLockError::WouldBlock) => {
            tracing::warn!(status, "error handler re-entered; dropping nested report");
            return 0;
        }
    };
    match catch_unwind(AssertUnwindSafe(|| (*callback)(&report))) {
        Ok(code) => code,
        Err(_) => {
            tracing::error!(status, "error handler panicked");
            0
        }
    }
}

/// Installed Rust error handler. Dropping it reinstalls the previous handler.
#[must_use = "dropping the guard immediately restores the previous handler"]
pub struct ErrorHandlerGuard {
    ctx: CvContext,
    state: Option<Box<HandlerState>>,
    previous: RawErrorHandler,
}

/// Route native error reports to `callback` until the guard is dropped.
///
/// The callback's return value is handed back to the native library. Panics
/// inside the callback are caught at the boundary and logged.
pub fn redirect_error<F>(ctx: &CvContext, callback: F) -> ErrorHandlerGuard
where
    F: FnMut(&ErrorReport) -> i32 + Send + 'static,
{
    let callback: Box<HandlerFn> = Box::new(callback);
    let state = Box::new(HandlerState {
        callback: Mutex::new(callback),
    });
    let handler = RawErrorHandler {
        callback: Some(error_trampoline),
        userdata: &*state as *const HandlerState as *mut c_void,
    };
    // The state is boxed and owned by the guard, which uninstalls it before freeing.
    let previous = unsafe { redirect_error_raw(ctx, handler) };
    tracing::debug!(chained = previous.is_set(), "error handler installed");
    ErrorHandlerGuard {
        ctx: ctx.clone(),
        state: Some(state),
        previous,
    }
}

impl ErrorHandlerGuard {
    /// Handler that was active before this one, for chaining.
    pub fn previous(&self) -> RawErrorHandler {
        self.previous
    }

    /// Reinstall the previous handler now.
    pub fn restore(mut self) {
        self.restore_inner();
    }

    fn restore_inner(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };
        let ours = &*state as *const HandlerState as *mut c_void;
        let replaced = unsafe { redirect_error_raw(&self.ctx, self.previous) };

        let was_ours = replaced.userdata == ours
            && replaced.callback.map(|f| f as usize) == Some(error_trampoline as usize);
        if !was_ours {
            // Restored out of order: leave the newer handler active and keep our
            // state alive, since the newer one may chain into it.
            tracing::warn!("error handlers restored out of order; keeping the newer handler");
            unsafe { redirect_error_raw(&self.ctx, replaced) };
            Box::leak(state);
            return;
        }
        tracing::debug!("error handler restored");
    }
}

impl Drop for ErrorHandlerGuard {
    fn drop(&mut self) {
        self.restore_inner();
    }
}

/// How the native library reports an error once it is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorMode {
    /// Report through the error handler where the error occurred.
    Leaf = CV_ErrModeLeaf,
    /// Report through the error handler after unwinding to the caller.
    Parent = CV_ErrModeParent,
    /// Set the status only; the error handler is not called.
    Silent = CV_ErrModeSilent,
}

impl ErrorMode {
    fn from_raw(raw: c_int) -> Result<Self> {
        match raw {
            CV_ErrModeLeaf => Ok(ErrorMode::Leaf),
            CV_ErrModeParent => Ok(ErrorMode::Parent),
            CV_ErrModeSilent => Ok(ErrorMode::Silent),
            other => Err(CvError::invalid_argument(format!(
                "native library reported unknown error mode {other}"
            ))),
        }
    }
}

/// Error mode currently set in the native library.
pub fn error_mode(ctx: &CvContext) -> Result<ErrorMode> {
    ErrorMode::from_raw(unsafe { (ctx.api().cvGetErrMode)() })
}

/// Set the process-wide error mode and return the one it replaced.
///
/// Like the error handler, the mode is global to the native library; restore
/// the returned mode when done.
pub fn set_error_mode(ctx: &CvContext, mode: ErrorMode) -> Result<ErrorMode> {
    let previous = unsafe { (ctx.api().cvSetErrMode)(mode as c_int) };
    ctx.check_status("cvSetErrMode")?;
    tracing::debug!(?mode, previous, "native error mode set");
    ErrorMode::from_raw(previous)
}

/// Allocator for every native allocation made while it is installed.
///
/// Memory obtained from one allocator may be handed back after a different one
/// has been installed, so implementations should be compatible with the
/// allocator they replace or outlive every allocation they serve.
pub trait NativeAllocator: Send + Sync {
    /// Return at least `size` bytes, or null on exhaustion.
    fn allocate(&self, size: usize) -> *mut c_void;

    /// # Safety
    /// `ptr` was returned by [`NativeAllocator::allocate`] and is freed once.
    unsafe fn free(&self, ptr: *mut c_void);
}

type SharedAllocator = Arc<dyn NativeAllocator>;

#[derive(Clone)]
struct InstalledAllocator {
    allocator: SharedAllocator,
    // Address of the boxed `SharedAllocator` passed as native userdata.
    userdata: usize,
}

static INSTALLED_ALLOCATOR: Mutex<Option<InstalledAllocator>> = Mutex::new(None);

unsafe extern "C" fn alloc_trampoline(size: size_t, userdata: *mut c_void) -> *mut c_void {
    let allocator = unsafe { &*(userdata as *const SharedAllocator) };
    catch_unwind(AssertUnwindSafe(|| allocator.allocate(size))).unwrap_or_else(|_| {
        tracing::error!(size, "allocator panicked");
        ptr::null_mut()
    })
}

unsafe extern "C" fn free_trampoline(ptr: *mut c_void, userdata: *mut c_void) -> c_int {
    let allocator = unsafe { &*(userdata as *const SharedAllocator) };
    match catch_unwind(AssertUnwindSafe(|| unsafe { allocator.free(ptr) })) {
        Ok(()) => 0,
        Err(_) => {
            tracing::error!("allocator free panicked");
            -1
        }
    }
}

const ALLOC_HOOK: CvAllocFunc = alloc_trampoline;
const FREE_HOOK: CvFreeFunc = free_trampoline;

/// Installed allocator. Dropping it reinstalls the previous allocator, or the
/// native default if there was none.
#[must_use = "dropping the guard immediately restores the previous allocator"]
pub struct AllocatorGuard {
    ctx: CvContext,
    own: Option<Box<SharedAllocator>>,
    previous: Option<InstalledAllocator>,
}

/// Install `allocator` for all subsequent native allocations.
///
/// # Safety
/// No native call may be running on another thread while the hook is swapped,
/// here or when the guard drops. Memory allocated before the swap will be freed
/// by whichever allocator is active at that point.
pub unsafe fn install_allocator(ctx: &CvContext, allocator: SharedAllocator) -> AllocatorGuard {
    let own = Box::new(allocator.clone());
    let userdata = &*own as *const SharedAllocator as usize;

    let mut installed = INSTALLED_ALLOCATOR.lock().unwrap_or_else(|e| e.into_inner());
    unsafe {
        (ctx.api().cvSetMemoryManager)(Some(ALLOC_HOOK), Some(FREE_HOOK), userdata as *mut c_void)
    };
    let previous = installed.replace(InstalledAllocator {
        allocator,
        userdata,
    });
    tracing::debug!(stacked = previous.is_some(), "native allocator installed");

    AllocatorGuard {
        ctx: ctx.clone(),
        own: Some(own),
        previous,
    }
}

impl AllocatorGuard {
    /// Reinstall the previous allocator now.
    pub fn restore(mut self) {
        self.restore_inner();
    }

    fn restore_inner(&mut self) {
        let Some(own) = self.own.take() else {
            return;
        };
        let userdata = &*own as *const SharedAllocator as usize;

        let mut installed = INSTALLED_ALLOCATOR.lock().unwrap_or_else(|e| e.into_inner());
        if installed.as_ref().map(|i| i.userdata) != Some(userdata) {
            tracing::warn!("allocators restored out of order; keeping the newer allocator");
            Box::leak(own);
            return;
        }

        let api = self.ctx.api();
        match &self.previous {
            Some(prev) => unsafe {
                (api.cvSetMemoryManager)(
                    Some(ALLOC_HOOK),
                    Some(FREE_HOOK),
                    prev.userdata as *mut c_void,
                )
            },
            None => unsafe { (api.cvSetMemoryManager)(None, None, ptr::null_mut()) },
        }
        *installed = self.previous.take();
        tracing::debug!(default = installed.is_none(), "native allocator restored");
    }
}

impl Drop for AllocatorGuard {
    fn drop(&mut self) {
        self.restore_inner();
    }
}

/// Allocator currently installed through this module, if any.
pub fn installed_allocator() -> Option<SharedAllocator> {
    INSTALLED_ALLOCATOR
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .as_ref()
        .map(|i| i.allocator.clone())
}

// In-process implementation of the cxcore entry points bound by `CxCore`.
//
// It follows the native library's contracts closely enough to exercise the
// ownership layer without a system OpenCV: every allocation goes through the
// installable memory manager, failures set the process-wide status and invoke
// the redirected error handler, and loaded names are returned in cvAlloc'd
// memory. Drawing validates its arguments and plots contour vertices only.

mod arrays;
mod drawing;
mod stats;
mod storage;

use std::ffi::{CStr, CString};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};

use libc::{c_char, c_int, c_void, size_t};

use super::cxcore_sys::*;

/// Function table pointing at the in-process implementation.
pub fn api() -> CxCore {
    CxCore {
        cvAlloc: cv_alloc,
        cvFree_: cv_free,
        cvSetMemoryManager: set_memory_manager,
        cvRedirectError: redirect_error,
        cvGetErrStatus: get_err_status,
        cvSetErrStatus: set_err_status,
        cvErrorStr: error_str,
        cvGetErrMode: get_err_mode,
        cvSetErrMode: set_err_mode,
        cvCreateMatND: arrays::create_mat_nd,
        cvCreateMatNDHeader: arrays::create_mat_nd_header,
        cvInitMatNDHeader: arrays::init_mat_nd_header,
        cvCloneMatND: arrays::clone_mat_nd,
        cvCreateMat: arrays::create_mat,
        cvCloneMat: arrays::clone_mat,
        cvReleaseMat: arrays::release_mat,
        cvCreateMemStorage: arrays::create_mem_storage,
        cvReleaseMemStorage: arrays::release_mem_storage,
        cvRelease: arrays::release,
        cvSave: storage::save,
        cvLoad: storage::load,
        cvCalcCovarMatrix: stats::calc_covar_matrix,
        cvFillPoly: drawing::fill_poly,
        cvPolyLine: drawing::poly_line,
    }
}

// --- Error status and handler ---

static ERR_STATUS: AtomicI32 = AtomicI32::new(CV_StsOk);
static ERR_MODE: AtomicI32 = AtomicI32::new(CV_ErrModeLeaf);

#[derive(Clone, Copy)]
struct HandlerSlot {
    callback: Option<CvErrorCallback>,
    userdata: usize,
}

static ERROR_HANDLER: Mutex<HandlerSlot> = Mutex::new(HandlerSlot {
    callback: None,
    userdata: 0,
});

fn handler_slot() -> std::sync::MutexGuard<'static, HandlerSlot> {
    ERROR_HANDLER.lock().unwrap_or_else(|e| e.into_inner())
}

/// Record a failure: set the status cell, then notify the installed handler
/// unless the error mode is silent.
pub(crate) fn raise(status: c_int, func: &CStr, msg: &str, line: u32) {
    ERR_STATUS.store(status, Ordering::SeqCst);
    if ERR_MODE.load(Ordering::SeqCst) == CV_ErrModeSilent {
        return;
    }

    let slot = *handler_slot();
    if let Some(callback) = slot.callback {
        let msg = CString::new(msg.replace('\0', " ")).unwrap_or_default();
        unsafe {
            callback(
                status,
                func.as_ptr(),
                msg.as_ptr(),
                c"reference.rs".as_ptr(),
                line as c_int,
                slot.userdata as *mut c_void,
            );
        }
    }
}

unsafe extern "C" fn get_err_status() -> c_int {
    ERR_STATUS.load(Ordering::SeqCst)
}

unsafe extern "C" fn set_err_status(status: c_int) {
    ERR_STATUS.store(status, Ordering::SeqCst);
}

unsafe extern "C" fn get_err_mode() -> c_int {
    ERR_MODE.load(Ordering::SeqCst)
}

unsafe extern "C" fn set_err_mode(mode: c_int) -> c_int {
    match mode {
        CV_ErrModeLeaf | CV_ErrModeParent | CV_ErrModeSilent => ERR_MODE.swap(mode, Ordering::SeqCst),
        _ => {
            raise(CV_StsOutOfRange, c"cvSetErrMode", "Unknown error mode", line!());
            ERR_MODE.load(Ordering::SeqCst)
        }
    }
}

unsafe extern "C" fn redirect_error(
    error_handler: Option<CvErrorCallback>,
    userdata: *mut c_void,
    prev_userdata: *mut *mut c_void,
) -> Option<CvErrorCallback> {
    let mut slot = handler_slot();
    let previous = *slot;
    *slot = HandlerSlot {
        callback: error_handler,
        userdata: userdata as usize,
    };
    if !prev_userdata.is_null() {
        unsafe { *prev_userdata = previous.userdata as *mut c_void };
    }
    previous.callback
}

unsafe extern "C" fn error_str(status: c_int) -> *const c_char {
    let text: &'static CStr = match status {
        CV_StsOk => c"No Error",
        CV_StsBackTrace => c"Backtrace",
        CV_StsError => c"Unspecified error",
        CV_StsInternal => c"Internal error",
        CV_StsNoMem => c"Insufficient memory",
        CV_StsBadArg => c"Bad argument",
        CV_StsNullPtr => c"Null pointer",
        CV_StsBadSize => c"Incorrect size of input array",
        CV_StsObjectNotFound => c"Requested object was not found",
        CV_StsUnmatchedSizes => c"Sizes of input arguments do not match",
        CV_StsBadFlag => c"Bad flag (parameter or structure field)",
        CV_StsUnsupportedFormat => c"Unsupported format or combination of formats",
        CV_StsOutOfRange => c"One of arguments' values is out of range",
        CV_StsParseError => c"Parsing error",
        _ => c"Unknown error code",
    };
    text.as_ptr()
}

// --- Memory manager ---

#[derive(Clone, Copy)]
struct ManagerSlot {
    alloc: Option<CvAllocFunc>,
    free: Option<CvFreeFunc>,
    userdata: usize,
}

static MEMORY_MANAGER: Mutex<ManagerSlot> = Mutex::new(ManagerSlot {
    alloc: None,
    free: None,
    userdata: 0,
});

fn manager() -> ManagerSlot {
    *MEMORY_MANAGER.lock().unwrap_or_else(|e| e.into_inner())
}

unsafe extern "C" fn set_memory_manager(
    alloc_func: Option<CvAllocFunc>,
    free_func: Option<CvFreeFunc>,
    userdata: *mut c_void,
) {
    // Both hooks or neither; a half-installed pair falls back to the default.
    let slot = match (alloc_func, free_func) {
        (Some(alloc), Some(free)) => ManagerSlot {
            alloc: Some(alloc),
            free: Some(free),
            userdata: userdata as usize,
        },
        _ => ManagerSlot {
            alloc: None,
            free: None,
            userdata: 0,
        },
    };
    *MEMORY_MANAGER.lock().unwrap_or_else(|e| e.into_inner()) = slot;
}

pub(crate) unsafe extern "C" fn cv_alloc(size: size_t) -> *mut c_void {
    let slot = manager();
    let ptr = match slot.alloc {
        Some(alloc) => unsafe { alloc(size, slot.userdata as *mut c_void) },
        None => unsafe { libc::malloc(size.max(1)) },
    };
    if ptr.is_null() {
        raise(
            CV_StsNoMem,
            c"cvAlloc",
            &format!("Failed to allocate {size} bytes"),
            line!(),
        );
    }
    ptr
}

pub(crate) unsafe extern "C" fn cv_free(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }
    let slot = manager();
    match slot.free {
        Some(free) => {
            unsafe { free(ptr, slot.userdata as *mut c_void) };
        }
        None => unsafe { libc::free(ptr) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_str_known_and_unknown() {
        let known = unsafe { CStr::from_ptr(error_str(CV_StsNullPtr)) };
        assert_eq!(known.to_str().unwrap(), "Null pointer");
        let unknown = unsafe { CStr::from_ptr(error_str(12345)) };
        assert_eq!(unknown.to_str().unwrap(), "Unknown error code");
    }

    #[test]
    fn test_default_alloc_and_free() {
        unsafe {
            let ptr = cv_alloc(64);
            assert!(!ptr.is_null());
            cv_free(ptr);
            cv_free(std::ptr::null_mut());
        }
    }
}

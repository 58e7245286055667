// Hand-written FFI declarations for the OpenCV 2.x C API (cxcore).
// Only the entry points the ownership and marshaling layer needs are bound here.
// Struct layouts match the published C headers; fields the layer reads directly
// (packed type, dims, sizes, data) must stay in the same order.

#![allow(non_camel_case_types, non_snake_case, non_upper_case_globals)]

use std::mem::size_of;

use libc::{c_char, c_double, c_int, c_void, size_t};

pub const CV_MAX_DIM: usize = 32;

// --- Packed type field ---

pub const CV_CN_MAX: c_int = 512;
pub const CV_CN_SHIFT: c_int = 3;
pub const CV_DEPTH_MAX: c_int = 1 << CV_CN_SHIFT;
pub const CV_MAT_DEPTH_MASK: c_int = CV_DEPTH_MAX - 1;
pub const CV_MAT_CN_MASK: c_int = (CV_CN_MAX - 1) << CV_CN_SHIFT;
pub const CV_MAT_TYPE_MASK: c_int = CV_DEPTH_MAX * CV_CN_MAX - 1;
pub const CV_MAT_CONT_FLAG_SHIFT: c_int = 14;
pub const CV_MAT_CONT_FLAG: c_int = 1 << CV_MAT_CONT_FLAG_SHIFT;

pub const CV_MAGIC_MASK: c_int = 0xFFFF0000_u32 as c_int;
pub const CV_MAT_MAGIC_VAL: c_int = 0x42420000;
pub const CV_MATND_MAGIC_VAL: c_int = 0x42430000;
pub const CV_STORAGE_MAGIC_VAL: c_int = 0x42890000;

// --- Status codes (forwarded untouched) ---

pub const CV_StsOk: c_int = 0;
pub const CV_StsBackTrace: c_int = -1;
pub const CV_StsError: c_int = -2;
pub const CV_StsInternal: c_int = -3;
pub const CV_StsNoMem: c_int = -4;
pub const CV_StsBadArg: c_int = -5;
pub const CV_StsNullPtr: c_int = -27;
pub const CV_StsBadSize: c_int = -201;
pub const CV_StsObjectNotFound: c_int = -204;
pub const CV_StsUnmatchedSizes: c_int = -209;
pub const CV_StsBadFlag: c_int = -206;
pub const CV_StsUnsupportedFormat: c_int = -210;
pub const CV_StsOutOfRange: c_int = -211;
pub const CV_StsParseError: c_int = -212;

// --- Error modes ---

pub const CV_ErrModeLeaf: c_int = 0;
pub const CV_ErrModeParent: c_int = 1;
pub const CV_ErrModeSilent: c_int = 2;

// --- cvCalcCovarMatrix flags ---

pub const CV_COVAR_SCRAMBLED: c_int = 0;
pub const CV_COVAR_NORMAL: c_int = 1;
pub const CV_COVAR_USE_AVG: c_int = 2;
pub const CV_COVAR_SCALE: c_int = 4;
pub const CV_COVAR_ROWS: c_int = 8;
pub const CV_COVAR_COLS: c_int = 16;

// --- Structures ---

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CvMatNDDim {
    pub size: c_int,
    pub step: c_int,
}

/// Header of a multi-dimensional dense array.
#[repr(C)]
pub struct CvMatND {
    pub type_: c_int,
    pub dims: c_int,
    pub refcount: *mut c_int,
    pub hdr_refcount: c_int,
    pub data: *mut u8,
    pub dim: [CvMatNDDim; CV_MAX_DIM],
}

/// Header of a 2-D matrix.
#[repr(C)]
pub struct CvMat {
    pub type_: c_int,
    pub step: c_int,
    pub refcount: *mut c_int,
    pub hdr_refcount: c_int,
    pub data: *mut u8,
    pub rows: c_int,
    pub cols: c_int,
}

#[repr(C)]
pub struct CvMemBlock {
    pub prev: *mut CvMemBlock,
    pub next: *mut CvMemBlock,
}

#[repr(C)]
pub struct CvMemStorage {
    pub signature: c_int,
    pub bottom: *mut CvMemBlock,
    pub top: *mut CvMemBlock,
    pub parent: *mut CvMemStorage,
    pub block_size: c_int,
    pub free_space: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CvPoint {
    pub x: c_int,
    pub y: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CvScalar {
    pub val: [c_double; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CvAttrList {
    pub attr: *const *const c_char,
    pub next: *mut CvAttrList,
}

impl CvAttrList {
    pub const fn empty() -> Self {
        CvAttrList {
            attr: std::ptr::null(),
            next: std::ptr::null_mut(),
        }
    }
}

// --- Callback signatures ---

pub type CvErrorCallback = unsafe extern "C" fn(
    status: c_int,
    func_name: *const c_char,
    err_msg: *const c_char,
    file_name: *const c_char,
    line: c_int,
    userdata: *mut c_void,
) -> c_int;

pub type CvAllocFunc = unsafe extern "C" fn(size: size_t, userdata: *mut c_void) -> *mut c_void;

pub type CvFreeFunc = unsafe extern "C" fn(pptr: *mut c_void, userdata: *mut c_void) -> c_int;

/// Function table for one bound copy of the native library.
///
/// Every entry has the exact C signature of the exported symbol of the same name.
#[derive(Clone, Copy)]
pub struct CxCore {
    // --- Memory and error hooks ---
    pub cvAlloc: unsafe extern "C" fn(size: size_t) -> *mut c_void,
    pub cvFree_: unsafe extern "C" fn(ptr: *mut c_void),
    pub cvSetMemoryManager: unsafe extern "C" fn(
        alloc_func: Option<CvAllocFunc>,
        free_func: Option<CvFreeFunc>,
        userdata: *mut c_void,
    ),
    pub cvRedirectError: unsafe extern "C" fn(
        error_handler: Option<CvErrorCallback>,
        userdata: *mut c_void,
        prev_userdata: *mut *mut c_void,
    ) -> Option<CvErrorCallback>,
    pub cvGetErrStatus: unsafe extern "C" fn() -> c_int,
    pub cvSetErrStatus: unsafe extern "C" fn(status: c_int),
    pub cvErrorStr: unsafe extern "C" fn(status: c_int) -> *const c_char,
    pub cvGetErrMode: unsafe extern "C" fn() -> c_int,
    /// Returns the mode that was active before the call.
    pub cvSetErrMode: unsafe extern "C" fn(mode: c_int) -> c_int,

    // --- Array creation and destruction ---
    pub cvCreateMatND:
        unsafe extern "C" fn(dims: c_int, sizes: *const c_int, type_: c_int) -> *mut CvMatND,
    pub cvCreateMatNDHeader:
        unsafe extern "C" fn(dims: c_int, sizes: *const c_int, type_: c_int) -> *mut CvMatND,
    pub cvInitMatNDHeader: unsafe extern "C" fn(
        mat: *mut CvMatND,
        dims: c_int,
        sizes: *const c_int,
        type_: c_int,
        data: *mut c_void,
    ) -> *mut CvMatND,
    pub cvCloneMatND: unsafe extern "C" fn(mat: *const CvMatND) -> *mut CvMatND,
    pub cvCreateMat: unsafe extern "C" fn(rows: c_int, cols: c_int, type_: c_int) -> *mut CvMat,
    pub cvCloneMat: unsafe extern "C" fn(mat: *const CvMat) -> *mut CvMat,
    /// Releases both `CvMat` and `CvMatND` headers (and their data when refcounted).
    pub cvReleaseMat: unsafe extern "C" fn(mat: *mut *mut CvMat),
    pub cvCreateMemStorage: unsafe extern "C" fn(block_size: c_int) -> *mut CvMemStorage,
    pub cvReleaseMemStorage: unsafe extern "C" fn(storage: *mut *mut CvMemStorage),
    /// Releases any object with a registered type.
    pub cvRelease: unsafe extern "C" fn(struct_ptr: *mut *mut c_void),

    // --- Persistence ---
    pub cvSave: unsafe extern "C" fn(
        filename: *const c_char,
        struct_ptr: *const c_void,
        name: *const c_char,
        comment: *const c_char,
        attributes: CvAttrList,
    ),
    pub cvLoad: unsafe extern "C" fn(
        filename: *const c_char,
        memstorage: *mut CvMemStorage,
        name: *const c_char,
        real_name: *mut *const c_char,
    ) -> *mut c_void,

    // --- Statistics (array-of-arrays argument) ---
    pub cvCalcCovarMatrix: unsafe extern "C" fn(
        vects: *mut *const c_void,
        count: c_int,
        cov_mat: *mut c_void,
        avg: *mut c_void,
        flags: c_int,
    ),

    // --- Drawing (jagged point-list arguments) ---
    pub cvFillPoly: unsafe extern "C" fn(
        img: *mut c_void,
        pts: *mut *mut CvPoint,
        npts: *const c_int,
        contours: c_int,
        color: CvScalar,
        line_type: c_int,
        shift: c_int,
    ),
    pub cvPolyLine: unsafe extern "C" fn(
        img: *mut c_void,
        pts: *mut *mut CvPoint,
        npts: *const c_int,
        contours: c_int,
        is_closed: c_int,
        color: CvScalar,
        thickness: c_int,
        line_type: c_int,
        shift: c_int,
    ),
}

// --- Header macros ---

pub const fn CV_MAKETYPE(depth: c_int, cn: c_int) -> c_int {
    (depth & CV_MAT_DEPTH_MASK) + ((cn - 1) << CV_CN_SHIFT)
}

pub const fn CV_MAT_DEPTH(flags: c_int) -> c_int {
    flags & CV_MAT_DEPTH_MASK
}

pub const fn CV_MAT_CN(flags: c_int) -> c_int {
    ((flags & CV_MAT_CN_MASK) >> CV_CN_SHIFT) + 1
}

pub const fn CV_MAT_TYPE(flags: c_int) -> c_int {
    flags & CV_MAT_TYPE_MASK
}

pub const fn CV_IS_MAT_CONT(flags: c_int) -> bool {
    flags & CV_MAT_CONT_FLAG != 0
}

/// Two bits of log2(channel size) per depth. `UserType` is pointer sized, so
/// the top pair depends on the target: `0xba50` on 32-bit, `0xfa50` on 64-bit.
pub const CV_ELEM_SIZE1_TABLE: c_int =
    ((size_of::<size_t>() / 4 + 1) * 16384) as c_int | 0x3a50;

/// Bytes per element (all channels).
pub const fn CV_ELEM_SIZE(type_: c_int) -> c_int {
    CV_MAT_CN(type_) << ((CV_ELEM_SIZE1_TABLE >> (CV_MAT_DEPTH(type_) * 2)) & 3)
}

/// Magic half of the first `int` of a typed native object.
///
/// # Safety
/// `ptr` must be null or point at a readable native object that starts with an `int`.
pub unsafe fn header_magic(ptr: *const c_void) -> c_int {
    if ptr.is_null() {
        return 0;
    }
    unsafe { *(ptr as *const c_int) & CV_MAGIC_MASK }
}

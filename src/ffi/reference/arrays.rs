// Array headers, refcounted data blocks and memory storages.

use std::mem::size_of;
use std::ptr;

use libc::{c_int, c_void};

use super::{cv_alloc, cv_free, raise};
use crate::ffi::cxcore_sys::*;

/// Bytes reserved in front of every data block for the shared refcount.
const DATA_PREFIX: usize = 16;

const CV_STORAGE_BLOCK_SIZE: c_int = (1 << 16) - 128;

/// Allocate `total` bytes of element storage with a refcount of one in front.
///
/// Returns `(refcount, data)`; both null on allocation failure.
unsafe fn create_data(total: usize) -> (*mut c_int, *mut u8) {
    let block = unsafe { cv_alloc(total + DATA_PREFIX) } as *mut u8;
    if block.is_null() {
        return (ptr::null_mut(), ptr::null_mut());
    }
    let refcount = block as *mut c_int;
    unsafe {
        *refcount = 1;
        (refcount, block.add(DATA_PREFIX))
    }
}

/// Drop one reference to the data block shared by a `CvMat`/`CvMatND` header.
///
/// Headers that alias caller memory carry no refcount and never free data.
unsafe fn dec_ref_data(mat: *mut CvMat) {
    let mat = unsafe { &mut *mat };
    if !mat.refcount.is_null() {
        unsafe {
            *mat.refcount -= 1;
            if *mat.refcount == 0 {
                cv_free(mat.refcount as *mut c_void);
            }
        }
    }
    mat.refcount = ptr::null_mut();
    mat.data = ptr::null_mut();
}

fn total_bytes_nd(mat: &CvMatND) -> usize {
    if mat.dims <= 0 {
        return 0;
    }
    (mat.dim[0].step as usize) * (mat.dim[0].size as usize)
}

// --- CvMatND ---

pub(super) unsafe extern "C" fn init_mat_nd_header(
    mat: *mut CvMatND,
    dims: c_int,
    sizes: *const c_int,
    type_: c_int,
    data: *mut c_void,
) -> *mut CvMatND {
    if mat.is_null() || sizes.is_null() {
        raise(CV_StsNullPtr, c"cvInitMatNDHeader", "NULL matrix header or sizes", line!());
        return ptr::null_mut();
    }
    if dims <= 0 || dims as usize > CV_MAX_DIM {
        raise(
            CV_StsOutOfRange,
            c"cvInitMatNDHeader",
            "non-positive or too large number of dimensions",
            line!(),
        );
        return ptr::null_mut();
    }

    let type_ = CV_MAT_TYPE(type_);
    let sizes = unsafe { std::slice::from_raw_parts(sizes, dims as usize) };
    let mut step = CV_ELEM_SIZE(type_) as i64;
    let mut dim = [CvMatNDDim::default(); CV_MAX_DIM];

    for i in (0..dims as usize).rev() {
        if sizes[i] < 0 {
            raise(
                CV_StsBadSize,
                c"cvInitMatNDHeader",
                "one of dimension sizes is non-positive",
                line!(),
            );
            return ptr::null_mut();
        }
        dim[i] = CvMatNDDim {
            size: sizes[i],
            step: step as c_int,
        };
        step *= sizes[i] as i64;
        if step > i32::MAX as i64 {
            raise(
                CV_StsOutOfRange,
                c"cvInitMatNDHeader",
                "the array is too big",
                line!(),
            );
            return ptr::null_mut();
        }
    }

    unsafe {
        let hdr = &mut *mat;
        hdr.type_ = CV_MATND_MAGIC_VAL | CV_MAT_CONT_FLAG | type_;
        hdr.dims = dims;
        hdr.data = data as *mut u8;
        hdr.refcount = ptr::null_mut();
        hdr.hdr_refcount = 0;
        hdr.dim = dim;
    }
    mat
}

pub(super) unsafe extern "C" fn create_mat_nd_header(
    dims: c_int,
    sizes: *const c_int,
    type_: c_int,
) -> *mut CvMatND {
    let mat = unsafe { cv_alloc(size_of::<CvMatND>()) } as *mut CvMatND;
    if mat.is_null() {
        return ptr::null_mut();
    }
    unsafe {
        ptr::write_bytes(mat, 0, 1);
        if init_mat_nd_header(mat, dims, sizes, type_, ptr::null_mut()).is_null() {
            cv_free(mat as *mut c_void);
            return ptr::null_mut();
        }
        (*mat).hdr_refcount = 1;
    }
    mat
}

pub(super) unsafe extern "C" fn create_mat_nd(
    dims: c_int,
    sizes: *const c_int,
    type_: c_int,
) -> *mut CvMatND {
    let mat = unsafe { create_mat_nd_header(dims, sizes, type_) };
    if mat.is_null() {
        return mat;
    }
    unsafe {
        let total = total_bytes_nd(&*mat);
        let (refcount, data) = create_data(total);
        if data.is_null() {
            cv_free(mat as *mut c_void);
            return ptr::null_mut();
        }
        (*mat).refcount = refcount;
        (*mat).data = data;
    }
    mat
}

pub(super) unsafe extern "C" fn clone_mat_nd(src: *const CvMatND) -> *mut CvMatND {
    if unsafe { header_magic(src as *const c_void) } != CV_MATND_MAGIC_VAL {
        raise(CV_StsBadArg, c"cvCloneMatND", "Bad CvMatND header", line!());
        return ptr::null_mut();
    }
    let src = unsafe { &*src };
    let sizes: Vec<c_int> = src.dim[..src.dims as usize].iter().map(|d| d.size).collect();

    let dst = unsafe { create_mat_nd_header(src.dims, sizes.as_ptr(), src.type_) };
    if dst.is_null() || src.data.is_null() {
        return dst;
    }
    unsafe {
        let total = total_bytes_nd(&*dst);
        let (refcount, data) = create_data(total);
        if data.is_null() {
            cv_free(dst as *mut c_void);
            return ptr::null_mut();
        }
        ptr::copy_nonoverlapping(src.data, data, total);
        (*dst).refcount = refcount;
        (*dst).data = data;
    }
    dst
}

// --- CvMat ---

unsafe fn create_mat_header(rows: c_int, cols: c_int, type_: c_int) -> *mut CvMat {
    if rows < 0 || cols < 0 {
        raise(CV_StsBadSize, c"cvCreateMatHeader", "Non-positive width or height", line!());
        return ptr::null_mut();
    }
    let type_ = CV_MAT_TYPE(type_);
    let step = CV_ELEM_SIZE(type_) as i64 * cols as i64;
    if step * rows as i64 > i32::MAX as i64 {
        raise(CV_StsOutOfRange, c"cvCreateMatHeader", "The matrix is too big", line!());
        return ptr::null_mut();
    }

    let mat = unsafe { cv_alloc(size_of::<CvMat>()) } as *mut CvMat;
    if mat.is_null() {
        return mat;
    }
    unsafe {
        ptr::write(
            mat,
            CvMat {
                type_: CV_MAT_MAGIC_VAL | CV_MAT_CONT_FLAG | type_,
                step: step as c_int,
                refcount: ptr::null_mut(),
                hdr_refcount: 1,
                data: ptr::null_mut(),
                rows,
                cols,
            },
        );
    }
    mat
}

pub(super) unsafe extern "C" fn create_mat(rows: c_int, cols: c_int, type_: c_int) -> *mut CvMat {
    let mat = unsafe { create_mat_header(rows, cols, type_) };
    if mat.is_null() {
        return mat;
    }
    unsafe {
        let total = (*mat).step as usize * rows as usize;
        let (refcount, data) = create_data(total);
        if data.is_null() {
            cv_free(mat as *mut c_void);
            return ptr::null_mut();
        }
        (*mat).refcount = refcount;
        (*mat).data = data;
    }
    mat
}

pub(super) unsafe extern "C" fn clone_mat(src: *const CvMat) -> *mut CvMat {
    if unsafe { header_magic(src as *const c_void) } != CV_MAT_MAGIC_VAL {
        raise(CV_StsBadArg, c"cvCloneMat", "Bad CvMat header", line!());
        return ptr::null_mut();
    }
    let src = unsafe { &*src };
    let dst = unsafe { create_mat(src.rows, src.cols, src.type_) };
    if dst.is_null() {
        return dst;
    }
    if !src.data.is_null() {
        let total = src.step as usize * src.rows as usize;
        unsafe { ptr::copy_nonoverlapping(src.data, (*dst).data, total) };
    }
    dst
}

pub(super) unsafe extern "C" fn release_mat(array: *mut *mut CvMat) {
    if array.is_null() {
        raise(CV_StsNullPtr, c"cvReleaseMat", "NULL double pointer", line!());
        return;
    }
    let mat = unsafe { *array };
    if mat.is_null() {
        return;
    }
    let magic = unsafe { header_magic(mat as *const c_void) };
    if magic != CV_MAT_MAGIC_VAL && magic != CV_MATND_MAGIC_VAL {
        raise(CV_StsBadFlag, c"cvReleaseMat", "Unknown array header", line!());
        return;
    }
    unsafe {
        *array = ptr::null_mut();
        dec_ref_data(mat);
        cv_free(mat as *mut c_void);
    }
}

// --- CvMemStorage ---

pub(super) unsafe extern "C" fn create_mem_storage(block_size: c_int) -> *mut CvMemStorage {
    let block_size = if block_size <= 0 {
        CV_STORAGE_BLOCK_SIZE
    } else {
        block_size
    };
    let storage = unsafe { cv_alloc(size_of::<CvMemStorage>()) } as *mut CvMemStorage;
    if storage.is_null() {
        return storage;
    }
    unsafe {
        ptr::write(
            storage,
            CvMemStorage {
                signature: CV_STORAGE_MAGIC_VAL,
                bottom: ptr::null_mut(),
                top: ptr::null_mut(),
                parent: ptr::null_mut(),
                block_size,
                free_space: block_size,
            },
        );
    }
    storage
}

pub(super) unsafe extern "C" fn release_mem_storage(storage: *mut *mut CvMemStorage) {
    if storage.is_null() {
        raise(CV_StsNullPtr, c"cvReleaseMemStorage", "", line!());
        return;
    }
    let st = unsafe { *storage };
    if st.is_null() {
        return;
    }
    if unsafe { header_magic(st as *const c_void) } != CV_STORAGE_MAGIC_VAL {
        raise(CV_StsBadArg, c"cvReleaseMemStorage", "Invalid memory storage", line!());
        return;
    }
    unsafe {
        *storage = ptr::null_mut();
        cv_free(st as *mut c_void);
    }
}

// --- Generic release ---

pub(super) unsafe extern "C" fn release(struct_ptr: *mut *mut c_void) {
    if struct_ptr.is_null() {
        raise(CV_StsNullPtr, c"cvRelease", "NULL double pointer", line!());
        return;
    }
    let obj = unsafe { *struct_ptr };
    if obj.is_null() {
        return;
    }
    match unsafe { header_magic(obj) } {
        CV_MAT_MAGIC_VAL | CV_MATND_MAGIC_VAL => unsafe {
            release_mat(struct_ptr as *mut *mut CvMat)
        },
        CV_STORAGE_MAGIC_VAL => unsafe {
            release_mem_storage(struct_ptr as *mut *mut CvMemStorage)
        },
        _ => raise(CV_StsBadArg, c"cvRelease", "Unknown object type", line!()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mat_nd_layout() {
        let sizes = [3, 4, 5];
        unsafe {
            let mat = create_mat_nd(3, sizes.as_ptr(), CV_MAKETYPE(2, 3));
            assert!(!mat.is_null());
            let hdr = &*mat;
            assert_eq!(header_magic(mat as *const c_void), CV_MATND_MAGIC_VAL);
            assert_eq!(hdr.dims, 3);
            // 16-bit, 3 channels: 6 bytes per element
            assert_eq!(hdr.dim[2].step, 6);
            assert_eq!(hdr.dim[1].step, 30);
            assert_eq!(hdr.dim[0].step, 120);
            assert_eq!(*hdr.refcount, 1);

            let mut p = mat as *mut CvMat;
            release_mat(&mut p);
            assert!(p.is_null());
        }
    }

    #[test]
    fn test_header_over_user_data_has_no_refcount() {
        let sizes = [2, 2];
        let mut buf = [0u8; 4];
        unsafe {
            let hdr = create_mat_nd_header(2, sizes.as_ptr(), CV_MAKETYPE(0, 1));
            let mat = init_mat_nd_header(hdr, 2, sizes.as_ptr(), CV_MAKETYPE(0, 1), buf.as_mut_ptr() as *mut c_void);
            assert_eq!(mat, hdr);
            assert!((*mat).refcount.is_null());
            assert_eq!((*mat).data, buf.as_mut_ptr());

            let mut p = mat as *mut c_void;
            release(&mut p);
            assert!(p.is_null());
        }
    }

    #[test]
    fn test_mem_storage_default_block_size() {
        unsafe {
            let mut storage = create_mem_storage(0);
            assert_eq!((*storage).block_size, CV_STORAGE_BLOCK_SIZE);
            release_mem_storage(&mut storage);
            assert!(storage.is_null());
        }
    }
}

// Save arrays to the native file storage and load them back as typed wrappers.

use std::ffi::{CStr, CString};
use std::path::Path;

use libc::{c_char, c_void};

use crate::error::{CvError, Result};
use crate::ffi::cxcore_sys::{
    CV_MAT_MAGIC_VAL, CV_MATND_MAGIC_VAL, CV_STORAGE_MAGIC_VAL, CvAttrList, CvMat, CvMatND,
    header_magic,
};
use crate::resource::array::NativeArray;
use crate::resource::context::CvContext;
use crate::resource::mat::Mat;
use crate::resource::mat_nd::MatND;
use crate::resource::mem_storage::MemStorage;

/// Concrete native object kinds a load can produce, identified by header magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKind {
    Mat,
    MatND,
    MemStorage,
}

impl NativeKind {
    /// Kind of the object at `ptr`, `None` if the magic is not recognised.
    ///
    /// # Safety
    /// `ptr` must be null or point at a readable native object.
    pub unsafe fn of(ptr: *const c_void) -> Option<Self> {
        match unsafe { header_magic(ptr) } {
            CV_MAT_MAGIC_VAL => Some(NativeKind::Mat),
            CV_MATND_MAGIC_VAL => Some(NativeKind::MatND),
            CV_STORAGE_MAGIC_VAL => Some(NativeKind::MemStorage),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NativeKind::Mat => "CvMat",
            NativeKind::MatND => "CvMatND",
            NativeKind::MemStorage => "CvMemStorage",
        }
    }
}

/// Wrapper types a load can construct.
///
/// Each implementor is one row of a closed construction table: it names the
/// native kind it wraps and how to take ownership of a freshly loaded object.
pub trait Loadable: Sized {
    const KIND: NativeKind;

    /// Take ownership of a loaded object already known to be of `KIND`.
    ///
    /// # Safety
    /// `ptr` must be a live object of `KIND` with no other owner.
    unsafe fn from_loaded(ctx: &CvContext, ptr: *mut c_void) -> Result<Self>;
}

impl Loadable for MatND {
    const KIND: NativeKind = NativeKind::MatND;

    unsafe fn from_loaded(ctx: &CvContext, ptr: *mut c_void) -> Result<Self> {
        unsafe { MatND::from_raw(ctx, ptr as *mut CvMatND) }
    }
}

impl Loadable for Mat {
    const KIND: NativeKind = NativeKind::Mat;

    unsafe fn from_loaded(ctx: &CvContext, ptr: *mut c_void) -> Result<Self> {
        unsafe { Mat::from_raw(ctx, ptr as *mut CvMat) }
    }
}

/// Result of a typed load: the owning wrapper and the node name found in the file.
#[derive(Debug)]
pub struct Loaded<T> {
    pub value: T,
    pub real_name: String,
}

/// Any array kind a storage file can hold.
#[derive(Debug)]
pub enum AnyArray {
    Mat(Mat),
    MatND(MatND),
}

impl AnyArray {
    pub fn kind(&self) -> NativeKind {
        match self {
            AnyArray::Mat(_) => NativeKind::Mat,
            AnyArray::MatND(_) => NativeKind::MatND,
        }
    }
}

fn path_arg(path: &Path) -> Result<CString> {
    let text = path
        .to_str()
        .ok_or_else(|| CvError::persistence("storage path contains non-UTF-8 characters"))?;
    CString::new(text).map_err(|_| CvError::persistence("storage path contains a NUL byte"))
}

fn opt_arg(value: Option<&str>, what: &str) -> Result<Option<CString>> {
    value
        .map(|v| {
            CString::new(v).map_err(|_| CvError::persistence(format!("{what} contains a NUL byte")))
        })
        .transpose()
}

fn opt_ptr(value: &Option<CString>) -> *const c_char {
    value.as_ref().map_or(std::ptr::null(), |v| v.as_ptr())
}

/// Raw load: the untyped object and its real name. The caller owns the object.
fn load_raw(
    ctx: &CvContext,
    path: &Path,
    storage: Option<&MemStorage>,
    name: Option<&str>,
) -> Result<(*mut c_void, String)> {
    let filename = path_arg(path)?;
    let name = opt_arg(name, "object name")?;
    let storage_ptr = match storage {
        Some(s) if s.is_invalid() => {
            return Err(CvError::invalid_argument("memory storage used after release"));
        }
        Some(s) => s.as_ptr(),
        None => std::ptr::null_mut(),
    };
    let api = ctx.api();

    let mut real_name: *const c_char = std::ptr::null();
    let obj = unsafe {
        (api.cvLoad)(
            filename.as_ptr(),
            storage_ptr,
            opt_ptr(&name),
            &mut real_name,
        )
    };

    // The name is cvAlloc'd by the library; copy it out and free it on every path.
    let resolved = if real_name.is_null() {
        String::new()
    } else {
        let text = unsafe { CStr::from_ptr(real_name) }
            .to_string_lossy()
            .into_owned();
        unsafe { (api.cvFree_)(real_name as *mut c_void) };
        text
    };

    if let Err(e) = ctx.check_status("cvLoad") {
        if !obj.is_null() {
            release_untyped(ctx, obj);
        }
        return Err(e);
    }
    if obj.is_null() {
        return Err(CvError::persistence(format!(
            "{} holds no object named {}",
            path.display(),
            name.as_ref()
                .map_or("<first>".into(), |n| n.to_string_lossy().into_owned())
        )));
    }
    Ok((obj, resolved))
}

fn release_untyped(ctx: &CvContext, obj: *mut c_void) {
    let before = ctx.status();
    let mut obj = obj;
    unsafe { (ctx.api().cvRelease)(&mut obj) };
    if let Err(e) = ctx.check_status_since("cvRelease", before) {
        tracing::error!(error = %e, "failed to release rejected object");
    }
}

/// Load an object from a storage file as wrapper type `T`.
///
/// `name` selects a node; `None` loads the first one. The returned wrapper
/// owns the object. If the file holds a different kind than `T` the object is
/// released and [`CvError::KindMismatch`] is returned.
pub fn load<T: Loadable>(
    ctx: &CvContext,
    path: &Path,
    storage: Option<&MemStorage>,
    name: Option<&str>,
) -> Result<Loaded<T>> {
    let (obj, real_name) = load_raw(ctx, path, storage, name)?;

    let found = unsafe { NativeKind::of(obj) };
    if found != Some(T::KIND) {
        tracing::warn!(
            expected = T::KIND.name(),
            found = found.map_or("unknown", NativeKind::name),
            "loaded object kind does not match requested wrapper"
        );
        release_untyped(ctx, obj);
        return Err(CvError::KindMismatch {
            expected: T::KIND.name(),
            found: found.map_or("unknown", NativeKind::name),
        });
    }

    let value = unsafe { T::from_loaded(ctx, obj)? };
    Ok(Loaded { value, real_name })
}

/// Load whatever array kind the node holds.
pub fn load_any(
    ctx: &CvContext,
    path: &Path,
    storage: Option<&MemStorage>,
    name: Option<&str>,
) -> Result<Loaded<AnyArray>> {
    let (obj, real_name) = load_raw(ctx, path, storage, name)?;
    let value = match unsafe { NativeKind::of(obj) } {
        Some(NativeKind::MatND) => AnyArray::MatND(unsafe { MatND::from_loaded(ctx, obj)? }),
        Some(NativeKind::Mat) => AnyArray::Mat(unsafe { Mat::from_loaded(ctx, obj)? }),
        other => {
            release_untyped(ctx, obj);
            return Err(CvError::KindMismatch {
                expected: "array",
                found: other.map_or("unknown", NativeKind::name),
            });
        }
    };
    Ok(Loaded { value, real_name })
}

/// Write `value` to `path` under `name` (or a name derived from the file name).
pub fn save<A: NativeArray + ?Sized>(
    path: &Path,
    value: &A,
    name: Option<&str>,
    comment: Option<&str>,
) -> Result<()> {
    let ctx = value.context();
    let arr = value.as_arr_ptr()?;
    let filename = path_arg(path)?;
    let name = opt_arg(name, "object name")?;
    let comment = opt_arg(comment, "comment")?;

    unsafe {
        (ctx.api().cvSave)(
            filename.as_ptr(),
            arr as *const c_void,
            opt_ptr(&name),
            opt_ptr(&comment),
            CvAttrList::empty(),
        )
    };
    ctx.check_status("cvSave")
}

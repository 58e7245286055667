// Runtime binding of the fixed-name cxcore shared library through libloading.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use libloading::Library;

use super::cxcore_sys::CxCore;
use crate::error::{CvError, Result};

/// Default base name of the native core library.
pub const DEFAULT_LIBRARY_NAME: &str = "opencv_core231";

/// A loaded native library together with its resolved function table.
///
/// The table's function pointers are only valid while the library stays loaded.
pub struct BoundLibrary {
    pub(crate) api: CxCore,
    pub(crate) path: PathBuf,
    _library: Library,
}

/// Platform file name for a library base name (`libfoo.so`, `foo.dll`, ...).
pub fn platform_file_name(name: &str) -> OsString {
    libloading::library_filename(name)
}

/// Resolve where to load the library from.
///
/// An explicit path wins. Otherwise the platform file name of `name` is returned
/// as-is, leaving the search to the system loader.
pub fn resolve_library_path(name: &str, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(platform_file_name(name)),
    }
}

/// Resolve one exported symbol and copy out its function pointer.
unsafe fn symbol<T: Copy>(library: &Library, name: &str) -> Result<T> {
    let mut raw = Vec::with_capacity(name.len() + 1);
    raw.extend_from_slice(name.as_bytes());
    raw.push(0);
    let sym = unsafe { library.get::<T>(&raw) }
        .map_err(|e| CvError::library(format!("symbol '{name}' not found: {e}")))?;
    Ok(*sym)
}

macro_rules! bind_symbols {
    ($lib:expr, $($sym:ident),* $(,)?) => {
        CxCore {
            $(
                $sym: symbol(&$lib, stringify!($sym))?,
            )*
        }
    };
}

impl BoundLibrary {
    /// Load the library at `path` and resolve every entry point of [`CxCore`].
    ///
    /// # Safety
    /// Loading runs the library's initialisers in this process. The library must
    /// export each symbol with exactly the C signature declared in [`CxCore`].
    pub unsafe fn open(path: &Path) -> Result<Self> {
        let library = unsafe { Library::new(path) }.map_err(|e| {
            CvError::library(format!("failed to load {}: {e}", path.display()))
        })?;

        let api = unsafe {
            bind_symbols!(
                library,
                cvAlloc,
                cvFree_,
                cvSetMemoryManager,
                cvRedirectError,
                cvGetErrStatus,
                cvSetErrStatus,
                cvErrorStr,
                cvGetErrMode,
                cvSetErrMode,
                cvCreateMatND,
                cvCreateMatNDHeader,
                cvInitMatNDHeader,
                cvCloneMatND,
                cvCreateMat,
                cvCloneMat,
                cvReleaseMat,
                cvCreateMemStorage,
                cvReleaseMemStorage,
                cvRelease,
                cvSave,
                cvLoad,
                cvCalcCovarMatrix,
                cvFillPoly,
                cvPolyLine,
            )
        };

        tracing::debug!(path = %path.display(), "bound native core library");

        Ok(BoundLibrary {
            api,
            path: path.to_path_buf(),
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

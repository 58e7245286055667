use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

use crate::config::settings::{Backend, Settings};
use crate::error::{CvError, Result};
use crate::ffi::cxcore_sys::{CV_StsOk, CxCore};
use crate::ffi::loader::{self, BoundLibrary};
#[cfg(feature = "reference-backend")]
use crate::ffi::reference;
use crate::resource::pressure::MemoryPressure;

/// One binding of the native core library plus the pressure gauge of the
/// wrappers created through it.
///
/// Cloning is cheap; every wrapper keeps a clone so the bound library outlives
/// all native objects allocated from it.
#[derive(Clone)]
pub struct CvContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    api: CxCore,
    pressure: MemoryPressure,
    // Keeps the function pointers in `api` valid.
    library: Option<BoundLibrary>,
}

impl CvContext {
    /// Bind the in-process reference implementation.
    #[cfg(feature = "reference-backend")]
    pub fn reference() -> Self {
        Self::with_api(reference::api(), None, None)
    }

    /// Same as [`CvContext::reference`] with a pressure warning threshold.
    #[cfg(feature = "reference-backend")]
    pub fn reference_with_threshold(warn_bytes: Option<u64>) -> Self {
        Self::with_api(reference::api(), None, warn_bytes)
    }

    #[cfg(feature = "reference-backend")]
    fn reference_backend(warn_bytes: Option<u64>) -> Result<Self> {
        Ok(Self::reference_with_threshold(warn_bytes))
    }

    #[cfg(not(feature = "reference-backend"))]
    fn reference_backend(_warn_bytes: Option<u64>) -> Result<Self> {
        Err(CvError::config(
            "backend 'reference' requires the `reference-backend` feature",
        ))
    }

    /// Bind the shared library at `path`.
    ///
    /// # Safety
    /// See [`BoundLibrary::open`]: the library runs initialisers in-process and must
    /// export every entry point with the declared C signature.
    pub unsafe fn open(path: &Path) -> Result<Self> {
        let library = unsafe { BoundLibrary::open(path)? };
        Ok(Self::with_api(library.api, Some(library), None))
    }

    /// Bind the backend selected by `settings`.
    ///
    /// # Safety
    /// Same contract as [`CvContext::open`] when the shared backend is selected.
    pub unsafe fn from_settings(settings: &Settings) -> Result<Self> {
        match settings.backend {
            Backend::Reference => Self::reference_backend(settings.pressure_warn_bytes),
            Backend::Shared => {
                let path = loader::resolve_library_path(
                    &settings.library_name,
                    settings.library_path.as_deref(),
                );
                let library = unsafe { BoundLibrary::open(&path)? };
                Ok(Self::with_api(
                    library.api,
                    Some(library),
                    settings.pressure_warn_bytes,
                ))
            }
        }
    }

    fn with_api(api: CxCore, library: Option<BoundLibrary>, warn_bytes: Option<u64>) -> Self {
        CvContext {
            inner: Arc::new(ContextInner {
                api,
                pressure: MemoryPressure::new(warn_bytes),
                library,
            }),
        }
    }

    pub fn api(&self) -> &CxCore {
        &self.inner.api
    }

    pub fn pressure(&self) -> &MemoryPressure {
        &self.inner.pressure
    }

    /// Path of the bound shared library, `None` for the reference backend.
    pub fn library_path(&self) -> Option<&Path> {
        self.inner.library.as_ref().map(|l| l.path())
    }

    /// Current value of the ambient native status cell.
    pub fn status(&self) -> i32 {
        unsafe { (self.inner.api.cvGetErrStatus)() }
    }

    /// Human-readable text for a native status code.
    pub fn error_str(&self, status: i32) -> String {
        let text = unsafe { (self.inner.api.cvErrorStr)(status) };
        if text.is_null() {
            return format!("status {status}");
        }
        unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned()
    }

    /// Surface a failure reported through the status cell after `op`.
    ///
    /// A non-zero status is reset to OK and returned as [`CvError::Native`].
    pub fn check_status(&self, op: &'static str) -> Result<()> {
        let status = self.status();
        if status == CV_StsOk {
            return Ok(());
        }
        unsafe { (self.inner.api.cvSetErrStatus)(CV_StsOk) };
        let message = self.error_str(status);
        tracing::debug!(op, status, %message, "native call reported failure");
        Err(CvError::Native {
            op,
            status,
            message,
        })
    }

    /// Surface a failure of `op` given the status it started from.
    ///
    /// Only a status that differs from `before` counts. The cell is put back to
    /// `before`, so an earlier pending failure stays with its own caller.
    pub fn check_status_since(&self, op: &'static str, before: i32) -> Result<()> {
        let status = self.status();
        if status == before {
            return Ok(());
        }
        unsafe { (self.inner.api.cvSetErrStatus)(before) };
        let message = self.error_str(status);
        tracing::debug!(op, status, before, %message, "native call reported failure");
        Err(CvError::Native {
            op,
            status,
            message,
        })
    }

    /// True if both handles refer to the same binding.
    pub fn same_binding(&self, other: &CvContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for CvContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CvContext")
            .field("library", &self.library_path())
            .field("pressure", &self.inner.pressure.current())
            .finish()
    }
}

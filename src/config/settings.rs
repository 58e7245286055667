use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::ffi::loader::DEFAULT_LIBRARY_NAME;

/// Which implementation of the native entry points a context binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The in-process implementation behind the `reference-backend` feature.
    Reference,
    /// A system build of the native core library, bound at runtime.
    #[default]
    Shared,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend: Backend,
    /// Base name of the shared library, without platform prefix or suffix.
    pub library_name: String,
    /// Explicit library path; overrides `library_name` when set.
    pub library_path: Option<PathBuf>,
    /// Log a warning when tracked native memory crosses this many bytes.
    pub pressure_warn_bytes: Option<u64>,
    /// Default `tracing` filter directive for the CLI.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            backend: Backend::Shared,
            library_name: DEFAULT_LIBRARY_NAME.to_string(),
            library_path: None,
            pressure_warn_bytes: None,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        serde_yml::from_str(yaml).map_err(|e| {
            crate::error::CvError::config(format!("Failed to parse settings YAML: {e}"))
        })
    }

    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CvError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Native library error: {0}")]
    LibraryError(String),

    #[error("{op} failed with status {status}: {message}")]
    Native {
        op: &'static str,
        status: i32,
        message: String,
    },

    #[error("Construction error: {0}")]
    ConstructionError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Generates factory methods for [`CvError`] variants that wrap a `String`.
macro_rules! error_constructors {
    ($(
        $(#[doc = $doc:expr])*
        $method:ident => $variant:ident
    ),* $(,)?) => {
        impl CvError {
            $(
                $(#[doc = $doc])*
                pub fn $method(msg: impl Into<String>) -> Self {
                    Self::$variant(msg.into())
                }
            )*
        }
    };
}

error_constructors! {
    /// Create a configuration error.
    config => ConfigError,
    /// Create a native library binding error.
    library => LibraryError,
    /// Create a construction error.
    construction => ConstructionError,
    /// Create an invalid argument error.
    invalid_argument => InvalidArgument,
    /// Create a persistence error.
    persistence => PersistenceError,
}

impl CvError {
    /// Native status code carried by this error, if it came from the native status cell.
    pub fn status(&self) -> Option<i32> {
        match self {
            Self::Native { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<libloading::Error> for CvError {
    fn from(e: libloading::Error) -> Self {
        Self::LibraryError(e.to_string())
    }
}

impl From<serde_yml::Error> for CvError {
    fn from(e: serde_yml::Error) -> Self {
        Self::ConfigError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CvError>;

pub mod config;
pub mod covariance;
pub mod drawing;
pub mod error;
pub mod ffi;
pub mod logging;
pub mod marshal;
pub mod persistence;
pub mod redirect;
pub mod resource;

pub use error::{CvError, Result};
pub use resource::context::CvContext;
pub use resource::mat::Mat;
pub use resource::mat_nd::{BorrowedMatND, MatND};
pub use resource::mat_type::{MatDepth, MatType};
pub use resource::mem_storage::MemStorage;

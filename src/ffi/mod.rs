pub mod cxcore_sys;
pub mod loader;
#[cfg(feature = "reference-backend")]
pub mod reference;

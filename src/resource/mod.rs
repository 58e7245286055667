pub mod array;
pub mod context;
pub mod handle;
pub mod mat;
pub mod mat_nd;
pub mod mat_type;
pub mod mem_storage;
pub mod pressure;

pub mod cache;
pub mod handle;
pub mod types;

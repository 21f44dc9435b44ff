pub mod proxy;
pub mod types;

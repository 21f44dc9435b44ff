pub mod cmd;
pub mod types;

pub mod docker;
#[cfg(test)]
pub mod stub;
pub mod types;

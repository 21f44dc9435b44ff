use std::sync::Arc;

use crate::lib::runtime::types::{ContainerRuntime, Stdin};

/// Builds commands bound to a single execution target.
pub trait Cmder {
    fn command(&self, name: &str, args: &[&str]) -> Cmd;
}

/// A `Cmder` whose commands run inside one container.
#[derive(Debug, Clone)]
pub struct ContainerCmder {
    pub container: String,
    pub runtime: Arc<dyn ContainerRuntime>,
}

pub struct Cmd {
    pub container: String,
    pub argv: Vec<String>,
    pub stdin: Option<Stdin>,
    pub runtime: Arc<dyn ContainerRuntime>,
}

use crate::lib::env::types::EnvSource;

pub const ADDRESS_ENV: &str = "KIND_NODE_ADDRESS";
pub const PORT_ENV: &str = "KIND_NODE_PORT";
pub const NODES_ENV: &str = "KIND_NODES";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub address: String,
    pub port: String,
    /// Container names of the cluster nodes to serve.
    pub nodes: Vec<String>,
}

impl Config {
    pub fn from_env(env: &impl EnvSource) -> Self {
        let nodes = env
            .var(NODES_ENV)
            .map(|names| {
                names
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Config {
            address: env.var(ADDRESS_ENV).unwrap_or_else(|| "localhost".to_string()),
            port: env.var(PORT_ENV).unwrap_or_else(|| "8080".to_string()),
            nodes,
        }
    }
}

use std::{error::Error, sync::Arc};

use crate::lib::{
    config::types::Config,
    env::types::ProcessEnv,
    node::types::Node,
    runtime::types::{ContainerRuntime, DockerRuntime},
    server::types::NodeServer,
};

mod lib {
    pub mod config;
    pub mod env;
    pub mod exec;
    pub mod node;
    pub mod proxy;
    pub mod runtime;
    pub mod server;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env(&ProcessEnv);
    if config.nodes.is_empty() {
        tracing::warn!("no nodes configured, set KIND_NODES to a comma-separated list of node containers");
    }

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::connect()?);
    let nodes = config
        .nodes
        .iter()
        .map(|name| Node::new(name, runtime.clone()))
        .collect();

    let server = NodeServer::new(nodes, &config.address, &config.port);
    server.start_server(ProcessEnv).await?;

    Ok(())
}

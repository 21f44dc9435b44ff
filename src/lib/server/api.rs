use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State as AxumState},
    http::StatusCode,
    routing::{get, post, put},
};

use super::types::{ApiError, CopyRequest, NodeInfo, NodeServer, PortMapping};
use crate::lib::env::types::EnvSource;
use crate::lib::node::types::Node;
use crate::lib::proxy::{proxy::get_proxy_details, types::ProxyDetails};
use futures_util::TryStreamExt;
use std::{io, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::io::StreamReader;

impl NodeServer {
    pub fn new(nodes: Vec<Node>, address: &str, port: &str) -> Self {
        Self {
            nodes: nodes
                .into_iter()
                .map(|node| (node.name().to_string(), Arc::new(node)))
                .collect(),
            address: address.to_string(),
            port: port.to_string(),
        }
    }

    fn node(&self, name: &str) -> Result<Arc<Node>, ApiError> {
        self.nodes
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::NodeNotFound(name.to_string()))
    }

    async fn healthz() -> &'static str {
        "ok"
    }

    async fn list_nodes(AxumState(server): AxumState<Arc<NodeServer>>) -> Json<Vec<String>> {
        Json(server.nodes.keys().cloned().collect())
    }

    async fn node_info(
        AxumState(server): AxumState<Arc<NodeServer>>,
        Path(name): Path<String>,
    ) -> Result<Json<NodeInfo>, ApiError> {
        let node = server.node(&name)?;
        let (role, ip, kube_version) =
            tokio::try_join!(node.role(), node.ip(), node.kube_version())?;
        Ok(Json(NodeInfo {
            name,
            role,
            ip,
            kube_version,
        }))
    }

    async fn port_mapping(
        AxumState(server): AxumState<Arc<NodeServer>>,
        Path((name, container_port)): Path<(String, u16)>,
    ) -> Result<Json<PortMapping>, ApiError> {
        let host_port = server.node(&name)?.ports(container_port).await?;
        Ok(Json(PortMapping {
            container_port,
            host_port,
        }))
    }

    async fn inspect_image(
        AxumState(server): AxumState<Arc<NodeServer>>,
        Path((name, image)): Path<(String, String)>,
    ) -> Result<Json<Vec<String>>, ApiError> {
        let lines = server.node(&name)?.image_inspect(&image).await?;
        Ok(Json(lines))
    }

    async fn load_image(
        AxumState(server): AxumState<Arc<NodeServer>>,
        Path(name): Path<String>,
        archive: Body,
    ) -> Result<StatusCode, ApiError> {
        let node = server.node(&name)?;
        tracing::info!(node = %node, "loading image archive");
        let archive = StreamReader::new(archive.into_data_stream().map_err(io::Error::other));
        node.load_image_archive(archive).await?;
        Ok(StatusCode::CREATED)
    }

    async fn write_file(
        AxumState(server): AxumState<Arc<NodeServer>>,
        Path((name, path)): Path<(String, String)>,
        content: String,
    ) -> Result<StatusCode, ApiError> {
        let dest = format!("/{}", path.trim_start_matches('/'));
        server.node(&name)?.write_file(&dest, &content).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    async fn copy_to(
        AxumState(server): AxumState<Arc<NodeServer>>,
        Path(name): Path<String>,
        Json(request): Json<CopyRequest>,
    ) -> Result<StatusCode, ApiError> {
        let node = server.node(&name)?;
        node.copy_to(std::path::Path::new(&request.source), &request.dest)
            .await?;
        Ok(StatusCode::NO_CONTENT)
    }

    async fn copy_from(
        AxumState(server): AxumState<Arc<NodeServer>>,
        Path(name): Path<String>,
        Json(request): Json<CopyRequest>,
    ) -> Result<StatusCode, ApiError> {
        let node = server.node(&name)?;
        node.copy_from(&request.source, std::path::Path::new(&request.dest))
            .await?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub fn router(self, env: impl EnvSource + Clone + Send + Sync + 'static) -> Router {
        let shared = Arc::new(self);
        let proxy = move || {
            let env = env.clone();
            async move { Json::<ProxyDetails>(get_proxy_details(&env)) }
        };

        Router::new()
            .route("/healthz", get(NodeServer::healthz))
            .route("/proxy", get(proxy))
            .route("/nodes", get(NodeServer::list_nodes))
            .route("/nodes/{name}", get(NodeServer::node_info))
            .route("/nodes/{name}/ports/{port}", get(NodeServer::port_mapping))
            .route("/nodes/{name}/images/{*image}", get(NodeServer::inspect_image))
            .route("/nodes/{name}/images", post(NodeServer::load_image))
            .route("/nodes/{name}/files/{*path}", put(NodeServer::write_file))
            .route("/nodes/{name}/copy-to", post(NodeServer::copy_to))
            .route("/nodes/{name}/copy-from", post(NodeServer::copy_from))
            .with_state(shared)
    }

    pub async fn start_server(self, env: impl EnvSource + Clone + Send + Sync + 'static) -> io::Result<()> {
        let address = self.address.clone();
        let port = self.port.clone();
        tracing::info!(nodes = ?self.nodes.keys().collect::<Vec<_>>(), "starting node server");

        let app = self.router(env);
        let listener = TcpListener::bind(format!("{}:{}", address, port)).await?;
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Listening on http://{addr}");
        }

        axum::serve(listener, app).await
    }
}

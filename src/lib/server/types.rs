use std::{collections::BTreeMap, error::Error, sync::Arc};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::lib::node::types::{Node, NodeError};

/// HTTP surface over a fixed set of node handles.
#[derive(Debug)]
pub struct NodeServer {
    pub nodes: BTreeMap<String, Arc<Node>>,
    pub address: String,
    pub port: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub role: String,
    pub ip: String,
    pub kube_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
}

/// Source and destination of a copy between the host and a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyRequest {
    pub source: String,
    pub dest: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("node {0:?} not found")]
    NodeNotFound(String),

    #[error(transparent)]
    Node(#[from] NodeError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NodeNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Node(NodeError::TransferFailed { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Node(_) => StatusCode::BAD_GATEWAY,
        };

        let mut message = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            message.push_str(&format!(": {}", cause));
            source = cause.source();
        }
        if status.is_server_error() {
            tracing::error!(%message, "request failed");
        }

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

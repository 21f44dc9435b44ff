use std::{collections::HashMap, fmt, num::ParseIntError, sync::Arc};

use tokio::sync::RwLock;

use crate::lib::runtime::types::{ContainerRuntime, RuntimeError};

/// Label carrying the node's role in the cluster.
pub const NODE_ROLE_LABEL: &str = "io.x-k8s.kind.role";
/// File inside the node image holding the Kubernetes version.
pub const KUBE_VERSION_FILE: &str = "/kind/version";
pub const CONTAINERD_SOCKET: &str = "/var/run/containerd/containerd.sock";
/// containerd namespace whose images are visible to the kubelet.
pub const IMAGE_NAMESPACE: &str = "k8s.io";

/// Handle to a single cluster node backed by a running container.
///
/// Handles are created by the workflow that knows which containers are nodes;
/// once created they can be shared freely across tasks.
#[derive(Debug)]
pub struct Node {
    pub(super) name: String,
    pub(super) runtime: Arc<dyn ContainerRuntime>,
    pub(super) cache: NodeCache,
}

/// Slow-changing facts about a node. Empty strings and absent ports mean "not fetched yet".
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NodeFacts {
    pub kubernetes_version: String,
    pub ip: String,
    pub ports: HashMap<u16, u16>,
    pub role: String,
}

#[derive(Debug, Default)]
pub struct NodeCache {
    pub(super) facts: RwLock<NodeFacts>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStep {
    CopyTo,
    CopyFrom,
    CreateDirectory,
    WriteContent,
    LoadImage,
}

impl fmt::Display for TransferStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStep::CopyTo => write!(f, "copy to node"),
            TransferStep::CopyFrom => write!(f, "copy from node"),
            TransferStep::CreateDirectory => write!(f, "create directory"),
            TransferStep::WriteContent => write!(f, "write content"),
            TransferStep::LoadImage => write!(f, "load image archive"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("failed to {operation}")]
    RuntimeQueryFailed {
        operation: String,
        #[source]
        source: RuntimeError,
    },

    #[error("{what} should only be one line, got {lines} lines")]
    UnexpectedOutputShape { what: String, lines: usize },

    #[error("{what} has malformed value {value:?}")]
    MalformedValue {
        what: String,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("failed to {step} for {path}")]
    TransferFailed {
        step: TransferStep,
        path: String,
        #[source]
        source: RuntimeError,
    },
}

pub type NodeResult<T> = Result<T, NodeError>;

use std::{fmt, path::Path};

use async_trait::async_trait;
use bollard::Docker;
use tokio::io::AsyncRead;

/// Standard input streamed into a command running inside a container.
pub type Stdin = Box<dyn AsyncRead + Send + Unpin>;

/// A narrowly scoped fact read from a container's metadata.
///
/// Each driver translates these into its own inspection mechanism, so node
/// logic never carries runtime-specific template syntax.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    /// The IP address of the container on its network.
    Ip,
    /// The value of a container label.
    Label(String),
    /// The host port published for a container-internal TCP port.
    HostPort(u16),
}

pub struct ExecRequest {
    pub argv: Vec<String>,
    pub stdin: Option<Stdin>,
}

impl fmt::Debug for ExecRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecRequest")
            .field("argv", &self.argv)
            .field("stdin", &self.stdin.as_ref().map(|_| "<stream>"))
            .finish()
    }
}

/// The container runtime as seen by a node: inspection, command execution
/// and file copies, all addressed by container name or ID.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + fmt::Debug {
    /// Returns the queried field as lines of text. An absent field yields no lines.
    async fn inspect(&self, container: &str, query: &Query) -> RuntimeResult<Vec<String>>;

    /// Runs `request.argv` inside the container and returns the combined
    /// stdout and stderr. A non-zero exit status is an error.
    async fn exec(&self, container: &str, request: ExecRequest) -> RuntimeResult<Vec<u8>>;

    async fn copy_to(&self, host_path: &Path, container: &str, node_path: &str)
    -> RuntimeResult<()>;

    async fn copy_from(
        &self,
        container: &str,
        node_path: &str,
        host_path: &Path,
    ) -> RuntimeResult<()>;
}

#[derive(Debug, Clone)]
pub struct DockerRuntime {
    pub client: Docker,
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("docker API request failed")]
    Docker(#[from] bollard::errors::Error),

    #[error("command {command:?} exited with status {code}")]
    ExitStatus {
        command: Vec<String>,
        code: i64,
        output: Vec<String>,
    },

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("background task failed")]
    Task(#[from] tokio::task::JoinError),

    #[error("invalid path {0:?}")]
    InvalidPath(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

use super::types::{
    CONTAINERD_SOCKET, IMAGE_NAMESPACE, KUBE_VERSION_FILE, NODE_ROLE_LABEL, Node, NodeCache,
    NodeError, NodeResult, TransferStep,
};
use crate::lib::exec::types::{Cmd, Cmder, ContainerCmder};
use crate::lib::runtime::types::{ContainerRuntime, Query};
use std::{fmt, io::Cursor, path::Path, sync::Arc};
use tokio::io::AsyncRead;

impl Node {
    pub(crate) fn new(name: &str, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Node {
            name: name.to_string(),
            runtime,
            cache: NodeCache::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a `Cmder` whose commands run inside this node's container.
    pub fn cmder(&self) -> ContainerCmder {
        ContainerCmder::new(&self.name, self.runtime.clone())
    }

    /// Copies `source` on the host to `dest` on the node. An existing
    /// directory at `dest` receives `source` under its own name.
    ///
    /// Symlinks are not preserved: links under `source` arrive as the files
    /// they point to.
    pub async fn copy_to(&self, source: &Path, dest: &str) -> NodeResult<()> {
        self.runtime
            .copy_to(source, &self.name, dest)
            .await
            .map_err(|source| NodeError::TransferFailed {
                step: TransferStep::CopyTo,
                path: dest.to_string(),
                source,
            })
    }

    /// Copies `source` on the node to `dest` on the host. An existing
    /// directory at `dest` receives `source` under its own name.
    ///
    /// Links inside the copied tree are recreated, but nothing is written
    /// through a link to a location outside `dest`.
    pub async fn copy_from(&self, source: &str, dest: &Path) -> NodeResult<()> {
        self.runtime
            .copy_from(&self.name, source, dest)
            .await
            .map_err(|source| NodeError::TransferFailed {
                step: TransferStep::CopyFrom,
                path: dest.display().to_string(),
                source,
            })
    }

    /// Returns the Kubernetes version installed on the node.
    pub async fn kube_version(&self) -> NodeResult<String> {
        if let Some(version) = self.cache.kube_version().await {
            return Ok(version);
        }

        tracing::debug!(node = %self.name, "reading kubernetes version");
        let lines = self
            .command("cat", &[KUBE_VERSION_FILE])
            .output_lines()
            .await
            .map_err(|source| NodeError::RuntimeQueryFailed {
                operation: format!("read {KUBE_VERSION_FILE}"),
                source,
            })?;
        let version = single_line(KUBE_VERSION_FILE, lines)?;

        self.cache.set_kube_version(&version).await;
        Ok(version)
    }

    /// Returns the IP address of the node.
    pub async fn ip(&self) -> NodeResult<String> {
        if let Some(ip) = self.cache.ip().await {
            return Ok(ip);
        }

        tracing::debug!(node = %self.name, "inspecting node IP");
        let lines = self
            .inspect(&Query::Ip, "get node IP address")
            .await?;
        let ip = single_line("node IP address", lines)?;

        self.cache.set_ip(&ip).await;
        Ok(ip)
    }

    /// Returns the host port published for `container_port`.
    ///
    /// Nodes listen on well known ports internally; the random host ports are
    /// what makes the cluster reachable from the host machine.
    pub async fn ports(&self, container_port: u16) -> NodeResult<u16> {
        if let Some(host_port) = self.cache.host_port(container_port).await {
            return Ok(host_port);
        }

        tracing::debug!(node = %self.name, container_port, "inspecting port mapping");
        let what = format!("host port for {container_port}/tcp");
        let lines = self
            .inspect(&Query::HostPort(container_port), &format!("get {what}"))
            .await?;
        let value = single_line(&what, lines)?;
        let host_port = value
            .trim()
            .parse::<u16>()
            .map_err(|source| NodeError::MalformedValue {
                what,
                value: value.clone(),
                source,
            })?;

        self.cache.set_host_port(container_port, host_port).await;
        Ok(host_port)
    }

    /// Returns the role of the node, e.g. `control-plane` or `worker`.
    pub async fn role(&self) -> NodeResult<String> {
        if let Some(role) = self.cache.role().await {
            return Ok(role);
        }

        tracing::debug!(node = %self.name, "inspecting node role");
        let lines = self
            .inspect(
                &Query::Label(NODE_ROLE_LABEL.to_string()),
                &format!("get {NODE_ROLE_LABEL:?} label"),
            )
            .await?;
        let label = single_line(&format!("{NODE_ROLE_LABEL:?} label"), lines)?;
        let role = label.trim_matches('\'').to_string();

        self.cache.set_role(&role).await;
        Ok(role)
    }

    /// Writes `content` to `dest` on the node, creating parent directories.
    /// Concurrent writers to the same path race; the last one wins.
    pub async fn write_file(&self, dest: &str, content: &str) -> NodeResult<()> {
        let dir = parent_dir(dest);
        self.command("mkdir", &["-p", &dir])
            .run_logging_output_on_fail()
            .await
            .map_err(|source| NodeError::TransferFailed {
                step: TransferStep::CreateDirectory,
                path: dest.to_string(),
                source,
            })?;

        self.command("cp", &["/dev/stdin", dest])
            .set_stdin(Cursor::new(content.to_string()))
            .run()
            .await
            .map_err(|source| NodeError::TransferFailed {
                step: TransferStep::WriteContent,
                path: dest.to_string(),
                source,
            })
    }

    /// Returns low-level information on an image in the node's image store.
    pub async fn image_inspect(&self, name_or_id: &str) -> NodeResult<Vec<String>> {
        self.command(
            "crictl",
            &["-r", CONTAINERD_SOCKET, "inspecti", name_or_id],
        )
        .output_lines()
        .await
        .map_err(|source| NodeError::RuntimeQueryFailed {
            operation: format!("inspect image {name_or_id}"),
            source,
        })
    }

    /// Loads an image archive into the kubelet's containerd namespace so pods
    /// on this node can use it. The reader is consumed fully.
    pub async fn load_image_archive(
        &self,
        image: impl AsyncRead + Send + Unpin + 'static,
    ) -> NodeResult<()> {
        let namespace = format!("--namespace={IMAGE_NAMESPACE}");
        self.command("ctr", &[&namespace, "images", "import", "-"])
            .set_stdin(image)
            .run()
            .await
            .map_err(|source| NodeError::TransferFailed {
                step: TransferStep::LoadImage,
                path: self.name.clone(),
                source,
            })
    }

    async fn inspect(&self, query: &Query, operation: &str) -> NodeResult<Vec<String>> {
        self.runtime
            .inspect(&self.name, query)
            .await
            .map_err(|source| NodeError::RuntimeQueryFailed {
                operation: operation.to_string(),
                source,
            })
    }
}

impl Cmder for Node {
    fn command(&self, name: &str, args: &[&str]) -> Cmd {
        self.cmder().command(name, args)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

fn single_line(what: &str, lines: Vec<String>) -> NodeResult<String> {
    let [line] = <[String; 1]>::try_from(lines).map_err(|lines| {
        NodeError::UnexpectedOutputShape {
            what: what.to_string(),
            lines: lines.len(),
        }
    })?;
    Ok(line)
}

fn parent_dir(path: &str) -> String {
    match Path::new(path).parent().and_then(|parent| parent.to_str()) {
        Some("") | None if path.starts_with('/') => "/".to_string(),
        Some("") | None => ".".to_string(),
        Some(parent) => parent.to_string(),
    }
}

use super::types::{ContainerRuntime, DockerRuntime, ExecRequest, Query, RuntimeError, RuntimeResult};
use async_trait::async_trait;
use bollard::{
    Docker,
    container::{DownloadFromContainerOptions, InspectContainerOptions, UploadToContainerOptions},
    exec::{CreateExecOptions, StartExecResults},
    models::ContainerInspectResponse,
};
use futures_util::stream::StreamExt;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tokio::io::AsyncWriteExt;

impl DockerRuntime {
    pub fn connect() -> RuntimeResult<Self> {
        let client = Docker::connect_with_unix_defaults()?;
        Ok(DockerRuntime { client })
    }

    async fn node_is_dir(&self, container: &str, node_path: &str) -> RuntimeResult<bool> {
        let request = ExecRequest {
            argv: vec!["test".to_string(), "-d".to_string(), node_path.to_string()],
            stdin: None,
        };
        match self.exec(container, request).await {
            Ok(_) => Ok(true),
            Err(RuntimeError::ExitStatus { code: 1, .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn inspect(&self, container: &str, query: &Query) -> RuntimeResult<Vec<String>> {
        let details = self
            .client
            .inspect_container(container, None::<InspectContainerOptions>)
            .await?;
        Ok(extract(&details, query))
    }

    async fn exec(&self, container: &str, request: ExecRequest) -> RuntimeResult<Vec<u8>> {
        let ExecRequest { argv, stdin } = request;
        tracing::debug!(container, ?argv, "exec");

        let exec = self
            .client
            .create_exec(
                container,
                CreateExecOptions {
                    cmd: Some(argv.clone()),
                    attach_stdin: Some(stdin.is_some()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let (mut output, mut input) = match self.client.start_exec(&exec.id, None).await? {
            StartExecResults::Attached { output, input } => (output, input),
            StartExecResults::Detached => {
                return Err(RuntimeError::Io(io::Error::other(
                    "exec started detached, no output attached",
                )));
            }
        };

        let feed_stdin = async {
            if let Some(mut stdin) = stdin {
                tokio::io::copy(&mut stdin, &mut input).await?;
                input.shutdown().await?;
            }
            Ok::<_, RuntimeError>(())
        };
        let collect_output = async {
            let mut combined = Vec::new();
            while let Some(chunk) = output.next().await {
                combined.extend_from_slice(&chunk?.into_bytes());
            }
            Ok::<_, RuntimeError>(combined)
        };
        let (fed, combined) = tokio::join!(feed_stdin, collect_output);
        let combined = combined?;
        fed?;

        // The exit code is only known once the output stream has closed.
        let inspected = self.client.inspect_exec(&exec.id).await?;
        match inspected.exit_code {
            Some(0) | None => Ok(combined),
            Some(code) => Err(RuntimeError::ExitStatus {
                command: argv,
                code,
                output: String::from_utf8_lossy(&combined)
                    .lines()
                    .map(str::to_string)
                    .collect(),
            }),
        }
    }

    async fn copy_to(
        &self,
        host_path: &Path,
        container: &str,
        node_path: &str,
    ) -> RuntimeResult<()> {
        let node_is_dir = self.node_is_dir(container, node_path).await?;
        let (parent, name) = upload_target(host_path, node_path, node_is_dir)?;
        let source = host_path.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || archive_path(&source, &name)).await??;

        self.client
            .upload_to_container(
                container,
                Some(UploadToContainerOptions {
                    path: parent,
                    ..Default::default()
                }),
                archive.into(),
            )
            .await?;
        Ok(())
    }

    async fn copy_from(
        &self,
        container: &str,
        node_path: &str,
        host_path: &Path,
    ) -> RuntimeResult<()> {
        let mut stream = Box::pin(self.client.download_from_container(
            container,
            Some(DownloadFromContainerOptions {
                path: node_path.to_string(),
            }),
        ));

        let mut archive = Vec::new();
        while let Some(chunk) = stream.next().await {
            archive.extend_from_slice(&chunk?);
        }

        let dest = host_path.to_path_buf();
        tokio::task::spawn_blocking(move || unpack_archive(&archive, &dest)).await??;
        Ok(())
    }
}

fn extract(details: &ContainerInspectResponse, query: &Query) -> Vec<String> {
    match query {
        Query::Ip => details
            .network_settings
            .as_ref()
            .and_then(|settings| settings.networks.as_ref())
            .map(|networks| {
                networks
                    .values()
                    .filter_map(|endpoint| endpoint.ip_address.clone())
                    .filter(|ip| !ip.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
        Query::Label(key) => details
            .config
            .as_ref()
            .and_then(|config| config.labels.as_ref())
            .and_then(|labels| labels.get(key))
            .map(|value| value.lines().map(str::to_string).collect())
            .unwrap_or_default(),
        Query::HostPort(port) => details
            .network_settings
            .as_ref()
            .and_then(|settings| settings.ports.as_ref())
            .and_then(|ports| ports.get(&format!("{}/tcp", port)))
            .and_then(|bindings| bindings.as_ref())
            .and_then(|bindings| bindings.first())
            .and_then(|binding| binding.host_port.clone())
            .into_iter()
            .collect(),
    }
}

/// Picks the upload directory and archive member name. Like `docker cp`, an
/// existing directory on the node receives `source` under its own name.
fn upload_target(
    source: &Path,
    node_path: &str,
    node_is_dir: bool,
) -> RuntimeResult<(String, String)> {
    if !node_is_dir {
        return split_node_path(node_path);
    }
    let name = source
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| RuntimeError::InvalidPath(source.display().to_string()))?;
    Ok((node_path.to_string(), name.to_string()))
}

/// Splits a path inside the node into the directory the archive is uploaded
/// to and the name of the single archive member.
fn split_node_path(node_path: &str) -> RuntimeResult<(String, String)> {
    let path = Path::new(node_path);
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| RuntimeError::InvalidPath(node_path.to_string()))?;
    let parent = match path.parent().and_then(|parent| parent.to_str()) {
        Some("") | None => ".",
        Some(parent) => parent,
    };
    Ok((parent.to_string(), name.to_string()))
}

// Symlinks are followed, so links on the host arrive as regular files.
fn archive_path(source: &Path, name: &str) -> io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    if source.is_dir() {
        builder.append_dir_all(name, source)?;
    } else {
        builder.append_path_with_name(source, name)?;
    }
    builder.into_inner()
}

/// Unpacks a docker archive whose root member is the copied file or
/// directory. The root lands inside `dest` when `dest` is an existing
/// directory and becomes `dest` otherwise.
///
/// Members are first unpacked into a staging directory next to the target,
/// where the tar crate refuses anything resolving outside of it.
fn unpack_archive(archive: &[u8], dest: &Path) -> io::Result<()> {
    let into_dir = dest.is_dir();
    let staging_parent = if into_dir {
        dest.to_path_buf()
    } else {
        match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    };
    fs::create_dir_all(&staging_parent)?;
    let staging = tempfile::Builder::new()
        .prefix(".kind-cp-")
        .tempdir_in(&staging_parent)?;

    tar::Archive::new(archive).unpack(staging.path())?;

    let mut roots = fs::read_dir(staging.path())?.collect::<io::Result<Vec<_>>>()?;
    let root = match (roots.pop(), roots.is_empty()) {
        (Some(root), true) => root,
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "archive must contain exactly one root member",
            ));
        }
    };

    let target = if into_dir {
        dest.join(root.file_name())
    } else {
        dest.to_path_buf()
    };
    place(&root.path(), &target)
}

/// Moves `from` to `to`, merging directories that already exist.
fn place(from: &Path, to: &Path) -> io::Result<()> {
    let merge = fs::symlink_metadata(from)?.is_dir() && to.is_dir();
    if !merge {
        return fs::rename(from, to);
    }
    for child in fs::read_dir(from)? {
        let child = child?;
        place(&child.path(), &to.join(child.file_name()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ContainerConfig, EndpointSettings, NetworkSettings, PortBinding};
    use std::collections::HashMap;

    fn details() -> ContainerInspectResponse {
        ContainerInspectResponse {
            config: Some(ContainerConfig {
                labels: Some(HashMap::from([(
                    "io.x-k8s.kind.role".to_string(),
                    "control-plane".to_string(),
                )])),
                ..Default::default()
            }),
            network_settings: Some(NetworkSettings {
                networks: Some(HashMap::from([(
                    "kind".to_string(),
                    EndpointSettings {
                        ip_address: Some("172.18.0.2".to_string()),
                        ..Default::default()
                    },
                )])),
                ports: Some(HashMap::from([
                    (
                        "6443/tcp".to_string(),
                        Some(vec![PortBinding {
                            host_ip: Some("127.0.0.1".to_string()),
                            host_port: Some("32769".to_string()),
                        }]),
                    ),
                    ("80/tcp".to_string(), None),
                ])),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn extracts_single_ip() {
        assert_eq!(extract(&details(), &Query::Ip), vec!["172.18.0.2"]);
    }

    #[test]
    fn extracts_label_value() {
        let role = extract(&details(), &Query::Label("io.x-k8s.kind.role".to_string()));
        assert_eq!(role, vec!["control-plane"]);
        assert!(extract(&details(), &Query::Label("missing".to_string())).is_empty());
    }

    #[test]
    fn extracts_first_host_port_binding() {
        assert_eq!(extract(&details(), &Query::HostPort(6443)), vec!["32769"]);
        assert!(extract(&details(), &Query::HostPort(80)).is_empty());
        assert!(extract(&details(), &Query::HostPort(22)).is_empty());
    }

    #[test]
    fn splits_node_paths() {
        let (parent, name) = split_node_path("/kind/manifests/cni.yaml").unwrap();
        assert_eq!(parent, "/kind/manifests");
        assert_eq!(name, "cni.yaml");

        let (parent, name) = split_node_path("version").unwrap();
        assert_eq!(parent, ".");
        assert_eq!(name, "version");

        assert!(split_node_path("/").is_err());
    }

    #[test]
    fn upload_into_existing_node_directory_keeps_source_name() {
        let (parent, name) =
            upload_target(Path::new("/tmp/admin.conf"), "/etc/kubernetes", true).unwrap();
        assert_eq!(parent, "/etc/kubernetes");
        assert_eq!(name, "admin.conf");

        let (parent, name) =
            upload_target(Path::new("/tmp/admin.conf"), "/etc/kubernetes/kubelet.conf", false)
                .unwrap();
        assert_eq!(parent, "/etc/kubernetes");
        assert_eq!(name, "kubelet.conf");
    }

    #[test]
    fn file_lands_inside_existing_host_directory() {
        let host = tempfile::tempdir().unwrap();
        let source = host.path().join("admin.conf");
        fs::write(&source, "apiVersion: v1\n").unwrap();
        let archive = archive_path(&source, "admin.conf").unwrap();

        let outdir = host.path().join("outdir");
        fs::create_dir(&outdir).unwrap();
        unpack_archive(&archive, &outdir).unwrap();

        assert_eq!(
            fs::read_to_string(outdir.join("admin.conf")).unwrap(),
            "apiVersion: v1\n"
        );
        assert_eq!(fs::read_dir(&outdir).unwrap().count(), 1);
    }

    #[test]
    fn directory_merges_into_existing_host_directory() {
        let host = tempfile::tempdir().unwrap();
        let source = host.path().join("pki");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("ca.crt"), "ca").unwrap();
        let archive = archive_path(&source, "pki").unwrap();

        let outdir = host.path().join("backup");
        fs::create_dir_all(outdir.join("pki")).unwrap();
        fs::write(outdir.join("pki").join("old.crt"), "old").unwrap();
        unpack_archive(&archive, &outdir).unwrap();

        assert_eq!(fs::read_to_string(outdir.join("pki").join("ca.crt")).unwrap(), "ca");
        assert_eq!(fs::read_to_string(outdir.join("pki").join("old.crt")).unwrap(), "old");
    }

    #[test]
    fn symlinked_member_cannot_escape_dest() {
        let host = tempfile::tempdir().unwrap();
        let outside = host.path().join("outside");
        fs::create_dir(&outside).unwrap();

        let mut builder = tar::Builder::new(Vec::new());
        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(tar::EntryType::Directory);
        dir.set_mode(0o755);
        dir.set_size(0);
        builder.append_data(&mut dir, "root", io::empty()).unwrap();
        let mut link = tar::Header::new_gnu();
        link.set_entry_type(tar::EntryType::Symlink);
        link.set_mode(0o777);
        link.set_size(0);
        builder.append_link(&mut link, "root/link", &outside).unwrap();
        let mut file = tar::Header::new_gnu();
        file.set_mode(0o644);
        file.set_size(5);
        builder
            .append_data(&mut file, "root/link/pwned", &b"owned"[..])
            .unwrap();
        let archive = builder.into_inner().unwrap();

        let _ = unpack_archive(&archive, &host.path().join("dest"));

        assert!(!outside.join("pwned").exists());
    }

    #[test]
    fn archive_round_trips_a_directory() {
        let host = tempfile::tempdir().unwrap();
        let source = host.path().join("certs");
        fs::create_dir_all(source.join("etcd")).unwrap();
        fs::write(source.join("ca.crt"), "ca").unwrap();
        fs::write(source.join("etcd").join("peer.crt"), "peer").unwrap();

        let archive = archive_path(&source, "pki").unwrap();
        let dest = host.path().join("restored");
        unpack_archive(&archive, &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("ca.crt")).unwrap(), "ca");
        assert_eq!(
            fs::read_to_string(dest.join("etcd").join("peer.crt")).unwrap(),
            "peer"
        );
    }

    #[test]
    fn archive_of_a_file_unpacks_to_dest() {
        let host = tempfile::tempdir().unwrap();
        let source = host.path().join("kubeadm.conf");
        fs::write(&source, "kind: ClusterConfiguration\n").unwrap();

        let archive = archive_path(&source, "kubeadm.conf").unwrap();
        let dest = host.path().join("copy.conf");
        unpack_archive(&archive, &dest).unwrap();

        assert_eq!(
            fs::read_to_string(dest).unwrap(),
            "kind: ClusterConfiguration\n"
        );
    }
}

use super::types::{Cmd, Cmder, ContainerCmder};
use crate::lib::runtime::types::{ContainerRuntime, ExecRequest, RuntimeError, RuntimeResult};
use std::{fmt, sync::Arc};
use tokio::io::AsyncRead;

impl ContainerCmder {
    pub fn new(container: &str, runtime: Arc<dyn ContainerRuntime>) -> Self {
        ContainerCmder {
            container: container.to_string(),
            runtime,
        }
    }
}

impl Cmder for ContainerCmder {
    fn command(&self, name: &str, args: &[&str]) -> Cmd {
        let argv = std::iter::once(name)
            .chain(args.iter().copied())
            .map(str::to_string)
            .collect();
        Cmd {
            container: self.container.clone(),
            argv,
            stdin: None,
            runtime: self.runtime.clone(),
        }
    }
}

impl Cmd {
    pub fn set_stdin(mut self, stdin: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stdin = Some(Box::new(stdin));
        self
    }

    /// Runs the command to completion, discarding its output.
    pub async fn run(self) -> RuntimeResult<()> {
        self.output().await.map(drop)
    }

    /// Runs the command and returns its combined stdout and stderr split into lines.
    pub async fn output_lines(self) -> RuntimeResult<Vec<String>> {
        let output = self.output().await?;
        Ok(String::from_utf8_lossy(&output)
            .lines()
            .map(str::to_string)
            .collect())
    }

    pub async fn run_logging_output_on_fail(self) -> RuntimeResult<()> {
        let argv = self.argv.clone();
        let result = self.run().await;
        match &result {
            Err(RuntimeError::ExitStatus { command, output, .. }) => {
                tracing::error!(?command, "command failed, output follows");
                for line in output {
                    tracing::error!("{}", line);
                }
            }
            Err(err) => tracing::error!(command = ?argv, error = %err, "command failed to run"),
            Ok(()) => {}
        }
        result
    }

    async fn output(self) -> RuntimeResult<Vec<u8>> {
        let request = ExecRequest {
            argv: self.argv,
            stdin: self.stdin,
        };
        self.runtime.exec(&self.container, request).await
    }
}

impl fmt::Debug for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cmd")
            .field("container", &self.container)
            .field("argv", &self.argv)
            .field("stdin", &self.stdin.is_some())
            .finish()
    }
}

use super::types::{ContainerRuntime, ExecRequest, Query, RuntimeError, RuntimeResult};
use async_trait::async_trait;
use std::{
    collections::{HashMap, VecDeque},
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tokio::io::AsyncReadExt;

const COPY: &str = "<copy>";

#[derive(Debug, Clone)]
pub enum Reply {
    Output(String),
    Exit(i64, String),
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Inspect(String, Query),
    Exec {
        container: String,
        argv: Vec<String>,
        stdin: Option<String>,
    },
    CopyTo(PathBuf, String, String),
    CopyFrom(String, String, PathBuf),
}

/// Scripted runtime that records every call. Replies are consumed in order;
/// the last reply for a key keeps answering once the queue runs dry.
#[derive(Debug, Default)]
pub struct StubRuntime {
    inspect_replies: Mutex<HashMap<Query, VecDeque<Reply>>>,
    exec_replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

impl StubRuntime {
    pub fn on_inspect(self, query: Query, reply: Reply) -> Self {
        self.inspect_replies
            .lock()
            .unwrap()
            .entry(query)
            .or_default()
            .push_back(reply);
        self
    }

    /// Scripts the reply for commands whose program name is `program`.
    pub fn on_exec(self, program: &str, reply: Reply) -> Self {
        self.exec_replies
            .lock()
            .unwrap()
            .entry(program.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn on_copy(self, reply: Reply) -> Self {
        self.on_exec(COPY, reply)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn inspect_count(&self, query: &Query) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Inspect(_, q) if q == query))
            .count()
    }

    pub fn exec_count(&self, program: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Exec { argv, .. } if argv.first().map(String::as_str) == Some(program)))
            .count()
    }

    fn next_reply<K>(replies: &Mutex<HashMap<K, VecDeque<Reply>>>, key: &K) -> Reply
    where
        K: std::hash::Hash + Eq,
    {
        let mut replies = replies.lock().unwrap();
        match replies.get_mut(key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Reply::Unreachable),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::Unreachable),
            None => Reply::Unreachable,
        }
    }

    fn answer(reply: Reply, command: Vec<String>) -> RuntimeResult<String> {
        match reply {
            Reply::Output(output) => Ok(output),
            Reply::Exit(code, output) => Err(RuntimeError::ExitStatus {
                command,
                code,
                output: output.lines().map(str::to_string).collect(),
            }),
            Reply::Unreachable => Err(RuntimeError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "no reply scripted",
            ))),
        }
    }
}

#[async_trait]
impl ContainerRuntime for StubRuntime {
    async fn inspect(&self, container: &str, query: &Query) -> RuntimeResult<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Inspect(container.to_string(), query.clone()));
        let reply = Self::next_reply(&self.inspect_replies, query);
        let output = Self::answer(reply, vec!["inspect".to_string()])?;
        Ok(output.lines().map(str::to_string).collect())
    }

    async fn exec(&self, container: &str, request: ExecRequest) -> RuntimeResult<Vec<u8>> {
        let stdin = match request.stdin {
            Some(mut stdin) => {
                let mut content = String::new();
                stdin.read_to_string(&mut content).await?;
                Some(content)
            }
            None => None,
        };
        self.calls.lock().unwrap().push(Call::Exec {
            container: container.to_string(),
            argv: request.argv.clone(),
            stdin,
        });
        let program = request.argv.first().cloned().unwrap_or_default();
        let reply = Self::next_reply(&self.exec_replies, &program);
        Self::answer(reply, request.argv).map(String::into_bytes)
    }

    async fn copy_to(
        &self,
        host_path: &Path,
        container: &str,
        node_path: &str,
    ) -> RuntimeResult<()> {
        self.calls.lock().unwrap().push(Call::CopyTo(
            host_path.to_path_buf(),
            container.to_string(),
            node_path.to_string(),
        ));
        Self::answer(Self::next_reply(&self.exec_replies, &COPY.to_string()), vec![]).map(drop)
    }

    async fn copy_from(
        &self,
        container: &str,
        node_path: &str,
        host_path: &Path,
    ) -> RuntimeResult<()> {
        self.calls.lock().unwrap().push(Call::CopyFrom(
            container.to_string(),
            node_path.to_string(),
            host_path.to_path_buf(),
        ));
        Self::answer(Self::next_reply(&self.exec_replies, &COPY.to_string()), vec![]).map(drop)
    }
}

//! Command Module - the command runner seam
//!
//! Everything the engine does to the outside world goes through
//! [`CommandRunner`]: running kubectl/helm/gcloud, issuing HTTP requests and
//! holding long-lived subprocesses such as port-forwards.
//!
//! - `Command`: program + args + optional stdin
//! - `ShellRunner`: tokio::process + reqwest implementation
//! - `StreamHandle`: a spawned child whose output is streamed to tracing

mod process;
mod shell;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

pub use process::StreamHandle;
pub use shell::ShellRunner;

/// A command line to execute
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
    /// Piped to the process when set
    pub stdin: Option<String>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn kubectl() -> Self {
        Self::new("kubectl")
    }

    pub fn helm() -> Self {
        Self::new("helm")
    }

    pub fn gcloud() -> Self {
        Self::new("gcloud")
    }

    /// `sh -c <line>`
    pub fn shell(line: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(line)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `-n <namespace>` (skipped when empty)
    pub fn namespace(self, namespace: &str) -> Self {
        if namespace.is_empty() {
            self
        } else {
            self.arg("-n").arg(namespace)
        }
    }

    /// Append `--kubeconfig <path>` when a kubeconfig is configured
    pub fn kubeconfig(self, kubeconfig: Option<&str>) -> Self {
        match kubeconfig {
            Some(path) if !path.is_empty() => self.arg("--kubeconfig").arg(path),
            _ => self,
        }
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// An HTTP request issued by a check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Overrides the Host header
    pub host: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Executes commands and requests on behalf of steps and resources
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion, failing on a non-zero exit status
    async fn run(&self, command: &Command) -> Result<()>;

    /// Run to completion and return stdout
    async fn output(&self, command: &Command) -> Result<String>;

    /// Send an HTTP request; non-2xx statuses are not errors
    async fn request(&self, request: &HttpRequest) -> Result<HttpResponse>;

    /// Spawn a long-lived process without waiting for it
    async fn stream(&self, command: &Command) -> Result<StreamHandle>;

    /// Terminate a process started with [`CommandRunner::stream`]
    async fn kill(&self, handle: &mut StreamHandle) -> Result<()>;
}

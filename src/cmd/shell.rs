//! ShellRunner - tokio::process + reqwest implementation of CommandRunner

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{Command, CommandRunner, HttpRequest, HttpResponse, StreamHandle};
use crate::error::{Result, ValetError};

/// Default timeout for a single HTTP request (30 seconds)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs commands on the local machine
#[derive(Clone)]
pub struct ShellRunner {
    /// Shared HTTP client (connection pooling)
    http_client: reqwest::Client,
    cancel: CancellationToken,
}

impl ShellRunner {
    pub fn new(cancel: CancellationToken) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("valet/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ValetError::HttpError {
                reason: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            http_client,
            cancel,
        })
    }

    fn build(command: &Command) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn execute(&self, command: &Command) -> Result<std::process::Output> {
        let mut child = Self::build(command).spawn().map_err(|e| ValetError::CommandFailed {
            command: command.to_string(),
            message: e.to_string(),
        })?;

        if let Some(input) = &command.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                // An early exit closes the pipe; the exit status and stderr say why
                match stdin.write_all(input.as_bytes()).await {
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                        debug!("Command closed stdin before reading all input");
                    }
                    result => result?,
                }
            }
        }

        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = self.cancel.cancelled() => return Err(ValetError::Cancelled),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ValetError::CommandFailed {
                command: command.to_string(),
                message: stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    #[instrument(skip(self), fields(command = %command))]
    async fn run(&self, command: &Command) -> Result<()> {
        debug!("Running command");
        self.execute(command).await.map(|_| ())
    }

    #[instrument(skip(self), fields(command = %command))]
    async fn output(&self, command: &Command) -> Result<String> {
        debug!("Running command for output");
        let output = self.execute(command).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn request(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            ValetError::HttpError {
                reason: format!("Invalid method '{}': {}", request.method, e),
            }
        })?;

        let mut builder = self.http_client.request(method, &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(host) = &request.host {
            builder = builder.header(reqwest::header::HOST, host);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let send = async {
            let response = builder.send().await.map_err(|e| ValetError::HttpError {
                reason: e.to_string(),
            })?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| ValetError::HttpError {
                reason: format!("Failed to read response body: {}", e),
            })?;
            Ok(HttpResponse { status, body })
        };

        tokio::select! {
            result = send => result,
            _ = self.cancel.cancelled() => Err(ValetError::Cancelled),
        }
    }

    #[instrument(skip(self), fields(command = %command))]
    async fn stream(&self, command: &Command) -> Result<StreamHandle> {
        let child = Self::build(command).spawn().map_err(|e| ValetError::CommandFailed {
            command: command.to_string(),
            message: e.to_string(),
        })?;
        debug!(pid = ?child.id(), "Spawned streaming process");
        Ok(StreamHandle::spawned(command.to_string(), child))
    }

    async fn kill(&self, handle: &mut StreamHandle) -> Result<()> {
        handle
            .kill()
            .await
            .map_err(|e| ValetError::ProcessCleanup {
                command: handle.command().to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ShellRunner {
        ShellRunner::new(CancellationToken::new()).unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_captures_stdout() {
        let out = runner().output(&Command::shell("echo hello")).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_pipes_stdin() {
        let out = runner()
            .output(&Command::new("cat").stdin("from stdin"))
            .await
            .unwrap();
        assert_eq!(out, "from stdin");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_failure_reports_stderr() {
        let err = runner()
            .run(&Command::shell("echo broken >&2; exit 3"))
            .await
            .unwrap_err();
        match err {
            ValetError::CommandFailed { message, .. } => assert_eq!(message, "broken"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_early_exit_with_stdin_reports_stderr() {
        let manifest = "kind: ConfigMap\n".repeat(64 * 1024);
        let err = runner()
            .run(&Command::shell("echo 'unable to recognize' >&2; exit 1").stdin(manifest))
            .await
            .unwrap_err();
        match err {
            ValetError::CommandFailed { message, .. } => assert_eq!(message, "unable to recognize"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancelled_run() {
        let cancel = CancellationToken::new();
        let runner = ShellRunner::new(cancel.clone()).unwrap();
        cancel.cancel();
        let err = runner.run(&Command::shell("sleep 5")).await.unwrap_err();
        assert!(matches!(err, ValetError::Cancelled));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = runner()
            .run(&Command::new("definitely-not-a-real-binary-valet"))
            .await
            .unwrap_err();
        assert!(matches!(err, ValetError::CommandFailed { .. }));
    }
}

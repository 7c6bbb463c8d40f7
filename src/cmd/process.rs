//! Long-lived subprocess handle (port-forwards)
//!
//! The child is spawned with `kill_on_drop`, so dropping a handle on an
//! unexpected path still terminates the process. The output streamer owns
//! the child's pipes and lives until the pipes close or the handle is killed.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a process started by `CommandRunner::stream`
#[derive(Debug)]
pub struct StreamHandle {
    command: String,
    child: Option<Child>,
    output: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub(crate) fn spawned(command: impl Into<String>, child: Child) -> Self {
        Self {
            command: command.into(),
            child: Some(child),
            output: None,
        }
    }

    /// A handle with no backing process (used by test runners)
    pub fn detached(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            child: None,
            output: None,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// True once output streaming has been started
    pub fn is_streaming(&self) -> bool {
        self.output.is_some()
    }

    /// Start forwarding stdout/stderr lines to tracing in a background task.
    ///
    /// Fire-and-forget: the task ends when the process closes its pipes.
    /// Calling this twice is a no-op.
    pub fn stream_output(&mut self) {
        if self.output.is_some() {
            return;
        }
        let (stdout, stderr) = match self.child.as_mut() {
            Some(child) => (child.stdout.take(), child.stderr.take()),
            None => (None, None),
        };
        let command = self.command.clone();

        self.output = Some(tokio::spawn(async move {
            let out = async {
                if let Some(stdout) = stdout {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        debug!(command = %command, "{}", line);
                    }
                }
            };
            let err = async {
                if let Some(stderr) = stderr {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        debug!(command = %command, stream = "stderr", "{}", line);
                    }
                }
            };
            futures::join!(out, err);
        }));
    }

    /// Kill the process and stop the output task
    pub async fn kill(&mut self) -> std::io::Result<()> {
        if let Some(task) = self.output.take() {
            task.abort();
        }
        match self.child.take() {
            Some(mut child) => {
                if child.try_wait()?.is_some() {
                    return Ok(());
                }
                child.kill().await
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_detached_handle_kill_is_noop() {
        let mut handle = StreamHandle::detached("kubectl port-forward");
        handle.stream_output();
        assert!(handle.is_streaming());
        assert!(handle.kill().await.is_ok());
        assert!(!handle.is_streaming());
        assert_eq!(handle.command(), "kubectl port-forward");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_spawned_process() {
        let child = tokio::process::Command::new("sleep")
            .arg("30")
            .stdout(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut handle = StreamHandle::spawned("sleep 30", child);
        handle.stream_output();
        assert!(handle.kill().await.is_ok());
    }
}

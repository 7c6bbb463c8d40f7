//! Test utilities for Valet (test builds and the `test-fixtures` feature)
//!
//! Recording doubles for the two external seams:
//!
//! ```rust,ignore
//! use valet::test_utils::{MockKubeClient, MockRunner};
//!
//! let runner = Arc::new(
//!     MockRunner::new()
//!         .with_output("git describe --tags", "v1.0.0")
//!         .with_response(200, "ok"),
//! );
//! let kube = Arc::new(MockKubeClient::new().with_address("35.1.2.3:80"));
//! let ctx = WorkflowContext::new(runner.clone(), kube.clone(), EnvConfig::default());
//!
//! // ... run something ...
//! assert_eq!(runner.commands(), vec!["kubectl apply -f -"]);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cmd::{Command, CommandRunner, HttpRequest, HttpResponse, StreamHandle};
use crate::config::EnvConfig;
use crate::context::WorkflowContext;
use crate::error::{Result, ValetError};
use crate::kube::KubeClient;

// ═══════════════════════════════════════════════════════════════════════════
// COMMAND RUNNER
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
enum ScriptedResponse {
    Response(HttpResponse),
    TransportError(String),
}

/// [`CommandRunner`] that records everything and replays scripted results.
///
/// Outputs are keyed by the command's display string (`program args...`).
/// A `cmd:` value runs through `sh -c`, so its key is the shell line itself.
/// When several outputs are scripted for one command they are returned in
/// order, and the last one repeats.
#[derive(Default)]
pub struct MockRunner {
    calls: Mutex<Vec<Command>>,
    outputs: Mutex<HashMap<String, VecDeque<String>>>,
    failures: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<HttpRequest>>,
    responses: Mutex<VecDeque<ScriptedResponse>>,
    streams: Mutex<Vec<String>>,
    kills: Mutex<Vec<bool>>,
    kill_error: Option<String>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(self, command: &str, output: impl Into<String>) -> Self {
        self.with_outputs(command, [output.into()])
    }

    pub fn with_outputs<I, S>(self, command: &str, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs
            .lock()
            .unwrap()
            .insert(command.to_string(), outputs.into_iter().map(Into::into).collect());
        self
    }

    /// Make a command fail with `CommandFailed`
    pub fn with_failure(self, command: &str, message: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(command.to_string(), message.to_string());
        self
    }

    /// Queue an HTTP response; the last queued response repeats
    pub fn with_response(self, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(ScriptedResponse::Response(HttpResponse {
                status,
                body: body.to_string(),
            }));
        self
    }

    /// Queue a transport failure
    pub fn with_request_error(self, reason: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(ScriptedResponse::TransportError(reason.to_string()));
        self
    }

    /// Make every `kill` fail with `ProcessCleanup`
    pub fn with_kill_error(mut self, reason: &str) -> Self {
        self.kill_error = Some(reason.to_string());
        self
    }

    /// Display strings of every `run`/`output` call, in order
    pub fn commands(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(ToString::to_string).collect()
    }

    /// Full commands (including stdin) of every `run`/`output` call
    pub fn calls(&self) -> Vec<Command> {
        self.calls.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Display strings of every `stream` call
    pub fn streams(&self) -> Vec<String> {
        self.streams.lock().unwrap().clone()
    }

    pub fn kill_count(&self) -> usize {
        self.kills.lock().unwrap().len()
    }

    /// For every `kill`, whether the handle was streaming its output
    pub fn killed_streaming(&self) -> Vec<bool> {
        self.kills.lock().unwrap().clone()
    }

    fn record(&self, command: &Command) -> Result<String> {
        self.calls.lock().unwrap().push(command.clone());
        let key = script_key(command);
        if let Some(message) = self.failures.lock().unwrap().get(&key) {
            return Err(ValetError::CommandFailed {
                command: command.to_string(),
                message: message.clone(),
            });
        }
        let mut outputs = self.outputs.lock().unwrap();
        let output = match outputs.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => String::new(),
        };
        Ok(output)
    }
}

/// `sh -c <line>` is keyed by `<line>`; everything else by its display string
fn script_key(command: &Command) -> String {
    match (command.program.as_str(), command.args.as_slice()) {
        ("sh", [flag, line]) if flag == "-c" => line.clone(),
        _ => command.to_string(),
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, command: &Command) -> Result<()> {
        self.record(command).map(|_| ())
    }

    async fn output(&self, command: &Command) -> Result<String> {
        self.record(command)
    }

    async fn request(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let scripted = {
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front()
            } else {
                responses.front().cloned()
            }
        };
        match scripted {
            Some(ScriptedResponse::Response(response)) => Ok(response),
            Some(ScriptedResponse::TransportError(reason)) => Err(ValetError::HttpError { reason }),
            None => Err(ValetError::HttpError {
                reason: "no response scripted".to_string(),
            }),
        }
    }

    async fn stream(&self, command: &Command) -> Result<StreamHandle> {
        self.streams.lock().unwrap().push(command.to_string());
        Ok(StreamHandle::detached(command.to_string()))
    }

    async fn kill(&self, handle: &mut StreamHandle) -> Result<()> {
        self.kills.lock().unwrap().push(handle.is_streaming());
        if let Some(reason) = &self.kill_error {
            return Err(ValetError::ProcessCleanup {
                command: handle.command().to_string(),
                reason: reason.clone(),
            });
        }
        handle
            .kill()
            .await
            .map_err(|e| ValetError::ProcessCleanup {
                command: handle.command().to_string(),
                reason: e.to_string(),
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// KUBE CLIENT
// ═══════════════════════════════════════════════════════════════════════════

/// [`KubeClient`] returning a fixed address and recording calls
#[derive(Default)]
pub struct MockKubeClient {
    address: String,
    pods_error: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl MockKubeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = address.to_string();
        self
    }

    /// Make `wait_until_pods_running` fail
    pub fn with_pods_error(mut self, reason: &str) -> Self {
        self.pods_error = Some(reason.to_string());
        self
    }

    /// e.g. `["get_ingress_address gateway-proxy gloo-system http", "wait_until_pods_running default"]`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl KubeClient for MockKubeClient {
    async fn get_ingress_address(&self, name: &str, namespace: &str, port: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("get_ingress_address {} {} {}", name, namespace, port));
        Ok(self.address.clone())
    }

    async fn wait_until_pods_running(&self, namespace: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("wait_until_pods_running {}", namespace));
        match &self.pods_error {
            Some(reason) => Err(ValetError::KubeError {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CONTEXT
// ═══════════════════════════════════════════════════════════════════════════

/// Mocks plus a context wired to them
pub struct TestHarness {
    pub runner: Arc<MockRunner>,
    pub kube: Arc<MockKubeClient>,
    pub ctx: WorkflowContext,
}

impl TestHarness {
    pub fn new(runner: MockRunner, kube: MockKubeClient) -> Self {
        Self::with_env(runner, kube, EnvConfig::default())
    }

    pub fn with_env(runner: MockRunner, kube: MockKubeClient, env: EnvConfig) -> Self {
        let runner = Arc::new(runner);
        let kube = Arc::new(kube);
        let ctx = WorkflowContext::new(runner.clone(), kube.clone(), env)
            .with_cancellation(CancellationToken::new());
        Self { runner, kube, ctx }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new(MockRunner::new(), MockKubeClient::new())
    }
}

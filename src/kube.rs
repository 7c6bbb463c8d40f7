//! Kube Module - cluster queries used by checks
//!
//! [`KubeClient`] is the seam for everything read from the cluster.
//! [`KubectlClient`] answers through `kubectl ... -o json` via the command
//! runner, so it shares cancellation and kubeconfig handling with the rest
//! of the engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::cmd::{Command, CommandRunner};
use crate::error::{Result, ValetError};
use crate::resilience::RetryPolicy;

/// Attempts while waiting for pods
pub const POD_WAIT_ATTEMPTS: u32 = 60;

/// Delay between pod polls
pub const POD_WAIT_DELAY: Duration = Duration::from_secs(2);

#[async_trait]
pub trait KubeClient: Send + Sync {
    /// `host:port` of a load-balanced service; `port` is a port name or number
    async fn get_ingress_address(&self, name: &str, namespace: &str, port: &str) -> Result<String>;

    /// Block until every pod in `namespace` is running (or completed)
    async fn wait_until_pods_running(&self, namespace: &str) -> Result<()>;
}

/// [`KubeClient`] backed by kubectl
pub struct KubectlClient {
    runner: Arc<dyn CommandRunner>,
    kubeconfig: Option<String>,
    pod_wait: RetryPolicy,
}

impl KubectlClient {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        kubeconfig: Option<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            runner,
            kubeconfig,
            pod_wait: RetryPolicy::fixed(POD_WAIT_ATTEMPTS, POD_WAIT_DELAY).with_cancellation(cancel),
        }
    }

    /// Override how long pods are polled for
    pub fn with_pod_wait(mut self, policy: RetryPolicy) -> Self {
        self.pod_wait = policy;
        self
    }

    fn kubectl(&self) -> Command {
        Command::kubectl().kubeconfig(self.kubeconfig.as_deref())
    }

    async fn get_json(&self, command: Command) -> Result<Value> {
        let output = self.runner.output(&command).await?;
        Ok(serde_json::from_str(&output)?)
    }
}

#[async_trait]
impl KubeClient for KubectlClient {
    #[instrument(skip(self))]
    async fn get_ingress_address(&self, name: &str, namespace: &str, port: &str) -> Result<String> {
        let command = self
            .kubectl()
            .args(["get", "service", name])
            .namespace(namespace)
            .args(["-o", "json"]);
        let service = self.get_json(command).await?;
        let address = ingress_address(&service, port)?;
        debug!(address = %address, "Resolved ingress address");
        Ok(address)
    }

    #[instrument(skip(self))]
    async fn wait_until_pods_running(&self, namespace: &str) -> Result<()> {
        self.pod_wait
            .execute("wait-for-pods", move |_| async move {
                let command = self
                    .kubectl()
                    .args(["get", "pods"])
                    .namespace(namespace)
                    .args(["-o", "json"]);
                let pods = self.get_json(command).await?;
                let pending = pending_pods(&pods);
                if pending.is_empty() {
                    Ok(())
                } else {
                    Err(ValetError::KubeError {
                        reason: format!(
                            "pods not running in namespace {}: {}",
                            namespace,
                            pending.join(", ")
                        ),
                    })
                }
            })
            .await
    }
}

/// Extract `host:port` from a `kubectl get service -o json` document
fn ingress_address(service: &Value, port: &str) -> Result<String> {
    let ingress = service
        .pointer("/status/loadBalancer/ingress/0")
        .ok_or_else(|| ValetError::KubeError {
            reason: "service has no load balancer ingress".to_string(),
        })?;
    let host = ingress
        .get("ip")
        .or_else(|| ingress.get("hostname"))
        .and_then(Value::as_str)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ValetError::KubeError {
            reason: "load balancer ingress has neither ip nor hostname".to_string(),
        })?;

    let ports = service
        .pointer("/spec/ports")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let number = ports
        .iter()
        .find(|p| {
            p.get("name").and_then(Value::as_str) == Some(port)
                || p.get("port").and_then(Value::as_u64).map(|n| n.to_string()).as_deref() == Some(port)
        })
        .and_then(|p| p.get("port"))
        .and_then(Value::as_u64)
        .ok_or_else(|| ValetError::KubeError {
            reason: format!("service has no port '{}'", port),
        })?;

    Ok(format!("{}:{}", host, number))
}

/// Names of pods that are neither running with all containers ready nor succeeded
fn pending_pods(pods: &Value) -> Vec<String> {
    let items = pods
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    items
        .iter()
        .filter(|pod| {
            let phase = pod.pointer("/status/phase").and_then(Value::as_str);
            match phase {
                Some("Succeeded") => false,
                Some("Running") => !containers_ready(pod),
                _ => true,
            }
        })
        .map(|pod| {
            pod.pointer("/metadata/name")
                .and_then(Value::as_str)
                .unwrap_or("<unnamed>")
                .to_string()
        })
        .collect()
}

fn containers_ready(pod: &Value) -> bool {
    pod.pointer("/status/containerStatuses")
        .and_then(Value::as_array)
        .map(|statuses| {
            statuses
                .iter()
                .all(|s| s.get("ready").and_then(Value::as_bool).unwrap_or(false))
        })
        .unwrap_or(true)
}

//! Workflow execution context
//!
//! Everything a step needs from the outside world, passed by reference to
//! every step and resource. Nothing in here is persisted between runs.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cmd::{Command, CommandRunner, ShellRunner};
use crate::config::{EnvConfig, GlobalConfig};
use crate::error::Result;
use crate::kube::{KubeClient, KubectlClient};
use crate::render::{RenderContext, Values};
use crate::resilience::RetryPolicy;

#[derive(Clone)]
pub struct WorkflowContext {
    pub runner: Arc<dyn CommandRunner>,
    pub kube: Arc<dyn KubeClient>,
    /// Passed to kubectl/helm as `--kubeconfig` when set
    pub kubeconfig: Option<String>,
    pub env: Arc<EnvConfig>,
    pub cancel: CancellationToken,
    /// Base values; they win over values declared by workflows and applications
    pub values: Values,
}

impl WorkflowContext {
    pub fn new(runner: Arc<dyn CommandRunner>, kube: Arc<dyn KubeClient>, env: EnvConfig) -> Self {
        Self {
            runner,
            kube,
            kubeconfig: None,
            env: Arc::new(env),
            cancel: CancellationToken::new(),
            values: Values::new(),
        }
    }

    /// Context backed by real kubectl/helm/gcloud and the process environment
    pub fn local(global: &GlobalConfig, kubeconfig: Option<String>, cancel: CancellationToken) -> Result<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::new(cancel.clone())?);
        let kube = Arc::new(KubectlClient::new(
            runner.clone(),
            kubeconfig.clone(),
            cancel.clone(),
        ));
        Ok(Self {
            runner,
            kube,
            kubeconfig,
            env: Arc::new(EnvConfig::from_process(global)),
            cancel,
            values: Values::new(),
        })
    }

    pub fn with_kubeconfig(mut self, kubeconfig: impl Into<String>) -> Self {
        self.kubeconfig = Some(kubeconfig.into());
        self
    }

    pub fn with_values(mut self, values: Values) -> Self {
        self.values = values;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// `kubectl` with the configured kubeconfig
    pub fn kubectl(&self) -> Command {
        Command::kubectl().kubeconfig(self.kubeconfig.as_deref())
    }

    /// `helm` with the configured kubeconfig
    pub fn helm(&self) -> Command {
        Command::helm().kubeconfig(self.kubeconfig.as_deref())
    }

    pub fn render_ctx(&self) -> RenderContext<'_> {
        RenderContext::new(self.runner.as_ref(), self.env.as_ref())
    }

    /// Fixed-delay retry that stops when the run is cancelled
    pub fn retry_policy(&self, attempts: u32, delay: Duration) -> RetryPolicy {
        RetryPolicy::fixed(attempts, delay).with_cancellation(self.cancel.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestHarness;

    #[test]
    fn test_kubectl_with_kubeconfig() {
        let ctx = TestHarness::default().ctx.with_kubeconfig("/tmp/kubeconfig");
        assert_eq!(
            ctx.kubectl().arg("apply").to_string(),
            "kubectl --kubeconfig /tmp/kubeconfig apply"
        );
        assert_eq!(ctx.helm().to_string(), "helm --kubeconfig /tmp/kubeconfig");
    }

    #[test]
    fn test_kubectl_without_kubeconfig() {
        let ctx = TestHarness::default().ctx;
        assert_eq!(ctx.kubectl().to_string(), "kubectl");
    }

    #[tokio::test]
    async fn test_retry_policy_observes_cancellation() {
        let ctx = TestHarness::default().ctx;
        ctx.cancel.cancel();
        let result: Result<()> = ctx
            .retry_policy(3, Duration::from_secs(60))
            .execute("op", |_| async {
                Err(crate::error::ValetError::UnexpectedStatusCode { status: 500 })
            })
            .await;
        assert!(matches!(result, Err(crate::error::ValetError::Cancelled)));
    }
}

//! Workflow - an ordered list of steps
//!
//! ```yaml
//! values:
//!   Namespace: gloo-system
//! steps:
//!   - installHelmChart:
//!       releaseName: gloo
//!       releaseUri: https://storage.googleapis.com/gloo-ee-helm/charts/gloo-ee-1.3.0.tgz
//!       waitForPods: true
//!   - apply:
//!       path: petstore.yaml
//!   - curl:
//!       service:
//!         name: gateway-proxy
//!       path: /sample-route-1
//!       statusCode: 200
//! ```
//!
//! Steps run strictly in sequence and the first error aborts the run. There
//! is no rollback: teardown is a separate, explicit operation.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::context::WorkflowContext;
use crate::error::Result;
use crate::loader;
use crate::render::Values;
use crate::step::Step;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Workflow {
    #[serde(default, skip_serializing_if = "Values::is_empty")]
    pub values: Values,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Workflow {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            values: Values::new(),
            steps,
        }
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        loader::load(path).await
    }

    /// Values the steps see; the context's values win over the workflow's
    pub fn effective_values(&self, ctx: &WorkflowContext) -> Values {
        ctx.values.merge(&self.values)
    }

    #[instrument(skip_all, fields(steps = self.steps.len()))]
    pub async fn run(&self, ctx: &WorkflowContext) -> Result<()> {
        let values = self.effective_values(ctx);
        for (index, step) in self.steps.iter().enumerate() {
            info!(step = index + 1, kind = step.kind(), "Running step");
            step.run(ctx, &values).await?;
        }
        info!("Workflow complete");
        Ok(())
    }

    /// Undo the steps bottom to top, skipping the ones that cannot be undone
    #[instrument(skip_all, fields(steps = self.steps.len()))]
    pub async fn teardown(&self, ctx: &WorkflowContext) -> Result<()> {
        let values = self.effective_values(ctx);
        for (index, step) in self.steps.iter().enumerate().rev() {
            if !step.supports_teardown() {
                debug!(step = index + 1, kind = step.kind(), "Nothing to tear down");
                continue;
            }
            info!(step = index + 1, kind = step.kind(), "Tearing down");
            step.teardown(ctx, &values).await?;
        }
        info!("Workflow teardown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValetError;
    use crate::step::{Curl, InstallHelmChart, ServiceRef};
    use crate::test_utils::{MockKubeClient, MockRunner, TestHarness};

    fn install(release: &str) -> Step {
        Step::InstallHelmChart(InstallHelmChart {
            release_name: release.to_string(),
            release_uri: format!("{release}/{release}"),
            ..Default::default()
        })
    }

    fn curl() -> Step {
        Step::Curl(Curl {
            service: Some(ServiceRef::new("gateway-proxy", "gloo-system")),
            path: "/".to_string(),
            delay: "1ms".to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_run_in_declared_order() {
        let harness = TestHarness::new(
            MockRunner::new().with_response(200, ""),
            MockKubeClient::new().with_address("10.0.0.1:80"),
        );
        let mut workflow = Workflow::new(vec![
            install("gloo"),
            Step::wait_for_pods("gloo-system"),
            curl(),
            install("petstore"),
        ]);
        workflow.values = Values::new().with("Namespace", "gloo-system");

        workflow.run(&harness.ctx).await.unwrap();

        assert_eq!(
            harness.runner.commands(),
            vec![
                "helm upgrade --install gloo gloo/gloo --namespace gloo-system --create-namespace",
                "helm upgrade --install petstore petstore/petstore --namespace gloo-system --create-namespace",
            ]
        );
        assert_eq!(harness.runner.requests().len(), 1);
        assert_eq!(
            harness.kube.calls(),
            vec![
                "wait_until_pods_running gloo-system",
                "get_ingress_address gateway-proxy gloo-system http",
            ]
        );
    }

    #[tokio::test]
    async fn test_run_aborts_on_first_error() {
        let harness = TestHarness::new(
            MockRunner::new(),
            MockKubeClient::new().with_pods_error("pod crashlooping"),
        );
        let mut workflow = Workflow::new(vec![Step::wait_for_pods("default"), install("gloo")]);
        workflow.values = Values::new().with("Namespace", "default");

        let err = workflow.run(&harness.ctx).await.unwrap_err();

        assert!(matches!(err, ValetError::KubeError { .. }));
        assert!(harness.runner.commands().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_reverse_order_skips_checks() {
        let harness = TestHarness::default();
        let mut workflow = Workflow::new(vec![
            install("gloo"),
            Step::wait_for_pods("default"),
            curl(),
            install("petstore"),
        ]);
        workflow.values = Values::new().with("Namespace", "default");

        workflow.teardown(&harness.ctx).await.unwrap();

        assert_eq!(
            harness.runner.commands(),
            vec![
                "helm uninstall petstore --namespace default",
                "helm uninstall gloo --namespace default",
            ]
        );
        assert!(harness.kube.calls().is_empty());
        assert!(harness.runner.requests().is_empty());
    }

    #[tokio::test]
    async fn test_context_values_win() {
        let harness = TestHarness::default();
        let ctx = harness
            .ctx
            .clone()
            .with_values(Values::new().with("Namespace", "from-cli"));
        let mut workflow = Workflow::new(vec![Step::WaitForPods(Default::default())]);
        workflow.values = Values::new().with("Namespace", "from-file");

        workflow.run(&ctx).await.unwrap();

        assert_eq!(harness.kube.calls(), vec!["wait_until_pods_running from-cli"]);
    }

    #[test]
    fn test_parse_workflow() {
        let yaml = r#"
values:
  Namespace: default
steps:
  - apply:
      path: petstore.yaml
  - waitForPods: {}
"#;
        let workflow: Workflow = loader::parse(yaml, "workflow.yaml").unwrap();
        assert_eq!(workflow.values.get("Namespace"), Some("default"));
        assert_eq!(workflow.steps.len(), 2);
        assert_eq!(workflow.steps[0], Step::apply("petstore.yaml"));
    }

    #[test]
    fn test_parse_rejects_unknown_field() {
        let err = loader::parse::<Workflow>("stepz: []\n", "workflow.yaml").unwrap_err();
        assert!(err.to_string().contains("stepz"));
    }
}

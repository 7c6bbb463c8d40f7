//! Install a helm chart from a URI and optionally wait for its pods

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::WorkflowContext;
use crate::error::Result;
use crate::render::fields::{is_unset, render_fields, FieldSpec, FieldValue, Renderable};
use crate::render::{Values, NAMESPACE_KEY};
use crate::resource::helm::{set_args, values_file_args};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InstallHelmChart {
    #[serde(default, skip_serializing_if = "is_unset")]
    pub release_name: String,
    /// Chart tarball URL or `repo/chart` reference
    #[serde(default, skip_serializing_if = "is_unset")]
    pub release_uri: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub wait_for_pods: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values_files: Vec<String>,
}

impl Renderable for InstallHelmChart {
    const TYPE_NAME: &'static str = "InstallHelmChart";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("releaseName").required(),
        FieldSpec::new("releaseUri").required(),
        FieldSpec::new("namespace").key(NAMESPACE_KEY).required(),
        FieldSpec::new("waitForPods"),
    ];

    fn field_mut(&mut self, name: &str) -> Option<&mut dyn FieldValue> {
        match name {
            "releaseName" => Some(&mut self.release_name),
            "releaseUri" => Some(&mut self.release_uri),
            "namespace" => Some(&mut self.namespace),
            "waitForPods" => Some(&mut self.wait_for_pods),
            _ => None,
        }
    }
}

impl InstallHelmChart {
    async fn rendered(&self, ctx: &WorkflowContext, values: &Values) -> Result<Self> {
        let mut step = self.clone();
        render_fields(&mut step, values, &ctx.render_ctx()).await?;
        Ok(step)
    }

    pub async fn run(&self, ctx: &WorkflowContext, values: &Values) -> Result<()> {
        let step = self.rendered(ctx, values).await?;
        info!("{}", step.summary());
        let command = ctx
            .helm()
            .args(["upgrade", "--install"])
            .args([step.release_name.as_str(), step.release_uri.as_str()])
            .args(["--namespace", step.namespace.as_str(), "--create-namespace"])
            .args(set_args(&step.set, &ctx.env)?)
            .args(values_file_args(&step.values_files));
        ctx.runner.run(&command).await?;

        if step.wait_for_pods {
            ctx.kube.wait_until_pods_running(&step.namespace).await?;
        }
        Ok(())
    }

    pub async fn teardown(&self, ctx: &WorkflowContext, values: &Values) -> Result<()> {
        let step = self.rendered(ctx, values).await?;
        info!(release = %step.release_name, namespace = %step.namespace, "Uninstalling helm chart");
        let command = ctx
            .helm()
            .args(["uninstall", step.release_name.as_str()])
            .args(["--namespace", step.namespace.as_str()]);
        ctx.runner.run(&command).await
    }

    fn summary(&self) -> String {
        format!(
            "Installing helm chart {} from {} into namespace {}",
            self.release_name, self.release_uri, self.namespace
        )
    }

    pub async fn describe(&self, ctx: &WorkflowContext, values: &Values) -> Result<String> {
        Ok(self.rendered(ctx, values).await?.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValetError;
    use crate::test_utils::{MockKubeClient, MockRunner, TestHarness};

    fn petstore() -> InstallHelmChart {
        InstallHelmChart {
            release_name: "petstore".to_string(),
            release_uri: "https://charts.example.com/petstore-0.1.0.tgz".to_string(),
            values_files: vec!["petstore-values.yaml".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_install_and_wait() {
        let harness = TestHarness::default();
        let mut step = petstore();
        step.wait_for_pods = true;
        let values = Values::new().with("Namespace", "default");

        step.run(&harness.ctx, &values).await.unwrap();

        assert_eq!(
            harness.runner.commands(),
            vec!["helm upgrade --install petstore https://charts.example.com/petstore-0.1.0.tgz --namespace default --create-namespace --values petstore-values.yaml"]
        );
        assert_eq!(harness.kube.calls(), vec!["wait_until_pods_running default"]);
    }

    #[tokio::test]
    async fn test_install_without_wait() {
        let harness = TestHarness::default();
        let values = Values::new().with("Namespace", "default");
        petstore().run(&harness.ctx, &values).await.unwrap();
        assert!(harness.kube.calls().is_empty());
    }

    #[tokio::test]
    async fn test_install_failure_skips_wait() {
        let command = "helm upgrade --install petstore https://charts.example.com/petstore-0.1.0.tgz --namespace default --create-namespace --values petstore-values.yaml";
        let harness = TestHarness::new(
            MockRunner::new().with_failure(command, "chart not found"),
            MockKubeClient::new(),
        );
        let mut step = petstore();
        step.wait_for_pods = true;

        let err = step
            .run(&harness.ctx, &Values::new().with("Namespace", "default"))
            .await
            .unwrap_err();
        assert!(matches!(err, ValetError::CommandFailed { .. }));
        assert!(harness.kube.calls().is_empty());
    }

    #[tokio::test]
    async fn test_namespace_required() {
        let harness = TestHarness::default();
        let err = petstore().run(&harness.ctx, &Values::new()).await.unwrap_err();
        assert!(matches!(err, ValetError::RequiredValueNotProvided { key } if key == "Namespace"));
    }

    #[tokio::test]
    async fn test_teardown() {
        let harness = TestHarness::default();
        petstore()
            .teardown(&harness.ctx, &Values::new().with("Namespace", "default"))
            .await
            .unwrap();
        assert_eq!(
            harness.runner.commands(),
            vec!["helm uninstall petstore --namespace default"]
        );
    }

    #[test]
    fn test_fields_addressable() {
        assert!(crate::render::fields::unaddressable_fields(&mut InstallHelmChart::default()).is_empty());
    }
}

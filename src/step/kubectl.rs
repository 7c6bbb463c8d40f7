//! kubectl-backed steps: apply, delete, patch, wait for pods

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::WorkflowContext;
use crate::error::Result;
use crate::render::fields::{is_unset, render_fields, FieldSpec, FieldValue, Renderable};
use crate::render::{Values, NAMESPACE_KEY};
use crate::resource::Template;

// ═══════════════════════════════════════════════════════════════
// APPLY / DELETE
// ═══════════════════════════════════════════════════════════════

/// Render a template file and apply it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Apply {
    pub path: String,
    #[serde(default, skip_serializing_if = "Values::is_empty")]
    pub values: Values,
}

impl Apply {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            values: Values::new(),
        }
    }

    fn template(&self) -> Template {
        Template {
            path: self.path.clone(),
            values: self.values.clone(),
        }
    }

    pub async fn run(&self, ctx: &WorkflowContext, values: &Values) -> Result<()> {
        self.template().ensure(ctx, values).await
    }

    pub async fn teardown(&self, ctx: &WorkflowContext, values: &Values) -> Result<()> {
        self.template().teardown(ctx, values).await
    }
}

/// Render a template file and delete what it describes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Delete {
    pub path: String,
    #[serde(default, skip_serializing_if = "Values::is_empty")]
    pub values: Values,
}

impl Delete {
    pub async fn run(&self, ctx: &WorkflowContext, values: &Values) -> Result<()> {
        Template {
            path: self.path.clone(),
            values: self.values.clone(),
        }
        .teardown(ctx, values)
        .await
    }
}

// ═══════════════════════════════════════════════════════════════
// WAIT FOR PODS
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WaitForPods {
    #[serde(default, skip_serializing_if = "is_unset")]
    pub namespace: String,
}

impl Renderable for WaitForPods {
    const TYPE_NAME: &'static str = "WaitForPods";
    const FIELDS: &'static [FieldSpec] = &[FieldSpec::new("namespace").key(NAMESPACE_KEY).required()];

    fn field_mut(&mut self, name: &str) -> Option<&mut dyn FieldValue> {
        match name {
            "namespace" => Some(&mut self.namespace),
            _ => None,
        }
    }
}

impl WaitForPods {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    async fn rendered(&self, ctx: &WorkflowContext, values: &Values) -> Result<Self> {
        let mut step = self.clone();
        render_fields(&mut step, values, &ctx.render_ctx()).await?;
        Ok(step)
    }

    fn summary(&self) -> String {
        format!("Waiting for pods in namespace {}", self.namespace)
    }

    pub async fn run(&self, ctx: &WorkflowContext, values: &Values) -> Result<()> {
        let step = self.rendered(ctx, values).await?;
        info!("{}", step.summary());
        ctx.kube.wait_until_pods_running(&step.namespace).await
    }

    pub async fn describe(&self, ctx: &WorkflowContext, values: &Values) -> Result<String> {
        Ok(self.rendered(ctx, values).await?.summary())
    }
}

// ═══════════════════════════════════════════════════════════════
// PATCH
// ═══════════════════════════════════════════════════════════════

/// `kubectl patch` with the rendered contents of a file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Patch {
    #[serde(default, skip_serializing_if = "is_unset")]
    pub name: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub kube_type: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub patch_type: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Values::is_empty")]
    pub values: Values,
}

impl Renderable for Patch {
    const TYPE_NAME: &'static str = "Patch";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("name").required(),
        FieldSpec::new("namespace").key(NAMESPACE_KEY),
        FieldSpec::new("kubeType").required(),
        FieldSpec::new("patchType").default_value("merge"),
        FieldSpec::new("path").required(),
    ];

    fn field_mut(&mut self, name: &str) -> Option<&mut dyn FieldValue> {
        match name {
            "name" => Some(&mut self.name),
            "namespace" => Some(&mut self.namespace),
            "kubeType" => Some(&mut self.kube_type),
            "patchType" => Some(&mut self.patch_type),
            "path" => Some(&mut self.path),
            _ => None,
        }
    }
}

impl Patch {
    async fn rendered(&self, ctx: &WorkflowContext, values: &Values) -> Result<Self> {
        let mut step = self.clone();
        render_fields(&mut step, values, &ctx.render_ctx()).await?;
        Ok(step)
    }

    pub async fn run(&self, ctx: &WorkflowContext, values: &Values) -> Result<()> {
        let step = self.rendered(ctx, values).await?;
        info!("{}", step.summary());
        let patch = Template {
            path: step.path.clone(),
            values: step.values.clone(),
        }
        .load(ctx, values)
        .await?;
        let command = ctx
            .kubectl()
            .args(["patch", step.kube_type.as_str(), step.name.as_str()])
            .namespace(&step.namespace)
            .args(["--type", step.patch_type.as_str()])
            .args(["--patch", patch.as_str()]);
        ctx.runner.run(&command).await
    }

    fn summary(&self) -> String {
        format!(
            "Patching {} {}.{} with {} ({})",
            self.kube_type, self.namespace, self.name, self.path, self.patch_type
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
    use crate::render::fields::unaddressable_fields;
    use crate::test_utils::TestHarness;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_apply_then_teardown() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "kind: VirtualService\nmetadata:\n  name: {{{{ .Name }}}}\n").unwrap();
        let mut apply = Apply::new(file.path().display().to_string());
        apply.values = Values::new().with("Name", "petstore");
        let harness = TestHarness::default();

        apply.run(&harness.ctx, &Values::new()).await.unwrap();
        apply.teardown(&harness.ctx, &Values::new()).await.unwrap();

        let calls = harness.runner.calls();
        assert_eq!(calls[0].to_string(), "kubectl apply -f -");
        assert_eq!(calls[1].to_string(), "kubectl delete -f - --ignore-not-found");
        assert!(calls[0].stdin.as_deref().unwrap().contains("name: petstore"));
    }

    #[tokio::test]
    async fn test_wait_for_pods_namespace_from_values() {
        let harness = TestHarness::default();
        let values = Values::new().with("Namespace", "gloo-system");

        WaitForPods::default().run(&harness.ctx, &values).await.unwrap();
        WaitForPods::new("default").run(&harness.ctx, &values).await.unwrap();

        assert_eq!(
            harness.kube.calls(),
            vec![
                "wait_until_pods_running gloo-system",
                "wait_until_pods_running default",
            ]
        );
    }

    #[tokio::test]
    async fn test_wait_for_pods_requires_namespace() {
        let harness = TestHarness::default();
        let err = WaitForPods::default()
            .run(&harness.ctx, &Values::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ValetError::RequiredValueNotProvided { key } if key == "Namespace"));
    }

    #[tokio::test]
    async fn test_patch_command() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "spec:\n  ratelimit:\n    descriptors: []\n").unwrap();
        let patch = Patch {
            name: "default".to_string(),
            namespace: "gloo-system".to_string(),
            kube_type: "settings".to_string(),
            path: file.path().display().to_string(),
            ..Default::default()
        };
        let harness = TestHarness::default();

        patch.run(&harness.ctx, &Values::new()).await.unwrap();

        let call = &harness.runner.calls()[0];
        assert_eq!(
            call.args[..7],
            ["patch", "settings", "default", "-n", "gloo-system", "--type", "merge"]
        );
        assert_eq!(call.args[7], "--patch");
        assert!(call.args[8].contains("descriptors"));
    }

    #[test]
    fn test_fields_addressable() {
        assert!(unaddressable_fields(&mut WaitForPods::default()).is_empty());
        assert!(unaddressable_fields(&mut Patch::default()).is_empty());
    }
}

//! Template resource - a manifest file with `{{ .Key }}` placeholders

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{kubectl_apply, kubectl_delete};
use crate::context::WorkflowContext;
use crate::error::Result;
use crate::loader;
use crate::render::Values;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Template {
    pub path: String,
    #[serde(default, skip_serializing_if = "Values::is_empty")]
    pub values: Values,
}

impl Template {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            values: Values::new(),
        }
    }

    /// Load the file and substitute placeholders; incoming values win over the template's own
    pub async fn load(&self, ctx: &WorkflowContext, values: &Values) -> Result<String> {
        let values = values.merge(&self.values);
        let body = loader::read_file(&self.path).await?;
        values.render_template(&body, &ctx.render_ctx()).await
    }

    pub async fn ensure(&self, ctx: &WorkflowContext, values: &Values) -> Result<()> {
        info!(path = %self.path, values = %values.merge(&self.values), "Ensuring template");
        let rendered = self.load(ctx, values).await?;
        kubectl_apply(ctx, rendered, "").await
    }

    pub async fn teardown(&self, ctx: &WorkflowContext, values: &Values) -> Result<()> {
        info!(path = %self.path, "Tearing down template");
        let rendered = self.load(ctx, values).await?;
        kubectl_delete(ctx, rendered, "").await
    }

    pub async fn render(&self, ctx: &WorkflowContext, values: &Values) -> Result<Vec<Value>> {
        loader::parse_objects(&self.load(ctx, values).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestHarness;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn template_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: {{{{ .Namespace }}}}\n"
        )
        .unwrap();
        file
    }

    #[tokio::test]
    async fn test_template_ensure_pipes_rendered_yaml() {
        let file = template_file();
        let harness = TestHarness::default();
        let template = Template::new(file.path().display().to_string());
        let values = Values::new().with("Namespace", "gloo-system");

        template.ensure(&harness.ctx, &values).await.unwrap();

        let calls = harness.runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].to_string(), "kubectl apply -f -");
        assert!(calls[0].stdin.as_deref().unwrap().contains("name: gloo-system"));
    }

    #[tokio::test]
    async fn test_template_teardown_deletes() {
        let file = template_file();
        let harness = TestHarness::default();
        let template = Template::new(file.path().display().to_string());
        let values = Values::new().with("Namespace", "ns");

        template.teardown(&harness.ctx, &values).await.unwrap();
        assert_eq!(harness.runner.commands(), vec!["kubectl delete -f - --ignore-not-found"]);
    }

    #[tokio::test]
    async fn test_incoming_values_win_over_template_values() {
        let file = template_file();
        let harness = TestHarness::default();
        let mut template = Template::new(file.path().display().to_string());
        template.values = Values::new().with("Namespace", "from-template");

        let objects = template
            .render(&harness.ctx, &Values::new().with("Namespace", "from-input"))
            .await
            .unwrap();
        assert_eq!(objects[0]["metadata"]["name"], "from-input");

        let objects = template.render(&harness.ctx, &Values::new()).await.unwrap();
        assert_eq!(objects[0]["metadata"]["name"], "from-template");
    }

    #[tokio::test]
    async fn test_missing_value_fails() {
        let file = template_file();
        let harness = TestHarness::default();
        let template = Template::new(file.path().display().to_string());
        assert!(template.render(&harness.ctx, &Values::new()).await.is_err());
        assert!(harness.runner.commands().is_empty());
    }
}

//! Step Module - units of workflow execution
//!
//! | Step | Run | Teardown |
//! |------|-----|----------|
//! | `apply` | render a template file, `kubectl apply` | `kubectl delete` |
//! | `delete` | render a template file, `kubectl delete` | - |
//! | `waitForPods` | wait for pods in a namespace | - |
//! | `curl` | HTTP check with bounded retry | - |
//! | `condition` | poll a jsonpath of a kube object | - |
//! | `patch` | `kubectl patch` from a file | - |
//! | `installHelmChart` | `helm upgrade --install` | `helm uninstall` |
//! | `application` | ensure an application file | application teardown |
//!
//! Steps hold no state between runs; every run renders a fresh copy and
//! logs its description from that copy.

pub mod condition;
pub mod curl;
pub mod helm;
pub mod kubectl;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::WorkflowContext;
use crate::error::{Result, ValetError};
use crate::render::Values;
use crate::resource::ApplicationRef;

pub use condition::Condition;
pub use curl::{Curl, PortForward, ServiceRef};
pub use helm::InstallHelmChart;
pub use kubectl::{Apply, Delete, Patch, WaitForPods};

/// One workflow step; exactly one variant per entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StepFields", into = "StepFields")]
pub enum Step {
    Apply(Apply),
    Delete(Delete),
    WaitForPods(WaitForPods),
    Curl(Curl),
    Condition(Condition),
    Patch(Patch),
    InstallHelmChart(InstallHelmChart),
    Application(ApplicationRef),
}

impl Step {
    pub fn apply(path: impl Into<String>) -> Self {
        Step::Apply(Apply::new(path))
    }

    pub fn wait_for_pods(namespace: impl Into<String>) -> Self {
        Step::WaitForPods(WaitForPods::new(namespace))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Step::Apply(_) => "apply",
            Step::Delete(_) => "delete",
            Step::WaitForPods(_) => "waitForPods",
            Step::Curl(_) => "curl",
            Step::Condition(_) => "condition",
            Step::Patch(_) => "patch",
            Step::InstallHelmChart(_) => "installHelmChart",
            Step::Application(_) => "application",
        }
    }

    /// Whether teardown undoes this step (checks and one-way actions do not)
    pub fn supports_teardown(&self) -> bool {
        matches!(
            self,
            Step::Apply(_) | Step::InstallHelmChart(_) | Step::Application(_)
        )
    }

    pub async fn run(&self, ctx: &WorkflowContext, values: &Values) -> Result<()> {
        match self {
            Step::Apply(s) => {
                info!("Applying {}", s.path);
                s.run(ctx, values).await
            }
            Step::Delete(s) => {
                info!("Deleting {}", s.path);
                s.run(ctx, values).await
            }
            Step::WaitForPods(s) => s.run(ctx, values).await,
            Step::Curl(s) => s.run(ctx, values).await,
            Step::Condition(s) => s.run(ctx, values).await,
            Step::Patch(s) => s.run(ctx, values).await,
            Step::InstallHelmChart(s) => s.run(ctx, values).await,
            Step::Application(s) => {
                info!("Ensuring application {}", s.path);
                s.ensure(ctx, values).await
            }
        }
    }

    /// Undo the step; a no-op for steps that do not support teardown
    pub async fn teardown(&self, ctx: &WorkflowContext, values: &Values) -> Result<()> {
        match self {
            Step::Apply(s) => s.teardown(ctx, values).await,
            Step::InstallHelmChart(s) => s.teardown(ctx, values).await,
            Step::Application(s) => s.teardown(ctx, values).await,
            _ => Ok(()),
        }
    }

    /// Human-readable summary of what the step will do
    pub async fn describe(&self, ctx: &WorkflowContext, values: &Values) -> Result<String> {
        match self {
            Step::Apply(s) => Ok(format!("Applying {}", s.path)),
            Step::Delete(s) => Ok(format!("Deleting {}", s.path)),
            Step::WaitForPods(s) => s.describe(ctx, values).await,
            Step::Curl(s) => s.describe(ctx, values).await,
            Step::Condition(s) => s.describe(ctx, values).await,
            Step::Patch(s) => s.describe(ctx, values).await,
            Step::InstallHelmChart(s) => s.describe(ctx, values).await,
            Step::Application(s) => Ok(format!("Ensuring application {}", s.path)),
        }
    }
}

/// Wire form: one optional key per variant
#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct StepFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    apply: Option<Apply>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delete: Option<Delete>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wait_for_pods: Option<WaitForPods>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    curl: Option<Curl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    patch: Option<Patch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    install_helm_chart: Option<InstallHelmChart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    application: Option<ApplicationRef>,
}

impl TryFrom<StepFields> for Step {
    type Error = ValetError;

    fn try_from(fields: StepFields) -> Result<Self> {
        let mut set: Vec<Step> = [
            fields.apply.map(Step::Apply),
            fields.delete.map(Step::Delete),
            fields.wait_for_pods.map(Step::WaitForPods),
            fields.curl.map(Step::Curl),
            fields.condition.map(Step::Condition),
            fields.patch.map(Step::Patch),
            fields.install_helm_chart.map(Step::InstallHelmChart),
            fields.application.map(Step::Application),
        ]
        .into_iter()
        .flatten()
        .collect();

        match set.len() {
            1 => Ok(set.remove(0)),
            0 => Err(ValetError::InvalidStep {
                reason: "no action set".to_string(),
            }),
            _ => Err(ValetError::InvalidStep {
                reason: format!(
                    "more than one action set: {}",
                    set.iter().map(Step::kind).collect::<Vec<_>>().join(", ")
                ),
            }),
        }
    }
}

impl From<Step> for StepFields {
    fn from(step: Step) -> Self {
        let mut fields = StepFields::default();
        match step {
            Step::Apply(s) => fields.apply = Some(s),
            Step::Delete(s) => fields.delete = Some(s),
            Step::WaitForPods(s) => fields.wait_for_pods = Some(s),
            Step::Curl(s) => fields.curl = Some(s),
            Step::Condition(s) => fields.condition = Some(s),
            Step::Patch(s) => fields.patch = Some(s),
            Step::InstallHelmChart(s) => fields.install_helm_chart = Some(s),
            Step::Application(s) => fields.application = Some(s),
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader;

    #[test]
    fn test_step_parse_wait_for_pods() {
        let step: Step = loader::parse("waitForPods:\n  namespace: default\n", "s").unwrap();
        assert_eq!(step, Step::wait_for_pods("default"));
    }

    #[test]
    fn test_step_rejects_two_actions() {
        let yaml = "apply:\n  path: a.yaml\ncurl:\n  path: /\n";
        let err = loader::parse::<Step>(yaml, "s").unwrap_err();
        assert!(err.to_string().contains("more than one action set: apply, curl"));
    }

    #[test]
    fn test_step_rejects_no_action() {
        let err = loader::parse::<Step>("{}", "s").unwrap_err();
        assert!(err.to_string().contains("no action set"));
    }

    #[test]
    fn test_supports_teardown() {
        assert!(Step::apply("a.yaml").supports_teardown());
        assert!(!Step::wait_for_pods("default").supports_teardown());
        assert!(!Step::Curl(Curl::default()).supports_teardown());
        assert!(!Step::Condition(Condition::default()).supports_teardown());
    }

    #[test]
    fn test_step_parse_condition() {
        let yaml = r#"
condition:
  type: virtualservice
  name: petstore
  jsonpath: '{.status.state}'
  value: Accepted
  interval: 2s
"#;
        let step: Step = loader::parse(yaml, "s").unwrap();
        assert_eq!(
            step,
            Step::Condition(Condition {
                kube_type: "virtualservice".to_string(),
                name: "petstore".to_string(),
                jsonpath: "{.status.state}".to_string(),
                value: "Accepted".to_string(),
                interval: "2s".to_string(),
                ..Default::default()
            })
        );
        assert_eq!(step.kind(), "condition");
    }

    #[tokio::test]
    async fn test_describe_renders_values() {
        let harness = crate::test_utils::TestHarness::default();
        let values = Values::new().with("Namespace", "gloo-system");
        let condition = Step::Condition(Condition {
            kube_type: "deployment".to_string(),
            name: "gloo".to_string(),
            jsonpath: "{.status.readyReplicas}".to_string(),
            value: "1".to_string(),
            ..Default::default()
        });

        assert_eq!(
            Step::WaitForPods(WaitForPods::default())
                .describe(&harness.ctx, &values)
                .await
                .unwrap(),
            "Waiting for pods in namespace gloo-system"
        );
        assert_eq!(
            condition.describe(&harness.ctx, &values).await.unwrap(),
            "Waiting up to 120s for deployment gloo-system.gloo {.status.readyReplicas} to be '1'"
        );
        assert!(harness.runner.commands().is_empty());
    }

    #[test]
    fn test_serializes_as_single_key() {
        let yaml = serde_yaml::to_string(&Step::apply("petstore.yaml")).unwrap();
        assert_eq!(yaml, "apply:\n  path: petstore.yaml\n");
    }
}

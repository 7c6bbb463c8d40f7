//! Condition check - wait for a field of a kube object to reach a value
//!
//! ```yaml
//! condition:
//!   type: deployment
//!   name: petstore
//!   jsonpath: '{.status.readyReplicas}'
//!   value: "1"
//!   timeout: 120s
//!   interval: 2s
//! ```
//!
//! The object is read with `kubectl get -o jsonpath` once per interval until
//! the trimmed output equals the trimmed value or the timeout runs out. A
//! failed `kubectl get` (object not created yet) counts as a miss.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::curl::parse_duration;
use crate::cmd::Command;
use crate::context::WorkflowContext;
use crate::error::{Result, ValetError};
use crate::render::fields::{is_unset, render_fields, FieldSpec, FieldValue, Renderable};
use crate::render::{Values, NAMESPACE_KEY};

pub const DEFAULT_CONDITION_TIMEOUT: &str = "120s";
pub const DEFAULT_CONDITION_INTERVAL: &str = "1s";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Condition {
    /// Kube resource type, e.g. `deployment` or `virtualservice`
    #[serde(default, rename = "type", skip_serializing_if = "is_unset")]
    pub kube_type: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub name: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub jsonpath: String,
    /// Expected jsonpath output
    #[serde(default, skip_serializing_if = "is_unset")]
    pub value: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub timeout: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub interval: String,
}

impl Renderable for Condition {
    const TYPE_NAME: &'static str = "Condition";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("type"),
        FieldSpec::new("name"),
        FieldSpec::new("namespace").key(NAMESPACE_KEY),
        FieldSpec::new("jsonpath"),
        FieldSpec::new("value"),
        FieldSpec::new("timeout").default_value(DEFAULT_CONDITION_TIMEOUT),
        FieldSpec::new("interval").default_value(DEFAULT_CONDITION_INTERVAL),
    ];

    fn field_mut(&mut self, name: &str) -> Option<&mut dyn FieldValue> {
        match name {
            "type" => Some(&mut self.kube_type),
            "name" => Some(&mut self.name),
            "namespace" => Some(&mut self.namespace),
            "jsonpath" => Some(&mut self.jsonpath),
            "value" => Some(&mut self.value),
            "timeout" => Some(&mut self.timeout),
            "interval" => Some(&mut self.interval),
            _ => None,
        }
    }
}

impl Condition {
    pub async fn rendered(&self, ctx: &WorkflowContext, values: &Values) -> Result<Self> {
        let mut condition = self.clone();
        render_fields(&mut condition, values, &ctx.render_ctx()).await?;
        Ok(condition)
    }

    /// `kubectl get <type> <name> -n <ns> -o jsonpath=<jsonpath>`
    pub fn command(&self, ctx: &WorkflowContext) -> Command {
        ctx.kubectl()
            .args(["get", self.kube_type.as_str(), self.name.as_str()])
            .namespace(&self.namespace)
            .arg("-o")
            .arg(format!("jsonpath={}", self.jsonpath))
    }

    /// Number of polls and the pause between them; the first poll is immediate
    pub fn schedule(&self) -> Result<(u32, Duration)> {
        let timeout = parse_duration("timeout", &self.timeout)?;
        let interval = parse_duration("interval", &self.interval)?;
        if interval.is_zero() {
            return Err(ValetError::FieldConversion {
                field: "interval".to_string(),
                value: self.interval.clone(),
                reason: "must be greater than zero".to_string(),
            });
        }
        let polls = timeout.as_nanos() / interval.as_nanos();
        let attempts = u32::try_from(polls).unwrap_or(u32::MAX).saturating_add(1);
        Ok((attempts, interval))
    }

    pub fn check(&self, output: &str) -> Result<()> {
        if output.trim() == self.value.trim() {
            return Ok(());
        }
        Err(ValetError::ConditionNotMet {
            target: self.target(),
            expected: self.value.clone(),
            actual: output.trim().to_string(),
        })
    }

    fn target(&self) -> String {
        let object = if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        };
        format!("{} {} {}", self.kube_type, object, self.jsonpath)
    }

    fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("type", &self.kube_type),
            ("name", &self.name),
            ("jsonpath", &self.jsonpath),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| field)
        .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(ValetError::InvalidStep {
            reason: format!("condition is missing {}", missing.join(", ")),
        })
    }

    fn summary(&self) -> String {
        format!(
            "Waiting up to {} for {} to be '{}'",
            self.timeout,
            self.target(),
            self.value
        )
    }

    #[instrument(skip_all, fields(name = %self.name))]
    pub async fn run(&self, ctx: &WorkflowContext, values: &Values) -> Result<()> {
        let condition = self.rendered(ctx, values).await?;
        condition.validate()?;
        let (attempts, interval) = condition.schedule()?;
        info!("{}", condition.summary());

        let command = condition.command(ctx);
        {
            let (condition, command) = (&condition, &command);
            ctx.retry_policy(attempts, interval)
                .execute("condition", move |_| async move {
                    let output = ctx.runner.output(command).await?;
                    condition.check(&output)
                })
                .await?;
        }
        info!("Condition met");
        Ok(())
    }

    pub async fn describe(&self, ctx: &WorkflowContext, values: &Values) -> Result<String> {
        let condition = self.rendered(ctx, values).await?;
        Ok(condition.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::fields::unaddressable_fields;
    use crate::test_utils::{MockKubeClient, MockRunner, TestHarness};

    const READY_REPLICAS: &str =
        "kubectl get deployment petstore -n default -o jsonpath={.status.readyReplicas}";

    fn full_condition() -> Condition {
        Condition {
            timeout: "foo1".to_string(),
            kube_type: "foo2".to_string(),
            namespace: "foo3".to_string(),
            name: "foo4".to_string(),
            value: "foo5".to_string(),
            jsonpath: "foo6".to_string(),
            interval: "foo7".to_string(),
        }
    }

    fn ready_replicas(timeout: &str) -> Condition {
        Condition {
            kube_type: "deployment".to_string(),
            name: "petstore".to_string(),
            jsonpath: "{.status.readyReplicas}".to_string(),
            value: "1".to_string(),
            timeout: timeout.to_string(),
            interval: "1ms".to_string(),
            ..Default::default()
        }
    }

    fn values() -> Values {
        Values::new().with("Namespace", "default")
    }

    #[tokio::test]
    async fn test_fully_provided_is_unchanged() {
        let harness = TestHarness::default();
        let rendered = full_condition()
            .rendered(&harness.ctx, &values())
            .await
            .unwrap();
        assert_eq!(rendered, full_condition());
    }

    #[tokio::test]
    async fn test_render_defaults() {
        let harness = TestHarness::default();
        let rendered = Condition::default()
            .rendered(&harness.ctx, &Values::new())
            .await
            .unwrap();

        assert_eq!(rendered.timeout, DEFAULT_CONDITION_TIMEOUT);
        assert_eq!(rendered.interval, DEFAULT_CONDITION_INTERVAL);
        assert_eq!(rendered.namespace, "");
    }

    #[tokio::test]
    async fn test_namespace_from_values() {
        let harness = TestHarness::default();
        let rendered = ready_replicas("1s")
            .rendered(&harness.ctx, &values())
            .await
            .unwrap();
        assert_eq!(rendered.namespace, "default");
        assert_eq!(rendered.command(&harness.ctx).to_string(), READY_REPLICAS);
    }

    #[test]
    fn test_schedule() {
        let mut condition = ready_replicas("10s");
        condition.interval = "2s".to_string();
        assert_eq!(condition.schedule().unwrap(), (6, Duration::from_secs(2)));

        condition.timeout = "0s".to_string();
        assert_eq!(condition.schedule().unwrap().0, 1);

        condition.interval = "0s".to_string();
        assert!(matches!(
            condition.schedule(),
            Err(ValetError::FieldConversion { field, .. }) if field == "interval"
        ));
    }

    #[tokio::test]
    async fn test_polls_until_value_matches() {
        let harness = TestHarness::new(
            MockRunner::new().with_outputs(READY_REPLICAS, ["", "0", "1\n"]),
            MockKubeClient::new(),
        );

        ready_replicas("1s").run(&harness.ctx, &values()).await.unwrap();

        assert_eq!(harness.runner.commands(), vec![READY_REPLICAS; 3]);
    }

    #[tokio::test]
    async fn test_missing_object_is_retried() {
        let harness = TestHarness::new(
            MockRunner::new().with_failure(READY_REPLICAS, "deployments.apps \"petstore\" not found"),
            MockKubeClient::new(),
        );

        let err = ready_replicas("3ms").run(&harness.ctx, &values()).await.unwrap_err();

        assert!(matches!(err, ValetError::CommandFailed { .. }));
        assert_eq!(harness.runner.commands().len(), 4);
    }

    #[tokio::test]
    async fn test_timeout_returns_last_observed_value() {
        let harness = TestHarness::new(
            MockRunner::new().with_output(READY_REPLICAS, "0"),
            MockKubeClient::new(),
        );

        let err = ready_replicas("2ms").run(&harness.ctx, &values()).await.unwrap_err();

        match err {
            ValetError::ConditionNotMet {
                target,
                expected,
                actual,
            } => {
                assert_eq!(target, "deployment default.petstore {.status.readyReplicas}");
                assert_eq!(expected, "1");
                assert_eq!(actual, "0");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(harness.runner.commands().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_target_rejected_before_polling() {
        let harness = TestHarness::default();
        let err = Condition {
            kube_type: "deployment".to_string(),
            ..Default::default()
        }
        .run(&harness.ctx, &values())
        .await
        .unwrap_err();

        assert!(err.to_string().contains("condition is missing name, jsonpath"));
        assert!(harness.runner.commands().is_empty());
    }

    #[test]
    fn test_fields_addressable() {
        assert!(unaddressable_fields(&mut Condition::default()).is_empty());
    }
}

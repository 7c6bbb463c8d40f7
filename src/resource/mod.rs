//! Resource Module - things an application installs
//!
//! Every variant supports three operations:
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | `ensure`  | create or update the resource in the cluster |
//! | `teardown`| remove it (idempotent) |
//! | `render`  | produce the concrete objects without touching the cluster |
//!
//! Variants are rendered from the value store on every call; nothing is
//! cached between calls.

pub mod application;
pub mod helm;
pub mod manifest;
pub mod secret;
pub mod template;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::WorkflowContext;
use crate::error::{Result, ValetError};
use crate::render::Values;

pub use application::{Application, ApplicationRef, INSTALLATION_STEP_LABEL};
pub use helm::HelmChart;
pub use manifest::Manifest;
pub use secret::{GcloudKmsEncryptedFile, Secret, SecretValue};
pub use template::Template;

/// One resource of an application; exactly one variant per entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ResourceFields", into = "ResourceFields")]
pub enum Resource {
    Template(Template),
    Manifest(Manifest),
    Secret(Secret),
    HelmChart(HelmChart),
    Application(ApplicationRef),
}

impl Resource {
    pub fn kind(&self) -> &'static str {
        match self {
            Resource::Template(_) => "template",
            Resource::Manifest(_) => "manifest",
            Resource::Secret(_) => "secret",
            Resource::HelmChart(_) => "helmChart",
            Resource::Application(_) => "application",
        }
    }

    pub fn ensure<'a>(
        &'a self,
        ctx: &'a WorkflowContext,
        values: &'a Values,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match self {
                Resource::Template(t) => t.ensure(ctx, values).await,
                Resource::Manifest(m) => m.ensure(ctx).await,
                Resource::Secret(s) => s.ensure(ctx, values).await,
                Resource::HelmChart(h) => h.ensure(ctx, values).await,
                Resource::Application(a) => a.ensure(ctx, values).await,
            }
        })
    }

    pub fn teardown<'a>(
        &'a self,
        ctx: &'a WorkflowContext,
        values: &'a Values,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match self {
                Resource::Template(t) => t.teardown(ctx, values).await,
                Resource::Manifest(m) => m.teardown(ctx).await,
                Resource::Secret(s) => s.teardown(ctx, values).await,
                Resource::HelmChart(h) => h.teardown(ctx, values).await,
                Resource::Application(a) => a.teardown(ctx, values).await,
            }
        })
    }

    pub fn render<'a>(
        &'a self,
        ctx: &'a WorkflowContext,
        values: &'a Values,
    ) -> BoxFuture<'a, Result<Vec<Value>>> {
        Box::pin(async move {
            match self {
                Resource::Template(t) => t.render(ctx, values).await,
                Resource::Manifest(m) => m.render().await,
                Resource::Secret(s) => s.render(ctx, values).await,
                Resource::HelmChart(h) => h.render(ctx, values).await,
                Resource::Application(a) => a.render(ctx, values).await,
            }
        })
    }
}

/// Wire form: one optional key per variant
#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ResourceFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    template: Option<Template>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    manifest: Option<Manifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    helm_chart: Option<HelmChart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    application: Option<ApplicationRef>,
}

impl TryFrom<ResourceFields> for Resource {
    type Error = ValetError;

    fn try_from(fields: ResourceFields) -> Result<Self> {
        let mut set: Vec<Resource> = [
            fields.template.map(Resource::Template),
            fields.manifest.map(Resource::Manifest),
            fields.secret.map(Resource::Secret),
            fields.helm_chart.map(Resource::HelmChart),
            fields.application.map(Resource::Application),
        ]
        .into_iter()
        .flatten()
        .collect();

        match set.len() {
            1 => Ok(set.remove(0)),
            0 => Err(ValetError::InvalidResource {
                reason: "resource must set one of template, manifest, secret, helmChart, application"
                    .to_string(),
            }),
            _ => Err(ValetError::InvalidResource {
                reason: format!(
                    "resource sets more than one kind: {}",
                    set.iter().map(Resource::kind).collect::<Vec<_>>().join(", ")
                ),
            }),
        }
    }
}

impl From<Resource> for ResourceFields {
    fn from(resource: Resource) -> Self {
        let mut fields = ResourceFields::default();
        match resource {
            Resource::Template(t) => fields.template = Some(t),
            Resource::Manifest(m) => fields.manifest = Some(m),
            Resource::Secret(s) => fields.secret = Some(s),
            Resource::HelmChart(h) => fields.helm_chart = Some(h),
            Resource::Application(a) => fields.application = Some(a),
        }
        fields
    }
}

/// `kubectl apply -f -` with `yaml` on stdin
pub(crate) async fn kubectl_apply(ctx: &WorkflowContext, yaml: String, namespace: &str) -> Result<()> {
    let command = ctx
        .kubectl()
        .args(["apply", "-f", "-"])
        .namespace(namespace)
        .stdin(yaml);
    ctx.runner.run(&command).await
}

/// `kubectl delete -f - --ignore-not-found` with `yaml` on stdin
pub(crate) async fn kubectl_delete(ctx: &WorkflowContext, yaml: String, namespace: &str) -> Result<()> {
    let command = ctx
        .kubectl()
        .args(["delete", "-f", "-"])
        .namespace(namespace)
        .arg("--ignore-not-found")
        .stdin(yaml);
    ctx.runner.run(&command).await
}

//! Application - an ordered composite of resources
//!
//! Ensure walks resources top to bottom and then waits for the namespace's
//! pods; teardown walks them bottom to top. A failing resource aborts the
//! walk and nothing already applied is rolled back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use super::Resource;
use crate::context::WorkflowContext;
use crate::error::{Result, ValetError};
use crate::loader;
use crate::render::fields::{is_unset, render_fields, FieldSpec, FieldValue, Renderable};
use crate::render::{Values, NAMESPACE_KEY};

/// Label stamped on every rendered object
pub const INSTALLATION_STEP_LABEL: &str = "valet.solo.io/installation_step";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Application {
    #[serde(default, skip_serializing_if = "is_unset")]
    pub name: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Values::is_empty")]
    pub values: Values,
}

impl Renderable for Application {
    const TYPE_NAME: &'static str = "Application";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("name"),
        FieldSpec::new("namespace")
            .key(NAMESPACE_KEY)
            .default_value("default"),
    ];

    fn field_mut(&mut self, name: &str) -> Option<&mut dyn FieldValue> {
        match name {
            "name" => Some(&mut self.name),
            "namespace" => Some(&mut self.namespace),
            _ => None,
        }
    }
}

impl Application {
    /// Merge own values under the input and check required keys
    fn prepare(&self, input: &Values) -> Result<Values> {
        let values = input.merge(&self.values);
        for key in &self.required_values {
            if !values.contains_key(key) {
                return Err(ValetError::RequiredValueNotProvided { key: key.clone() });
            }
        }
        Ok(values)
    }

    async fn rendered(&self, ctx: &WorkflowContext, values: &Values) -> Result<Application> {
        let mut app = self.clone();
        render_fields(&mut app, values, &ctx.render_ctx()).await?;
        Ok(app)
    }

    #[instrument(skip_all, fields(application = %self.name))]
    pub async fn ensure(&self, ctx: &WorkflowContext, input: &Values) -> Result<()> {
        let values = self.prepare(input)?;
        let app = self.rendered(ctx, &values).await?;
        info!(namespace = %app.namespace, resources = app.resources.len(), "Ensuring application");
        for resource in &app.resources {
            resource.ensure(ctx, &values).await?;
        }
        ctx.kube.wait_until_pods_running(&app.namespace).await
    }

    #[instrument(skip_all, fields(application = %self.name))]
    pub async fn teardown(&self, ctx: &WorkflowContext, input: &Values) -> Result<()> {
        let values = self.prepare(input)?;
        let app = self.rendered(ctx, &values).await?;
        info!(namespace = %app.namespace, "Tearing down application");
        for resource in app.resources.iter().rev() {
            resource.teardown(ctx, &values).await?;
        }
        Ok(())
    }

    /// Flattened objects of every resource, labelled with the resource's index
    pub async fn render(&self, ctx: &WorkflowContext, input: &Values) -> Result<Vec<Value>> {
        let values = self.prepare(input)?;
        let mut objects = Vec::new();
        for (index, resource) in self.resources.iter().enumerate() {
            let label = self.installation_step(index);
            for mut object in resource.render(ctx, &values).await? {
                stamp_label(&mut object, &label);
                objects.push(object);
            }
        }
        Ok(objects)
    }

    fn installation_step(&self, index: usize) -> String {
        format!("valet.{}.{}", self.name, index)
    }
}

/// Set `metadata.labels[INSTALLATION_STEP_LABEL]`, creating maps as needed
fn stamp_label(object: &mut Value, label: &str) {
    let Some(object) = object.as_object_mut() else {
        return;
    };
    let metadata = object
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if !metadata.is_object() {
        *metadata = Value::Object(Map::new());
    }
    let Some(metadata) = metadata.as_object_mut() else {
        return;
    };
    let labels = metadata
        .entry("labels")
        .or_insert_with(|| Value::Object(Map::new()));
    if !labels.is_object() {
        *labels = Value::Object(Map::new());
    }
    if let Some(labels) = labels.as_object_mut() {
        labels.insert(
            INSTALLATION_STEP_LABEL.to_string(),
            Value::String(label.to_string()),
        );
    }
}

/// Reference to an application file plus values for it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApplicationRef {
    pub path: String,
    #[serde(default, skip_serializing_if = "Values::is_empty")]
    pub values: Values,
}

impl ApplicationRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            values: Values::new(),
        }
    }

    pub async fn load(&self) -> Result<Application> {
        loader::load(&self.path).await
    }

    pub async fn ensure(&self, ctx: &WorkflowContext, input: &Values) -> Result<()> {
        let values = input.merge(&self.values);
        self.load().await?.ensure(ctx, &values).await
    }

    pub async fn teardown(&self, ctx: &WorkflowContext, input: &Values) -> Result<()> {
        let values = input.merge(&self.values);
        self.load().await?.teardown(ctx, &values).await
    }

    pub async fn render(&self, ctx: &WorkflowContext, input: &Values) -> Result<Vec<Value>> {
        let values = input.merge(&self.values);
        self.load().await?.render(ctx, &values).await
    }
}

//! Ensure config - the top-level document of `valet ensure`
//!
//! ```yaml
//! cluster:
//!   type: gke
//!   gke:
//!     name: valet-test
//!     project: solo-test-236622
//!     location: us-east1-b
//! values:
//!   Version: 1.3.0
//! applications:
//!   - path: apps/gloo.yaml
//!   - path: apps/petstore.yaml
//!     values:
//!       Namespace: default
//! steps:
//!   - waitForPods:
//!       namespace: default
//! ```
//!
//! The cluster section is accepted for compatibility with existing config
//! files but nothing is provisioned; point `--kubeconfig` at a running
//! cluster instead.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::context::WorkflowContext;
use crate::error::Result;
use crate::loader;
use crate::render::Values;
use crate::resource::ApplicationRef;
use crate::step::Step;
use crate::workflow::Workflow;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnsureConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterSpec>,
    #[serde(default, skip_serializing_if = "Values::is_empty")]
    pub values: Values,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applications: Vec<ApplicationRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClusterSpec {
    #[serde(rename = "type")]
    pub cluster_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gke: Option<GkeCluster>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minikube: Option<MinikubeCluster>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GkeCluster {
    pub name: String,
    pub project: String,
    pub location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MinikubeCluster {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kube_version: String,
}

impl EnsureConfig {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        loader::load(path).await
    }

    fn workflow(&self) -> Workflow {
        Workflow {
            values: self.values.clone(),
            steps: self.steps.clone(),
        }
    }

    fn note_cluster(&self) {
        if let Some(cluster) = &self.cluster {
            warn!(
                cluster_type = %cluster.cluster_type,
                "Cluster provisioning is not supported; using the current kubeconfig"
            );
        }
    }

    /// Ensure every application in order, then run the steps
    #[instrument(skip_all, fields(applications = self.applications.len(), steps = self.steps.len()))]
    pub async fn ensure(&self, ctx: &WorkflowContext) -> Result<()> {
        self.note_cluster();
        let values = ctx.values.merge(&self.values);
        for app in &self.applications {
            info!(path = %app.path, "Ensuring application");
            app.ensure(ctx, &values).await?;
        }
        self.workflow().run(ctx).await
    }

    /// Tear down the steps, then the applications, both in reverse
    #[instrument(skip_all, fields(applications = self.applications.len(), steps = self.steps.len()))]
    pub async fn teardown(&self, ctx: &WorkflowContext) -> Result<()> {
        self.workflow().teardown(ctx).await?;
        let values = ctx.values.merge(&self.values);
        for app in self.applications.iter().rev() {
            info!(path = %app.path, "Tearing down application");
            app.teardown(ctx, &values).await?;
        }
        Ok(())
    }

    /// Concrete objects of every application, without touching the cluster
    pub async fn render(&self, ctx: &WorkflowContext) -> Result<Vec<Value>> {
        let values = ctx.values.merge(&self.values);
        let mut objects = Vec::new();
        for app in &self.applications {
            objects.extend(app.render(ctx, &values).await?);
        }
        Ok(objects)
    }
}

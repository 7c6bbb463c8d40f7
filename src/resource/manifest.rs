//! Manifest resource - a static file applied as is

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{kubectl_apply, kubectl_delete};
use crate::context::WorkflowContext;
use crate::error::Result;
use crate::loader;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Manifest {
    pub path: String,
}

impl Manifest {
    pub async fn ensure(&self, ctx: &WorkflowContext) -> Result<()> {
        info!(path = %self.path, "Ensuring manifest");
        kubectl_apply(ctx, loader::read_file(&self.path).await?, "").await
    }

    pub async fn teardown(&self, ctx: &WorkflowContext) -> Result<()> {
        info!(path = %self.path, "Tearing down manifest");
        kubectl_delete(ctx, loader::read_file(&self.path).await?, "").await
    }

    pub async fn render(&self) -> Result<Vec<Value>> {
        loader::parse_objects(&loader::read_file(&self.path).await?)
    }
}

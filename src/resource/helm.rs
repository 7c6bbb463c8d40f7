//! Helm chart resource

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::cmd::Command;
use crate::config::EnvConfig;
use crate::context::WorkflowContext;
use crate::error::Result;
use crate::loader;
use crate::render::fields::{is_unset, render_fields, FieldSpec, FieldValue, Renderable};
use crate::render::values::ENV_PREFIX;
use crate::render::{Values, NAMESPACE_KEY, VERSION_KEY};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HelmChart {
    #[serde(default, skip_serializing_if = "is_unset")]
    pub release_name: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub chart_name: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub repo_name: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub repo_url: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values_files: Vec<String>,
}

impl Renderable for HelmChart {
    const TYPE_NAME: &'static str = "HelmChart";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("releaseName").required(),
        FieldSpec::new("namespace").key(NAMESPACE_KEY).required(),
        FieldSpec::new("chartName").required(),
        FieldSpec::new("repoName"),
        FieldSpec::new("repoUrl"),
        FieldSpec::new("version").key(VERSION_KEY),
    ];

    fn field_mut(&mut self, name: &str) -> Option<&mut dyn FieldValue> {
        match name {
            "releaseName" => Some(&mut self.release_name),
            "namespace" => Some(&mut self.namespace),
            "chartName" => Some(&mut self.chart_name),
            "repoName" => Some(&mut self.repo_name),
            "repoUrl" => Some(&mut self.repo_url),
            "version" => Some(&mut self.version),
            _ => None,
        }
    }
}

impl HelmChart {
    async fn rendered(&self, ctx: &WorkflowContext, values: &Values) -> Result<HelmChart> {
        let mut chart = self.clone();
        render_fields(&mut chart, values, &ctx.render_ctx()).await?;
        Ok(chart)
    }

    /// `repo/chart` when a repo is named, otherwise the chart reference as given
    pub fn chart_ref(&self) -> String {
        if self.repo_name.is_empty() {
            self.chart_name.clone()
        } else {
            format!("{}/{}", self.repo_name, self.chart_name)
        }
    }

    fn with_chart_args(&self, command: Command, env: &EnvConfig) -> Result<Command> {
        let mut command = command
            .arg(self.release_name.as_str())
            .arg(self.chart_ref())
            .args(["--namespace", self.namespace.as_str()]);
        if !self.version.is_empty() {
            command = command.args(["--version", self.version.as_str()]);
        }
        Ok(command.args(set_args(&self.set, env)?).args(values_file_args(&self.values_files)))
    }

    async fn add_repo(&self, ctx: &WorkflowContext) -> Result<()> {
        if self.repo_name.is_empty() || self.repo_url.is_empty() {
            return Ok(());
        }
        let add = ctx
            .helm()
            .args(["repo", "add", self.repo_name.as_str(), self.repo_url.as_str()]);
        ctx.runner.run(&add).await?;
        ctx.runner.run(&ctx.helm().args(["repo", "update"])).await
    }

    pub async fn ensure(&self, ctx: &WorkflowContext, values: &Values) -> Result<()> {
        let chart = self.rendered(ctx, values).await?;
        info!(
            release = %chart.release_name,
            chart = %chart.chart_ref(),
            namespace = %chart.namespace,
            "Ensuring helm chart"
        );
        chart.add_repo(ctx).await?;
        let command = chart.with_chart_args(ctx.helm().args(["upgrade", "--install"]), &ctx.env)?;
        ctx.runner.run(&command.arg("--create-namespace")).await
    }

    pub async fn teardown(&self, ctx: &WorkflowContext, values: &Values) -> Result<()> {
        let chart = self.rendered(ctx, values).await?;
        info!(release = %chart.release_name, namespace = %chart.namespace, "Uninstalling helm chart");
        let command = ctx
            .helm()
            .args(["uninstall", chart.release_name.as_str()])
            .args(["--namespace", chart.namespace.as_str()]);
        ctx.runner.run(&command).await
    }

    pub async fn render(&self, ctx: &WorkflowContext, values: &Values) -> Result<Vec<Value>> {
        let chart = self.rendered(ctx, values).await?;
        chart.add_repo(ctx).await?;
        let command = chart.with_chart_args(ctx.helm().arg("template"), &ctx.env)?;
        let manifest = ctx.runner.output(&command).await?;
        loader::parse_objects(&manifest)
    }
}

/// `--set k=v` pairs; values written `env:NAME` are read from the environment
pub(crate) fn set_args(set: &BTreeMap<String, String>, env: &EnvConfig) -> Result<Vec<String>> {
    let mut args = Vec::with_capacity(set.len() * 2);
    for (key, value) in set {
        let value = match value.strip_prefix(ENV_PREFIX) {
            Some(name) => env.require(name.trim())?,
            None => value.as_str(),
        };
        args.push("--set".to_string());
        args.push(format!("{}={}", key, value));
    }
    Ok(args)
}

pub(crate) fn values_file_args(files: &[String]) -> Vec<String> {
    files
        .iter()
        .flat_map(|f| ["--values".to_string(), f.clone()])
        .collect()
}

//! Curl check - verify an HTTP endpoint converges to an expected response
//!
//! The target is either a load-balanced service (address looked up through
//! the kube client) or a deployment exposed with `kubectl port-forward`.
//! Exactly one must be set.
//!
//! ```yaml
//! curl:
//!   service:
//!     name: gateway-proxy
//!     namespace: gloo-system
//!   path: /sample-route-1
//!   statusCode: 429
//!   headers:
//!     x-token: abc
//!   attempts: 100
//!   delay: 100ms
//! ```
//!
//! Every attempt that fails (transport error, wrong status, wrong body) is
//! retried after a fixed delay; once attempts run out only the last failure
//! is returned. A port-forward is always killed before returning.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::cmd::{Command, HttpRequest, HttpResponse};
use crate::context::WorkflowContext;
use crate::error::{Result, ValetError};
use crate::render::fields::{is_unset, render_fields, FieldSpec, FieldValue, Renderable};
use crate::render::{Values, NAMESPACE_KEY};

pub const DEFAULT_CURL_DELAY: &str = "1s";
pub const DEFAULT_CURL_ATTEMPTS: u32 = 10;
pub const DEFAULT_METHOD: &str = "GET";
pub const DEFAULT_PORT_FORWARD_PORT: u16 = 8080;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Curl {
    #[serde(default, skip_serializing_if = "is_unset")]
    pub path: String,
    /// Host header override
    #[serde(default, skip_serializing_if = "is_unset")]
    pub host: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub method: String,
    #[serde(default, rename = "body", skip_serializing_if = "is_unset")]
    pub request_body: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub response_body: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub response_body_substring: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_forward: Option<PortForward>,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub delay: String,
}

impl Renderable for Curl {
    const TYPE_NAME: &'static str = "Curl";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("path"),
        FieldSpec::new("host"),
        FieldSpec::new("statusCode").default_value("200"),
        FieldSpec::new("method").default_value(DEFAULT_METHOD),
        FieldSpec::new("body"),
        FieldSpec::new("responseBody"),
        FieldSpec::new("responseBodySubstring"),
        FieldSpec::new("attempts").default_value("10"),
        FieldSpec::new("delay").default_value(DEFAULT_CURL_DELAY),
    ];

    fn field_mut(&mut self, name: &str) -> Option<&mut dyn FieldValue> {
        match name {
            "path" => Some(&mut self.path),
            "host" => Some(&mut self.host),
            "statusCode" => Some(&mut self.status_code),
            "method" => Some(&mut self.method),
            "body" => Some(&mut self.request_body),
            "responseBody" => Some(&mut self.response_body),
            "responseBodySubstring" => Some(&mut self.response_body_substring),
            "attempts" => Some(&mut self.attempts),
            "delay" => Some(&mut self.delay),
            _ => None,
        }
    }
}

/// A service exposed through a load balancer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceRef {
    #[serde(default, skip_serializing_if = "is_unset")]
    pub name: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub namespace: String,
    /// Port name (also used as the URL scheme) or number
    #[serde(default, skip_serializing_if = "is_unset")]
    pub port: String,
}

impl Renderable for ServiceRef {
    const TYPE_NAME: &'static str = "ServiceRef";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("name").required(),
        FieldSpec::new("namespace").key(NAMESPACE_KEY),
        FieldSpec::new("port").default_value("http"),
    ];

    fn field_mut(&mut self, name: &str) -> Option<&mut dyn FieldValue> {
        match name {
            "name" => Some(&mut self.name),
            "namespace" => Some(&mut self.namespace),
            "port" => Some(&mut self.port),
            _ => None,
        }
    }
}

impl ServiceRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            port: String::new(),
        }
    }
}

/// A deployment exposed on localhost with `kubectl port-forward`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PortForward {
    #[serde(default, skip_serializing_if = "is_unset")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub deployment_name: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub port: u16,
}

impl Renderable for PortForward {
    const TYPE_NAME: &'static str = "PortForward";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("namespace").key(NAMESPACE_KEY),
        FieldSpec::new("deploymentName").required(),
        FieldSpec::new("port").default_value("8080"),
    ];

    fn field_mut(&mut self, name: &str) -> Option<&mut dyn FieldValue> {
        match name {
            "namespace" => Some(&mut self.namespace),
            "deploymentName" => Some(&mut self.deployment_name),
            "port" => Some(&mut self.port),
            _ => None,
        }
    }
}

impl PortForward {
    /// `kubectl port-forward -n <ns> deploy/<name> <port>`
    pub fn command(&self, ctx: &WorkflowContext) -> Command {
        ctx.kubectl()
            .arg("port-forward")
            .namespace(&self.namespace)
            .arg(format!("deploy/{}", self.deployment_name))
            .arg(self.port.to_string())
    }
}

impl Curl {
    /// Copy with own, service and port-forward fields rendered
    pub async fn rendered(&self, ctx: &WorkflowContext, values: &Values) -> Result<Curl> {
        let rctx = ctx.render_ctx();
        let mut curl = self.clone();
        render_fields(&mut curl, values, &rctx).await?;
        if let Some(service) = curl.service.as_mut() {
            render_fields(service, values, &rctx).await?;
        }
        if let Some(port_forward) = curl.port_forward.as_mut() {
            render_fields(port_forward, values, &rctx).await?;
        }
        Ok(curl)
    }

    /// Target URL of a rendered check
    pub async fn url(&self, ctx: &WorkflowContext) -> Result<String> {
        match (&self.service, &self.port_forward) {
            (Some(service), None) => {
                let address = ctx
                    .kube
                    .get_ingress_address(&service.name, &service.namespace, &service.port)
                    .await?;
                Ok(format!("{}://{}{}", service.port, address, self.path))
            }
            (None, Some(port_forward)) => {
                Ok(format!("http://localhost:{}{}", port_forward.port, self.path))
            }
            _ => Err(ValetError::InvalidTarget),
        }
    }

    pub fn http_request(&self, url: String) -> HttpRequest {
        HttpRequest {
            method: self.method.clone(),
            url,
            headers: self.headers.clone(),
            host: non_empty(&self.host),
            body: non_empty(&self.request_body),
        }
    }

    /// Compare a response against the expectations
    pub fn check(&self, response: &HttpResponse) -> Result<()> {
        if response.status != self.status_code {
            return Err(ValetError::UnexpectedStatusCode {
                status: response.status,
            });
        }
        let body = response.body.trim();
        if !self.response_body.is_empty() && body != self.response_body.trim() {
            return Err(ValetError::UnexpectedResponseBody {
                body: response.body.clone(),
            });
        }
        if !self.response_body_substring.is_empty()
            && !body.contains(self.response_body_substring.trim())
        {
            return Err(ValetError::UnexpectedResponseBody {
                body: response.body.clone(),
            });
        }
        Ok(())
    }

    /// Rendered copy together with its target URL
    async fn prepare(&self, ctx: &WorkflowContext, values: &Values) -> Result<(Curl, String)> {
        let curl = self.rendered(ctx, values).await?;
        let url = curl.url(ctx).await?;
        Ok((curl, url))
    }

    #[instrument(skip_all, fields(path = %self.path))]
    pub async fn run(&self, ctx: &WorkflowContext, values: &Values) -> Result<()> {
        let (curl, url) = self.prepare(ctx, values).await?;
        let delay = parse_delay(&curl.delay)?;
        info!("{}", curl.summary(&url));

        let mut port_forward = match &curl.port_forward {
            Some(pf) => {
                let mut handle = ctx.runner.stream(&pf.command(ctx)).await?;
                handle.stream_output();
                info!(command = %handle.command(), "Initiated port forward");
                Some(handle)
            }
            None => None,
        };

        let request = curl.http_request(url);
        let outcome = {
            let (curl, request) = (&curl, &request);
            ctx.retry_policy(curl.attempts, delay)
                .execute("curl", move |_| async move {
                    let response = ctx.runner.request(request).await?;
                    curl.check(&response)
                })
                .await
        };

        if let Some(mut handle) = port_forward.take() {
            if let Err(cleanup_err) = ctx.runner.kill(&mut handle).await {
                if outcome.is_ok() {
                    return Err(cleanup_err);
                }
                warn!(error = %cleanup_err, "Failed to stop port forward after failed check");
            }
        }

        if outcome.is_ok() {
            info!("Curl successful");
        }
        outcome
    }

    /// Request and expectations in readable form
    pub async fn describe(&self, ctx: &WorkflowContext, values: &Values) -> Result<String> {
        let (curl, url) = self.prepare(ctx, values).await?;
        Ok(curl.summary(&url))
    }

    fn summary(&self, url: &str) -> String {
        let mut out = format!("Issuing http request\n{} {}", self.method, url);
        if !self.headers.is_empty() {
            let headers: Vec<String> = self
                .headers
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect();
            let _ = write!(out, "\nHeaders: {}", headers.join(", "));
        }
        if !self.request_body.is_empty() {
            let _ = write!(out, "\nBody: {}", self.request_body);
        }
        let _ = write!(out, "\nExpected status: {}", self.status_code);
        if !self.response_body.is_empty() {
            let _ = write!(out, "\nExpected response: {}", self.response_body);
        } else if !self.response_body_substring.is_empty() {
            let _ = write!(
                out,
                "\nExpected response substring: {}",
                self.response_body_substring
            );
        }
        out
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Parse `100ms`, `1s`, `1.5s` or `2m`
pub fn parse_delay(raw: &str) -> Result<Duration> {
    parse_duration("delay", raw)
}

/// Duration with an `ms`, `s` or `m` suffix, reported against `field`
pub fn parse_duration(field: &str, raw: &str) -> Result<Duration> {
    let invalid = |reason: &str| ValetError::FieldConversion {
        field: field.to_string(),
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    let trimmed = raw.trim();
    let (number, unit_secs) = if let Some(n) = trimmed.strip_suffix("ms") {
        (n, 0.001)
    } else if let Some(n) = trimmed.strip_suffix('s') {
        (n, 1.0)
    } else if let Some(n) = trimmed.strip_suffix('m') {
        (n, 60.0)
    } else {
        return Err(invalid("expected a unit of ms, s or m"));
    };
    let amount: f64 = number
        .trim()
        .parse()
        .map_err(|_| invalid("expected a number before the unit"))?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(invalid("must be a non-negative number"));
    }
    Duration::try_from_secs_f64(amount * unit_secs).map_err(|e| invalid(&e.to_string()))
}

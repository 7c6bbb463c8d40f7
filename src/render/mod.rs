//! Render Module - value resolution and field rendering
//!
//! - `values`: the value store and its expression language
//! - `template`: `{{ .Name }}` placeholder parsing
//! - `fields`: static field-binding tables and the generic field renderer
//!
//! Expression forms:
//! ```yaml
//! values:
//!   Namespace: gloo-system                               # literal
//!   UpstreamNamespace: key:Namespace                     # indirection
//!   UpstreamName: template:{{ .Namespace }}-ui-8080      # template
//!   LicenseKey: env:LICENSE_KEY                          # environment
//!   Version: cmd:git describe --tags                     # command output
//! ```

pub mod fields;
pub mod template;
pub mod values;

use crate::cmd::CommandRunner;
use crate::config::EnvConfig;

pub use fields::{render_fields, FieldSpec, FieldValue, Renderable};
pub use values::Values;

/// Well-known value keys shared by resources and steps
pub const NAMESPACE_KEY: &str = "Namespace";
pub const VERSION_KEY: &str = "Version";

/// What expression evaluation may call out to
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub env: &'a EnvConfig,
}

impl<'a> RenderContext<'a> {
    pub fn new(runner: &'a dyn CommandRunner, env: &'a EnvConfig) -> Self {
        Self { runner, env }
    }
}

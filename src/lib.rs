//! Valet - declarative ensure engine for Kubernetes environments
//!
//! ## Module Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DOMAIN MODEL                          │
//! │  workflow/  Workflow { values, steps }                       │
//! │  ensure/    EnsureConfig { cluster, applications, steps }    │
//! │  step/      apply, delete, waitForPods, curl, condition,     │
//! │             patch, installHelmChart, application             │
//! │  resource/  template, manifest, secret, helmChart, app       │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      RESOLUTION LAYER                        │
//! │  render/    Values store, resolver, field renderer           │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                      │
//! │  cmd/        CommandRunner (kubectl, helm, gcloud, HTTP)     │
//! │  kube/       KubeClient (ingress address, pod readiness)     │
//! │  resilience/ Fixed-delay bounded retry                       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`workflow`] | Sequential step execution, reverse teardown |
//! | [`ensure`] | Top-level ensure document |
//! | [`step`] | Step variants and their run/teardown/describe |
//! | [`resource`] | Resource variants and their ensure/teardown/render |
//! | [`render`] | Value expressions and typed field rendering |
//! | [`cmd`] | Command and HTTP execution seam |
//! | [`kube`] | Cluster queries seam |
//! | [`context`] | Per-run context passed to every step |
//! | [`config`] | Global config file and environment snapshot |
//! | [`loader`] | Strict YAML loading |
//! | [`error`] | Error types with fix suggestions |

// ═══════════════════════════════════════════════════════════════
// DOMAIN MODEL - YAML → Rust types
// ═══════════════════════════════════════════════════════════════
pub mod ensure;
pub mod resource;
pub mod step;
pub mod workflow;

// ═══════════════════════════════════════════════════════════════
// RESOLUTION LAYER - Values and field rendering
// ═══════════════════════════════════════════════════════════════
pub mod render;

// ═══════════════════════════════════════════════════════════════
// INFRASTRUCTURE LAYER - Commands, cluster, retry
// ═══════════════════════════════════════════════════════════════
pub mod cmd;
pub mod kube;
pub mod resilience;

// ═══════════════════════════════════════════════════════════════
// CROSS-CUTTING - Context, configuration, errors
// ═══════════════════════════════════════════════════════════════
pub mod config;
pub mod context;
pub mod error;
pub mod loader;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod test_utils;

// ═══════════════════════════════════════════════════════════════
// PUBLIC API RE-EXPORTS
// ═══════════════════════════════════════════════════════════════

// Error types
pub use error::{FixSuggestion, Result, ValetError};

// Config types
pub use config::{EnvConfig, GlobalConfig};

// Execution
pub use context::WorkflowContext;
pub use ensure::EnsureConfig;
pub use workflow::Workflow;

// Domain types
pub use render::Values;
pub use resource::{Application, Resource};
pub use step::Step;

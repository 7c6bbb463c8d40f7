//! Secret resource
//!
//! Entries come from the environment, a plaintext file, or a file encrypted
//! with Google Cloud KMS. Encrypted files must end in `.enc`; they are
//! decrypted next to the ciphertext and the plaintext is removed again once
//! the secret has been built.

use std::collections::BTreeMap;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::kubectl_apply;
use crate::cmd::Command;
use crate::context::WorkflowContext;
use crate::error::{Result, ValetError};
use crate::loader;
use crate::render::fields::{is_unset, render_fields, FieldSpec, FieldValue, Renderable};
use crate::render::{Values, NAMESPACE_KEY};

pub const ENCRYPTED_SUFFIX: &str = ".enc";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Secret {
    #[serde(default, skip_serializing_if = "is_unset")]
    pub name: String,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub namespace: String,
    #[serde(default, rename = "type", skip_serializing_if = "is_unset")]
    pub secret_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub entries: BTreeMap<String, SecretValue>,
}

/// Source of one secret entry; exactly one field is set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecretValue {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub env_var: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcloud_kms_encrypted_file: Option<GcloudKmsEncryptedFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GcloudKmsEncryptedFile {
    pub ciphertext_file: String,
    pub gcloud_project: String,
    pub keyring: String,
    pub key: String,
}

impl GcloudKmsEncryptedFile {
    /// Path the plaintext is decrypted to
    pub fn plaintext_file(&self) -> Result<&str> {
        self.ciphertext_file
            .strip_suffix(ENCRYPTED_SUFFIX)
            .ok_or_else(|| ValetError::InvalidCiphertextFilename {
                path: self.ciphertext_file.clone(),
            })
    }

    fn decrypt_command(&self, plaintext: &str) -> Command {
        Command::gcloud()
            .args(["kms", "decrypt"])
            .args(["--ciphertext-file", self.ciphertext_file.as_str()])
            .args(["--plaintext-file", plaintext])
            .args(["--project", self.gcloud_project.as_str()])
            .args(["--keyring", self.keyring.as_str()])
            .args(["--key", self.key.as_str()])
            .args(["--location", "global"])
    }
}

impl Renderable for Secret {
    const TYPE_NAME: &'static str = "Secret";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("name").required(),
        FieldSpec::new("namespace").key(NAMESPACE_KEY),
        FieldSpec::new("type").default_value("Opaque"),
    ];

    fn field_mut(&mut self, name: &str) -> Option<&mut dyn FieldValue> {
        match name {
            "name" => Some(&mut self.name),
            "namespace" => Some(&mut self.namespace),
            "type" => Some(&mut self.secret_type),
            _ => None,
        }
    }
}

impl Secret {
    async fn rendered(&self, ctx: &WorkflowContext, values: &Values) -> Result<Secret> {
        let mut secret = self.clone();
        render_fields(&mut secret, values, &ctx.render_ctx()).await?;
        Ok(secret)
    }

    pub async fn ensure(&self, ctx: &WorkflowContext, values: &Values) -> Result<()> {
        let secret = self.rendered(ctx, values).await?;
        info!(
            name = %secret.name,
            namespace = %secret.namespace,
            entries = secret.entries.len(),
            "Ensuring secret"
        );
        let object = secret.build(ctx).await?;
        kubectl_apply(ctx, serde_yaml::to_string(&object)?, &secret.namespace).await
    }

    pub async fn teardown(&self, ctx: &WorkflowContext, values: &Values) -> Result<()> {
        let secret = self.rendered(ctx, values).await?;
        info!(name = %secret.name, namespace = %secret.namespace, "Tearing down secret");
        let command = ctx
            .kubectl()
            .args(["delete", "secret", secret.name.as_str()])
            .namespace(&secret.namespace)
            .arg("--ignore-not-found");
        ctx.runner.run(&command).await
    }

    pub async fn render(&self, ctx: &WorkflowContext, values: &Values) -> Result<Vec<Value>> {
        let secret = self.rendered(ctx, values).await?;
        Ok(vec![secret.build(ctx).await?])
    }

    /// Build the v1 Secret object from already rendered fields
    async fn build(&self, ctx: &WorkflowContext) -> Result<Value> {
        let mut plaintexts = Vec::new();
        let data = self.collect_data(ctx, &mut plaintexts).await;
        let cleanup = remove_plaintexts(&plaintexts).await;

        let data = match (data, cleanup) {
            (Err(err), cleanup) => {
                if let Err(cleanup_err) = cleanup {
                    warn!(error = %cleanup_err, "Plaintext cleanup failed after secret error");
                }
                return Err(err);
            }
            (Ok(_), Err(cleanup_err)) => return Err(cleanup_err),
            (Ok(data), Ok(())) => data,
        };

        let mut metadata = Map::new();
        metadata.insert("name".into(), Value::String(self.name.clone()));
        if !self.namespace.is_empty() {
            metadata.insert("namespace".into(), Value::String(self.namespace.clone()));
        }
        Ok(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": metadata,
            "type": self.secret_type,
            "data": data,
        }))
    }

    async fn collect_data(
        &self,
        ctx: &WorkflowContext,
        plaintexts: &mut Vec<String>,
    ) -> Result<Map<String, Value>> {
        let mut data = Map::new();
        for (key, entry) in &self.entries {
            let bytes = match (
                entry.env_var.is_empty(),
                entry.file.is_empty(),
                &entry.gcloud_kms_encrypted_file,
            ) {
                (false, true, None) => ctx.env.require(&entry.env_var)?.as_bytes().to_vec(),
                (true, false, None) => loader::read_bytes(&entry.file).await?,
                (true, true, Some(encrypted)) => {
                    let plaintext = encrypted.plaintext_file()?;
                    ctx.runner
                        .run(&encrypted.decrypt_command(plaintext))
                        .await
                        .map_err(|e| ValetError::DecryptFailed {
                            reason: e.to_string(),
                        })?;
                    plaintexts.push(plaintext.to_string());
                    loader::read_bytes(plaintext).await?
                }
                _ => {
                    return Err(ValetError::InvalidResource {
                        reason: format!(
                            "secret entry '{}' must set exactly one of envVar, file, gcloudKmsEncryptedFile",
                            key
                        ),
                    })
                }
            };
            data.insert(key.clone(), Value::String(STANDARD.encode(bytes)));
        }
        Ok(data)
    }
}

async fn remove_plaintexts(paths: &[String]) -> Result<()> {
    for path in paths {
        if !Path::new(path).exists() {
            continue;
        }
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| ValetError::PlaintextCleanupFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;
    }
    Ok(())
}

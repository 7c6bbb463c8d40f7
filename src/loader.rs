//! YAML loading
//!
//! Configuration documents are parsed strictly: every struct rejects unknown
//! fields, and parse errors carry the file they came from.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, ValetError};

/// Read a file to a string
pub async fn read_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ValetError::FileRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Read a file to bytes
pub async fn read_bytes(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    tokio::fs::read(path).await.map_err(|e| ValetError::FileRead {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Parse one YAML document; `origin` names the source in errors
pub fn parse<T: DeserializeOwned>(yaml: &str, origin: &str) -> Result<T> {
    serde_yaml::from_str(yaml).map_err(|e| ValetError::ParseError {
        path: origin.to_string(),
        details: e.to_string(),
    })
}

/// Read and parse one YAML document
pub async fn load<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let yaml = read_file(path).await?;
    parse(&yaml, &path.display().to_string())
}

/// Parse a multi-document YAML stream into objects, skipping empty documents
pub fn parse_objects(yaml: &str) -> Result<Vec<Value>> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(yaml) {
        let value = Value::deserialize(document)?;
        if !value.is_null() {
            objects.push(value);
        }
    }
    Ok(objects)
}

/// Serialize objects back into a multi-document YAML stream
pub fn to_yaml_stream(objects: &[Value]) -> Result<String> {
    let mut out = String::new();
    for object in objects {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(object)?);
    }
    Ok(out)
}

//! Node keys and input-shape signatures
//!
//! A registry node is keyed by its display name plus a short hash of its
//! declared inputs, so two packages that ship a node with the same name but
//! different inputs land under different keys. Community data carries names
//! only and always uses the placeholder token.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;

/// Token for nodes whose input shape is unknown
pub const PLACEHOLDER_TOKEN: &str = "_";

/// Hex characters of the digest kept in a token
const TOKEN_LEN: usize = 8;

/// Input section that never affects the signature
const HIDDEN_SECTION: &str = "hidden";

/// Type name recorded for an input whose type is a list of choices
const COMBO_TYPE: &str = "COMBO";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("input shape is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("input shape is not an object")]
    NotAnObject,
}

/// `"{display_name}::{token}"`
pub fn node_key(display_name: &str, token: &str) -> String {
    format!("{}::{}", display_name, token)
}

/// Split a node key into display name and token
pub fn split_node_key(key: &str) -> Option<(&str, &str)> {
    key.rsplit_once("::")
}

/// Signature token for a declared input shape
///
/// The shape is either an inline JSON object or a string holding one. An
/// absent or empty shape yields the placeholder.
pub fn signature_token(input_types: &Value) -> Result<String, SignatureError> {
    let parsed;
    let shape = match input_types {
        Value::Null => return Ok(PLACEHOLDER_TOKEN.to_string()),
        Value::String(raw) if raw.trim().is_empty() => return Ok(PLACEHOLDER_TOKEN.to_string()),
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw)
                .map_err(|e| SignatureError::InvalidJson(e.to_string()))?;
            &parsed
        }
        other => other,
    };

    let canonical = canonical_shape(shape)?;
    if canonical.is_empty() {
        return Ok(PLACEHOLDER_TOKEN.to_string());
    }

    // BTreeMap serialization is key-ordered, so equivalent shapes hash alike
    let text = serde_json::to_string(&canonical)
        .map_err(|e| SignatureError::InvalidJson(e.to_string()))?;
    let digest = hex::encode(Sha256::digest(text.as_bytes()));
    Ok(digest[..TOKEN_LEN].to_string())
}

/// Reduce a shape to `section -> input name -> type name`
fn canonical_shape(
    shape: &Value,
) -> Result<BTreeMap<String, BTreeMap<String, String>>, SignatureError> {
    let sections = shape.as_object().ok_or(SignatureError::NotAnObject)?;

    let mut canonical = BTreeMap::new();
    for (section, inputs) in sections {
        if section == HIDDEN_SECTION {
            continue;
        }
        let Some(inputs) = inputs.as_object() else {
            continue;
        };
        let normalized: BTreeMap<String, String> = inputs
            .iter()
            .map(|(name, spec)| (name.clone(), type_name(spec)))
            .collect();
        if !normalized.is_empty() {
            canonical.insert(section.clone(), normalized);
        }
    }
    Ok(canonical)
}

fn type_name(spec: &Value) -> String {
    let head = match spec {
        Value::Array(items) => match items.first() {
            Some(head) => head,
            None => return String::new(),
        },
        other => other,
    };
    match head {
        Value::String(name) => name.clone(),
        Value::Array(_) => COMBO_TYPE.to_string(),
        other => other.to_string(),
    }
}
